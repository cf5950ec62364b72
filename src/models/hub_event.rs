use std::fmt::Display;

use super::{port_registry::Port, session_state::SessionState, value_store::SensorReading};

/// Broadcast whenever inbound frames change the registry or the value store,
/// and whenever the session moves between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEvent {
    PortAttached(Port),
    PortDetached { port_id: u8 },
    ReadingUpdated(SensorReading),
    SessionChanged(SessionState),
}

impl Display for HubEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortAttached(port) => write!(f, "<Attached {}>", port),
            Self::PortDetached { port_id } => write!(f, "<Detached port 0x{:02X}>", port_id),
            Self::ReadingUpdated(reading) => write!(f, "<Updated {}>", reading),
            Self::SessionChanged(state) => write!(f, "<Session {}>", state),
        }
    }
}
