use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Lifecycle of a connection session.
/// `Disconnected -> Connecting -> Connected -> Disconnected`.
#[derive(Serialize, Deserialize, Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[display(fmt = "disconnected")]
    Disconnected,

    #[display(fmt = "connecting")]
    Connecting,

    #[display(fmt = "connected")]
    Connected,
}
