use common::{
    frame::EncodeError,
    physical::{ColorError, DirectionError, SoundError},
};
use thiserror::Error;

/// Errors surfaced to callers of the hub driver.
///
/// Malformed inbound frames are not part of this enum, they are logged and
/// dropped by the decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Scanning or connecting failed, or the link went away while a command
    /// was waiting. Never retried automatically.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single write was not acknowledged by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rejected before anything was written.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<EncodeError> for HubError {
    fn from(e: EncodeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<ColorError> for HubError {
    fn from(e: ColorError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<SoundError> for HubError {
    fn from(e: SoundError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<DirectionError> for HubError {
    fn from(e: DirectionError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}
