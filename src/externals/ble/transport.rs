use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{error::HubError, models::config::HubFilter};

/// Finds and connects to a hub. Implementations may scan forever, the session
/// bounds `connect` with the configured scan timeout.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn connect(&self, filter: &HubFilter) -> Result<Box<dyn HubLink>, HubError>;
}

/// An established link to one hub.
#[async_trait]
pub trait HubLink: Send + Sync {
    /// Write one frame, resolving once the peripheral acknowledged it.
    async fn write(&self, bytes: &[u8]) -> Result<(), HubError>;

    /// Inbound frames in arrival order, including those the hub sent while
    /// the link was set up. The stream ends when the link is lost.
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>, HubError>;

    async fn disconnect(&self) -> Result<(), HubError>;
}
