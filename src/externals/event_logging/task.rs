use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::hub_event::HubEvent;

/// Task: Logs every hub event. Readings are frequent, so they go to debug.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_hub_event_logging(
    token: CancellationToken,
    mut events: BroadcastStream<HubEvent>,
) {
    info!("Started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            event = events.next() => match event {
                Some(Ok(event @ HubEvent::ReadingUpdated(_))) => debug!("Got hub event: {}", event),
                Some(Ok(event)) => info!("Got hub event: {}", event),
                Some(Err(e)) => warn!("Event log fell behind. Error: {}", e),
                None => {
                    warn!("Event stream closed.");
                    break;
                }
            },
        };
    }
}
