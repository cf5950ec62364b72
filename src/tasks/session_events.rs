use tokio::sync::{broadcast::Sender, watch::Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{hub_event::HubEvent, session_state::SessionState};

/// Task: Republishes session state changes as hub events for as long as the
/// hub exists. Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_forward_session_state(
    token: CancellationToken,
    mut rx_state: Receiver<SessionState>,
    tx_events: Sender<HubEvent>,
) {
    info!("Started.");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            changed = rx_state.changed() => {
                if changed.is_err() {
                    debug!("Session dropped.");
                    break;
                }
                let state = *rx_state.borrow_and_update();
                let _ = tx_events.send(HubEvent::SessionChanged(state));
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast, watch};

    use super::*;

    #[tokio::test]
    async fn test_states_forwarded_across_reconnects() {
        let (tx_state, rx_state) = watch::channel(SessionState::Disconnected);
        let (tx_events, mut rx_events) = broadcast::channel(8);
        let token = CancellationToken::new();

        let handle = tokio::spawn(task_forward_session_state(token.clone(), rx_state, tx_events));

        for state in [
            SessionState::Connecting,
            SessionState::Disconnected,
            SessionState::Connecting,
        ] {
            tx_state.send_replace(state);
            assert_eq!(rx_events.recv().await, Ok(HubEvent::SessionChanged(state)));
        }

        token.cancel();
        handle.await.expect("Task panicked.");
    }

    #[tokio::test]
    async fn test_stops_when_session_dropped() {
        let (tx_state, rx_state) = watch::channel(SessionState::Disconnected);
        let (tx_events, _rx_events) = broadcast::channel(8);

        let handle = tokio::spawn(task_forward_session_state(
            CancellationToken::new(),
            rx_state,
            tx_events,
        ));
        drop(tx_state);
        handle.await.expect("Task panicked.");
    }
}
