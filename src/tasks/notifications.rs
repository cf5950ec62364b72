use futures::{stream::BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Why the notification pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    Cancelled,

    /// The transport closed the stream, the link is gone.
    StreamEnded,
}

/// Task: Hands every inbound frame to `dispatch`, in arrival order, until the
/// stream ends or the token is cancelled. Never waits on outbound writes.
#[tracing::instrument(skip_all)]
pub async fn task_pump_notifications<F>(
    token: CancellationToken,
    mut frames: BoxStream<'static, Vec<u8>>,
    dispatch: F,
) -> PumpExit
where
    F: Fn(&[u8]),
{
    info!("Started.");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                return PumpExit::Cancelled;
            },
            frame = frames.next() => match frame {
                Some(frame) => {
                    trace!("Received {} byte frame.", frame.len());
                    dispatch(&frame);
                }
                None => {
                    warn!("Notification stream ended.");
                    return PumpExit::StreamEnded;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn test_frames_dispatched_in_order_until_stream_ends() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let frames = stream::iter(vec![vec![1u8], vec![2], vec![3]]).boxed();

        let seen_clone = seen.clone();
        let exit = task_pump_notifications(CancellationToken::new(), frames, move |frame| {
            seen_clone.lock().unwrap().push(frame[0]);
        })
        .await;

        assert_eq!(exit, PumpExit::StreamEnded);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_stops_pump() {
        let token = CancellationToken::new();
        token.cancel();
        let exit = task_pump_notifications(token, stream::pending().boxed(), |_| {}).await;
        assert_eq!(exit, PumpExit::Cancelled);
    }
}
