use std::{future::Future, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, trace, warn};

use crate::error::HubError;

type WriteFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), HubError>> + Send>;

struct ScheduledWrite {
    write: WriteFn,
    reply: oneshot::Sender<Result<(), HubError>>,
}

fn disconnected() -> HubError {
    HubError::Connection("Session disconnected before the write was sent.".into())
}

/// Serializes writes to one session and keeps at least `min_interval` between
/// the submission of consecutive writes. Writes are served strictly in the
/// order they were scheduled; none are dropped or merged.
///
/// Timing follows tokio's clock, so a paused test runtime controls it.
#[derive(Clone)]
pub struct RateLimiter {
    tx_writes: mpsc::UnboundedSender<ScheduledWrite>,
    token: CancellationToken,
}

impl RateLimiter {
    /// Start the worker on `tracker`. It stops, failing whatever is still
    /// queued, once `token` is cancelled.
    pub fn spawn(tracker: &TaskTracker, token: CancellationToken, min_interval: Duration) -> Self {
        let (tx_writes, rx_writes) = mpsc::unbounded_channel();
        tracker.spawn(task_drain_write_queue(token.clone(), min_interval, rx_writes));
        Self { tx_writes, token }
    }

    /// Queue `write` and wait until it ran. Fails with `HubError::Connection`
    /// when the session is disconnected before or while waiting.
    pub async fn schedule<F, Fut>(&self, write: F) -> Result<(), HubError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HubError>> + Send + 'static,
    {
        if self.token.is_cancelled() {
            return Err(disconnected());
        }

        let (reply, rx_reply) = oneshot::channel();
        let scheduled = ScheduledWrite {
            write: Box::new(move || write().boxed()),
            reply,
        };
        if self.tx_writes.send(scheduled).is_err() {
            return Err(disconnected());
        }

        rx_reply.await.unwrap_or_else(|_| Err(disconnected()))
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Task: Runs scheduled writes one at a time, waiting out the minimum
/// interval before each submission. Can be cancelled.
#[tracing::instrument(skip_all)]
async fn task_drain_write_queue(
    token: CancellationToken,
    min_interval: Duration,
    mut rx_writes: mpsc::UnboundedReceiver<ScheduledWrite>,
) {
    info!("Started.");
    let mut last_submission: Option<Instant> = None;

    loop {
        let scheduled = tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            scheduled = rx_writes.recv() => match scheduled {
                Some(scheduled) => scheduled,
                None => {
                    debug!("All schedulers dropped.");
                    break;
                }
            },
        };

        if let Some(last) = last_submission {
            let ready_at = last + min_interval;
            trace!(
                "Waiting {:?} before next write.",
                ready_at.saturating_duration_since(Instant::now())
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    warn!("Cancelled while waiting to write.");
                    let _ = scheduled.reply.send(Err(disconnected()));
                    break;
                },
                _ = tokio::time::sleep_until(ready_at) => {}
            }
        }

        last_submission = Some(Instant::now());
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(disconnected()),
            result = (scheduled.write)() => result,
        };
        if let Err(e) = &result {
            debug!("Scheduled write failed. Error: {}", e);
        }
        let _ = scheduled.reply.send(result);
    }

    rx_writes.close();
    let mut dropped = 0;
    while let Ok(scheduled) = rx_writes.try_recv() {
        let _ = scheduled.reply.send(Err(disconnected()));
        dropped += 1;
    }
    if dropped > 0 {
        warn!("Failed {} queued writes.", dropped);
    }
}
