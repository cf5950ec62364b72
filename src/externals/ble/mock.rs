use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::transport::{HubLink, HubTransport};
use crate::{error::HubError, models::config::HubFilter};

/// In-memory transport for tests. Records every acknowledged write and lets
/// the test push notification frames into the current link.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    writes: Mutex<Vec<Vec<u8>>>,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    fail_connect: AtomicBool,
    hang_connect: AtomicBool,
    fail_writes: AtomicBool,
    hang_writes: AtomicBool,
    disconnects: AtomicUsize,
    connect_burst: Mutex<Vec<Vec<u8>>>,
    connect_delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.writes.lock().unwrap().clone()
    }

    /// Deliver a frame on the current link. `false` when nothing is connected.
    pub fn notify(&self, frame: &[u8]) -> bool {
        match self.state.notify_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(frame.to_vec()).is_ok(),
            None => false,
        }
    }

    /// End the notification stream as if the hub went out of range.
    pub fn drop_link(&self) {
        self.state.notify_tx.lock().unwrap().take();
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Frames the hub sends while the link is still being set up, before
    /// anyone asked for the notification stream.
    pub fn set_connect_burst(&self, frames: &[&[u8]]) {
        *self.state.connect_burst.lock().unwrap() =
            frames.iter().map(|frame| frame.to_vec()).collect();
    }

    /// Make scanning take `delay` before the hub is found.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_hang_connect(&self, hang: bool) {
        self.state.hang_connect.store(hang, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_hang_writes(&self, hang: bool) {
        self.state.hang_writes.store(hang, Ordering::SeqCst);
    }
}

#[async_trait]
impl HubTransport for MockTransport {
    async fn connect(&self, _filter: &HubFilter) -> Result<Box<dyn HubLink>, HubError> {
        if self.state.hang_connect.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        let delay = *self.state.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(HubError::Connection("No hub found.".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for frame in self.state.connect_burst.lock().unwrap().iter() {
            let _ = tx.send(frame.clone());
        }
        *self.state.notify_tx.lock().unwrap() = Some(tx);
        Ok(Box::new(MockLink {
            state: self.state.clone(),
            rx: Mutex::new(Some(rx)),
        }))
    }
}

struct MockLink {
    state: Arc<MockState>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

#[async_trait]
impl HubLink for MockLink {
    async fn write(&self, bytes: &[u8]) -> Result<(), HubError> {
        if self.state.hang_writes.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(HubError::Transport("Write was not acknowledged.".into()));
        }
        self.state.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>, HubError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| HubError::Connection("Notifications already taken.".into()))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn disconnect(&self) -> Result<(), HubError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.notify_tx.lock().unwrap().take();
        Ok(())
    }
}
