use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use btleplug::{
    api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Adapter, Manager, Peripheral},
};
use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, info, instrument, trace, warn};

use super::transport::{HubLink, HubTransport};
use crate::{
    error::HubError,
    models::config::{HubFilter, LWP3_CHARACTERISTIC_UUID},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

fn connection_error(e: btleplug::Error) -> HubError {
    HubError::Connection(e.to_string())
}

/// Central role transport on top of the platform's bluetooth stack.
#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    adapter_index: usize,
    poll_interval: Duration,
}

impl BtleplugTransport {
    pub fn new() -> Self {
        Self {
            adapter_index: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Choose which bluetooth adapter to scan with.
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// How often discovered peripherals are re-checked while scanning.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[instrument(skip_all)]
    async fn find_hub(
        &self,
        adapter: &Adapter,
        filter: &HubFilter,
    ) -> Result<BtleplugLink, HubError> {
        loop {
            for peripheral in adapter.peripherals().await.map_err(connection_error)? {
                let Some(properties) = peripheral.properties().await.map_err(connection_error)?
                else {
                    continue;
                };
                if !filter.matches(&properties.services, &properties.manufacturer_data) {
                    trace!("Skipping peripheral {}.", properties.address);
                    continue;
                }

                info!(
                    "Found hub '{}' at {}.",
                    properties.local_name.unwrap_or_default(),
                    properties.address
                );
                match open_link(peripheral.clone()).await {
                    Ok(link) => return Ok(link),
                    Err(e) => {
                        warn!("Failed to open link to hub. Error: {}", e);
                        if let Err(e) = peripheral.disconnect().await {
                            debug!("Failed to release peripheral. Error: {}", e);
                        }
                    }
                }
            }
            trace!("Sleeping briefly before checking again.");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for BtleplugTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubTransport for BtleplugTransport {
    #[instrument(skip_all)]
    async fn connect(&self, filter: &HubFilter) -> Result<Box<dyn HubLink>, HubError> {
        let manager = Manager::new().await.map_err(connection_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(connection_error)?
            .into_iter()
            .nth(self.adapter_index)
            .ok_or_else(|| {
                HubError::Connection(format!(
                    "No bluetooth adapter at index {}.",
                    self.adapter_index
                ))
            })?;

        adapter
            .start_scan(ScanFilter {
                services: vec![filter.service],
            })
            .await
            .map_err(connection_error)?;
        info!("Scanning for hub.");

        let result = self.find_hub(&adapter, filter).await;
        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop scanning. Error: {}", e);
        }
        Ok(Box::new(result?))
    }
}

/// Connect, discover the LWP3 characteristic and enable its notifications.
/// The hub reports its attached devices as soon as notifications are on, so
/// the stream is opened before subscribing.
async fn open_link(peripheral: Peripheral) -> Result<BtleplugLink, HubError> {
    peripheral.connect().await.map_err(connection_error)?;
    peripheral
        .discover_services()
        .await
        .map_err(connection_error)?;

    let characteristic = peripheral
        .characteristics()
        .into_iter()
        .find(|characteristic| characteristic.uuid == LWP3_CHARACTERISTIC_UUID)
        .ok_or_else(|| HubError::Connection("Hub has no LWP3 characteristic.".into()))?;

    let uuid = characteristic.uuid;
    let frames = peripheral
        .notifications()
        .await
        .map_err(connection_error)?
        .filter_map(move |notification| async move {
            (notification.uuid == uuid).then_some(notification.value)
        })
        .boxed();
    peripheral
        .subscribe(&characteristic)
        .await
        .map_err(connection_error)?;

    debug!("Subscribed to hub characteristic.");
    Ok(BtleplugLink {
        peripheral,
        characteristic,
        frames: Mutex::new(Some(frames)),
    })
}

pub struct BtleplugLink {
    peripheral: Peripheral,
    characteristic: Characteristic,

    /// Opened before subscribing, handed out once.
    frames: Mutex<Option<BoxStream<'static, Vec<u8>>>>,
}

#[async_trait]
impl HubLink for BtleplugLink {
    async fn write(&self, bytes: &[u8]) -> Result<(), HubError> {
        self.peripheral
            .write(&self.characteristic, bytes, WriteType::WithResponse)
            .await
            .map_err(|e| HubError::Transport(e.to_string()))
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>, HubError> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| HubError::Connection("Notification stream already taken.".into()))
    }

    async fn disconnect(&self) -> Result<(), HubError> {
        self.peripheral.disconnect().await.map_err(connection_error)
    }
}
