use std::sync::{Arc, RwLock};

use common::frame::encode_input_format_setup;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::rate_limiter::RateLimiter;
use crate::{
    hub::write_to_attached_port,
    models::{
        hub_event::HubEvent,
        port_registry::{Port, PortRegistry},
    },
    session::ConnectionSession,
};

/// Task: Activates when a port is attached. Sensors get an input format setup
/// so the hub starts sending their values. Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_subscribe_sensor_ports(
    token: CancellationToken,
    mut rx_events: Receiver<HubEvent>,
    limiter: RateLimiter,
    session: Arc<ConnectionSession>,
    registry: Arc<RwLock<PortRegistry>>,
    notification_delta: u32,
) {
    info!("Started.");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            event = rx_events.recv() => match event {
                Ok(HubEvent::PortAttached(port)) => {
                    business_logic(port, &limiter, &session, &registry, notification_delta)
                        .await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} hub events, some sensors may stay silent.", missed);
                }
                Err(RecvError::Closed) => {
                    warn!("Event channel closed.");
                    break;
                }
            },
        }
    }
}

/// Subscribe the port to its sensor key's mode, if it carries a sensor.
#[tracing::instrument(skip_all)]
async fn business_logic(
    port: Port,
    limiter: &RateLimiter,
    session: &Arc<ConnectionSession>,
    registry: &Arc<RwLock<PortRegistry>>,
    notification_delta: u32,
) {
    let Some(key) = port.device_type.sensor_key() else {
        trace!("{} has no sensor values.", port);
        return;
    };

    let frame = match encode_input_format_setup(
        port.port_id,
        key.input_mode(),
        notification_delta,
        true,
    ) {
        Err(e) => {
            error!("Failed to encode input format setup. Error: {}", e);
            return;
        }
        Ok(frame) => frame,
    };

    let session = session.clone();
    let registry = registry.clone();
    match limiter
        .schedule(move || write_to_attached_port(registry, session, frame))
        .await
    {
        Err(e) => warn!("Failed to subscribe {} to {}. Error: {}", port, key, e),
        Ok(()) => debug!("Subscribed {} to {}.", port, key),
    }
}
