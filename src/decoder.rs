use std::sync::{Arc, PoisonError, RwLock};

use common::notification::{decode_notification, AttachEvent, Notification};
use tokio::sync::broadcast::Sender;
use tracing::{debug, trace, warn};

use crate::models::{
    hub_event::HubEvent, port_registry::PortRegistry, value_store::ValueStore,
};

/// Applies inbound frames to the port registry and the value store, and
/// announces every change on the event channel.
///
/// Frames that fail to decode, or that refer to ports we know nothing about,
/// are logged and dropped. Nothing here ever fails the session.
#[derive(Clone)]
pub struct InboundDecoder {
    registry: Arc<RwLock<PortRegistry>>,
    store: Arc<RwLock<ValueStore>>,
    tx_events: Sender<HubEvent>,
}

impl InboundDecoder {
    pub fn new(
        registry: Arc<RwLock<PortRegistry>>,
        store: Arc<RwLock<ValueStore>>,
        tx_events: Sender<HubEvent>,
    ) -> Self {
        Self {
            registry,
            store,
            tx_events,
        }
    }

    /// Forget every port and reading, before a new connection starts.
    pub fn reset(&self) {
        self.registry().clear();
        self.store().clear();
        debug!("Cleared ports and readings.");
    }

    pub fn handle_frame(&self, frame: &[u8]) {
        match decode_notification(frame) {
            Err(e) => warn!("Dropping malformed frame {:02X?}. Error: {}", frame, e),
            Ok(notification) => {
                if let Some(event) = self.apply(notification) {
                    // no receivers is fine, the state is already updated
                    let _ = self.tx_events.send(event);
                }
            }
        }
    }

    fn apply(&self, notification: Notification<'_>) -> Option<HubEvent> {
        match notification {
            Notification::HubAttachedIo { port_id, event } => self.apply_attach(port_id, event),
            Notification::PortValue { port_id, payload } => self.apply_value(port_id, payload),
            Notification::PortInputFormat {
                port_id,
                mode,
                delta,
                notifications_enabled,
            } => {
                debug!(
                    "Port 0x{:02X} input format: mode={}, delta={}, notify={}.",
                    port_id, mode, delta, notifications_enabled
                );
                if !self.registry().set_input_mode(port_id, mode) {
                    debug!("Input format for unattached port 0x{:02X}.", port_id);
                }
                None
            }
            Notification::OutputCommandFeedback { feedback } => {
                trace!("Output command feedback {:02X?}.", feedback);
                None
            }
            Notification::GenericError {
                command_type,
                error_code,
            } => {
                warn!(
                    "Hub rejected command 0x{:02X}, error code 0x{:02X}.",
                    command_type, error_code
                );
                None
            }
            Notification::HubProperty {
                property,
                operation,
                payload,
            } => {
                debug!(
                    "Hub property 0x{:02X} (op 0x{:02X}): {:02X?}.",
                    property, operation, payload
                );
                None
            }
            Notification::Unhandled { message_type } => {
                trace!("Ignoring message type 0x{:02X}.", message_type);
                None
            }
        }
    }

    fn apply_attach(&self, port_id: u8, event: AttachEvent) -> Option<HubEvent> {
        match event {
            AttachEvent::Attached { device_type }
            | AttachEvent::AttachedVirtual { device_type, .. } => {
                let port = self.registry().attach(port_id, device_type);
                self.store().clear_port(port_id);
                debug!("Attached {}.", port);
                Some(HubEvent::PortAttached(port))
            }
            AttachEvent::Detached => {
                let detached = self.registry().detach(port_id);
                self.store().clear_port(port_id);
                match detached {
                    Some(port) => {
                        debug!("Detached {}.", port);
                        Some(HubEvent::PortDetached { port_id })
                    }
                    None => {
                        debug!("Detach for unknown port 0x{:02X}.", port_id);
                        None
                    }
                }
            }
        }
    }

    fn apply_value(&self, port_id: u8, payload: &[u8]) -> Option<HubEvent> {
        let Some(port) = self.registry().get(port_id) else {
            debug!("Value for unattached port 0x{:02X} dropped.", port_id);
            return None;
        };
        let Some(key) = port.device_type.sensor_key() else {
            trace!("{} reports no known values.", port);
            return None;
        };
        if let Some(mode) = port.input_mode {
            if mode != key.input_mode() {
                debug!("{} is in mode {}, not reporting {}.", port, mode, key);
                return None;
            }
        }

        match key.decode(payload) {
            Err(e) => {
                warn!("Dropping {} value {:02X?}. Error: {}", port, payload, e);
                None
            }
            Ok(value) => {
                let reading = self.store().update(port_id, key, value);
                trace!("{}", reading);
                Some(HubEvent::ReadingUpdated(reading))
            }
        }
    }

    fn registry(&self) -> std::sync::RwLockWriteGuard<'_, PortRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> std::sync::RwLockWriteGuard<'_, ValueStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use common::physical::{DeviceType, SensorKey};
    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver};

    use super::*;

    fn decoder() -> (InboundDecoder, Receiver<HubEvent>) {
        let (tx_events, rx_events) = broadcast::channel(16);
        let decoder = InboundDecoder::new(
            Arc::new(RwLock::new(PortRegistry::new())),
            Arc::new(RwLock::new(ValueStore::new())),
            tx_events,
        );
        (decoder, rx_events)
    }

    fn attach(decoder: &InboundDecoder, port_id: u8, io_type: u16) {
        let [lo, hi] = io_type.to_le_bytes();
        decoder.handle_frame(&[0x0F, 0x00, 0x04, port_id, 0x01, lo, hi, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    fn read(decoder: &InboundDecoder, port_id: u8, key: SensorKey, default: i32) -> i32 {
        decoder.store.read().unwrap().read(port_id, key, default)
    }

    #[tokio::test]
    async fn test_color_value_is_stored() {
        let (decoder, mut rx_events) = decoder();
        attach(&decoder, 0x12, 0x002B);
        assert!(matches!(
            rx_events.try_recv(),
            Ok(HubEvent::PortAttached(port)) if port.device_type == DeviceType::ColorSensor
        ));

        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x03]);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), 3);
        assert!(matches!(
            rx_events.try_recv(),
            Ok(HubEvent::ReadingUpdated(reading)) if reading.value == 3
        ));
    }

    #[tokio::test]
    async fn test_driving_distance_is_stored_as_magnitude() {
        let (decoder, _rx_events) = decoder();
        attach(&decoder, 0x13, 0x002C);

        let [a, b, c, d] = (-250i32).to_le_bytes();
        decoder.handle_frame(&[0x08, 0x00, 0x45, 0x13, a, b, c, d]);
        assert_eq!(read(&decoder, 0x13, SensorKey::DrivingDistance, 0), 250);
    }

    #[tokio::test]
    async fn test_value_for_unknown_port_is_dropped() {
        let (decoder, mut rx_events) = decoder();
        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x03]);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);
        assert_eq!(rx_events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (decoder, mut rx_events) = decoder();
        attach(&decoder, 0x12, 0x002B);
        let _ = rx_events.try_recv();

        // declared length longer than the frame
        decoder.handle_frame(&[0x09, 0x00, 0x45, 0x12]);
        // color outside the palette
        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x40]);
        decoder.handle_frame(&[]);

        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);
        assert_eq!(rx_events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_mode_mismatch_is_dropped() {
        let (decoder, _rx_events) = decoder();
        attach(&decoder, 0x12, 0x002B);
        // hub confirms mode 1 on the color sensor
        decoder.handle_frame(&[0x0A, 0x00, 0x47, 0x12, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]);

        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x03]);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);
    }

    #[tokio::test]
    async fn test_detach_forgets_port_and_values() {
        let (decoder, mut rx_events) = decoder();
        attach(&decoder, 0x12, 0x002B);
        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x09]);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), 9);
        let _ = rx_events.try_recv();
        let _ = rx_events.try_recv();

        decoder.handle_frame(&[0x05, 0x00, 0x04, 0x12, 0x00]);
        assert_eq!(
            rx_events.try_recv(),
            Ok(HubEvent::PortDetached { port_id: 0x12 })
        );
        assert_eq!(decoder.registry.read().unwrap().resolve(0x12), None);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);

        // a value after detach is dropped
        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x09]);
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);
    }

    #[tokio::test]
    async fn test_reset_forgets_ports_and_readings() {
        let (decoder, _rx_events) = decoder();
        attach(&decoder, 0x12, 0x002B);
        decoder.handle_frame(&[0x05, 0x00, 0x45, 0x12, 0x03]);

        decoder.reset();
        assert!(decoder.registry.read().unwrap().ports().is_empty());
        assert_eq!(read(&decoder, 0x12, SensorKey::Color, -1), -1);
    }

    #[tokio::test]
    async fn test_hub_errors_change_nothing() {
        let (decoder, mut rx_events) = decoder();
        decoder.handle_frame(&[0x05, 0x00, 0x05, 0x81, 0x06]);
        decoder.handle_frame(&[0x05, 0x00, 0x82, 0x00, 0x0A]);
        assert_eq!(rx_events.try_recv(), Err(TryRecvError::Empty));
        assert!(decoder.registry.read().unwrap().ports().is_empty());
    }
}
