use std::sync::Arc;

use common::physical::{Color, Direction, Power, SensorKey, Sound};
use tracing::{debug, instrument};

use crate::{
    error::HubError, externals::ble::transport::HubTransport, hub::Hub,
    models::config::HubConfig,
};

/// Fixed port ids of the DUPLO train base.
pub mod ports {
    pub const MOTOR: u8 = 0x00;
    pub const SPEAKER: u8 = 0x01;
    pub const RGB_LIGHT: u8 = 0x11;
    pub const COLOR_SENSOR: u8 = 0x12;
    pub const SPEEDOMETER: u8 = 0x13;
}

/// Reported before the color sensor saw anything.
pub const DEFAULT_COLOR: i32 = -1;

/// Reported before the speedometer counted anything.
pub const DEFAULT_DRIVING_DISTANCE: i32 = 0;

/// The DUPLO train base on top of a generic `Hub`.
pub struct DuploTrain {
    hub: Hub,
}

impl DuploTrain {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        Self::with_config(transport, HubConfig::default())
    }

    pub fn with_config(transport: Arc<dyn HubTransport>, config: HubConfig) -> Self {
        Self {
            hub: Hub::new(transport, config),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub async fn connect(&self) -> Result<(), HubError> {
        self.hub.connect().await
    }

    pub async fn disconnect(&self) {
        self.hub.disconnect().await
    }

    /// Drive at `power` percent (0..=100) in `direction`.
    #[instrument(skip(self))]
    pub async fn run(&self, direction: Direction, power: f32) -> Result<(), HubError> {
        let power = Power::with_direction(power, direction);
        debug!("Running at {}.", power.value());
        self.hub.motor_pwm(ports::MOTOR, power.value() as i32).await
    }

    pub async fn stop(&self) -> Result<(), HubError> {
        self.hub
            .motor_pwm(ports::MOTOR, Power::stop().value() as i32)
            .await
    }

    pub async fn play_sound(&self, sound: Sound) -> Result<(), HubError> {
        self.hub.play_sound(ports::SPEAKER, sound).await
    }

    pub async fn set_led_color(&self, color: Color) -> Result<(), HubError> {
        self.hub.set_led_color(color).await
    }

    /// Set the light from a raw palette index, -1 turns it off.
    pub async fn set_led_color_value(&self, value: i32) -> Result<(), HubError> {
        let color = Color::try_from(value)?;
        self.set_led_color(color).await
    }

    /// Palette index under the color sensor.
    pub fn color(&self) -> i32 {
        self.hub
            .read(ports::COLOR_SENSOR, SensorKey::Color, DEFAULT_COLOR)
    }

    pub fn is_color(&self, color: Color) -> bool {
        self.color() == i32::from(color)
    }

    pub fn driving_distance(&self) -> i32 {
        self.hub.read(
            ports::SPEEDOMETER,
            SensorKey::DrivingDistance,
            DEFAULT_DRIVING_DISTANCE,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::externals::ble::mock::MockTransport;

    fn attach_frame(port_id: u8, io_type: u16) -> Vec<u8> {
        let [lo, hi] = io_type.to_le_bytes();
        vec![0x0F, 0x00, 0x04, port_id, 0x01, lo, hi, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    /// A connected train with every built-in device attached, past the
    /// sensor subscription writes.
    async fn connected_train() -> (DuploTrain, MockTransport) {
        let transport = MockTransport::new();
        let train = DuploTrain::new(Arc::new(transport.clone()));
        train.connect().await.expect("Failed to connect.");

        transport.notify(&attach_frame(ports::MOTOR, 0x0029));
        transport.notify(&attach_frame(ports::SPEAKER, 0x002A));
        transport.notify(&attach_frame(ports::RGB_LIGHT, 0x0017));
        transport.notify(&attach_frame(ports::COLOR_SENSOR, 0x002B));
        transport.notify(&attach_frame(ports::SPEEDOMETER, 0x002C));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.writes().len(), 2);

        (train, transport)
    }

    fn last_write(transport: &MockTransport) -> Vec<u8> {
        transport.writes().last().cloned().unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_defaults_before_sensors_report() {
        let (train, _transport) = connected_train().await;
        assert_eq!(train.color(), -1);
        assert!(train.is_color(Color::NoColor));
        assert_eq!(train.driving_distance(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_values() {
        let (train, transport) = connected_train().await;
        transport.notify(&[0x05, 0x00, 0x45, ports::COLOR_SENSOR, 0x09]);
        let [a, b, c, d] = 1234i32.to_le_bytes();
        transport.notify(&[0x08, 0x00, 0x45, ports::SPEEDOMETER, a, b, c, d]);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(train.color(), 9);
        assert!(train.is_color(Color::Red));
        assert_eq!(train.driving_distance(), 1234);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_and_stop() {
        let (train, transport) = connected_train().await;

        train
            .run(Direction::Backward, 40.0)
            .await
            .expect("Run failed.");
        assert_eq!(
            last_write(&transport),
            vec![0x08, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00, (-40i8) as u8]
        );

        train.stop().await.expect("Stop failed.");
        assert_eq!(
            last_write(&transport),
            vec![0x08, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00, 0x00]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sound_and_light() {
        let (train, transport) = connected_train().await;

        train.play_sound(Sound::Horn).await.expect("Sound failed.");
        assert_eq!(
            last_write(&transport),
            vec![0x08, 0x00, 0x81, 0x01, 0x11, 0x51, 0x01, 0x09]
        );

        train
            .set_led_color_value(-1)
            .await
            .expect("Light failed.");
        assert_eq!(
            last_write(&transport),
            vec![0x08, 0x00, 0x81, 0x11, 0x11, 0x51, 0x00, 0xFF]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_color_outside_palette_is_rejected() {
        let (train, transport) = connected_train().await;
        let before = transport.writes().len();

        for value in [11, -2, 255] {
            assert!(matches!(
                train.set_led_color_value(value).await,
                Err(HubError::InvalidArgument(_))
            ));
        }
        assert_eq!(transport.writes().len(), before);
    }
}
