use core::fmt::Display;

use serde::{Deserialize, Serialize};

use super::SensorKey;

const IO_TYPE_MOTOR: u16 = 0x0001;
const IO_TYPE_SYSTEM_TRAIN_MOTOR: u16 = 0x0002;
const IO_TYPE_RGB_LIGHT: u16 = 0x0017;
const IO_TYPE_DUPLO_TRAIN_BASE_MOTOR: u16 = 0x0029;
const IO_TYPE_DUPLO_TRAIN_BASE_SPEAKER: u16 = 0x002A;
const IO_TYPE_DUPLO_TRAIN_BASE_COLOR_SENSOR: u16 = 0x002B;
const IO_TYPE_DUPLO_TRAIN_BASE_SPEEDOMETER: u16 = 0x002C;

/// Kind of device the hub reports as attached to a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Motor,
    Speaker,
    RgbLight,
    ColorSensor,
    Speedometer,

    /// Any io type id this driver has no special handling for.
    Unknown(u16),
}

impl DeviceType {
    /// The sensor key whose values this device reports, if any.
    pub fn sensor_key(&self) -> Option<SensorKey> {
        match self {
            Self::ColorSensor => Some(SensorKey::Color),
            Self::Speedometer => Some(SensorKey::DrivingDistance),
            _ => None,
        }
    }
}

impl From<u16> for DeviceType {
    fn from(io_type_id: u16) -> Self {
        match io_type_id {
            IO_TYPE_MOTOR | IO_TYPE_SYSTEM_TRAIN_MOTOR | IO_TYPE_DUPLO_TRAIN_BASE_MOTOR => {
                Self::Motor
            }
            IO_TYPE_DUPLO_TRAIN_BASE_SPEAKER => Self::Speaker,
            IO_TYPE_RGB_LIGHT => Self::RgbLight,
            IO_TYPE_DUPLO_TRAIN_BASE_COLOR_SENSOR => Self::ColorSensor,
            IO_TYPE_DUPLO_TRAIN_BASE_SPEEDOMETER => Self::Speedometer,
            other => Self::Unknown(other),
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "<Device: unknown 0x{:04X}>", id),
            known => write!(f, "<Device: {:?}>", known),
        }
    }
}
