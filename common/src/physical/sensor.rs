use core::fmt::Display;

use serde::{Deserialize, Serialize};

use super::Color;
use crate::notification::DecodeError;

/// Which value a port reports. The hub's value frames don't carry this, it
/// follows from the device attached to the port and the mode it was set up in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKey {
    /// Color index under the sensor, -1 for none.
    Color,

    /// Distance counter of the speedometer.
    DrivingDistance,
}

impl SensorKey {
    /// Input mode to request from the device so it reports this key.
    pub fn input_mode(&self) -> u8 {
        match self {
            Self::Color => 0,
            Self::DrivingDistance => 1,
        }
    }

    /// Decode the payload of a port value frame for this key.
    pub fn decode(&self, payload: &[u8]) -> Result<i32, DecodeError> {
        match self {
            Self::Color => {
                let raw = *payload.first().ok_or(DecodeError::Truncated {
                    expected: 1,
                    actual: 0,
                })? as i8;
                let color =
                    Color::try_from(raw as i32).map_err(|_| DecodeError::InvalidValue(raw as i32))?;
                Ok(color.into())
            }
            Self::DrivingDistance => {
                let bytes: [u8; 4] = payload
                    .get(0..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(DecodeError::Truncated {
                        expected: 4,
                        actual: payload.len(),
                    })?;
                let count = i32::from_le_bytes(bytes);
                Ok(count.unsigned_abs().min(i32::MAX as u32) as i32)
            }
        }
    }
}

impl Display for SensorKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Color => write!(f, "color"),
            Self::DrivingDistance => write!(f, "drivingDistance"),
        }
    }
}
