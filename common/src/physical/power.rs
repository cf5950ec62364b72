use core::{fmt::Display, marker::PhantomData};

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Represents a signed motor power in percent, -100..=100. Negative values run
/// the motor backwards. Construction always clamps so an instance can't hold
/// a value the hub would reject.
///
/// ```
/// use common::physical::Power;
/// assert_eq!(Power::clamped(250).value(), 100);
/// assert_eq!(Power::clamped(-40).magnitude(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Power {
    value: i8,

    /// Make sure this can't be constructed with struct literals.
    _private: PhantomData<()>,
}

/// Direction a motor is driven in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Represents errors in creating the `Direction` type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectionError {
    #[error("Direction must be 1 or -1, got {0}!")]
    Invalid(i32),
}

impl Power {
    pub const MAX: i8 = 100;
    pub const MIN: i8 = -100;

    /// Clamp an integer percentage into the valid range.
    pub fn clamped(percent: i32) -> Self {
        Self {
            value: percent.clamp(Self::MIN as i32, Self::MAX as i32) as i8,
            _private: PhantomData,
        }
    }

    /// Clamp a fractional percentage, truncating toward zero.
    /// NaN is treated as a stop.
    pub fn from_percent(percent: f32) -> Self {
        let clamped = percent.clamp(Self::MIN as f32, Self::MAX as f32);
        Self::clamped(clamped as i32)
    }

    /// Power scaled by the sign of a direction.
    pub fn with_direction(percent: f32, direction: Direction) -> Self {
        Self::from_percent(percent * direction.sign() as f32)
    }

    pub fn stop() -> Self {
        Self::clamped(0)
    }

    /// Get the signed power value.
    pub fn value(&self) -> i8 {
        self.value
    }

    /// Get the absolute power value.
    pub fn magnitude(&self) -> u8 {
        self.value.unsigned_abs()
    }

    /// `None` when stopped.
    pub fn direction(&self) -> Option<Direction> {
        match self.value {
            0 => None,
            v if v > 0 => Some(Direction::Forward),
            _ => Some(Direction::Backward),
        }
    }

    /// Byte used for this power inside a frame (two's complement).
    pub fn wire_byte(&self) -> u8 {
        self.value as u8
    }
}

impl Direction {
    pub fn sign(&self) -> i32 {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

impl TryFrom<i32> for Direction {
    type Error = DirectionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Forward),
            -1 => Ok(Self::Backward),
            other => Err(DirectionError::Invalid(other)),
        }
    }
}

impl Display for Power {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<Power: {}%>", self.value)
    }
}
