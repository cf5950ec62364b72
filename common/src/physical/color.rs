use core::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// The fixed color palette understood by the hub's RGB light and reported by
/// the color sensor. `NoColor` is sent on the wire as `0xFF` (-1).
///
/// ```
/// use common::physical::Color;
/// let color = Color::try_from(3).expect("Failed to get Color representation.");
/// assert_eq!(color, Color::Blue);
/// assert_eq!(color.value(), 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Pink,
    Purple,
    Blue,
    LightBlue,
    LightGreen,
    Green,
    Yellow,
    Orange,
    Red,
    White,

    /// Light off, or nothing in front of the sensor.
    NoColor,
}

/// Represents errors in creating the `Color` type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    /// The value is neither one of the 11 palette entries nor -1.
    #[error("Color value {0} is not part of the palette!")]
    OutOfPalette(i32),
}

impl Color {
    /// Every palette entry in wire order, followed by `NoColor`.
    pub const ALL: [Color; 12] = [
        Color::Black,
        Color::Pink,
        Color::Purple,
        Color::Blue,
        Color::LightBlue,
        Color::LightGreen,
        Color::Green,
        Color::Yellow,
        Color::Orange,
        Color::Red,
        Color::White,
        Color::NoColor,
    ];

    /// Get the signed palette index of this color.
    pub fn value(&self) -> i8 {
        match self {
            Self::Black => 0,
            Self::Pink => 1,
            Self::Purple => 2,
            Self::Blue => 3,
            Self::LightBlue => 4,
            Self::LightGreen => 5,
            Self::Green => 6,
            Self::Yellow => 7,
            Self::Orange => 8,
            Self::Red => 9,
            Self::White => 10,
            Self::NoColor => -1,
        }
    }

    /// Byte used for this color inside a frame.
    pub fn wire_byte(&self) -> u8 {
        self.value() as u8
    }
}

impl TryFrom<i32> for Color {
    type Error = ColorError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .find(|color| color.value() as i32 == value)
            .copied()
            .ok_or(ColorError::OutOfPalette(value))
    }
}

impl From<Color> for i32 {
    fn from(color: Color) -> Self {
        color.value() as i32
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Black => "black",
            Self::Pink => "pink",
            Self::Purple => "purple",
            Self::Blue => "blue",
            Self::LightBlue => "light blue",
            Self::LightGreen => "light green",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::White => "white",
            Self::NoColor => "no color",
        };
        write!(f, "<Color: ({}) {}>", self.value(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_round_trips_through_i32() {
        for color in Color::ALL {
            let raw: i32 = color.into();
            assert_eq!(Color::try_from(raw), Ok(color));
        }
    }

    #[test]
    fn test_values_outside_palette_are_rejected() {
        for raw in -200..200 {
            let in_palette = (0..=10).contains(&raw) || raw == -1;
            assert_eq!(Color::try_from(raw).is_ok(), in_palette, "raw={}", raw);
        }
        assert_eq!(Color::try_from(11), Err(ColorError::OutOfPalette(11)));
        assert_eq!(Color::try_from(-2), Err(ColorError::OutOfPalette(-2)));
    }

    #[test]
    fn test_no_color_is_sent_as_ff() {
        assert_eq!(Color::NoColor.wire_byte(), 0xFF);
        assert_eq!(Color::White.wire_byte(), 10);
    }
}
