use core::fmt::Display;

use heapless::Vec;
use thiserror_no_std::Error;

use crate::physical::{Color, Power, Sound};

/// Hub id placed in every common header. Always 0 for a single hub.
pub const HUB_ID: u8 = 0x00;

/// Largest outbound frame this crate builds. Every command the driver sends is
/// well below the 127 byte limit of the single byte length encoding.
pub const MAX_FRAME_LEN: usize = 32;

/// LWP3 message type ids.
pub mod message_type {
    pub const HUB_PROPERTIES: u8 = 0x01;
    pub const HUB_ATTACHED_IO: u8 = 0x04;
    pub const GENERIC_ERROR: u8 = 0x05;
    pub const PORT_INPUT_FORMAT_SETUP_SINGLE: u8 = 0x41;
    pub const PORT_VALUE_SINGLE: u8 = 0x45;
    pub const PORT_INPUT_FORMAT_SINGLE: u8 = 0x47;
    pub const PORT_OUTPUT_COMMAND: u8 = 0x81;
    pub const PORT_OUTPUT_COMMAND_FEEDBACK: u8 = 0x82;
}

/// Startup and completion flags: execute immediately, request feedback.
pub const EXECUTE_IMMEDIATELY_WITH_FEEDBACK: u8 = 0x11;

/// Output sub command that writes raw mode data to a device.
pub const WRITE_DIRECT_MODE_DATA: u8 = 0x51;

const MOTOR_POWER_MODE: u8 = 0x00;
const LIGHT_COLOR_MODE: u8 = 0x00;
const SPEAKER_SOUND_MODE: u8 = 0x01;

/// One outbound instruction, ready to be written to the hub characteristic.
/// Built fresh per call and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8, MAX_FRAME_LEN>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The frame would not fit in a single outbound write.
    #[error("Frame of {0} bytes exceeds the maximum frame length!")]
    FrameTooLong(usize),
}

impl CommandFrame {
    /// Prefix `parts` with the common header (length, hub id, message type).
    fn build(message_type: u8, parts: &[&[u8]]) -> Result<Self, EncodeError> {
        let length = 3 + parts.iter().map(|part| part.len()).sum::<usize>();
        if length > MAX_FRAME_LEN {
            return Err(EncodeError::FrameTooLong(length));
        }

        let mut bytes: Vec<u8, MAX_FRAME_LEN> = Vec::new();
        bytes
            .extend_from_slice(&[length as u8, HUB_ID, message_type])
            .map_err(|_| EncodeError::FrameTooLong(length))?;
        for part in parts {
            bytes
                .extend_from_slice(part)
                .map_err(|_| EncodeError::FrameTooLong(length))?;
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn message_type(&self) -> u8 {
        self.bytes[2]
    }

    /// Port addressed by this frame. Every frame this crate builds has one.
    pub fn port_id(&self) -> u8 {
        self.bytes[3]
    }
}

impl Display for CommandFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<Frame:")?;
        for byte in self.bytes.iter() {
            write!(f, " {:02X}", byte)?;
        }
        write!(f, ">")
    }
}

/// Port output command addressing `port_id` with an arbitrary sub command.
pub fn encode_output_command(
    port_id: u8,
    sub_command: u8,
    payload: &[u8],
) -> Result<CommandFrame, EncodeError> {
    CommandFrame::build(
        message_type::PORT_OUTPUT_COMMAND,
        &[
            &[port_id, EXECUTE_IMMEDIATELY_WITH_FEEDBACK, sub_command],
            payload,
        ],
    )
}

/// Set the power of a motor. `power_percent` is clamped to -100..=100.
pub fn encode_motor_power(port_id: u8, power_percent: i32) -> Result<CommandFrame, EncodeError> {
    let power = Power::clamped(power_percent);
    encode_output_command(
        port_id,
        WRITE_DIRECT_MODE_DATA,
        &[MOTOR_POWER_MODE, power.wire_byte()],
    )
}

/// Set the color of the RGB light on `port_id`.
pub fn encode_set_color(port_id: u8, color: Color) -> Result<CommandFrame, EncodeError> {
    encode_output_command(
        port_id,
        WRITE_DIRECT_MODE_DATA,
        &[LIGHT_COLOR_MODE, color.wire_byte()],
    )
}

/// Play one of the built-in sounds on the speaker at `port_id`.
pub fn encode_play_sound(port_id: u8, sound: Sound) -> Result<CommandFrame, EncodeError> {
    encode_output_command(
        port_id,
        WRITE_DIRECT_MODE_DATA,
        &[SPEAKER_SOUND_MODE, sound.id()],
    )
}

/// Ask the device on `port_id` to report `mode` values whenever they change
/// by at least `delta`.
pub fn encode_input_format_setup(
    port_id: u8,
    mode: u8,
    delta: u32,
    notifications_enabled: bool,
) -> Result<CommandFrame, EncodeError> {
    CommandFrame::build(
        message_type::PORT_INPUT_FORMAT_SETUP_SINGLE,
        &[
            &[port_id, mode],
            &delta.to_le_bytes(),
            &[notifications_enabled as u8],
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_power_layout() {
        let frame = encode_motor_power(0x00, 50).expect("Failed to encode motor power.");
        assert_eq!(
            frame.as_bytes(),
            &[0x08, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00, 0x32]
        );
        assert_eq!(frame.message_type(), message_type::PORT_OUTPUT_COMMAND);
        assert_eq!(frame.port_id(), 0x00);

        let frame = encode_motor_power(0x00, -100).expect("Failed to encode motor power.");
        assert_eq!(frame.as_bytes()[7], 0x9C);
    }

    #[test]
    fn test_motor_power_magnitude_and_sign() {
        for percent in -100..=100 {
            let frame = encode_motor_power(0x00, percent).expect("Failed to encode motor power.");
            let again = encode_motor_power(0x00, percent).expect("Failed to encode motor power.");
            assert_eq!(frame, again);

            let decoded = frame.as_bytes()[7] as i8;
            assert_eq!(decoded.unsigned_abs() as i32, percent.abs());
            assert_eq!(decoded.signum() as i32, percent.signum());
        }
    }

    #[test]
    fn test_motor_power_is_clamped() {
        let high = encode_motor_power(0x00, 180).expect("Failed to encode motor power.");
        let low = encode_motor_power(0x00, -180).expect("Failed to encode motor power.");
        assert_eq!(high.as_bytes()[7] as i8, 100);
        assert_eq!(low.as_bytes()[7] as i8, -100);
    }

    #[test]
    fn test_set_color_layout() {
        let frame = encode_set_color(0x11, Color::Blue).expect("Failed to encode color.");
        assert_eq!(
            frame.as_bytes(),
            &[0x08, 0x00, 0x81, 0x11, 0x11, 0x51, 0x00, 0x03]
        );
        let frame = encode_set_color(0x11, Color::NoColor).expect("Failed to encode color.");
        assert_eq!(frame.as_bytes()[7], 0xFF);
    }

    #[test]
    fn test_play_sound_layout() {
        let frame = encode_play_sound(0x01, Sound::Horn).expect("Failed to encode sound.");
        assert_eq!(
            frame.as_bytes(),
            &[0x08, 0x00, 0x81, 0x01, 0x11, 0x51, 0x01, 0x09]
        );
    }

    #[test]
    fn test_output_command_payload_length() {
        let frame = encode_output_command(0x01, 0x51, &[0x01, 0x05])
            .expect("Failed to encode output command.");
        assert_eq!(frame.as_bytes()[0] as usize, frame.as_bytes().len());

        let too_long = [0u8; MAX_FRAME_LEN];
        assert_eq!(
            encode_output_command(0x01, 0x51, &too_long),
            Err(EncodeError::FrameTooLong(6 + MAX_FRAME_LEN))
        );
    }

    #[test]
    fn test_input_format_setup_layout() {
        let frame =
            encode_input_format_setup(0x13, 1, 1, true).expect("Failed to encode input setup.");
        assert_eq!(
            frame.as_bytes(),
            &[0x0A, 0x00, 0x41, 0x13, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]
        );
    }
}
