use thiserror_no_std::Error;

use crate::{frame::message_type, physical::DeviceType};

const EVENT_DETACHED: u8 = 0x00;
const EVENT_ATTACHED: u8 = 0x01;
const EVENT_ATTACHED_VIRTUAL: u8 = 0x02;

/// What happened to a port in a Hub Attached I/O message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachEvent {
    Detached,
    Attached {
        device_type: DeviceType,
    },

    /// A virtual port combining two physical ports.
    AttachedVirtual {
        device_type: DeviceType,
        port_a: u8,
        port_b: u8,
    },
}

/// One inbound frame from the hub, borrowed from the notification buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification<'a> {
    HubAttachedIo {
        port_id: u8,
        event: AttachEvent,
    },

    /// Raw value bytes. Their meaning depends on the device on the port.
    PortValue {
        port_id: u8,
        payload: &'a [u8],
    },

    /// The hub confirming an input format setup.
    PortInputFormat {
        port_id: u8,
        mode: u8,
        delta: u32,
        notifications_enabled: bool,
    },

    /// Pairs of (port id, feedback bits).
    OutputCommandFeedback {
        feedback: &'a [u8],
    },

    GenericError {
        command_type: u8,
        error_code: u8,
    },

    HubProperty {
        property: u8,
        operation: u8,
        payload: &'a [u8],
    },

    /// Well formed frame of a message type this crate doesn't interpret.
    Unhandled {
        message_type: u8,
    },
}

/// Reasons an inbound frame is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame truncated: expected at least {expected} bytes, got {actual}.")]
    Truncated { expected: usize, actual: usize },

    #[error("Frame declares {declared} bytes but {actual} were received.")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Unknown attach event {0}.")]
    UnknownAttachEvent(u8),

    #[error("Value {0} is outside of the valid range for its key.")]
    InvalidValue(i32),
}

/// Split off the common header, returning the message type and body.
/// Lengths above 127 use a second length byte.
fn split_header(frame: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    let first = *frame.first().ok_or(DecodeError::Truncated {
        expected: 3,
        actual: 0,
    })?;

    let (declared, header_len) = if first & 0x80 != 0 {
        let second = *frame.get(1).ok_or(DecodeError::Truncated {
            expected: 4,
            actual: frame.len(),
        })?;
        (((first & 0x7F) as usize) | ((second as usize) << 7), 4)
    } else {
        (first as usize, 3)
    };

    if frame.len() < header_len {
        return Err(DecodeError::Truncated {
            expected: header_len,
            actual: frame.len(),
        });
    }
    if declared != frame.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    Ok((frame[header_len - 1], &frame[header_len..]))
}

fn require(body: &[u8], len: usize) -> Result<(), DecodeError> {
    if body.len() < len {
        return Err(DecodeError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }
    Ok(())
}

fn decode_attached_io(body: &[u8]) -> Result<Notification<'_>, DecodeError> {
    require(body, 2)?;
    let port_id = body[0];
    let event = match body[1] {
        EVENT_DETACHED => AttachEvent::Detached,
        EVENT_ATTACHED => {
            require(body, 4)?;
            AttachEvent::Attached {
                device_type: u16::from_le_bytes([body[2], body[3]]).into(),
            }
        }
        EVENT_ATTACHED_VIRTUAL => {
            require(body, 6)?;
            AttachEvent::AttachedVirtual {
                device_type: u16::from_le_bytes([body[2], body[3]]).into(),
                port_a: body[4],
                port_b: body[5],
            }
        }
        other => return Err(DecodeError::UnknownAttachEvent(other)),
    };
    Ok(Notification::HubAttachedIo { port_id, event })
}

/// Decode a single inbound frame. The body lengths of each message type are
/// checked, the payload of port values is left to the sensor key.
pub fn decode_notification(frame: &[u8]) -> Result<Notification<'_>, DecodeError> {
    let (message_type, body) = split_header(frame)?;

    match message_type {
        message_type::HUB_ATTACHED_IO => decode_attached_io(body),
        message_type::PORT_VALUE_SINGLE => {
            require(body, 2)?;
            Ok(Notification::PortValue {
                port_id: body[0],
                payload: &body[1..],
            })
        }
        message_type::PORT_INPUT_FORMAT_SINGLE => {
            require(body, 7)?;
            Ok(Notification::PortInputFormat {
                port_id: body[0],
                mode: body[1],
                delta: u32::from_le_bytes([body[2], body[3], body[4], body[5]]),
                notifications_enabled: body[6] != 0,
            })
        }
        message_type::PORT_OUTPUT_COMMAND_FEEDBACK => {
            require(body, 2)?;
            Ok(Notification::OutputCommandFeedback { feedback: body })
        }
        message_type::GENERIC_ERROR => {
            require(body, 2)?;
            Ok(Notification::GenericError {
                command_type: body[0],
                error_code: body[1],
            })
        }
        message_type::HUB_PROPERTIES => {
            require(body, 2)?;
            Ok(Notification::HubProperty {
                property: body[0],
                operation: body[1],
                payload: &body[2..],
            })
        }
        other => Ok(Notification::Unhandled {
            message_type: other,
        }),
    }
}
