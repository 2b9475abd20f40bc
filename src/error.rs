//! Error types shared by the session, codec and radio layers.

use crate::infrastructure::bluetooth::protocol::CharacteristicRole;
use thiserror::Error;

/// Reasons a public session operation did not reach the peripheral.
///
/// None of these are fatal; the session logs them and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Bluetooth radio is not powered on")]
    RadioUnavailable,

    #[error("no peripheral is bound to this session")]
    PeripheralAbsent,

    #[error("characteristic {0:?} was not discovered on this peripheral")]
    CharacteristicUnbound(CharacteristicRole),

    #[error("event id {0} is outside [0, 32768)")]
    InvalidEventId(u16),

    #[error("session service has stopped")]
    ServiceStopped,
}

/// Payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("payload too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("payload is empty")]
    Empty,
}

/// Failure reported by the radio stack alongside a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("radio stack error: {message}")]
pub struct RadioError {
    pub message: String,
}

impl RadioError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
