use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CubeError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] BluetoothError),
    #[error("operation rejected by cube: {0}")]
    Rejected(ResponseReason),
    #[error("cannot discover the characteristic: {0}")]
    MissingCapability(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cube disconnected")]
    Disconnected,
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty frame")]
    Empty,
    #[error("frame too short for {kind}: need {expected} bytes, got {actual}")]
    TooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unrecognized discriminant {0:#04x}")]
    UnknownType(u8),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[cfg_attr(not(feature = "bluez"), allow(dead_code))]
#[derive(Debug, Error)]
pub enum BluetoothError {
    #[error("bluetooth session unavailable: {0}")]
    Session(String),
    #[error("device not found during scan: {mac}")]
    NotFound { mac: String },
    #[error("connection not established: {0}")]
    NotConnected(String),
    #[error("gatt discovery failed: {0}")]
    Discovery(String),
}

/// Reason byte carried by a move-to response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ResponseReason {
    Success,
    Timeout,
    IdMissed,
    InvalidParameter,
    InvalidState,
    OtherWriteAccepted,
    NotSupported,
    QueueFull,
    Unknown(u8),
}

impl ResponseReason {
    pub fn code(self) -> u8 {
        match self {
            ResponseReason::Success => 0x00,
            ResponseReason::Timeout => 0x01,
            ResponseReason::IdMissed => 0x02,
            ResponseReason::InvalidParameter => 0x03,
            ResponseReason::InvalidState => 0x04,
            ResponseReason::OtherWriteAccepted => 0x05,
            ResponseReason::NotSupported => 0x06,
            ResponseReason::QueueFull => 0x07,
            ResponseReason::Unknown(code) => code,
        }
    }

    /// Reasons that complete a move-to chunk. `OtherWriteAccepted` means a
    /// newer motor command took over, which the caller sees as finished.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ResponseReason::Success | ResponseReason::OtherWriteAccepted
        )
    }
}

impl From<u8> for ResponseReason {
    fn from(code: u8) -> Self {
        match code {
            0x00 => ResponseReason::Success,
            0x01 => ResponseReason::Timeout,
            0x02 => ResponseReason::IdMissed,
            0x03 => ResponseReason::InvalidParameter,
            0x04 => ResponseReason::InvalidState,
            0x05 => ResponseReason::OtherWriteAccepted,
            0x06 => ResponseReason::NotSupported,
            0x07 => ResponseReason::QueueFull,
            other => ResponseReason::Unknown(other),
        }
    }
}

impl fmt::Display for ResponseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (reason {:#04x})", self, self.code())
    }
}

pub type Result<T> = std::result::Result<T, CubeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_round_trip_through_u8() {
        for code in 0u8..=0x07 {
            assert_eq!(ResponseReason::from(code).code(), code);
        }
        assert_eq!(ResponseReason::from(0x42), ResponseReason::Unknown(0x42));
    }

    #[test]
    fn only_success_and_overwrite_complete_a_chunk() {
        assert!(ResponseReason::Success.is_success());
        assert!(ResponseReason::OtherWriteAccepted.is_success());
        assert!(!ResponseReason::Timeout.is_success());
        assert!(!ResponseReason::Unknown(0x05 + 0x10).is_success());
    }

    #[test]
    fn rejected_error_reports_numeric_reason() {
        let err = CubeError::Rejected(ResponseReason::IdMissed);
        assert!(err.to_string().contains("0x02"));
    }
}
