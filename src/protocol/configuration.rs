//! Configuration characteristic: firmware settings and the protocol version.
//!
//! Every setting command is acknowledged with a response whose type byte
//! is the command byte with the high bit set (`0x18` -> `0x98`), except the
//! version request which answers with `0x81` and an ASCII version string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sensor::AttitudeFormat;
use super::{duration_units, require_len, Encoded, MessageSpec, CONFIGURATION_CHARACTERISTIC_UUID};
use crate::errors::ParseError;

const CMD_REQUEST_VERSION: u8 = 0x01;
const CMD_FLAT_THRESHOLD: u8 = 0x05;
const CMD_COLLISION_THRESHOLD: u8 = 0x06;
const CMD_DOUBLE_TAP_INTERVAL: u8 = 0x17;
const CMD_ID_NOTIFICATION: u8 = 0x18;
const CMD_ID_MISSED_NOTIFICATION: u8 = 0x19;
const CMD_MAGNET_DETECTION: u8 = 0x1B;
const CMD_MOTOR_SPEED_FEEDBACK: u8 = 0x1C;
const CMD_ATTITUDE_NOTIFICATION: u8 = 0x1D;

const RESP_VERSION: u8 = 0x81;
const RESP_FLAG: u8 = 0x80;

const RESERVED: u8 = 0x00;

/// When the cube sends a periodic notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyCondition {
    #[default]
    Always = 0x00,
    OnChange = 0x01,
}

/// When the cube sends id notifications. `Suppressed` additionally keeps
/// quiet for 300 ms after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdNotifyCondition {
    #[default]
    Always = 0x00,
    OnChange = 0x01,
    Suppressed = 0xFF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MagnetDetectionMode {
    #[default]
    Disabled = 0x00,
    /// Report which magnet is close.
    MagnetState = 0x01,
    /// Report magnetic force as a vector.
    MagneticForce = 0x02,
}

/// Acknowledgement of a setting command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigResponse {
    /// The command byte this response answers.
    pub command: u8,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigMessage {
    Version(String),
    Response(ConfigResponse),
}

pub struct ConfigurationSpec;

impl ConfigurationSpec {
    pub fn encode_request_version() -> Vec<u8> {
        vec![CMD_REQUEST_VERSION, RESERVED]
    }

    /// Tilt, in degrees, past which the cube reports itself as sloped.
    pub fn encode_flat_threshold(degrees: u8) -> Encoded<u8> {
        let degrees = degrees.clamp(1, 45);
        Encoded::new(vec![CMD_FLAT_THRESHOLD, RESERVED, degrees], degrees)
    }

    pub fn encode_collision_threshold(level: u8) -> Encoded<u8> {
        let level = level.clamp(1, 10);
        Encoded::new(vec![CMD_COLLISION_THRESHOLD, RESERVED, level], level)
    }

    pub fn encode_double_tap_interval(level: u8) -> Encoded<u8> {
        let level = level.clamp(1, 7);
        Encoded::new(vec![CMD_DOUBLE_TAP_INTERVAL, RESERVED, level], level)
    }

    /// Minimum interval between id notifications. Echoes the interval in ms.
    pub fn encode_id_notification(interval_ms: u32, condition: IdNotifyCondition) -> Encoded<u32> {
        let units = duration_units(interval_ms, 0);
        Encoded::new(
            vec![CMD_ID_NOTIFICATION, RESERVED, units, condition as u8],
            u32::from(units) * 10,
        )
    }

    /// How long the mat must be out of sight before "missed" is reported.
    pub fn encode_id_missed_notification(sensitivity_ms: u32) -> Encoded<u32> {
        let units = duration_units(sensitivity_ms, 0);
        Encoded::new(
            vec![CMD_ID_MISSED_NOTIFICATION, RESERVED, units],
            u32::from(units) * 10,
        )
    }

    /// Firmware before 2.3.0 only understands the short form without
    /// interval and condition; pass `with_interval = false` for it.
    pub fn encode_magnet_detection(
        mode: MagnetDetectionMode,
        interval_ms: u32,
        condition: NotifyCondition,
        with_interval: bool,
    ) -> Encoded<u32> {
        if !with_interval {
            return Encoded::new(vec![CMD_MAGNET_DETECTION, RESERVED, mode as u8], 0);
        }
        // This one counts in 20 ms steps.
        let units = ((u64::from(interval_ms) + 10) / 20).clamp(1, 255) as u8;
        Encoded::new(
            vec![
                CMD_MAGNET_DETECTION,
                RESERVED,
                mode as u8,
                units,
                condition as u8,
            ],
            u32::from(units) * 20,
        )
    }

    pub fn encode_motor_speed_feedback(enabled: bool) -> Vec<u8> {
        vec![CMD_MOTOR_SPEED_FEEDBACK, RESERVED, u8::from(enabled)]
    }

    pub fn encode_attitude_notification(
        format: AttitudeFormat,
        interval_ms: u32,
        condition: NotifyCondition,
    ) -> Encoded<u32> {
        let units = duration_units(interval_ms, 0);
        Encoded::new(
            vec![
                CMD_ATTITUDE_NOTIFICATION,
                RESERVED,
                format as u8,
                units,
                condition as u8,
            ],
            u32::from(units) * 10,
        )
    }
}

impl MessageSpec for ConfigurationSpec {
    const UUID: Uuid = CONFIGURATION_CHARACTERISTIC_UUID;
    type Message = ConfigMessage;

    fn decode(frame: &[u8]) -> Result<ConfigMessage, ParseError> {
        let kind = *frame.first().ok_or(ParseError::Empty)?;
        match kind {
            RESP_VERSION => {
                require_len(frame, 3, "protocol version")?;
                let version = std::str::from_utf8(&frame[2..])
                    .map_err(|e| ParseError::InvalidPayload(format!("version string: {e}")))?;
                Ok(ConfigMessage::Version(
                    version.trim_end_matches('\0').to_string(),
                ))
            }
            k if k & RESP_FLAG != 0 && is_setting_command(k & !RESP_FLAG) => {
                require_len(frame, 3, "configuration response")?;
                Ok(ConfigMessage::Response(ConfigResponse {
                    command: k & !RESP_FLAG,
                    success: frame[2] == 0x00,
                }))
            }
            other => Err(ParseError::UnknownType(other)),
        }
    }
}

fn is_setting_command(command: u8) -> bool {
    matches!(
        command,
        CMD_ID_NOTIFICATION
            | CMD_ID_MISSED_NOTIFICATION
            | CMD_MAGNET_DETECTION
            | CMD_MOTOR_SPEED_FEEDBACK
            | CMD_ATTITUDE_NOTIFICATION
    )
}
