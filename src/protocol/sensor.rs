//! Motion, magnet and attitude sensor frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{read_f32, read_i16, require_len, MessageSpec, SENSOR_CHARACTERISTIC_UUID};
use crate::errors::ParseError;

const TYPE_MOTION: u8 = 0x01;
const TYPE_MAGNET: u8 = 0x02;
const TYPE_ATTITUDE: u8 = 0x03;

const REQUEST_MOTION: u8 = 0x81;
const REQUEST_MAGNET: u8 = 0x82;
const REQUEST_ATTITUDE: u8 = 0x83;

/// Magnet frames carry force data when at least this long.
const MAGNET_FORCE_LEN: usize = 6;

/// Which face of the cube points up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    TopUp,
    BottomUp,
    RearUp,
    FrontUp,
    RightUp,
    LeftUp,
    Unknown(u8),
}

impl Orientation {
    pub fn code(self) -> u8 {
        match self {
            Orientation::TopUp => 1,
            Orientation::BottomUp => 2,
            Orientation::RearUp => 3,
            Orientation::FrontUp => 4,
            Orientation::RightUp => 5,
            Orientation::LeftUp => 6,
            Orientation::Unknown(code) => code,
        }
    }
}

impl From<u8> for Orientation {
    fn from(code: u8) -> Self {
        match code {
            1 => Orientation::TopUp,
            2 => Orientation::BottomUp,
            3 => Orientation::RearUp,
            4 => Orientation::FrontUp,
            5 => Orientation::RightUp,
            6 => Orientation::LeftUp,
            other => Orientation::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotionStatus {
    pub is_sloped: bool,
    pub is_collision_detected: bool,
    pub is_double_tapped: bool,
    pub orientation: Orientation,
    /// 0-10.
    pub shake_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MagneticForce {
    pub strength: u8,
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MagnetStatus {
    /// 0 when no magnet is detected.
    pub id: u8,
    /// Only reported by firmware that supports force detection.
    pub force: Option<MagneticForce>,
}

/// Attitude in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AttitudeEuler {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttitudeQuaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for AttitudeQuaternion {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AttitudeHighPrecisionEuler {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Attitude report format selected through the configuration characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttitudeFormat {
    #[default]
    Euler = 1,
    Quaternion = 2,
    HighPrecisionEuler = 3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorMessage {
    Motion(MotionStatus),
    Magnet(MagnetStatus),
    AttitudeEuler(AttitudeEuler),
    AttitudeQuaternion(AttitudeQuaternion),
    AttitudeHighPrecisionEuler(AttitudeHighPrecisionEuler),
}

pub struct SensorSpec;

impl SensorSpec {
    pub fn encode_motion_request() -> Vec<u8> {
        vec![REQUEST_MOTION]
    }

    pub fn encode_magnet_request() -> Vec<u8> {
        vec![REQUEST_MAGNET]
    }

    pub fn encode_attitude_request(format: AttitudeFormat) -> Vec<u8> {
        vec![REQUEST_ATTITUDE, format as u8]
    }

    fn decode_attitude(frame: &[u8]) -> Result<SensorMessage, ParseError> {
        require_len(frame, 2, "attitude")?;
        match frame[1] {
            1 => {
                require_len(frame, 8, "attitude euler")?;
                Ok(SensorMessage::AttitudeEuler(AttitudeEuler {
                    roll: read_i16(frame, 2),
                    pitch: read_i16(frame, 4),
                    yaw: read_i16(frame, 6),
                }))
            }
            2 => {
                require_len(frame, 18, "attitude quaternion")?;
                Ok(SensorMessage::AttitudeQuaternion(AttitudeQuaternion {
                    w: read_f32(frame, 2),
                    x: read_f32(frame, 6),
                    y: read_f32(frame, 10),
                    z: read_f32(frame, 14),
                }))
            }
            3 => {
                require_len(frame, 14, "attitude high precision euler")?;
                Ok(SensorMessage::AttitudeHighPrecisionEuler(
                    AttitudeHighPrecisionEuler {
                        roll: read_f32(frame, 2),
                        pitch: read_f32(frame, 6),
                        yaw: read_f32(frame, 10),
                    },
                ))
            }
            other => Err(ParseError::InvalidPayload(format!(
                "unknown attitude format {other}"
            ))),
        }
    }
}

impl MessageSpec for SensorSpec {
    const UUID: Uuid = SENSOR_CHARACTERISTIC_UUID;
    type Message = SensorMessage;

    fn decode(frame: &[u8]) -> Result<SensorMessage, ParseError> {
        let kind = *frame.first().ok_or(ParseError::Empty)?;
        match kind {
            TYPE_MOTION => {
                require_len(frame, 5, "motion")?;
                Ok(SensorMessage::Motion(MotionStatus {
                    // The cube reports "horizontal", 0 means tilted.
                    is_sloped: frame[1] == 0,
                    is_collision_detected: frame[2] == 1,
                    is_double_tapped: frame[3] == 1,
                    orientation: Orientation::from(frame[4]),
                    shake_level: frame.get(5).copied().unwrap_or(0),
                }))
            }
            TYPE_MAGNET => {
                require_len(frame, 2, "magnet")?;
                let force = (frame.len() >= MAGNET_FORCE_LEN).then(|| MagneticForce {
                    strength: frame[2],
                    x: frame[3] as i8,
                    y: frame[4] as i8,
                    z: frame[5] as i8,
                });
                Ok(SensorMessage::Magnet(MagnetStatus {
                    id: frame[1],
                    force,
                }))
            }
            TYPE_ATTITUDE => Self::decode_attitude(frame),
            other => Err(ParseError::UnknownType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_motion() {
        let msg = SensorSpec::decode(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(
            msg,
            SensorMessage::Motion(MotionStatus {
                is_sloped: true,
                is_collision_detected: false,
                is_double_tapped: false,
                orientation: Orientation::Unknown(0),
                shake_level: 0,
            })
        );

        let msg = SensorSpec::decode(&[0x01, 0x01, 0x01, 0x01, 0x05, 0x03]).unwrap();
        let SensorMessage::Motion(motion) = msg else {
            panic!("expected motion, got {msg:?}");
        };
        assert!(!motion.is_sloped);
        assert!(motion.is_collision_detected);
        assert!(motion.is_double_tapped);
        assert_eq!(motion.orientation, Orientation::RightUp);
        assert_eq!(motion.shake_level, 3);
    }

    #[test]
    fn motion_without_shake_byte_defaults_to_zero() {
        let msg = SensorSpec::decode(&[0x01, 0x01, 0x00, 0x00, 0x01]).unwrap();
        assert!(matches!(msg, SensorMessage::Motion(m) if m.shake_level == 0));
        assert!(SensorSpec::decode(&[0x01, 0x01, 0x00]).is_err());
    }

    #[test]
    fn decodes_magnet_with_and_without_force() {
        assert_eq!(
            SensorSpec::decode(&[0x02, 0x03]).unwrap(),
            SensorMessage::Magnet(MagnetStatus { id: 3, force: None })
        );
        assert_eq!(
            SensorSpec::decode(&[0x02, 0x01, 0x20, 0xFF, 0x02, 0x80]).unwrap(),
            SensorMessage::Magnet(MagnetStatus {
                id: 1,
                force: Some(MagneticForce {
                    strength: 0x20,
                    x: -1,
                    y: 2,
                    z: -128
                }),
            })
        );
    }

    #[test]
    fn decodes_attitude_formats() {
        let euler = [0x03, 0x01, 0x0A, 0x00, 0xF6, 0xFF, 0x5A, 0x00];
        assert_eq!(
            SensorSpec::decode(&euler).unwrap(),
            SensorMessage::AttitudeEuler(AttitudeEuler {
                roll: 10,
                pitch: -10,
                yaw: 90
            })
        );

        let mut quaternion = vec![0x03, 0x02];
        for v in [1.0f32, 0.0, 0.5, -0.5] {
            quaternion.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(
            SensorSpec::decode(&quaternion).unwrap(),
            SensorMessage::AttitudeQuaternion(AttitudeQuaternion {
                w: 1.0,
                x: 0.0,
                y: 0.5,
                z: -0.5
            })
        );

        let mut precise = vec![0x03, 0x03];
        for v in [1.5f32, -2.25, 180.0] {
            precise.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(
            SensorSpec::decode(&precise).unwrap(),
            SensorMessage::AttitudeHighPrecisionEuler(AttitudeHighPrecisionEuler {
                roll: 1.5,
                pitch: -2.25,
                yaw: 180.0
            })
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(SensorSpec::decode(&[0x03, 0x02, 0x00]).is_err());
        assert!(SensorSpec::decode(&[0x03, 0x07, 0, 0, 0, 0, 0, 0]).is_err());
        assert_eq!(
            SensorSpec::decode(&[0x7F, 0x00]),
            Err(ParseError::UnknownType(0x7F))
        );
    }

    #[test]
    fn request_frames() {
        assert_eq!(SensorSpec::encode_motion_request(), vec![0x81]);
        assert_eq!(SensorSpec::encode_magnet_request(), vec![0x82]);
        assert_eq!(
            SensorSpec::encode_attitude_request(AttitudeFormat::Quaternion),
            vec![0x83, 0x02]
        );
    }

    #[test]
    fn defaults_match_an_idle_cube() {
        assert_eq!(MotionStatus::default().orientation, Orientation::TopUp);
        assert_eq!(AttitudeQuaternion::default().w, 1.0);
    }
}
