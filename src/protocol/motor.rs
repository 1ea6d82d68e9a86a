//! Motor control frames and their responses.
//!
//! Two command shapes matter here:
//! - the timed differential drive (`0x02`), which the cube never
//!   acknowledges, and
//! - the multi-target "move to" command (`0x04`), which carries an
//!   operation tag echoed back in a `0x84` response once the cube has
//!   reached (or given up on) the targets.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{duration_units, require_len, Encoded, MessageSpec, MOTOR_CHARACTERISTIC_UUID};
use crate::errors::{ParseError, ResponseReason};

const CMD_MOVE_TIMED: u8 = 0x02;
const CMD_MOVE_TO_MULTI: u8 = 0x04;
const RESP_MOVE_TO_SINGLE: u8 = 0x83;
const RESP_MOVE_TO_MULTI: u8 = 0x84;
const RESP_MOTOR_SPEED: u8 = 0xE0;

const MOTOR_LEFT: u8 = 0x01;
const MOTOR_RIGHT: u8 = 0x02;
const DIRECTION_FORWARD: u8 = 0x01;
const DIRECTION_BACKWARD: u8 = 0x02;

/// Maximum magnitude accepted for timed moves.
pub const MAX_SPEED: u8 = 100;
/// Longest duration a timed move can carry.
pub const MAX_DURATION_MS: u32 = 2550;
/// Targets carried by one move-to frame.
pub const TARGETS_PER_FRAME: usize = 29;
/// Coordinate value meaning "keep the current one".
pub const COORDINATE_UNCHANGED: u16 = 0xFFFF;
/// The packed angle field keeps 13 bits for the angle.
pub const MAX_ANGLE: u16 = 0x1FFF;

const MOVE_TO_HEADER_LEN: usize = 8;
const MOVE_TO_ROW_LEN: usize = 6;

/// Speeds and duration actually encoded for a timed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveParams {
    pub left: i32,
    pub right: i32,
    pub duration_ms: u32,
}

/// How the cube travels towards a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveType {
    /// Turn while moving.
    #[default]
    RotatingMove = 0,
    /// Turn while moving, never backing up.
    RotatingMoveWithoutBack = 1,
    /// Turn in place first, then drive straight.
    RotateThenMove = 2,
}

/// Speed profile while travelling to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedType {
    #[default]
    Constant = 0,
    Accelerate = 1,
    Decelerate = 2,
    AccelerateThenDecelerate = 3,
}

/// How the final `angle` of a target is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotateType {
    #[default]
    AbsoluteOptimal = 0,
    AbsolutePositive = 1,
    AbsoluteNegative = 2,
    RelativePositive = 3,
    RelativeNegative = 4,
    NoRotation = 5,
    SameAsAtWriting = 6,
}

/// One waypoint of a move-to command. `None` coordinates leave that axis
/// where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveToTarget {
    pub x: Option<u16>,
    pub y: Option<u16>,
    pub angle: Option<u16>,
    pub rotate_type: Option<RotateType>,
}

impl MoveToTarget {
    pub fn new(x: u16, y: u16) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn with_angle(mut self, angle: u16, rotate_type: RotateType) -> Self {
        self.angle = Some(angle);
        self.rotate_type = Some(rotate_type);
        self
    }

    fn packed_angle(&self) -> u16 {
        let rotate_type = match (self.rotate_type, self.angle) {
            (Some(rotate_type), _) => rotate_type,
            (None, Some(_)) => RotateType::AbsoluteOptimal,
            (None, None) => RotateType::NoRotation,
        };
        let angle = self.angle.unwrap_or(0).min(MAX_ANGLE);
        ((rotate_type as u16) << 13) | angle
    }
}

/// Shared options of a move-to command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveToOptions {
    pub move_type: MoveType,
    /// 10-255.
    pub max_speed: u8,
    pub speed_type: SpeedType,
    /// Seconds before the cube gives up; 0 lets the firmware pick (10 s).
    pub timeout: u8,
    /// Replace whatever the motors are doing instead of queueing behind it.
    pub overwrite: bool,
}

impl Default for MoveToOptions {
    fn default() -> Self {
        Self {
            move_type: MoveType::RotatingMove,
            max_speed: 115,
            speed_type: SpeedType::Constant,
            timeout: 0,
            overwrite: true,
        }
    }
}

/// Options plus the targets that fit in one frame, as encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveToFrame {
    pub tag: u8,
    pub options: MoveToOptions,
    pub targets: Vec<MoveToTarget>,
}

/// Acknowledgement for a move-to command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveToResponse {
    pub tag: u8,
    pub reason: ResponseReason,
}

/// Motor speed feedback, in the cube's speed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotorSpeed {
    pub left: u8,
    pub right: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorMessage {
    MoveToResponse(MoveToResponse),
    Speed(MotorSpeed),
}

pub struct MotorSpec;

impl MotorSpec {
    /// Timed differential drive. A duration of 0 runs until the next command.
    pub fn encode_move(left: i32, right: i32, duration_ms: u32) -> Encoded<MoveParams> {
        let (l_dir, l_power, l_echo) = split_speed(left);
        let (r_dir, r_power, r_echo) = split_speed(right);
        let units = duration_units(duration_ms, 0);

        Encoded::new(
            vec![
                CMD_MOVE_TIMED,
                MOTOR_LEFT,
                l_dir,
                l_power,
                MOTOR_RIGHT,
                r_dir,
                r_power,
                units,
            ],
            MoveParams {
                left: l_echo,
                right: r_echo,
                duration_ms: u32::from(units) * 10,
            },
        )
    }

    pub fn encode_stop() -> Encoded<MoveParams> {
        Self::encode_move(0, 0, 0)
    }

    /// Multi-target move-to. Targets past [`TARGETS_PER_FRAME`] are dropped.
    pub fn encode_move_to(
        tag: u8,
        targets: &[MoveToTarget],
        options: &MoveToOptions,
    ) -> Encoded<MoveToFrame> {
        let targets = &targets[..targets.len().min(TARGETS_PER_FRAME)];
        let options = MoveToOptions {
            max_speed: options.max_speed.clamp(10, 255),
            ..*options
        };

        let mut frame = Vec::with_capacity(MOVE_TO_HEADER_LEN + MOVE_TO_ROW_LEN * targets.len());
        frame.extend_from_slice(&[
            CMD_MOVE_TO_MULTI,
            tag,
            options.timeout,
            options.move_type as u8,
            options.max_speed,
            options.speed_type as u8,
            0x00,
            if options.overwrite { 0x00 } else { 0x01 },
        ]);

        let mut echoed = Vec::with_capacity(targets.len());
        for target in targets {
            let x = target.x.unwrap_or(COORDINATE_UNCHANGED);
            let y = target.y.unwrap_or(COORDINATE_UNCHANGED);
            frame.extend_from_slice(&x.to_le_bytes());
            frame.extend_from_slice(&y.to_le_bytes());
            frame.extend_from_slice(&target.packed_angle().to_le_bytes());
            echoed.push(MoveToTarget {
                angle: target.angle.map(|a| a.min(MAX_ANGLE)),
                ..*target
            });
        }

        Encoded::new(
            frame,
            MoveToFrame {
                tag,
                options,
                targets: echoed,
            },
        )
    }
}

impl MessageSpec for MotorSpec {
    const UUID: Uuid = MOTOR_CHARACTERISTIC_UUID;
    type Message = MotorMessage;

    fn decode(frame: &[u8]) -> Result<MotorMessage, ParseError> {
        let kind = *frame.first().ok_or(ParseError::Empty)?;
        match kind {
            RESP_MOVE_TO_SINGLE | RESP_MOVE_TO_MULTI => {
                require_len(frame, 3, "move-to response")?;
                Ok(MotorMessage::MoveToResponse(MoveToResponse {
                    tag: frame[1],
                    reason: ResponseReason::from(frame[2]),
                }))
            }
            RESP_MOTOR_SPEED => {
                require_len(frame, 3, "motor speed")?;
                Ok(MotorMessage::Speed(MotorSpeed {
                    left: frame[1],
                    right: frame[2],
                }))
            }
            other => Err(ParseError::UnknownType(other)),
        }
    }
}

/// Direction byte, magnitude byte and the signed value they represent.
fn split_speed(speed: i32) -> (u8, u8, i32) {
    let power = speed.unsigned_abs().min(u32::from(MAX_SPEED)) as u8;
    if speed > 0 {
        (DIRECTION_FORWARD, power, i32::from(power))
    } else {
        (DIRECTION_BACKWARD, power, -i32::from(power))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_without_duration() {
        let encoded = MotorSpec::encode_move(100, -20, 0);
        assert_eq!(
            encoded.frame,
            vec![0x02, 0x01, 0x01, 0x64, 0x02, 0x02, 0x14, 0x00]
        );
        assert_eq!(
            encoded.echo,
            MoveParams {
                left: 100,
                right: -20,
                duration_ms: 0
            }
        );
    }

    #[test]
    fn move_with_duration() {
        let encoded = MotorSpec::encode_move(100, -20, 100);
        assert_eq!(
            encoded.frame,
            vec![0x02, 0x01, 0x01, 0x64, 0x02, 0x02, 0x14, 0x0A]
        );
        assert_eq!(encoded.echo.duration_ms, 100);
    }

    #[test]
    fn move_clamps_out_of_range_parameters() {
        let encoded = MotorSpec::encode_move(-500, 500, 3000);
        assert_eq!(
            encoded.frame,
            vec![0x02, 0x01, 0x02, 0x64, 0x02, 0x01, 0x64, 0xFF]
        );
        assert_eq!(
            encoded.echo,
            MoveParams {
                left: -100,
                right: 100,
                duration_ms: 2550
            }
        );
    }

    #[test]
    fn move_duration_echo_is_rounded_to_wire_unit() {
        for ms in [0u32, 1, 4, 5, 14, 15, 999, 2544, 2545, 2555, 10_000] {
            let echo = MotorSpec::encode_move(10, 10, ms).echo;
            let expected = ((ms + 5) / 10).min(255) * 10;
            assert_eq!(echo.duration_ms, expected, "duration {ms}");
        }
    }

    #[test]
    fn stop_is_zero_speed_endless_move() {
        assert_eq!(
            MotorSpec::encode_stop().frame,
            vec![0x02, 0x01, 0x02, 0x00, 0x02, 0x02, 0x00, 0x00]
        );
    }

    #[test]
    fn move_to_frame_layout() {
        let targets = [
            MoveToTarget::new(250, 250).with_angle(90, RotateType::AbsoluteOptimal),
            MoveToTarget {
                x: None,
                y: Some(300),
                angle: None,
                rotate_type: None,
            },
        ];
        let options = MoveToOptions {
            overwrite: false,
            timeout: 5,
            ..Default::default()
        };
        let encoded = MotorSpec::encode_move_to(7, &targets, &options);
        assert_eq!(
            encoded.frame,
            vec![
                0x04, 0x07, 0x05, 0x00, 0x73, 0x00, 0x00, 0x01, // header
                0xFA, 0x00, 0xFA, 0x00, 0x5A, 0x00, // 250, 250, 90 optimal
                0xFF, 0xFF, 0x2C, 0x01, 0x00, 0xA0, // x unchanged, 300, no rotation
            ]
        );
        assert_eq!(encoded.echo.tag, 7);
        assert_eq!(encoded.echo.targets.len(), 2);
    }

    #[test]
    fn move_to_packs_rotate_type_into_high_bits() {
        let target = MoveToTarget::new(0, 0).with_angle(0x3FFF, RotateType::RelativeNegative);
        let encoded = MotorSpec::encode_move_to(1, &[target], &MoveToOptions::default());
        let packed = u16::from_le_bytes([encoded.frame[12], encoded.frame[13]]);
        assert_eq!(packed >> 13, RotateType::RelativeNegative as u16);
        assert_eq!(packed & MAX_ANGLE, MAX_ANGLE);
        assert_eq!(encoded.echo.targets[0].angle, Some(MAX_ANGLE));
    }

    #[test]
    fn move_to_truncates_and_clamps() {
        let targets = vec![MoveToTarget::new(1, 1); 40];
        let options = MoveToOptions {
            max_speed: 3,
            ..Default::default()
        };
        let encoded = MotorSpec::encode_move_to(0, &targets, &options);
        assert_eq!(encoded.frame.len(), 8 + 6 * TARGETS_PER_FRAME);
        assert_eq!(encoded.echo.targets.len(), TARGETS_PER_FRAME);
        assert_eq!(encoded.echo.options.max_speed, 10);
        assert_eq!(encoded.frame[4], 10);
    }

    #[test]
    fn decodes_responses() {
        assert_eq!(
            MotorSpec::decode(&[0x84, 0x12, 0x00]).unwrap(),
            MotorMessage::MoveToResponse(MoveToResponse {
                tag: 0x12,
                reason: ResponseReason::Success
            })
        );
        assert_eq!(
            MotorSpec::decode(&[0x83, 0x01, 0x02]).unwrap(),
            MotorMessage::MoveToResponse(MoveToResponse {
                tag: 0x01,
                reason: ResponseReason::IdMissed
            })
        );
        assert_eq!(
            MotorSpec::decode(&[0xE0, 0x20, 0x10]).unwrap(),
            MotorMessage::Speed(MotorSpeed {
                left: 0x20,
                right: 0x10
            })
        );
        assert!(MotorSpec::decode(&[0x84, 0x12]).is_err());
        assert_eq!(
            MotorSpec::decode(&[0x05, 0x00, 0x00]),
            Err(ParseError::UnknownType(0x05))
        );
    }
}
