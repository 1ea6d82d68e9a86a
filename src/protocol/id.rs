//! ID reader: what the optical sensor under the cube currently sees.

use serde::Serialize;
use uuid::Uuid;

use super::{read_u16, read_u32, require_len, MessageSpec, ID_CHARACTERISTIC_UUID};
use crate::errors::ParseError;

const TYPE_POSITION_ID: u8 = 0x01;
const TYPE_STANDARD_ID: u8 = 0x02;
const TYPE_POSITION_ID_MISSED: u8 = 0x03;
const TYPE_STANDARD_ID_MISSED: u8 = 0x04;

/// Cube location on a position mat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionId {
    /// X coordinate of the cube's center.
    pub x: u16,
    /// Y coordinate of the cube's center.
    pub y: u16,
    /// Angle in degrees, 0-360.
    pub angle: u16,
    /// X coordinate of the optical sensor.
    pub sensor_x: u16,
    /// Y coordinate of the optical sensor.
    pub sensor_y: u16,
}

/// A printed card, sticker or mat marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StandardIdInfo {
    pub standard_id: u32,
    /// Angle in degrees, 0-360.
    pub angle: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IdMessage {
    PositionId(PositionId),
    StandardId(StandardIdInfo),
    PositionIdMissed,
    StandardIdMissed,
}

pub struct IdSpec;

impl MessageSpec for IdSpec {
    const UUID: Uuid = ID_CHARACTERISTIC_UUID;
    type Message = IdMessage;

    fn decode(frame: &[u8]) -> Result<IdMessage, ParseError> {
        let kind = *frame.first().ok_or(ParseError::Empty)?;
        match kind {
            TYPE_POSITION_ID => {
                require_len(frame, 11, "position id")?;
                Ok(IdMessage::PositionId(PositionId {
                    x: read_u16(frame, 1),
                    y: read_u16(frame, 3),
                    angle: read_u16(frame, 5),
                    sensor_x: read_u16(frame, 7),
                    sensor_y: read_u16(frame, 9),
                }))
            }
            TYPE_STANDARD_ID => {
                require_len(frame, 7, "standard id")?;
                Ok(IdMessage::StandardId(StandardIdInfo {
                    standard_id: read_u32(frame, 1),
                    angle: read_u16(frame, 5),
                }))
            }
            TYPE_POSITION_ID_MISSED => Ok(IdMessage::PositionIdMissed),
            TYPE_STANDARD_ID_MISSED => Ok(IdMessage::StandardIdMissed),
            other => Err(ParseError::UnknownType(other)),
        }
    }
}

/// Standard ids printed on the official cards, mats and stickers.
pub mod standard_id {
    pub const CARD_TYPHOON: u32 = 3670016;
    pub const CARD_RUSH: u32 = 3670054;
    pub const CARD_AUTO_TACKLE: u32 = 3670018;
    pub const CARD_RANDOM: u32 = 3670056;
    pub const CARD_TACKLE_POWER_UP: u32 = 3670020;
    pub const CARD_SWING_POWER_UP: u32 = 3670058;
    pub const CARD_SIDE_ATTACK: u32 = 3670022;
    pub const CARD_CHASING: u32 = 3670060;

    pub const CARD_LEFT: u32 = 3670024;
    pub const CARD_RIGHT: u32 = 3670062;
    pub const CARD_FRONT: u32 = 3670026;
    pub const CARD_BACK: u32 = 3670064;
    pub const CARD_GO: u32 = 3670028;

    pub const SKUNK_BLUE: u32 = 3670078;
    pub const SKUNK_GREEN: u32 = 3670042;
    pub const SKUNK_YELLOW: u32 = 3670080;
    pub const SKUNK_ORANGE: u32 = 3670044;
    pub const SKUNK_RED: u32 = 3670082;
    pub const SKUNK_BROWN: u32 = 3670046;

    pub const STICKER_SPEED_UP: u32 = 3670066;
    pub const STICKER_SPEED_DOWN: u32 = 3670030;
    pub const STICKER_WOBBLE: u32 = 3670068;
    pub const STICKER_PANIC: u32 = 3670032;
    pub const STICKER_SPIN: u32 = 3670070;
    pub const STICKER_SHOCK: u32 = 3670034;

    pub const MARK_CRAFT_FIGHTER: u32 = 3670048;
    pub const MARK_RHYTHM_AND_GO: u32 = 3670052;
    pub const MARK_SKUNK_CHASER: u32 = 3670086;
    pub const MARK_FINGER_STRIKE: u32 = 3670050;
    pub const MARK_FINGER_STRIKE_1P: u32 = 3670088;
    pub const MARK_FREE_MOVE: u32 = 3670084;

    /// Name of a known standard id.
    pub fn name(id: u32) -> Option<&'static str> {
        let name = match id {
            CARD_TYPHOON => "CARD_TYPHOON",
            CARD_RUSH => "CARD_RUSH",
            CARD_AUTO_TACKLE => "CARD_AUTO_TACKLE",
            CARD_RANDOM => "CARD_RANDOM",
            CARD_TACKLE_POWER_UP => "CARD_TACKLE_POWER_UP",
            CARD_SWING_POWER_UP => "CARD_SWING_POWER_UP",
            CARD_SIDE_ATTACK => "CARD_SIDE_ATTACK",
            CARD_CHASING => "CARD_CHASING",
            CARD_LEFT => "CARD_LEFT",
            CARD_RIGHT => "CARD_RIGHT",
            CARD_FRONT => "CARD_FRONT",
            CARD_BACK => "CARD_BACK",
            CARD_GO => "CARD_GO",
            SKUNK_BLUE => "SKUNK_BLUE",
            SKUNK_GREEN => "SKUNK_GREEN",
            SKUNK_YELLOW => "SKUNK_YELLOW",
            SKUNK_ORANGE => "SKUNK_ORANGE",
            SKUNK_RED => "SKUNK_RED",
            SKUNK_BROWN => "SKUNK_BROWN",
            STICKER_SPEED_UP => "STICKER_SPEED_UP",
            STICKER_SPEED_DOWN => "STICKER_SPEED_DOWN",
            STICKER_WOBBLE => "STICKER_WOBBLE",
            STICKER_PANIC => "STICKER_PANIC",
            STICKER_SPIN => "STICKER_SPIN",
            STICKER_SHOCK => "STICKER_SHOCK",
            MARK_CRAFT_FIGHTER => "MARK_CRAFT_FIGHTER",
            MARK_RHYTHM_AND_GO => "MARK_RHYTHM_AND_GO",
            MARK_SKUNK_CHASER => "MARK_SKUNK_CHASER",
            MARK_FINGER_STRIKE => "MARK_FINGER_STRIKE",
            MARK_FINGER_STRIKE_1P => "MARK_FINGER_STRIKE_1P",
            MARK_FREE_MOVE => "MARK_FREE_MOVE",
            _ => return None,
        };
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_position_id() {
        let frame = [
            0x01, 0xC5, 0x02, 0x7F, 0x01, 0x32, 0x01, 0xBC, 0x02, 0x82, 0x01, 0x32, 0x01,
        ];
        let msg = IdSpec::decode(&frame).unwrap();
        assert_eq!(
            msg,
            IdMessage::PositionId(PositionId {
                x: 709,
                y: 383,
                angle: 306,
                sensor_x: 700,
                sensor_y: 386,
            })
        );
    }

    #[test]
    fn decodes_standard_id() {
        let frame = [0x02, 0x00, 0x00, 0x38, 0x00, 0x15, 0x00];
        let msg = IdSpec::decode(&frame).unwrap();
        assert_eq!(
            msg,
            IdMessage::StandardId(StandardIdInfo {
                standard_id: 3670016,
                angle: 21,
            })
        );
        assert_eq!(standard_id::name(3670016), Some("CARD_TYPHOON"));
    }

    #[test]
    fn decodes_missed_variants_without_payload() {
        assert_eq!(IdSpec::decode(&[0x03]).unwrap(), IdMessage::PositionIdMissed);
        assert_eq!(IdSpec::decode(&[0x04]).unwrap(), IdMessage::StandardIdMissed);
    }

    #[test]
    fn rejects_truncated_and_unknown_frames() {
        assert!(matches!(
            IdSpec::decode(&[0x01, 0xC5, 0x02]),
            Err(ParseError::TooShort { expected: 11, actual: 3, .. })
        ));
        assert!(matches!(
            IdSpec::decode(&[0x02, 0x00]),
            Err(ParseError::TooShort { expected: 7, .. })
        ));
        assert_eq!(IdSpec::decode(&[0x09]), Err(ParseError::UnknownType(0x09)));
        assert_eq!(IdSpec::decode(&[]), Err(ParseError::Empty));
    }
}
