//! Function button on top of the cube.

use serde::Serialize;
use uuid::Uuid;

use super::{require_len, MessageSpec, BUTTON_CHARACTERISTIC_UUID};
use crate::errors::ParseError;

/// The cube has exactly one button, id 1.
const BUTTON_ID: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonPress {
    pub id: u8,
    pub pressed: bool,
}

pub struct ButtonSpec;

impl MessageSpec for ButtonSpec {
    const UUID: Uuid = BUTTON_CHARACTERISTIC_UUID;
    type Message = ButtonPress;

    fn decode(frame: &[u8]) -> Result<ButtonPress, ParseError> {
        require_len(frame, 2, "button")?;
        if frame[0] != BUTTON_ID {
            return Err(ParseError::UnknownType(frame[0]));
        }
        Ok(ButtonPress {
            id: frame[0],
            pressed: frame[1] != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_press_and_release() {
        assert_eq!(
            ButtonSpec::decode(&[0x01, 0x80]).unwrap(),
            ButtonPress {
                id: 1,
                pressed: true
            }
        );
        assert_eq!(
            ButtonSpec::decode(&[0x01, 0x00]).unwrap(),
            ButtonPress {
                id: 1,
                pressed: false
            }
        );
    }

    #[test]
    fn rejects_other_button_ids() {
        assert_eq!(
            ButtonSpec::decode(&[0x02, 0x80]),
            Err(ParseError::UnknownType(0x02))
        );
        assert!(ButtonSpec::decode(&[0x01]).is_err());
    }
}
