use serde::Serialize;
use uuid::Uuid;

use super::{MessageSpec, BATTERY_CHARACTERISTIC_UUID};
use crate::errors::ParseError;

/// Remaining charge in percent, reported in steps of 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryLevel {
    pub level: u8,
}

pub struct BatterySpec;

impl MessageSpec for BatterySpec {
    const UUID: Uuid = BATTERY_CHARACTERISTIC_UUID;
    type Message = BatteryLevel;

    fn decode(frame: &[u8]) -> Result<BatteryLevel, ParseError> {
        let level = *frame.first().ok_or(ParseError::Empty)?;
        Ok(BatteryLevel { level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_level() {
        assert_eq!(BatterySpec::decode(&[0x50]).unwrap(), BatteryLevel { level: 80 });
        assert_eq!(BatterySpec::decode(&[]), Err(ParseError::Empty));
    }
}
