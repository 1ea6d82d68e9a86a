//! Wire formats of the cube's GATT characteristics.
//!
//! Each submodule owns one characteristic's message family. Encoders never
//! fail: every numeric parameter is clamped to the range the firmware
//! accepts, and the clamped values are returned next to the frame so the
//! caller can see what was actually sent. Decoders either produce a whole
//! message or a [`ParseError`]; they never return partial data.

use uuid::Uuid;

use crate::errors::ParseError;

pub mod battery;
pub mod button;
pub mod configuration;
pub mod id;
pub mod light;
pub mod motor;
pub mod sensor;
pub mod sound;

pub use battery::{BatteryLevel, BatterySpec};
pub use button::{ButtonPress, ButtonSpec};
pub use configuration::{
    ConfigMessage, ConfigResponse, ConfigurationSpec, IdNotifyCondition, MagnetDetectionMode,
    NotifyCondition,
};
pub use id::{IdMessage, IdSpec, PositionId, StandardIdInfo};
pub use light::{LightOperation, LightScenario, LightSpec};
pub use motor::{
    MotorMessage, MotorSpec, MotorSpeed, MoveParams, MoveToOptions, MoveToResponse, MoveToTarget,
    MoveType, RotateType, SpeedType,
};
pub use sensor::{
    AttitudeEuler, AttitudeFormat, AttitudeHighPrecisionEuler, AttitudeQuaternion, MagnetStatus,
    MagneticForce, MotionStatus, Orientation, SensorMessage, SensorSpec,
};
pub use sound::{Note, SoundOperation, SoundScenario, SoundSpec};

/// Primary service advertised by every cube.
pub const CUBE_SERVICE_UUID: Uuid = Uuid::from_u128(0x10b20100_5b3b_4571_9508_cf3efcd7bbae);
pub const ID_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x10b20101_5b3b_4571_9508_cf3efcd7bbae);
pub const MOTOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20102_5b3b_4571_9508_cf3efcd7bbae);
pub const LIGHT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20103_5b3b_4571_9508_cf3efcd7bbae);
pub const SOUND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20104_5b3b_4571_9508_cf3efcd7bbae);
pub const SENSOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20106_5b3b_4571_9508_cf3efcd7bbae);
pub const BUTTON_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20107_5b3b_4571_9508_cf3efcd7bbae);
pub const BATTERY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b20108_5b3b_4571_9508_cf3efcd7bbae);
pub const CONFIGURATION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x10b201ff_5b3b_4571_9508_cf3efcd7bbae);

/// A frame ready to be written, plus the parameters it actually carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded<T> {
    pub frame: Vec<u8>,
    pub echo: T,
}

impl<T> Encoded<T> {
    pub(crate) fn new(frame: Vec<u8>, echo: T) -> Self {
        Self { frame, echo }
    }
}

/// Decoder for one characteristic's notification/read frames.
pub trait MessageSpec {
    const UUID: Uuid;
    type Message;

    fn decode(frame: &[u8]) -> Result<Self::Message, ParseError>;
}

/// Any frame the cube can send, tagged by family.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Id(IdMessage),
    Motor(MotorMessage),
    Sensor(SensorMessage),
    Button(ButtonPress),
    Battery(BatteryLevel),
    Configuration(ConfigMessage),
}

/// Decode a frame by the UUID of the characteristic it arrived on.
pub fn decode(characteristic: &Uuid, frame: &[u8]) -> Result<ParsedMessage, ParseError> {
    match *characteristic {
        ID_CHARACTERISTIC_UUID => IdSpec::decode(frame).map(ParsedMessage::Id),
        MOTOR_CHARACTERISTIC_UUID => MotorSpec::decode(frame).map(ParsedMessage::Motor),
        SENSOR_CHARACTERISTIC_UUID => SensorSpec::decode(frame).map(ParsedMessage::Sensor),
        BUTTON_CHARACTERISTIC_UUID => ButtonSpec::decode(frame).map(ParsedMessage::Button),
        BATTERY_CHARACTERISTIC_UUID => BatterySpec::decode(frame).map(ParsedMessage::Battery),
        CONFIGURATION_CHARACTERISTIC_UUID => {
            ConfigurationSpec::decode(frame).map(ParsedMessage::Configuration)
        }
        _ => Err(ParseError::InvalidPayload(format!(
            "no message family for characteristic {characteristic}"
        ))),
    }
}

/// Human readable name of a known characteristic.
pub fn characteristic_name(uuid: &Uuid) -> Option<&'static str> {
    match *uuid {
        ID_CHARACTERISTIC_UUID => Some("id"),
        MOTOR_CHARACTERISTIC_UUID => Some("motor"),
        LIGHT_CHARACTERISTIC_UUID => Some("light"),
        SOUND_CHARACTERISTIC_UUID => Some("sound"),
        SENSOR_CHARACTERISTIC_UUID => Some("sensor"),
        BUTTON_CHARACTERISTIC_UUID => Some("button"),
        BATTERY_CHARACTERISTIC_UUID => Some("battery"),
        CONFIGURATION_CHARACTERISTIC_UUID => Some("configuration"),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Shared helpers
// ----------------------------------------------------------------------------

/// Convert milliseconds to the 10 ms wire unit, rounded and clamped.
pub(crate) fn duration_units(duration_ms: u32, min: u8) -> u8 {
    let units = (u64::from(duration_ms) + 5) / 10;
    units.clamp(u64::from(min), 255) as u8
}

pub(crate) fn require_len(
    frame: &[u8],
    expected: usize,
    kind: &'static str,
) -> Result<(), ParseError> {
    if frame.len() < expected {
        return Err(ParseError::TooShort {
            kind,
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u16(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

pub(crate) fn read_i16(frame: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([frame[offset], frame[offset + 1]])
}

pub(crate) fn read_u32(frame: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

pub(crate) fn read_f32(frame: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(frame, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units_round_and_clamp() {
        assert_eq!(duration_units(0, 0), 0);
        assert_eq!(duration_units(0, 1), 1);
        assert_eq!(duration_units(104, 0), 10);
        assert_eq!(duration_units(105, 0), 11);
        assert_eq!(duration_units(2550, 0), 255);
        assert_eq!(duration_units(u32::MAX, 0), 255);
    }

    #[test]
    fn decode_dispatches_by_characteristic() {
        let msg = decode(&BATTERY_CHARACTERISTIC_UUID, &[0x50]).unwrap();
        assert_eq!(msg, ParsedMessage::Battery(BatteryLevel { level: 80 }));

        let msg = decode(&ID_CHARACTERISTIC_UUID, &[0x03]).unwrap();
        assert_eq!(msg, ParsedMessage::Id(IdMessage::PositionIdMissed));

        assert!(decode(&LIGHT_CHARACTERISTIC_UUID, &[0x01]).is_err());
    }

    #[test]
    fn characteristic_names() {
        assert_eq!(characteristic_name(&MOTOR_CHARACTERISTIC_UUID), Some("motor"));
        assert_eq!(characteristic_name(&CUBE_SERVICE_UUID), None);
    }
}
