//! BLE protocol version reported by the cube and the features it unlocks.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::errors::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPayload(format!("protocol version {s:?}"));
        let mut parts = s.trim().trim_end_matches('\0').split('.');
        let mut next = || -> Result<u16, ParseError> {
            parts
                .next()
                .ok_or_else(invalid)?
                .parse::<u16>()
                .map_err(|_| invalid())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

const V2_1_0: ProtocolVersion = ProtocolVersion::new(2, 1, 0);
const V2_2_0: ProtocolVersion = ProtocolVersion::new(2, 2, 0);
const V2_3_0: ProtocolVersion = ProtocolVersion::new(2, 3, 0);

/// Feature set derived once from the negotiated version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub move_to: bool,
    pub motor_speed_feedback: bool,
    pub id_notification_settings: bool,
    pub magnet_detection: bool,
    pub attitude: bool,
    /// Magnet detection frames carry interval/condition and report force.
    pub magnetic_force: bool,
}

impl Capabilities {
    /// Everything enabled; used when the version is unknown.
    pub const ALL: Capabilities = Capabilities {
        move_to: true,
        motor_speed_feedback: true,
        id_notification_settings: true,
        magnet_detection: true,
        attitude: true,
        magnetic_force: true,
    };

    pub fn for_version(version: Option<ProtocolVersion>) -> Self {
        let Some(v) = version else {
            return Self::ALL;
        };
        Self {
            move_to: v >= V2_1_0,
            motor_speed_feedback: v >= V2_1_0,
            id_notification_settings: v >= V2_1_0,
            magnet_detection: v >= V2_2_0,
            attitude: v >= V2_2_0,
            magnetic_force: v >= V2_3_0,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_orders_versions() {
        let v: ProtocolVersion = "2.1.0".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(2, 1, 0));
        assert!(v < "2.10.0".parse().unwrap());
        assert!("2.0.0".parse::<ProtocolVersion>().unwrap() < v);
        assert_eq!(v.to_string(), "2.1.0");
        assert!("2.1".parse::<ProtocolVersion>().is_err());
        assert!("2.1.0.4".parse::<ProtocolVersion>().is_err());
        assert!("two".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn gates_features_by_version() {
        let old = Capabilities::for_version(Some(ProtocolVersion::new(2, 0, 0)));
        assert!(!old.move_to);
        assert!(!old.attitude);

        let mid = Capabilities::for_version(Some(ProtocolVersion::new(2, 2, 0)));
        assert!(mid.move_to && mid.magnet_detection && mid.attitude);
        assert!(!mid.magnetic_force);

        let new = Capabilities::for_version(Some(ProtocolVersion::new(2, 3, 0)));
        assert_eq!(new, Capabilities::ALL);
    }

    #[test]
    fn unknown_version_allows_everything() {
        assert_eq!(Capabilities::for_version(None), Capabilities::ALL);
    }
}
