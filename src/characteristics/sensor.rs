//! Motion, magnet and attitude notifications.
//!
//! Slope, orientation, shake, magnet and attitude changes are reported on
//! the edge: only when the value differs from the previous frame of the
//! same family (the first frame always counts as a change). Collision and
//! double tap are reported on every frame that carries them.

use std::sync::{Arc, Mutex};

use log::trace;

use super::NotificationHandler;
use crate::errors::{CubeError, ParseError, Result};
use crate::events::{CubeEvent, EventListeners};
use crate::lock;
use crate::protocol::{
    AttitudeEuler, AttitudeFormat, AttitudeHighPrecisionEuler, AttitudeQuaternion, MagnetStatus,
    MessageSpec, MotionStatus, Orientation, SensorMessage, SensorSpec,
};
use crate::transport::GattCharacteristic;

const WITH_RESPONSE: bool = true;

#[derive(Debug, Default)]
struct SensorCache {
    motion: Option<MotionStatus>,
    magnet: Option<MagnetStatus>,
    euler: Option<AttitudeEuler>,
    quaternion: Option<AttitudeQuaternion>,
    high_precision: Option<AttitudeHighPrecisionEuler>,
}

// Float families compare bitwise so a NaN equals its cached copy.
fn quaternion_bits(q: &AttitudeQuaternion) -> [u32; 4] {
    [q.w.to_bits(), q.x.to_bits(), q.y.to_bits(), q.z.to_bits()]
}

fn euler_bits(e: &AttitudeHighPrecisionEuler) -> [u32; 3] {
    [e.roll.to_bits(), e.pitch.to_bits(), e.yaw.to_bits()]
}

impl SensorCache {
    /// Store `message` and return the events it triggers.
    fn update(&mut self, message: SensorMessage) -> Vec<CubeEvent> {
        let mut events = Vec::new();
        match message {
            SensorMessage::Motion(motion) => {
                let prev = self.motion.replace(motion);
                if prev.map(|p| p.is_sloped) != Some(motion.is_sloped) {
                    events.push(CubeEvent::Slope {
                        is_sloped: motion.is_sloped,
                    });
                }
                if motion.is_collision_detected {
                    events.push(CubeEvent::Collision);
                }
                if motion.is_double_tapped {
                    events.push(CubeEvent::DoubleTap);
                }
                if prev.map(|p| p.orientation) != Some(motion.orientation) {
                    events.push(CubeEvent::Orientation {
                        orientation: motion.orientation,
                    });
                }
                if prev.map(|p| p.shake_level) != Some(motion.shake_level) {
                    events.push(CubeEvent::Shake {
                        level: motion.shake_level,
                    });
                }
            }
            SensorMessage::Magnet(magnet) => {
                let prev = self.magnet.replace(magnet);
                if prev.map(|p| p.id) != Some(magnet.id) {
                    events.push(CubeEvent::MagnetId { id: magnet.id });
                }
                if let Some(force) = magnet.force {
                    if prev.and_then(|p| p.force) != Some(force) {
                        events.push(CubeEvent::MagneticForce(force));
                    }
                }
            }
            SensorMessage::AttitudeEuler(euler) => {
                if self.euler.replace(euler) != Some(euler) {
                    events.push(CubeEvent::AttitudeEuler(euler));
                }
            }
            SensorMessage::AttitudeQuaternion(quaternion) => {
                let prev = self.quaternion.replace(quaternion);
                if prev.map(|p| quaternion_bits(&p)) != Some(quaternion_bits(&quaternion)) {
                    events.push(CubeEvent::AttitudeQuaternion(quaternion));
                }
            }
            SensorMessage::AttitudeHighPrecisionEuler(attitude) => {
                let prev = self.high_precision.replace(attitude);
                if prev.map(|p| euler_bits(&p)) != Some(euler_bits(&attitude)) {
                    events.push(CubeEvent::AttitudeHighPrecisionEuler(attitude));
                }
            }
        }
        events
    }
}

pub struct SensorCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
    cache: Mutex<SensorCache>,
}

impl SensorCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
            cache: Mutex::new(SensorCache::default()),
        }
    }

    /// Last motion frame, or an upright idle cube if none arrived yet.
    pub fn motion(&self) -> MotionStatus {
        lock(&self.cache).motion.unwrap_or_default()
    }

    pub fn is_sloped(&self) -> bool {
        self.motion().is_sloped
    }

    pub fn is_collision_detected(&self) -> bool {
        self.motion().is_collision_detected
    }

    pub fn is_double_tapped(&self) -> bool {
        self.motion().is_double_tapped
    }

    pub fn orientation(&self) -> Orientation {
        self.motion().orientation
    }

    pub fn shake_level(&self) -> u8 {
        self.motion().shake_level
    }

    pub fn magnet(&self) -> MagnetStatus {
        lock(&self.cache).magnet.unwrap_or_default()
    }

    pub fn attitude_euler(&self) -> AttitudeEuler {
        lock(&self.cache).euler.unwrap_or_default()
    }

    pub fn attitude_quaternion(&self) -> AttitudeQuaternion {
        lock(&self.cache).quaternion.unwrap_or_default()
    }

    pub fn attitude_high_precision_euler(&self) -> AttitudeHighPrecisionEuler {
        lock(&self.cache).high_precision.unwrap_or_default()
    }

    /// Read the motion status directly, bypassing the cache.
    pub async fn read_motion(&self) -> Result<MotionStatus> {
        let frame = self.characteristic.read().await?;
        match SensorSpec::decode(&frame)? {
            SensorMessage::Motion(motion) => Ok(motion),
            other => Err(CubeError::Parse(ParseError::InvalidPayload(format!(
                "expected motion frame, got {other:?}"
            )))),
        }
    }

    pub async fn request_motion(&self) -> Result<()> {
        self.characteristic
            .write(SensorSpec::encode_motion_request(), WITH_RESPONSE)
            .await
    }

    pub async fn request_magnet(&self) -> Result<()> {
        self.characteristic
            .write(SensorSpec::encode_magnet_request(), WITH_RESPONSE)
            .await
    }

    pub async fn request_attitude(&self, format: AttitudeFormat) -> Result<()> {
        self.characteristic
            .write(SensorSpec::encode_attitude_request(format), WITH_RESPONSE)
            .await
    }
}

impl NotificationHandler for SensorCharacteristic {
    fn handle(&self, frame: &[u8]) {
        let message = match SensorSpec::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                trace!("sensor: dropping frame: {e}");
                return;
            }
        };
        let events = lock(&self.cache).update(message);
        for event in events {
            self.events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MagneticForce;

    fn motion(sloped: bool, collision: bool, orientation: Orientation) -> SensorMessage {
        SensorMessage::Motion(MotionStatus {
            is_sloped: sloped,
            is_collision_detected: collision,
            is_double_tapped: false,
            orientation,
            shake_level: 0,
        })
    }

    #[test]
    fn first_motion_frame_reports_everything_edge_triggered() {
        let mut cache = SensorCache::default();
        let events = cache.update(motion(false, false, Orientation::TopUp));
        assert_eq!(
            events,
            vec![
                CubeEvent::Slope { is_sloped: false },
                CubeEvent::Orientation {
                    orientation: Orientation::TopUp
                },
                CubeEvent::Shake { level: 0 },
            ]
        );
    }

    #[test]
    fn slope_is_edge_triggered_collision_is_level_triggered() {
        let mut cache = SensorCache::default();
        cache.update(motion(false, false, Orientation::TopUp));

        let events = cache.update(motion(false, true, Orientation::TopUp));
        assert_eq!(events, vec![CubeEvent::Collision]);

        let events = cache.update(motion(false, true, Orientation::TopUp));
        assert_eq!(events, vec![CubeEvent::Collision]);

        let events = cache.update(motion(true, false, Orientation::TopUp));
        assert_eq!(events, vec![CubeEvent::Slope { is_sloped: true }]);

        let events = cache.update(motion(true, false, Orientation::TopUp));
        assert!(events.is_empty());
    }

    #[test]
    fn magnet_force_only_reported_when_present_and_changed() {
        let mut cache = SensorCache::default();
        let force = MagneticForce {
            strength: 10,
            x: 1,
            y: 0,
            z: -1,
        };
        let events = cache.update(SensorMessage::Magnet(MagnetStatus { id: 0, force: None }));
        assert_eq!(events, vec![CubeEvent::MagnetId { id: 0 }]);

        let with_force = SensorMessage::Magnet(MagnetStatus {
            id: 0,
            force: Some(force),
        });
        assert_eq!(
            cache.update(with_force),
            vec![CubeEvent::MagneticForce(force)]
        );
        assert!(cache.update(with_force).is_empty());
    }

    #[test]
    fn attitude_families_are_tracked_separately() {
        let mut cache = SensorCache::default();
        let euler = AttitudeEuler {
            roll: 1,
            pitch: 2,
            yaw: 3,
        };
        assert_eq!(
            cache.update(SensorMessage::AttitudeEuler(euler)),
            vec![CubeEvent::AttitudeEuler(euler)]
        );
        assert!(cache.update(SensorMessage::AttitudeEuler(euler)).is_empty());

        let quaternion = AttitudeQuaternion::default();
        assert_eq!(
            cache.update(SensorMessage::AttitudeQuaternion(quaternion)),
            vec![CubeEvent::AttitudeQuaternion(quaternion)]
        );
    }

    #[test]
    fn nan_attitude_is_reported_once() {
        let mut cache = SensorCache::default();
        let attitude = AttitudeHighPrecisionEuler {
            roll: f32::NAN,
            pitch: 0.0,
            yaw: 90.0,
        };
        let frame = SensorMessage::AttitudeHighPrecisionEuler(attitude);
        assert_eq!(cache.update(frame).len(), 1);
        assert!(cache.update(frame).is_empty());

        let quaternion = AttitudeQuaternion {
            w: f32::NAN,
            ..AttitudeQuaternion::default()
        };
        let frame = SensorMessage::AttitudeQuaternion(quaternion);
        assert_eq!(cache.update(frame).len(), 1);
        assert!(cache.update(frame).is_empty());
    }
}
