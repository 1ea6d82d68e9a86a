//! Rust driver for toio Core Cube robots, with optional Python bindings.
//!
//! The cube is reached over a BLE GATT link and exposes one characteristic
//! per function (id reader, motors, light, sound, sensors, button, battery,
//! configuration). This crate turns high-level intents into the exact
//! frames each characteristic expects and turns notifications back into
//! typed [`CubeEvent`]s.
//!
//! # Completion model
//!
//! Most commands are fire-and-forget on the wire. Timed moves, light
//! patterns and melodies return a [`Completion`] driven by a local timer;
//! a newer command on the same characteristic resolves the previous one
//! early. Only [`Cube::move_to`] is acknowledged by the cube, through an
//! operation tag echoed in a motor notification.
//!
//! # Transports
//!
//! [`transport::GattCharacteristic`] and [`transport::Peripheral`] are the
//! only link-level seams. The `bluez` feature provides a BlueZ backend;
//! [`transport::memory`] provides an in-process one for tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "bluez")]
pub mod bluetooth;
pub mod characteristics;
mod cube;
mod errors;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod protocol;
#[cfg(feature = "python")]
mod python;
pub mod tag;
pub mod timed;
pub mod transport;
pub mod version;

#[cfg(feature = "bluez")]
pub use bluetooth::{BluerPeripheral, CubeConnector};
pub use cube::{Cube, CubeConfig};
pub use errors::*;
pub use events::{CubeEvent, EventListeners, ListenerId};
pub use protocol::id::standard_id;
pub use protocol::{
    AttitudeEuler, AttitudeFormat, AttitudeHighPrecisionEuler, AttitudeQuaternion, BatteryLevel,
    ButtonPress, IdMessage, IdNotifyCondition, LightOperation, MagnetDetectionMode, MagnetStatus,
    MagneticForce, MotionStatus, MotorSpeed, MoveToOptions, MoveToTarget, MoveType, Note,
    NotifyCondition, Orientation, PositionId, RotateType, SoundOperation, SpeedType,
    StandardIdInfo,
};
pub use timed::Completion;
pub use version::{Capabilities, ProtocolVersion};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
