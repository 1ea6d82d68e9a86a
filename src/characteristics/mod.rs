//! One component per GATT characteristic.
//!
//! Components own the write side of their characteristic and, for those
//! that notify, a [`NotificationHandler`] fed by a pump task in frame order.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, trace};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::Result;
use crate::protocol::characteristic_name;
use crate::transport::GattCharacteristic;

pub mod battery;
pub mod button;
pub mod configuration;
pub mod id;
pub mod light;
pub mod motor;
pub mod sensor;
pub mod sound;

pub use battery::BatteryCharacteristic;
pub use button::ButtonCharacteristic;
pub use configuration::ConfigurationCharacteristic;
pub use id::IdCharacteristic;
pub use light::LightCharacteristic;
pub use motor::MotorCharacteristic;
pub use sensor::SensorCharacteristic;
pub use sound::SoundCharacteristic;

pub trait NotificationHandler: Send + Sync + 'static {
    fn handle(&self, frame: &[u8]);
}

/// Subscribe to `characteristic` and feed every frame to `handler` on a
/// spawned task. The task ends when the stream does or when aborted.
pub(crate) async fn start_pump(
    characteristic: &Arc<dyn GattCharacteristic>,
    handler: Arc<dyn NotificationHandler>,
) -> Result<JoinHandle<()>> {
    let name = display_name(&characteristic.uuid());
    let mut frames = characteristic.subscribe().await?;
    debug!("{name}: notifications enabled");
    Ok(tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            trace!("{name}: <- {frame:02x?}");
            handler.handle(&frame);
        }
        debug!("{name}: notification stream closed");
    }))
}

pub(crate) fn display_name(uuid: &Uuid) -> &'static str {
    characteristic_name(uuid).unwrap_or("unknown")
}
