use std::sync::Arc;

use log::trace;

use super::NotificationHandler;
use crate::errors::Result;
use crate::events::{CubeEvent, EventListeners};
use crate::protocol::{BatteryLevel, BatterySpec, MessageSpec};
use crate::transport::GattCharacteristic;

pub struct BatteryCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
}

impl BatteryCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
        }
    }

    pub async fn read(&self) -> Result<BatteryLevel> {
        let frame = self.characteristic.read().await?;
        Ok(BatterySpec::decode(&frame)?)
    }
}

impl NotificationHandler for BatteryCharacteristic {
    fn handle(&self, frame: &[u8]) {
        match BatterySpec::decode(frame) {
            Ok(battery) => self.events.emit(CubeEvent::BatteryLevel {
                level: battery.level,
            }),
            Err(e) => trace!("battery: dropping frame: {e}"),
        }
    }
}
