use std::sync::Arc;

use log::trace;

use super::NotificationHandler;
use crate::errors::Result;
use crate::events::{CubeEvent, EventListeners};
use crate::protocol::{ButtonPress, ButtonSpec, MessageSpec};
use crate::transport::GattCharacteristic;

pub struct ButtonCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
}

impl ButtonCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
        }
    }

    pub async fn read(&self) -> Result<ButtonPress> {
        let frame = self.characteristic.read().await?;
        Ok(ButtonSpec::decode(&frame)?)
    }
}

impl NotificationHandler for ButtonCharacteristic {
    fn handle(&self, frame: &[u8]) {
        match ButtonSpec::decode(frame) {
            Ok(press) => self.events.emit(CubeEvent::ButtonPress {
                pressed: press.pressed,
            }),
            Err(e) => trace!("button: dropping frame: {e}"),
        }
    }
}
