use std::sync::Arc;

use log::trace;

use super::NotificationHandler;
use crate::errors::Result;
use crate::events::{CubeEvent, EventListeners};
use crate::protocol::{IdMessage, IdSpec, MessageSpec};
use crate::transport::GattCharacteristic;

pub struct IdCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
}

impl IdCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
        }
    }

    pub async fn read(&self) -> Result<IdMessage> {
        let frame = self.characteristic.read().await?;
        Ok(IdSpec::decode(&frame)?)
    }
}

impl NotificationHandler for IdCharacteristic {
    fn handle(&self, frame: &[u8]) {
        let event = match IdSpec::decode(frame) {
            Ok(IdMessage::PositionId(position)) => CubeEvent::PositionId(position),
            Ok(IdMessage::StandardId(info)) => CubeEvent::StandardId(info),
            Ok(IdMessage::PositionIdMissed) => CubeEvent::PositionIdMissed,
            Ok(IdMessage::StandardIdMissed) => CubeEvent::StandardIdMissed,
            Err(e) => {
                trace!("id: dropping frame: {e}");
                return;
            }
        };
        self.events.emit(event);
    }
}
