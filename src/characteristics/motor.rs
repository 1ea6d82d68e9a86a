use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};

use super::NotificationHandler;
use crate::errors::Result;
use crate::events::{CubeEvent, EventListeners};
use crate::pipeline::MoveToPipeline;
use crate::protocol::{MessageSpec, MotorMessage, MotorSpec, MoveParams, MoveToOptions, MoveToTarget};
use crate::timed::{Completion, TimedController};
use crate::transport::GattCharacteristic;
use crate::version::Capabilities;

/// Motor frames go out without a link-layer response.
const WITH_RESPONSE: bool = false;

pub struct MotorCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
    timed: TimedController,
    pipeline: Arc<MoveToPipeline>,
}

impl MotorCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
            timed: TimedController::new("motor"),
            pipeline: Arc::new(MoveToPipeline::new()),
        }
    }

    /// Timed differential drive; see [`MotorSpec::encode_move`].
    pub async fn move_motors(&self, left: i32, right: i32, duration_ms: u32) -> Result<(MoveParams, Completion)> {
        let encoded = MotorSpec::encode_move(left, right, duration_ms);
        debug!("motor: move {:?}", encoded.echo);
        let duration = Duration::from_millis(u64::from(encoded.echo.duration_ms));
        let completion = self
            .timed
            .issue(duration, self.characteristic.write(encoded.frame, WITH_RESPONSE))
            .await?;
        Ok((encoded.echo, completion))
    }

    pub async fn stop(&self) -> Result<()> {
        let encoded = MotorSpec::encode_stop();
        self.timed
            .issue(Duration::ZERO, self.characteristic.write(encoded.frame, WITH_RESPONSE))
            .await?;
        Ok(())
    }

    /// A move-to takes the motors over, so any timed move still pending
    /// counts as finished.
    pub async fn move_to(
        &self,
        capabilities: &Capabilities,
        targets: &[MoveToTarget],
        options: &MoveToOptions,
    ) -> Result<()> {
        if capabilities.move_to {
            self.timed.supersede();
        }
        self.pipeline
            .run(Arc::clone(&self.characteristic), capabilities, targets, options)
            .await
    }

    pub fn pipeline(&self) -> &MoveToPipeline {
        &self.pipeline
    }

    /// Fail correlated operations still waiting for the cube and resolve
    /// any pending timed move.
    pub fn cancel(&self) {
        self.pipeline.cancel_all();
        self.timed.supersede();
    }
}

impl NotificationHandler for MotorCharacteristic {
    fn handle(&self, frame: &[u8]) {
        match MotorSpec::decode(frame) {
            Ok(MotorMessage::MoveToResponse(response)) => {
                debug!("motor: move-to tag={} reason={}", response.tag, response.reason);
                self.pipeline.on_response(response);
            }
            Ok(MotorMessage::Speed(speed)) => self.events.emit(CubeEvent::MotorSpeed(speed)),
            Err(e) => trace!("motor: dropping frame: {e}"),
        }
    }
}
