use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::errors::{CubeError, Result};
use crate::protocol::{LightOperation, LightScenario, LightSpec};
use crate::timed::{Completion, TimedController};
use crate::transport::GattCharacteristic;

const WITH_RESPONSE: bool = true;

pub struct LightCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    timed: TimedController,
}

impl LightCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>) -> Self {
        Self {
            characteristic,
            timed: TimedController::new("light"),
        }
    }

    /// The completion resolves when the light goes out again; a duration
    /// of 0 keeps it on and resolves immediately.
    pub async fn turn_on(&self, operation: &LightOperation) -> Result<(LightOperation, Completion)> {
        let encoded = LightSpec::encode_turn_on(operation);
        debug!("light: on {:?}", encoded.echo);
        let duration = Duration::from_millis(u64::from(encoded.echo.duration_ms));
        let completion = self
            .timed
            .issue(duration, self.characteristic.write(encoded.frame, WITH_RESPONSE))
            .await?;
        Ok((encoded.echo, completion))
    }

    /// `repeat_count` 0 repeats forever, in which case the completion
    /// resolves immediately.
    pub async fn turn_on_with_scenario(
        &self,
        operations: &[LightOperation],
        repeat_count: u8,
    ) -> Result<(LightScenario, Completion)> {
        if operations.is_empty() {
            return Err(CubeError::InvalidArgument("empty light scenario".into()));
        }
        let encoded = LightSpec::encode_scenario(operations, repeat_count);
        debug!(
            "light: scenario of {} rows x{}",
            encoded.echo.operations.len(),
            repeat_count
        );
        let duration = Duration::from_millis(u64::from(encoded.echo.total_duration_ms));
        let completion = self
            .timed
            .issue(duration, self.characteristic.write(encoded.frame, WITH_RESPONSE))
            .await?;
        Ok((encoded.echo, completion))
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.timed
            .issue(
                Duration::ZERO,
                self.characteristic.write(LightSpec::encode_turn_off(), WITH_RESPONSE),
            )
            .await?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.timed.supersede();
    }
}
