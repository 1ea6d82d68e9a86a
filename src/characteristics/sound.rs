use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::errors::{CubeError, Result};
use crate::protocol::{SoundOperation, SoundScenario, SoundSpec};
use crate::timed::{Completion, TimedController};
use crate::transport::GattCharacteristic;

const WITH_RESPONSE: bool = true;

pub struct SoundCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    timed: TimedController,
}

impl SoundCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>) -> Self {
        Self {
            characteristic,
            timed: TimedController::new("sound"),
        }
    }

    /// Preset effects have no known length; nothing is tracked.
    pub async fn play_preset(&self, sound_id: u8) -> Result<u8> {
        let encoded = SoundSpec::encode_preset(sound_id);
        debug!("sound: preset {}", encoded.echo);
        self.timed
            .issue(Duration::ZERO, self.characteristic.write(encoded.frame, WITH_RESPONSE))
            .await?;
        Ok(encoded.echo)
    }

    pub async fn play(
        &self,
        operations: &[SoundOperation],
        repeat_count: u8,
    ) -> Result<(SoundScenario, Completion)> {
        if operations.is_empty() {
            return Err(CubeError::InvalidArgument("empty melody".into()));
        }
        let encoded = SoundSpec::encode_play(operations, repeat_count);
        debug!(
            "sound: melody of {} notes x{}",
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

    pub async fn stop(&self) -> Result<()> {
        self.timed
            .issue(
                Duration::ZERO,
                self.characteristic.write(SoundSpec::encode_stop(), WITH_RESPONSE),
            )
            .await?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.timed.supersede();
    }
}
