use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::oneshot;

use super::NotificationHandler;
use crate::errors::{CubeError, Result};
use crate::events::{CubeEvent, EventListeners};
use crate::lock;
use crate::protocol::{
    AttitudeFormat, ConfigMessage, ConfigurationSpec, IdNotifyCondition, MagnetDetectionMode,
    MessageSpec, NotifyCondition,
};
use crate::transport::GattCharacteristic;
use crate::version::Capabilities;

const WITH_RESPONSE: bool = true;

pub struct ConfigurationCharacteristic {
    characteristic: Arc<dyn GattCharacteristic>,
    events: Arc<EventListeners>,
    version_waiter: Mutex<Option<oneshot::Sender<String>>>,
}

impl ConfigurationCharacteristic {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, events: Arc<EventListeners>) -> Self {
        Self {
            characteristic,
            events,
            version_waiter: Mutex::new(None),
        }
    }

    /// Ask the cube for its BLE protocol version. Needs notifications to
    /// be running on this characteristic.
    pub async fn request_protocol_version(&self, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.version_waiter) = Some(tx);

        self.characteristic
            .write(ConfigurationSpec::encode_request_version(), WITH_RESPONSE)
            .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(version)) => Ok(version),
            Ok(Err(_)) => Err(CubeError::Disconnected),
            Err(_) => {
                lock(&self.version_waiter).take();
                Err(CubeError::Timeout(format!(
                    "no protocol version within {timeout:?}"
                )))
            }
        }
    }

    pub async fn set_flat_threshold(&self, degrees: u8) -> Result<u8> {
        let encoded = ConfigurationSpec::encode_flat_threshold(degrees);
        self.write(encoded.frame).await?;
        Ok(encoded.echo)
    }

    pub async fn set_collision_threshold(&self, level: u8) -> Result<u8> {
        let encoded = ConfigurationSpec::encode_collision_threshold(level);
        self.write(encoded.frame).await?;
        Ok(encoded.echo)
    }

    pub async fn set_double_tap_interval(&self, level: u8) -> Result<u8> {
        let encoded = ConfigurationSpec::encode_double_tap_interval(level);
        self.write(encoded.frame).await?;
        Ok(encoded.echo)
    }

    pub async fn set_id_notification(
        &self,
        capabilities: &Capabilities,
        interval_ms: u32,
        condition: IdNotifyCondition,
    ) -> Result<()> {
        if !gate(capabilities.id_notification_settings, "id notification settings") {
            return Ok(());
        }
        let encoded = ConfigurationSpec::encode_id_notification(interval_ms, condition);
        self.write(encoded.frame).await
    }

    pub async fn set_id_missed_notification(
        &self,
        capabilities: &Capabilities,
        sensitivity_ms: u32,
    ) -> Result<()> {
        if !gate(capabilities.id_notification_settings, "id missed notification settings") {
            return Ok(());
        }
        let encoded = ConfigurationSpec::encode_id_missed_notification(sensitivity_ms);
        self.write(encoded.frame).await
    }

    pub async fn set_magnet_detection(
        &self,
        capabilities: &Capabilities,
        mode: MagnetDetectionMode,
        interval_ms: u32,
        condition: NotifyCondition,
    ) -> Result<()> {
        if !gate(capabilities.magnet_detection, "magnet detection") {
            return Ok(());
        }
        let encoded = ConfigurationSpec::encode_magnet_detection(
            mode,
            interval_ms,
            condition,
            capabilities.magnetic_force,
        );
        self.write(encoded.frame).await
    }

    pub async fn set_motor_speed_feedback(&self, capabilities: &Capabilities, enabled: bool) -> Result<()> {
        if !gate(capabilities.motor_speed_feedback, "motor speed feedback") {
            return Ok(());
        }
        self.write(ConfigurationSpec::encode_motor_speed_feedback(enabled))
            .await
    }

    pub async fn set_attitude_notification(
        &self,
        capabilities: &Capabilities,
        format: AttitudeFormat,
        interval_ms: u32,
        condition: NotifyCondition,
    ) -> Result<()> {
        if !gate(capabilities.attitude, "attitude notification") {
            return Ok(());
        }
        let encoded = ConfigurationSpec::encode_attitude_notification(format, interval_ms, condition);
        self.write(encoded.frame).await
    }

    async fn write(&self, frame: Vec<u8>) -> Result<()> {
        debug!("configuration: -> {frame:02x?}");
        self.characteristic.write(frame, WITH_RESPONSE).await
    }

    /// Wake a pending version request with `Disconnected`.
    pub fn cancel(&self) {
        lock(&self.version_waiter).take();
    }
}

fn gate(supported: bool, what: &str) -> bool {
    if !supported {
        debug!("{what} not supported by this firmware, skipping");
    }
    supported
}

impl NotificationHandler for ConfigurationCharacteristic {
    fn handle(&self, frame: &[u8]) {
        match ConfigurationSpec::decode(frame) {
            Ok(ConfigMessage::Version(version)) => match lock(&self.version_waiter).take() {
                Some(waiter) => {
                    let _ = waiter.send(version);
                }
                None => trace!("configuration: unsolicited version {version}"),
            },
            Ok(ConfigMessage::Response(response)) => {
                if !response.success {
                    warn!(
                        "configuration: command {:#04x} was refused",
                        response.command
                    );
                }
                self.events.emit(CubeEvent::ConfigurationResponse(response));
            }
            Err(e) => trace!("configuration: dropping frame: {e}"),
        }
    }
}
