//! The device facade: one connected cube.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::characteristics::{
    self, BatteryCharacteristic, ButtonCharacteristic, ConfigurationCharacteristic,
    IdCharacteristic, LightCharacteristic, MotorCharacteristic, NotificationHandler,
    SensorCharacteristic, SoundCharacteristic,
};
use crate::errors::{CubeError, Result};
use crate::events::{CubeEvent, EventListeners, ListenerId};
use crate::lock;
use crate::protocol::{
    AttitudeEuler, AttitudeFormat, AttitudeHighPrecisionEuler, AttitudeQuaternion, BatteryLevel,
    ButtonPress, IdMessage, IdNotifyCondition, LightOperation, MagnetDetectionMode, MagnetStatus,
    MotionStatus, MoveToOptions, MoveToTarget, NotifyCondition, Orientation, SoundOperation,
    BATTERY_CHARACTERISTIC_UUID, BUTTON_CHARACTERISTIC_UUID, CONFIGURATION_CHARACTERISTIC_UUID,
    ID_CHARACTERISTIC_UUID, LIGHT_CHARACTERISTIC_UUID, MOTOR_CHARACTERISTIC_UUID,
    SENSOR_CHARACTERISTIC_UUID, SOUND_CHARACTERISTIC_UUID,
};
use crate::timed::Completion;
use crate::transport::{GattCharacteristic, Peripheral};
use crate::version::{Capabilities, ProtocolVersion};

const DEFAULT_VERSION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// How long to wait for the protocol version during `connect`.
    pub version_timeout: Duration,
    /// Subscribe to id, motor, sensor, button and battery notifications.
    /// The configuration characteristic is always subscribed.
    pub subscribe_notifications: bool,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            version_timeout: Duration::from_secs(DEFAULT_VERSION_TIMEOUT_SECS),
            subscribe_notifications: true,
        }
    }
}

/// A connected cube.
///
/// Commands that the cube never acknowledges (timed moves, light, sound)
/// return a [`Completion`] that resolves after the command's duration or
/// when a newer command on the same characteristic supersedes it.
/// Sensor getters answer from the last notification without any I/O.
pub struct Cube {
    peripheral: Arc<dyn Peripheral>,
    events: Arc<EventListeners>,
    id: Option<Arc<IdCharacteristic>>,
    motor: Option<Arc<MotorCharacteristic>>,
    light: Option<LightCharacteristic>,
    sound: Option<SoundCharacteristic>,
    sensor: Option<Arc<SensorCharacteristic>>,
    button: Option<Arc<ButtonCharacteristic>>,
    battery: Option<Arc<BatteryCharacteristic>>,
    configuration: Option<Arc<ConfigurationCharacteristic>>,
    protocol_version: Option<String>,
    capabilities: OnceCell<Capabilities>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

fn as_handler<T: NotificationHandler>(
    component: &Option<Arc<T>>,
) -> Option<Arc<dyn NotificationHandler>> {
    component
        .clone()
        .map(|c| c as Arc<dyn NotificationHandler>)
}

fn require<'a, T>(component: &'a Option<T>, name: &'static str) -> Result<&'a T> {
    component.as_ref().ok_or(CubeError::MissingCapability(name))
}

impl Cube {
    /// Connect, discover the cube's characteristics, start notifications
    /// and negotiate the protocol version.
    pub async fn connect(peripheral: Arc<dyn Peripheral>, config: CubeConfig) -> Result<Cube> {
        info!("connecting to cube {}", peripheral.address());
        peripheral.connect().await?;
        let discovered = peripheral.characteristics().await?;
        debug!("discovered {} characteristics", discovered.len());

        let find = |uuid: Uuid| -> Option<Arc<dyn GattCharacteristic>> {
            discovered.iter().find(|c| c.uuid() == uuid).cloned()
        };
        let events = Arc::new(EventListeners::new());

        let mut cube = Cube {
            id: find(ID_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(IdCharacteristic::new(c, Arc::clone(&events)))),
            motor: find(MOTOR_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(MotorCharacteristic::new(c, Arc::clone(&events)))),
            light: find(LIGHT_CHARACTERISTIC_UUID).map(LightCharacteristic::new),
            sound: find(SOUND_CHARACTERISTIC_UUID).map(SoundCharacteristic::new),
            sensor: find(SENSOR_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(SensorCharacteristic::new(c, Arc::clone(&events)))),
            button: find(BUTTON_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(ButtonCharacteristic::new(c, Arc::clone(&events)))),
            battery: find(BATTERY_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(BatteryCharacteristic::new(c, Arc::clone(&events)))),
            configuration: find(CONFIGURATION_CHARACTERISTIC_UUID)
                .map(|c| Arc::new(ConfigurationCharacteristic::new(c, Arc::clone(&events)))),
            peripheral,
            events,
            protocol_version: None,
            capabilities: OnceCell::new(),
            pumps: Mutex::new(Vec::new()),
        };

        let mut handlers: Vec<(Arc<dyn GattCharacteristic>, Arc<dyn NotificationHandler>)> =
            Vec::new();
        if let (Some(c), Some(h)) = (
            find(CONFIGURATION_CHARACTERISTIC_UUID),
            as_handler(&cube.configuration),
        ) {
            handlers.push((c, h));
        }
        if config.subscribe_notifications {
            let optional = [
                (ID_CHARACTERISTIC_UUID, as_handler(&cube.id)),
                (MOTOR_CHARACTERISTIC_UUID, as_handler(&cube.motor)),
                (SENSOR_CHARACTERISTIC_UUID, as_handler(&cube.sensor)),
                (BUTTON_CHARACTERISTIC_UUID, as_handler(&cube.button)),
                (BATTERY_CHARACTERISTIC_UUID, as_handler(&cube.battery)),
            ];
            for (uuid, handler) in optional {
                if let (Some(c), Some(h)) = (find(uuid), handler) {
                    handlers.push((c, h));
                }
            }
        }
        for (characteristic, handler) in handlers {
            if !characteristic.properties().notify {
                continue;
            }
            let pump = characteristics::start_pump(&characteristic, handler).await?;
            lock(&cube.pumps).push(pump);
        }

        let version = match &cube.configuration {
            Some(configuration) => Some(
                configuration
                    .request_protocol_version(config.version_timeout)
                    .await?,
            ),
            None => {
                warn!("no configuration characteristic, assuming every feature is available");
                None
            }
        };
        cube.init_capabilities(version);
        info!(
            "cube {} ready, protocol {}",
            cube.address(),
            cube.protocol_version.as_deref().unwrap_or("unknown")
        );
        Ok(cube)
    }

    fn init_capabilities(&mut self, version: Option<String>) {
        let parsed = version.as_deref().and_then(|v| match v.parse::<ProtocolVersion>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("unparsable protocol version {v:?} ({e}), enabling every feature");
                None
            }
        });
        self.protocol_version = version;
        let _ = self.capabilities.set(Capabilities::for_version(parsed));
    }

    pub fn id(&self) -> String {
        self.peripheral.id()
    }

    pub fn address(&self) -> String {
        self.peripheral.address()
    }

    /// Protocol version string reported by the cube, e.g. `"2.3.0"`.
    pub fn ble_protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn capabilities(&self) -> Capabilities {
        *self.capabilities.get_or_init(Capabilities::default)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn on<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&CubeEvent) + Send + Sync + 'static,
    {
        self.events.on(handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Every event from now on, as a channel. Dropping the receiver
    /// unsubscribes it.
    pub fn events(&self) -> mpsc::UnboundedReceiver<CubeEvent> {
        self.events.channel()
    }

    // ------------------------------------------------------------------
    // Motors
    // ------------------------------------------------------------------

    /// Drive both wheels. Speeds are clamped to -100..=100, `duration_ms`
    /// to 0..=2550 where 0 runs until the next motor command.
    pub async fn move_motors(&self, left: i32, right: i32, duration_ms: u32) -> Result<Completion> {
        let motor = require(&self.motor, "motor")?;
        let (_, completion) = motor.move_motors(left, right, duration_ms).await?;
        Ok(completion)
    }

    /// Drive through `targets` on the position mat. Resolves when the cube
    /// reports every target reached.
    pub async fn move_to(&self, targets: &[MoveToTarget], options: &MoveToOptions) -> Result<()> {
        let motor = require(&self.motor, "motor")?;
        motor.move_to(&self.capabilities(), targets, options).await
    }

    pub async fn stop(&self) -> Result<()> {
        require(&self.motor, "motor")?.stop().await
    }

    // ------------------------------------------------------------------
    // Light
    // ------------------------------------------------------------------

    pub async fn turn_on_light(&self, operation: &LightOperation) -> Result<Completion> {
        let light = require(&self.light, "light")?;
        Ok(light.turn_on(operation).await?.1)
    }

    pub async fn turn_on_light_with_scenario(
        &self,
        operations: &[LightOperation],
        repeat_count: u8,
    ) -> Result<Completion> {
        let light = require(&self.light, "light")?;
        Ok(light.turn_on_with_scenario(operations, repeat_count).await?.1)
    }

    pub async fn turn_off_light(&self) -> Result<()> {
        require(&self.light, "light")?.turn_off().await
    }

    // ------------------------------------------------------------------
    // Sound
    // ------------------------------------------------------------------

    pub async fn play_preset_sound(&self, sound_id: u8) -> Result<()> {
        require(&self.sound, "sound")?.play_preset(sound_id).await?;
        Ok(())
    }

    pub async fn play_sound(&self, operations: &[SoundOperation], repeat_count: u8) -> Result<Completion> {
        let sound = require(&self.sound, "sound")?;
        Ok(sound.play(operations, repeat_count).await?.1)
    }

    pub async fn stop_sound(&self) -> Result<()> {
        require(&self.sound, "sound")?.stop().await
    }

    // ------------------------------------------------------------------
    // Sensors
    // ------------------------------------------------------------------

    fn sensor(&self) -> Result<&SensorCharacteristic> {
        require(&self.sensor, "sensor").map(|s| &**s)
    }

    pub fn slope_status(&self) -> Result<bool> {
        Ok(self.sensor()?.is_sloped())
    }

    pub fn collision_status(&self) -> Result<bool> {
        Ok(self.sensor()?.is_collision_detected())
    }

    pub fn double_tap_status(&self) -> Result<bool> {
        Ok(self.sensor()?.is_double_tapped())
    }

    pub fn orientation(&self) -> Result<Orientation> {
        Ok(self.sensor()?.orientation())
    }

    pub fn shake_status(&self) -> Result<u8> {
        Ok(self.sensor()?.shake_level())
    }

    pub fn magnet_status(&self) -> Result<MagnetStatus> {
        Ok(self.sensor()?.magnet())
    }

    pub fn attitude_euler(&self) -> Result<AttitudeEuler> {
        Ok(self.sensor()?.attitude_euler())
    }

    pub fn attitude_quaternion(&self) -> Result<AttitudeQuaternion> {
        Ok(self.sensor()?.attitude_quaternion())
    }

    pub fn attitude_high_precision_euler(&self) -> Result<AttitudeHighPrecisionEuler> {
        Ok(self.sensor()?.attitude_high_precision_euler())
    }

    pub async fn read_motion_status(&self) -> Result<MotionStatus> {
        self.sensor()?.read_motion().await
    }

    pub async fn request_motion_status(&self) -> Result<()> {
        self.sensor()?.request_motion().await
    }

    pub async fn request_magnet_status(&self) -> Result<()> {
        self.sensor()?.request_magnet().await
    }

    pub async fn request_attitude(&self, format: AttitudeFormat) -> Result<()> {
        self.sensor()?.request_attitude(format).await
    }

    // ------------------------------------------------------------------
    // One-shot reads
    // ------------------------------------------------------------------

    pub async fn button_status(&self) -> Result<ButtonPress> {
        require(&self.button, "button")?.read().await
    }

    pub async fn battery_status(&self) -> Result<BatteryLevel> {
        require(&self.battery, "battery")?.read().await
    }

    pub async fn read_id(&self) -> Result<IdMessage> {
        require(&self.id, "id")?.read().await
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    fn configuration(&self) -> Result<&ConfigurationCharacteristic> {
        require(&self.configuration, "configuration").map(|c| &**c)
    }

    /// Tilt in degrees (1-45) past which the cube counts as sloped.
    pub async fn set_flat_threshold(&self, degrees: u8) -> Result<()> {
        self.configuration()?.set_flat_threshold(degrees).await?;
        Ok(())
    }

    /// Collision sensitivity, 1 (least) to 10 (most).
    pub async fn set_collision_threshold(&self, level: u8) -> Result<()> {
        self.configuration()?.set_collision_threshold(level).await?;
        Ok(())
    }

    pub async fn set_double_tap_interval(&self, level: u8) -> Result<()> {
        self.configuration()?.set_double_tap_interval(level).await?;
        Ok(())
    }

    pub async fn set_id_notification(&self, interval_ms: u32, condition: IdNotifyCondition) -> Result<()> {
        self.configuration()?
            .set_id_notification(&self.capabilities(), interval_ms, condition)
            .await
    }

    pub async fn set_id_missed_notification(&self, sensitivity_ms: u32) -> Result<()> {
        self.configuration()?
            .set_id_missed_notification(&self.capabilities(), sensitivity_ms)
            .await
    }

    pub async fn set_magnet_detection(
        &self,
        mode: MagnetDetectionMode,
        interval_ms: u32,
        condition: NotifyCondition,
    ) -> Result<()> {
        self.configuration()?
            .set_magnet_detection(&self.capabilities(), mode, interval_ms, condition)
            .await
    }

    pub async fn set_motor_speed_feedback(&self, enabled: bool) -> Result<()> {
        self.configuration()?
            .set_motor_speed_feedback(&self.capabilities(), enabled)
            .await
    }

    pub async fn set_attitude_notification(
        &self,
        format: AttitudeFormat,
        interval_ms: u32,
        condition: NotifyCondition,
    ) -> Result<()> {
        self.configuration()?
            .set_attitude_notification(&self.capabilities(), format, interval_ms, condition)
            .await
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn shutdown(&self) {
        for pump in lock(&self.pumps).drain(..) {
            pump.abort();
        }
        if let Some(motor) = &self.motor {
            motor.cancel();
        }
        if let Some(light) = &self.light {
            light.cancel();
        }
        if let Some(sound) = &self.sound {
            sound.cancel();
        }
        if let Some(configuration) = &self.configuration {
            configuration.cancel();
        }
    }

    /// Stop notifications, fail pending move-to operations with
    /// [`CubeError::Disconnected`] and drop the link.
    pub async fn disconnect(&self) -> Result<()> {
        self.shutdown();
        self.peripheral.disconnect().await?;
        info!("cube {} disconnected", self.address());
        Ok(())
    }
}

impl Drop for Cube {
    fn drop(&mut self) {
        self.shutdown();
    }
}
