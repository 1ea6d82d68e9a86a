//! Typed cube events and the per-cube listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::lock;
use crate::protocol::configuration::ConfigResponse;
use crate::protocol::{
    AttitudeEuler, AttitudeHighPrecisionEuler, AttitudeQuaternion, MagneticForce, MotorSpeed,
    Orientation, PositionId, StandardIdInfo,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum CubeEvent {
    PositionId(PositionId),
    StandardId(StandardIdInfo),
    PositionIdMissed,
    StandardIdMissed,
    MotorSpeed(MotorSpeed),
    Slope { is_sloped: bool },
    /// Sent for every motion frame that reports a collision.
    Collision,
    /// Sent for every motion frame that reports a double tap.
    DoubleTap,
    Orientation { orientation: Orientation },
    Shake { level: u8 },
    MagnetId { id: u8 },
    MagneticForce(MagneticForce),
    AttitudeEuler(AttitudeEuler),
    AttitudeQuaternion(AttitudeQuaternion),
    AttitudeHighPrecisionEuler(AttitudeHighPrecisionEuler),
    ButtonPress { pressed: bool },
    BatteryLevel { level: u8 },
    ConfigurationResponse(ConfigResponse),
}

impl CubeEvent {
    /// Stable event name, e.g. `"sensor:slope"`.
    pub fn name(&self) -> &'static str {
        match self {
            CubeEvent::PositionId(_) => "id:position-id",
            CubeEvent::StandardId(_) => "id:standard-id",
            CubeEvent::PositionIdMissed => "id:position-id-missed",
            CubeEvent::StandardIdMissed => "id:standard-id-missed",
            CubeEvent::MotorSpeed(_) => "motor:speed",
            CubeEvent::Slope { .. } => "sensor:slope",
            CubeEvent::Collision => "sensor:collision",
            CubeEvent::DoubleTap => "sensor:double-tap",
            CubeEvent::Orientation { .. } => "sensor:orientation",
            CubeEvent::Shake { .. } => "sensor:shake",
            CubeEvent::MagnetId { .. } => "sensor:magnet-id",
            CubeEvent::MagneticForce(_) => "sensor:magnetic-force",
            CubeEvent::AttitudeEuler(_) => "sensor:attitude-euler",
            CubeEvent::AttitudeQuaternion(_) => "sensor:attitude-quaternion",
            CubeEvent::AttitudeHighPrecisionEuler(_) => "sensor:attitude-high-precision-euler",
            CubeEvent::ButtonPress { .. } => "button:press",
            CubeEvent::BatteryLevel { .. } => "battery:battery",
            CubeEvent::ConfigurationResponse(_) => "configuration:response",
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&CubeEvent) + Send + Sync>;

/// Handle returned by [`EventListeners::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventListeners {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(ListenerId, EventHandler)>>,
    forwarders: Mutex<Vec<mpsc::UnboundedSender<CubeEvent>>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&CubeEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers).push((id, Arc::new(handler)));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Forward every event into an unbounded channel. The channel is
    /// unregistered once its receiver is dropped.
    pub fn channel(&self) -> mpsc::UnboundedReceiver<CubeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.forwarders).push(tx);
        rx
    }

    /// Callbacks plus channels whose receiver is still alive.
    pub fn len(&self) -> usize {
        let mut forwarders = lock(&self.forwarders);
        forwarders.retain(|tx| !tx.is_closed());
        lock(&self.handlers).len() + forwarders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener in registration order. Listeners may register
    /// or unregister from inside a callback.
    pub fn emit(&self, event: CubeEvent) {
        let handlers: Vec<EventHandler> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
        lock(&self.forwarders).retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_off_and_emit() {
        let listeners = EventListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = listeners.on(move |event| sink.lock().unwrap().push(event.clone()));
        listeners.emit(CubeEvent::DoubleTap);
        assert!(listeners.off(id));
        assert!(!listeners.off(id));
        listeners.emit(CubeEvent::Collision);

        assert_eq!(*seen.lock().unwrap(), vec![CubeEvent::DoubleTap]);
        assert!(listeners.is_empty());
    }

    #[test]
    fn listener_may_unregister_itself() {
        let listeners = Arc::new(EventListeners::new());
        let id_slot = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&listeners);
        let slot = Arc::clone(&id_slot);
        let id = listeners.on(move |_| {
            if let Some(id) = slot.lock().unwrap().take() {
                registry.off(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        listeners.emit(CubeEvent::Collision);
        assert!(listeners.is_empty());
    }

    #[test]
    fn channel_receives_events() {
        let listeners = EventListeners::new();
        let mut rx = listeners.channel();
        listeners.emit(CubeEvent::BatteryLevel { level: 70 });
        assert_eq!(rx.try_recv().unwrap(), CubeEvent::BatteryLevel { level: 70 });
    }

    #[test]
    fn dropped_channels_are_unregistered() {
        let listeners = EventListeners::new();
        for _ in 0..3 {
            drop(listeners.channel());
        }
        let kept = listeners.channel();
        listeners.emit(CubeEvent::Collision);
        assert_eq!(listeners.len(), 1);
        assert_eq!(lock(&listeners.forwarders).len(), 1);

        drop(kept);
        listeners.emit(CubeEvent::Collision);
        assert!(listeners.is_empty());
    }

    #[test]
    fn serializes_with_name_and_payload() {
        let json = serde_json::to_value(CubeEvent::Slope { is_sloped: true }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "slope", "data": {"is_sloped": true}})
        );
        assert_eq!(CubeEvent::Slope { is_sloped: true }.name(), "sensor:slope");
    }
}
