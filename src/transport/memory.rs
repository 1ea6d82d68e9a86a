//! In-process cube link for tests and simulations.
//!
//! Writes are recorded, notifications are injected by hand or produced by
//! a responder closure reacting to each write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use uuid::Uuid;

use super::{CharacteristicProperties, GattCharacteristic, Peripheral};
use crate::errors::{CubeError, Result};
use crate::lock;
use crate::protocol::{
    BATTERY_CHARACTERISTIC_UUID, BUTTON_CHARACTERISTIC_UUID, CONFIGURATION_CHARACTERISTIC_UUID,
    ID_CHARACTERISTIC_UUID, LIGHT_CHARACTERISTIC_UUID, MOTOR_CHARACTERISTIC_UUID,
    SENSOR_CHARACTERISTIC_UUID, SOUND_CHARACTERISTIC_UUID,
};

type Responder = Arc<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// A frame written to a [`MemoryCharacteristic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub frame: Vec<u8>,
    pub with_response: bool,
}

pub struct MemoryCharacteristic {
    uuid: Uuid,
    properties: CharacteristicProperties,
    writes: watch::Sender<Vec<RecordedWrite>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    read_value: Mutex<Option<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    fail_writes: AtomicBool,
}

impl MemoryCharacteristic {
    pub fn new(uuid: Uuid, properties: CharacteristicProperties) -> Arc<Self> {
        let (writes, _) = watch::channel(Vec::new());
        Arc::new(Self {
            uuid,
            properties,
            writes,
            subscribers: Mutex::new(Vec::new()),
            read_value: Mutex::new(None),
            responder: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Push a notification frame to every subscriber.
    pub fn notify(&self, frame: impl Into<Vec<u8>>) {
        let frame = frame.into();
        lock(&self.subscribers).retain(|tx| tx.unbounded_send(frame.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Value returned by subsequent reads.
    pub fn set_read_value(&self, frame: impl Into<Vec<u8>>) {
        *lock(&self.read_value) = Some(frame.into());
    }

    /// Install a closure whose returned frames are notified after each write.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        *lock(&self.responder) = Some(Arc::new(responder));
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.borrow().clone()
    }

    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.writes.borrow().iter().map(|w| w.frame.clone()).collect()
    }

    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.writes.borrow().last().map(|w| w.frame.clone())
    }

    /// Wait until at least `count` frames have been written.
    pub async fn wait_for_writes(&self, count: usize) -> Vec<Vec<u8>> {
        let mut rx = self.writes.subscribe();
        let writes = rx
            .wait_for(|writes| writes.len() >= count)
            .await
            .map(|writes| writes.iter().map(|w| w.frame.clone()).collect());
        // The sender lives in `self`, so the channel cannot close here.
        writes.unwrap_or_default()
    }
}

impl GattCharacteristic for MemoryCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    fn write(&self, frame: Vec<u8>, with_response: bool) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(CubeError::Write(format!("{}: write rejected", self.uuid)));
            }
            let responder = lock(&self.responder).clone();
            let replies = responder.map(|r| r(&frame)).unwrap_or_default();
            self.writes.send_modify(|writes| {
                writes.push(RecordedWrite {
                    frame,
                    with_response,
                })
            });
            for reply in replies {
                self.notify(reply);
            }
            Ok(())
        }
        .boxed()
    }

    fn read(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        async move {
            lock(&self.read_value)
                .clone()
                .ok_or_else(|| CubeError::Read(format!("{}: nothing to read", self.uuid)))
        }
        .boxed()
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<BoxStream<'static, Vec<u8>>>> {
        async move {
            let (tx, rx) = mpsc::unbounded();
            lock(&self.subscribers).push(tx);
            Ok(rx.boxed())
        }
        .boxed()
    }
}

/// A fake cube exposing the standard characteristics.
pub struct MemoryPeripheral {
    id: String,
    address: String,
    characteristics: Vec<Arc<MemoryCharacteristic>>,
    connected: AtomicBool,
}

impl MemoryPeripheral {
    pub fn new(id: impl Into<String>, characteristics: Vec<Arc<MemoryCharacteristic>>) -> Self {
        let id = id.into();
        Self {
            address: id.clone(),
            id,
            characteristics,
            connected: AtomicBool::new(false),
        }
    }

    /// All eight cube characteristics with their real property flags.
    pub fn cube() -> Self {
        let p = CharacteristicProperties::new;
        let characteristics = vec![
            MemoryCharacteristic::new(ID_CHARACTERISTIC_UUID, p(true, false, false, true)),
            MemoryCharacteristic::new(MOTOR_CHARACTERISTIC_UUID, p(false, true, true, true)),
            MemoryCharacteristic::new(LIGHT_CHARACTERISTIC_UUID, p(false, true, false, false)),
            MemoryCharacteristic::new(SOUND_CHARACTERISTIC_UUID, p(false, true, false, false)),
            MemoryCharacteristic::new(SENSOR_CHARACTERISTIC_UUID, p(true, true, false, true)),
            MemoryCharacteristic::new(BUTTON_CHARACTERISTIC_UUID, p(true, false, false, true)),
            MemoryCharacteristic::new(BATTERY_CHARACTERISTIC_UUID, p(true, false, false, true)),
            MemoryCharacteristic::new(CONFIGURATION_CHARACTERISTIC_UUID, p(false, true, false, true)),
        ];
        Self::new("memory-cube", characteristics)
    }

    /// A cube that answers version requests with `version`.
    pub fn cube_with_version(version: &str) -> Self {
        let cube = Self::cube();
        let mut reply = vec![0x81, 0x00];
        reply.extend_from_slice(version.as_bytes());
        if let Some(config) = cube.characteristic(CONFIGURATION_CHARACTERISTIC_UUID) {
            config.set_responder(move |frame| {
                if frame.first() == Some(&0x01) {
                    vec![reply.clone()]
                } else {
                    Vec::new()
                }
            });
        }
        cube
    }

    /// Drop one characteristic, as if discovery had not found it.
    pub fn without(mut self, uuid: Uuid) -> Self {
        self.characteristics.retain(|c| c.uuid != uuid);
        self
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<Arc<MemoryCharacteristic>> {
        self.characteristics.iter().find(|c| c.uuid == uuid).cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Peripheral for MemoryPeripheral {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn GattCharacteristic>>>> {
        async move {
            Ok(self
                .characteristics
                .iter()
                .map(|c| Arc::clone(c) as Arc<dyn GattCharacteristic>)
                .collect())
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.connected.store(false, Ordering::SeqCst);
            // Closing the streams ends every notification pump.
            for c in &self.characteristics {
                lock(&c.subscribers).clear();
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_writes_and_replays_responses() {
        let chr = MemoryCharacteristic::new(
            MOTOR_CHARACTERISTIC_UUID,
            CharacteristicProperties::new(false, true, true, true),
        );
        chr.set_responder(|frame| vec![vec![0x84, frame[1], 0x00]]);
        let mut stream = chr.subscribe().await.unwrap();

        chr.write(vec![0x04, 0x09], false).await.unwrap();
        assert_eq!(
            chr.writes(),
            vec![RecordedWrite {
                frame: vec![0x04, 0x09],
                with_response: false
            }]
        );
        assert_eq!(stream.next().await, Some(vec![0x84, 0x09, 0x00]));
    }

    #[tokio::test]
    async fn failing_writes_are_not_recorded() {
        let chr = MemoryCharacteristic::new(LIGHT_CHARACTERISTIC_UUID, Default::default());
        chr.set_fail_writes(true);
        assert!(matches!(
            chr.write(vec![0x01], true).await,
            Err(CubeError::Write(_))
        ));
        assert!(chr.writes().is_empty());
    }

    #[tokio::test]
    async fn read_needs_a_value() {
        let chr = MemoryCharacteristic::new(BATTERY_CHARACTERISTIC_UUID, Default::default());
        assert!(chr.read().await.is_err());
        chr.set_read_value([0x50]);
        assert_eq!(chr.read().await.unwrap(), vec![0x50]);
    }
}
