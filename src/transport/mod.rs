//! The GATT link as seen by the driver.
//!
//! The driver only needs a handful of operations per characteristic, so
//! the BlueZ backend and the in-memory test double both implement these
//! two traits and nothing else.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::errors::Result;

pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl CharacteristicProperties {
    pub const fn new(read: bool, write: bool, write_without_response: bool, notify: bool) -> Self {
        Self {
            read,
            write,
            write_without_response,
            notify,
        }
    }
}

pub trait GattCharacteristic: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn properties(&self) -> CharacteristicProperties;

    /// Submit a frame. `with_response` asks for a link-layer acknowledgement.
    fn write(&self, frame: Vec<u8>, with_response: bool) -> BoxFuture<'_, Result<()>>;

    fn read(&self) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Start notifications. Frames arrive in the order the cube sent them.
    fn subscribe(&self) -> BoxFuture<'_, Result<BoxStream<'static, Vec<u8>>>>;
}

pub trait Peripheral: Send + Sync {
    fn id(&self) -> String;

    fn address(&self) -> String;

    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    /// Characteristics of the cube service. Only valid after `connect`.
    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn GattCharacteristic>>>>;

    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}
