//! BlueZ backend for the transport traits, built on `bluer`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{BluetoothError, CubeError, Result};
use crate::protocol::{characteristic_name, CUBE_SERVICE_UUID};
use crate::transport::{CharacteristicProperties, GattCharacteristic, Peripheral};

const SCAN_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_CONNECT_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;
const SERVICES_POLL_MS: u64 = 100;

/// Finds a cube by address through BlueZ and opens its GATT link.
#[derive(Debug, Clone)]
pub struct CubeConnector {
    pub scan_timeout: Duration,
    /// Per attempt, including service resolution.
    pub connect_timeout: Duration,
    pub max_retries: u32,
    /// First backoff step; doubles on each retry.
    pub retry_delay: Duration,
}

impl Default for CubeConnector {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(SCAN_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            max_retries: MAX_CONNECT_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl CubeConnector {
    /// Locate the cube with address `mac` on the default adapter. The
    /// returned peripheral is not connected yet; `Cube::connect` does that.
    pub async fn find(&self, mac: &str) -> Result<Arc<BluerPeripheral>> {
        let address: Address = mac
            .parse()
            .map_err(|_| BluetoothError::NotFound { mac: mac.to_string() })?;

        let session = Session::new()
            .await
            .map_err(|e| BluetoothError::Session(e.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| BluetoothError::Session(e.to_string()))?;
        adapter
            .set_powered(true)
            .await
            .map_err(|e| BluetoothError::Session(e.to_string()))?;

        wait_for_device(&adapter, address, self.scan_timeout).await?;
        let device = adapter
            .device(address)
            .map_err(|e| BluetoothError::NotConnected(e.to_string()))?;

        Ok(Arc::new(BluerPeripheral {
            _session: session,
            device,
            connector: self.clone(),
        }))
    }

    async fn connect_device(&self, device: &Device) -> Result<()> {
        let mac = device.address();
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay * (1 << (attempt - 1).min(3));
                warn!(
                    "retrying GATT connection after {:?} (mac={}, attempt={})",
                    delay, mac, attempt
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.connect_timeout, connect_and_resolve(device)).await {
                Ok(Ok(())) => {
                    info!("GATT connection established: mac={}", mac);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(
                        "GATT connection attempt failed: mac={}, attempt={}, error={}",
                        mac, attempt, e
                    );
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("GATT connection attempt timed out: mac={}, attempt={}", mac, attempt);
                    last_error = Some(CubeError::Timeout(format!(
                        "connecting to {mac} took longer than {:?}",
                        self.connect_timeout
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BluetoothError::NotConnected(format!("{mac}: no connection attempt made")).into()
        }))
    }
}

async fn connect_and_resolve(device: &Device) -> Result<()> {
    if !device.is_connected().await.unwrap_or(false) {
        device
            .connect()
            .await
            .map_err(|e| BluetoothError::NotConnected(e.to_string()))?;
    }
    while !device
        .is_services_resolved()
        .await
        .map_err(|e| BluetoothError::Discovery(e.to_string()))?
    {
        tokio::time::sleep(Duration::from_millis(SERVICES_POLL_MS)).await;
    }
    Ok(())
}

async fn wait_for_device(adapter: &Adapter, address: Address, timeout: Duration) -> Result<()> {
    // Already known to BlueZ from an earlier scan or pairing.
    if adapter
        .device_addresses()
        .await
        .map(|known| known.contains(&address))
        .unwrap_or(false)
    {
        return Ok(());
    }

    let mut events = adapter
        .discover_devices()
        .await
        .map_err(|e| BluetoothError::Session(e.to_string()))?;
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(AdapterEvent::DeviceAdded(addr))) if addr == address => {
                info!("device discovered: mac={}", addr);
                return Ok(());
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                return Err(BluetoothError::NotFound {
                    mac: address.to_string(),
                }
                .into())
            }
        }
    }
}

/// A cube reached through BlueZ.
pub struct BluerPeripheral {
    // Keeps the D-Bus connection alive for as long as the device is used.
    _session: Session,
    device: Device,
    connector: CubeConnector,
}

impl Peripheral for BluerPeripheral {
    fn id(&self) -> String {
        self.device.address().to_string()
    }

    fn address(&self) -> String {
        self.device.address().to_string()
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        self.connector.connect_device(&self.device).boxed()
    }

    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn GattCharacteristic>>>> {
        async move {
            let discovery = |e: bluer::Error| BluetoothError::Discovery(e.to_string());
            let mut found: Vec<Arc<dyn GattCharacteristic>> = Vec::new();
            for service in self.device.services().await.map_err(discovery)? {
                if service.uuid().await.map_err(discovery)? != CUBE_SERVICE_UUID {
                    continue;
                }
                for characteristic in service.characteristics().await.map_err(discovery)? {
                    let uuid = characteristic.uuid().await.map_err(discovery)?;
                    let flags = characteristic.flags().await.map_err(discovery)?;
                    debug!(
                        "characteristic {} ({})",
                        uuid,
                        characteristic_name(&uuid).unwrap_or("unknown")
                    );
                    found.push(Arc::new(BluerCharacteristic {
                        uuid,
                        properties: CharacteristicProperties::new(
                            flags.read,
                            flags.write,
                            flags.write_without_response,
                            flags.notify,
                        ),
                        inner: characteristic,
                    }));
                }
            }
            if found.is_empty() {
                return Err(BluetoothError::Discovery(format!(
                    "{} exposes no cube service",
                    self.device.address()
                ))
                .into());
            }
            Ok(found)
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.device
                .disconnect()
                .await
                .map_err(|e| BluetoothError::NotConnected(e.to_string()))?;
            Ok(())
        }
        .boxed()
    }
}

pub struct BluerCharacteristic {
    uuid: Uuid,
    properties: CharacteristicProperties,
    inner: Characteristic,
}

impl GattCharacteristic for BluerCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    fn write(&self, frame: Vec<u8>, with_response: bool) -> BoxFuture<'_, Result<()>> {
        async move {
            let request = CharacteristicWriteRequest {
                op_type: if with_response {
                    WriteOp::Request
                } else {
                    WriteOp::Command
                },
                ..Default::default()
            };
            self.inner
                .write_ext(&frame, &request)
                .await
                .map_err(|e| CubeError::Write(e.to_string()))
        }
        .boxed()
    }

    fn read(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        async move {
            self.inner
                .read()
                .await
                .map_err(|e| CubeError::Read(e.to_string()))
        }
        .boxed()
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<BoxStream<'static, Vec<u8>>>> {
        async move {
            let stream = self
                .inner
                .notify()
                .await
                .map_err(|e| CubeError::Subscribe(e.to_string()))?;
            Ok(stream.boxed())
        }
        .boxed()
    }
}
