//! btleplug-backed UART link

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::link::UartLink;
use super::{DeviceInfo, RX_CHAR_UUID, TX_CHAR_UUID, UART_SERVICE_UUID};
use crate::error::{BridgeError, Result};
use crate::session::NotifyBuffer;

/// Default write chunk: the payload of a 23-byte ATT MTU
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 20;

/// UART link to a single btleplug peripheral
pub struct BtleUartLink {
    peripheral: Peripheral,
    info: DeviceInfo,
    tx: Option<Characteristic>,
    rx: Option<Characteristic>,
    chunk_size: usize,
    /// Task forwarding RX notifications into the session's buffer
    forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for BtleUartLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleUartLink")
            .field("info", &self.info)
            .field("identified", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl BtleUartLink {
    pub fn new(peripheral: Peripheral, info: DeviceInfo, chunk_size: usize) -> Self {
        Self {
            peripheral,
            info,
            tx: None,
            rx: None,
            chunk_size: chunk_size.max(1),
            forwarder: None,
        }
    }

    fn stop_forwarder(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl UartLink for BtleUartLink {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    async fn connect(&mut self, timeout: Duration) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        info!("Connecting to {}...", self.info);
        match tokio::time::timeout(timeout, self.peripheral.connect()).await {
            Ok(Ok(())) => {
                info!("Connected to {}", self.info);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(BridgeError::ConnectTimeout(timeout.as_millis() as u64)),
        }
    }

    fn max_write_len(&self) -> usize {
        self.chunk_size
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn identify(&mut self) -> Result<()> {
        info!("Identifying device UART service...");
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        let uart = services
            .iter()
            .find(|s| s.uuid == UART_SERVICE_UUID)
            .ok_or(BridgeError::ServiceNotFound)?;

        let find = |uuid: Uuid| {
            uart.characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(BridgeError::CharacteristicNotFound(uuid))
        };
        self.tx = Some(find(TX_CHAR_UUID)?);
        self.rx = Some(find(RX_CHAR_UUID)?);

        info!("UART identified");
        Ok(())
    }

    async fn subscribe(&mut self, sink: NotifyBuffer) -> Result<()> {
        let rx = self.rx.clone().ok_or(BridgeError::NotConnected)?;

        info!("Enabling characteristic notify...");
        self.peripheral.subscribe(&rx).await?;
        let mut notifications = self.peripheral.notifications().await?;

        self.stop_forwarder();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == RX_CHAR_UUID {
                    sink.push(String::from_utf8_lossy(&notification.value).into_owned());
                }
            }
            debug!("Notification stream ended");
        }));

        info!("Notifications enabled");
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(BridgeError::NotConnected)?;

        let write_type = if tx.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        if data.len() > self.chunk_size {
            warn!("Write of {} bytes exceeds the {}-byte chunk size", data.len(), self.chunk_size);
        }
        self.peripheral.write(tx, data, write_type).await?;

        debug!("Wrote {} bytes to {}", data.len(), self.info);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop_forwarder();
        if self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.peripheral.disconnect().await {
                warn!("Failed to disconnect {}: {}", self.info, e);
                return Err(e.into());
            }
            info!("Disconnected {}", self.info);
        }
        Ok(())
    }
}
