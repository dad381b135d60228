//! Radio context: adapter ownership, scanning and shutdown
//!
//! Constructed once at startup and passed to the session explicitly; there is
//! no process-wide BLE state.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::link::RadioControl;
use super::{power, DeviceInfo, UART_SERVICE_UUID};
use crate::error::{BridgeError, Result};

/// Interval between scan result checks
const SCAN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Initialized BLE adapter
pub struct BleRadio {
    _manager: Manager,
    adapter: Adapter,
    powered_off: bool,
}

impl std::fmt::Debug for BleRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleRadio")
            .field("powered_off", &self.powered_off)
            .finish_non_exhaustive()
    }
}

impl BleRadio {
    /// Find the first adapter and power it on
    ///
    /// # Errors
    ///
    /// - `AdapterNotFound`: the system has no Bluetooth adapter
    /// - `Ble`: the BLE stack could not be initialized
    pub async fn init() -> Result<Self> {
        info!("Initializing Bluetooth...");
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BridgeError::AdapterNotFound)?;

        match adapter.adapter_info().await {
            Ok(description) => info!("Using adapter {}", description),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        if let Err(e) = power::power_on().await {
            // The adapter may already be up; scanning will tell
            warn!("Could not power on adapter: {}", e);
        }

        Ok(Self { _manager: manager, adapter, powered_off: false })
    }

    /// Disconnect any UART peripheral left connected by a previous run
    pub async fn disconnect_stale_uarts(&self) {
        let peripherals = match self.adapter.peripherals().await {
            Ok(p) => p,
            Err(e) => {
                debug!("Could not list known peripherals: {}", e);
                return;
            }
        };

        for peripheral in peripherals {
            if !peripheral.is_connected().await.unwrap_or(false) {
                continue;
            }
            let is_uart = matches!(
                peripheral.properties().await,
                Ok(Some(props)) if props.services.contains(&UART_SERVICE_UUID)
            );
            if is_uart {
                info!("Disconnecting stale UART {:?}", peripheral.id());
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Failed to disconnect stale UART: {}", e);
                }
            }
        }
    }

    /// Scan for UART peripherals for `duration`
    ///
    /// # Returns
    ///
    /// * `Result<Vec<(DeviceInfo, Peripheral)>>` - Devices in discovery order
    pub async fn scan(&self, duration: Duration) -> Result<Vec<(DeviceInfo, Peripheral)>> {
        info!("Scanning for UART devices ({}s)", duration.as_secs());
        self.adapter
            .start_scan(ScanFilter { services: vec![UART_SERVICE_UUID] })
            .await?;

        let mut known: HashSet<PeripheralId> = HashSet::new();
        let mut found = Vec::new();
        let deadline = Instant::now() + duration;

        loop {
            for peripheral in self.adapter.peripherals().await? {
                if !known.insert(peripheral.id()) {
                    continue;
                }
                let info = describe(&peripheral).await;
                info!("Found device: {}", info);
                found.push((info, peripheral));
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(SCAN_POLL_INTERVAL.min(deadline - now)).await;
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        info!("Found {} device(s)", found.len());
        for (i, (info, _)) in found.iter().enumerate() {
            info!("{}: {}", i, info);
        }
        Ok(found)
    }
}

#[async_trait]
impl RadioControl for BleRadio {
    async fn power_off(&mut self) -> Result<()> {
        if self.powered_off {
            return Ok(());
        }
        info!("Powering down adapter...");
        self.powered_off = true;
        power::power_off().await
    }
}

/// Read name and address once, at discovery time
async fn describe(peripheral: &Peripheral) -> DeviceInfo {
    let name = match peripheral.properties().await {
        Ok(Some(props)) => props.local_name,
        _ => None,
    };
    let address = peripheral.address();

    DeviceInfo {
        id: format!("{:?}", peripheral.id()),
        name,
        // Platforms without address access report all zeros
        address: (address != BDAddr::default()).then(|| address.to_string()),
    }
}
