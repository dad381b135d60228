//! # BLE Module
//!
//! Bluetooth LE plumbing for the UART-over-BLE peripheral.
//!
//! This module handles:
//! - Adapter setup, power control and stale connection cleanup
//! - Scanning for UART peripherals and picking one
//! - Connecting, identifying the UART service and subscribing to notifications
//! - Writing command bytes to the TX characteristic

pub mod link;
pub mod power;
pub mod radio;
pub mod scan;
pub mod uart;

use std::fmt;

use uuid::Uuid;

pub use link::{RadioControl, UartLink};
pub use radio::BleRadio;
pub use scan::DeviceSelector;
pub use uart::BtleUartLink;

/// Nordic UART service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// TX characteristic (central writes)
pub const TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// RX characteristic (peripheral notifies)
pub const RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

/// Identity of a discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Radio stack identifier
    pub id: String,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Hardware address, if the platform exposes one
    pub address: Option<String>,
}

impl DeviceInfo {
    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or("Name Unknown")
    }

    pub fn address_or_unknown(&self) -> &str {
        self.address.as_deref().unwrap_or("Address Unknown")
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name_or_unknown(), self.address_or_unknown())
    }
}
