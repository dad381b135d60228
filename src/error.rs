//! # Error Types
//!
//! Custom error types for the BLE UART bridge using `thiserror`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the BLE UART bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the BLE stack
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Errors from raw OS calls (mkfifo, poll, kill)
    #[error("OS error: {0}")]
    Os(#[from] nix::errno::Errno),

    /// No Bluetooth adapter present
    #[error("No Bluetooth adapter found")]
    AdapterNotFound,

    /// Scan finished without seeing a UART peripheral
    #[error("No UART devices found")]
    NoDevicesFound,

    /// Requested device is not among the scan results
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Peripheral does not expose the UART service
    #[error("UART service not found on device")]
    ServiceNotFound,

    /// UART service is missing one of its characteristics
    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// Operation needs a connected, identified device
    #[error("Device not connected")]
    NotConnected,

    /// Connect attempt exceeded its time budget
    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    /// Adapter power control failed
    #[error("Adapter power error: {0}")]
    Power(String),

    /// Converter process could not be started
    #[error("Failed to launch converter {program:?}: {source}")]
    ConverterLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more teardown steps failed
    #[error("Teardown finished with {} failed step(s): {}", .0.len(), TeardownList(.0))]
    Teardown(Vec<TeardownFailure>),
}

/// A single failed teardown step
#[derive(Debug)]
pub struct TeardownFailure {
    /// Step name, e.g. "close log"
    pub step: &'static str,
    /// Rendered error message
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

struct TeardownList<'a>(&'a [TeardownFailure]);

impl fmt::Display for TeardownList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Result type alias for the BLE UART bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
