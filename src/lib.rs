//! # BLE UART Bridge Library
//!
//! Bridge a Bluetooth LE UART peripheral to the local machine.
//!
//! Notifications from the device are appended to a raw log file, a converter
//! process turns telemetry lines in that log into a table, and commands
//! written to a named pipe are sent back to the device.

pub mod ble;
pub mod config;
pub mod converter;
pub mod error;
pub mod pidfile;
pub mod pipe;
pub mod session;
pub mod telemetry;
