//! # Telemetry Module
//!
//! Handles the device's telemetry stream on its way to disk.
//!
//! This module handles:
//! - Decoding `##`-prefixed hex/underscore telemetry lines
//! - Rendering decoded records as CSV or JSONL table rows
//! - Appending raw notification payloads to the session log

pub mod decoder;
pub mod raw_log;
pub mod table;

pub use decoder::{decode, Flags, Position, TelemetryRecord};
pub use raw_log::RawLog;
pub use table::TableFormat;
