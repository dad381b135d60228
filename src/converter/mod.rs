//! # Converter Module
//!
//! Turns the raw session log into a table file.
//!
//! This module handles:
//! - Launching and supervising the converter process for the session
//! - The converter itself: tailing the log and writing decoded rows
//!   (run through the `convert` subcommand)

pub mod supervisor;
pub mod tail;

pub use supervisor::{ConverterCommand, ConverterSupervisor};
pub use tail::{tail_log, TableWriter};
