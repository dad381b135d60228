//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ble::DeviceSelector;
use crate::converter::ConverterCommand;
use crate::error::{BridgeError, Result};
use crate::telemetry::TableFormat;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device discovery and link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Exact advertised name to connect to
    #[serde(default)]
    pub name: Option<String>,

    /// Hardware address to connect to
    #[serde(default)]
    pub address: Option<String>,

    /// Position in scan results when neither name nor address is set
    #[serde(default)]
    pub index: usize,

    #[serde(default = "default_scan_time_s")]
    pub scan_time_s: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_chunk_size")]
    pub write_chunk_size: usize,
}

/// Session file and loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Raw log path; `ble_log_<unix time>.txt` when unset
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_pipe_path")]
    pub pipe_path: PathBuf,

    #[serde(default = "default_pid_path")]
    pub pid_path: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Converter process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default = "default_converter_enabled")]
    pub enabled: bool,

    /// Converter executable; this binary's `convert` subcommand when unset
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Arguments placed before the log and table paths
    #[serde(default)]
    pub args: Vec<String>,

    /// Table path; derived from the log path when unset
    #[serde(default)]
    pub table_path: Option<PathBuf>,

    #[serde(default)]
    pub format: TableFormat,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write diagnostics to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_scan_time_s() -> u64 { 10 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_write_chunk_size() -> usize { 20 }

fn default_pipe_path() -> PathBuf { PathBuf::from("bleinput") }
fn default_pid_path() -> PathBuf { PathBuf::from("ble-uart-bridge.pid") }
fn default_poll_interval_ms() -> u64 { 10 }

fn default_converter_enabled() -> bool { true }
fn default_shutdown_timeout_ms() -> u64 { 2000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            address: None,
            index: 0,
            scan_time_s: default_scan_time_s(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_chunk_size: default_write_chunk_size(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            pipe_path: default_pipe_path(),
            pid_path: default_pid_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            enabled: default_converter_enabled(),
            program: None,
            args: Vec::new(),
            table_path: None,
            format: TableFormat::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), file: None }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ble_uart_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.device.name.as_deref() == Some("") {
            return Err(invalid("device name cannot be empty when set"));
        }

        if self.device.address.as_deref() == Some("") {
            return Err(invalid("device address cannot be empty when set"));
        }

        if self.device.scan_time_s == 0 || self.device.scan_time_s > 300 {
            return Err(invalid("scan_time_s must be between 1 and 300"));
        }

        if self.device.connect_timeout_ms == 0 || self.device.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.device.write_chunk_size == 0 || self.device.write_chunk_size > 512 {
            return Err(invalid("write_chunk_size must be between 1 and 512"));
        }

        if self.session.pipe_path.as_os_str().is_empty() {
            return Err(invalid("pipe_path cannot be empty"));
        }

        if self.session.pid_path.as_os_str().is_empty() {
            return Err(invalid("pid_path cannot be empty"));
        }

        if self.session.poll_interval_ms == 0 || self.session.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 1 and 1000"));
        }

        if self.converter.program.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(invalid("converter program cannot be empty when set"));
        }

        if self.converter.shutdown_timeout_ms == 0 || self.converter.shutdown_timeout_ms > 60000 {
            return Err(invalid("shutdown_timeout_ms must be between 1 and 60000"));
        }

        if let (Some(log), Some(table)) = (&self.session.log_path, &self.converter.table_path) {
            if log == table {
                return Err(invalid("converter table_path must differ from log_path"));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }

    /// Scan duration
    pub fn scan_time(&self) -> Duration {
        Duration::from_secs(self.device.scan_time_s)
    }

    /// How the device is picked from scan results
    pub fn selector(&self) -> DeviceSelector {
        DeviceSelector {
            address: self.device.address.clone(),
            name: self.device.name.clone(),
            index: self.device.index,
        }
    }
}

impl SessionConfig {
    /// Configured log path, or a timestamped default
    pub fn resolve_log_path(&self) -> PathBuf {
        self.log_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("ble_log_{}.txt", chrono::Utc::now().timestamp()))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ConverterConfig {
    /// Configured table path, or the log path with the format's extension
    ///
    /// A derived path never equals the log path: `capture.csv` logs into
    /// `capture.table.csv`.
    pub fn resolve_table_path(&self, log_path: &Path) -> PathBuf {
        if let Some(table_path) = &self.table_path {
            return table_path.clone();
        }

        let extension = self.format.extension();
        let derived = log_path.with_extension(extension);
        if derived != log_path {
            return derived;
        }
        log_path.with_extension(format!("table.{}", extension))
    }

    /// Configured converter, or this executable's `convert` subcommand
    pub fn resolve_command(&self) -> Result<ConverterCommand> {
        match &self.program {
            Some(program) => Ok(ConverterCommand {
                program: program.clone(),
                args: self.args.clone(),
            }),
            None => {
                let mut args = vec![
                    "convert".to_string(),
                    "--format".to_string(),
                    self.format.to_string(),
                ];
                args.extend(self.args.iter().cloned());
                Ok(ConverterCommand { program: std::env::current_exe()?, args })
            }
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

pub(crate) fn invalid(msg: &str) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}
