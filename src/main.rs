//! # BLE UART Bridge
//!
//! Log a Bluetooth LE UART peripheral's notifications and feed it commands.
//!
//! The bridge scans for a UART peripheral, connects to it and then:
//! - appends every notification to a raw log file
//! - runs a converter that turns telemetry lines in the log into a table
//! - sends every line written to the command pipe to the device
//!
//! The same binary doubles as the default converter through its `convert`
//! subcommand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use ble_uart_bridge::ble::{BleRadio, BtleUartLink, DeviceInfo, RadioControl};
use ble_uart_bridge::config::{Config, LoggingConfig};
use ble_uart_bridge::converter::tail_log;
use ble_uart_bridge::error::Result as BridgeResult;
use ble_uart_bridge::pidfile::PidFile;
use ble_uart_bridge::session::{SessionLoop, SessionSettings, Teardown};
use ble_uart_bridge::telemetry::TableFormat;

/// Log polling interval of the `convert` subcommand, in milliseconds
const DEFAULT_CONVERT_POLL_MS: u64 = 10;

#[derive(Debug, Parser)]
#[command(name = "ble-uart-bridge", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scan time in seconds
    #[arg(short = 't', long = "time")]
    scan_time: Option<u64>,

    /// Connect to the device with this address
    #[arg(short = 'b', long = "addr")]
    address: Option<String>,

    /// Connect to the device with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Connect to the device at this position in the scan results
    #[arg(short, long)]
    index: Option<usize>,

    /// Raw log file
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Command pipe path
    #[arg(short, long = "pipename")]
    pipe: Option<PathBuf>,

    /// Do not launch the converter
    #[arg(long)]
    no_converter: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow a raw log and write its telemetry lines to a table
    Convert {
        /// Raw log to follow
        log: PathBuf,

        /// Table file to write
        table: PathBuf,

        /// Table format
        #[arg(short, long, default_value_t = TableFormat::Csv)]
        format: TableFormat,

        /// Log polling interval in milliseconds
        #[arg(long, default_value_t = DEFAULT_CONVERT_POLL_MS)]
        poll_ms: u64,
    },
}

impl Cli {
    /// Load the configuration file (or defaults) and apply flag overrides
    fn load_config(&self) -> BridgeResult<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(scan_time) = self.scan_time {
            config.device.scan_time_s = scan_time;
        }
        if let Some(address) = &self.address {
            config.device.address = Some(address.clone());
        }
        if let Some(name) = &self.name {
            config.device.name = Some(name.clone());
        }
        if let Some(index) = self.index {
            config.device.index = index;
        }
        if let Some(log) = &self.log {
            config.session.log_path = Some(log.clone());
        }
        if let Some(pipe) = &self.pipe {
            config.session.pipe_path = pipe.clone();
        }
        if self.no_converter {
            config.converter.enabled = false;
        }
    }
}

/// Main entry point for the BLE UART bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse flags, load and validate configuration
///    - Set up logging with tracing subscriber
///    - Write the pid file, initialize the adapter, scan and pick a device
///
/// 2. **Session**
///    - Open the raw log and command pipe, launch the converter, connect
///    - Run the session loop until Ctrl+C or SIGTERM
///
/// 3. **Teardown**
///    - Stop the converter, close the log, remove the pipe and pid file
///    - Disconnect the device and power off the adapter
///
/// # Errors
///
/// Returns error if startup fails, the session loop fails, or any teardown
/// step fails. Teardown always runs once a session exists.
///
/// # Example Output
///
/// ```text
/// INFO ble_uart_bridge: BLE UART Bridge v0.1.0 starting...
/// INFO ble_uart_bridge::ble::radio: Scanning for UART devices (10s)
/// INFO ble_uart_bridge::ble::radio: 0: Hatch [C8:2B:96:A1:00:10]
/// INFO ble_uart_bridge::session: Streaming from Hatch [C8:2B:96:A1:00:10]
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Convert { log, table, format, poll_ms }) = &cli.command {
        let _guard = init_logging(&LoggingConfig::default())?;
        return run_converter(log, table, *format, Duration::from_millis(*poll_ms)).await;
    }

    let config = cli.load_config().context("Invalid configuration")?;
    let _guard = init_logging(&config.logging)?;

    info!("BLE UART Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    run_bridge(config).await
}

/// Set up the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. When a log file is
/// configured, output goes to both stderr and the file; the returned guard
/// must be held until exit so buffered lines are written.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let Some(path) = &config.file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Startup, session loop and teardown
async fn run_bridge(config: Config) -> Result<()> {
    let settings = SessionSettings::from_config(&config)?;
    let pid_file = PidFile::create(&config.session.pid_path)
        .with_context(|| format!("Failed to write pid file {}", config.session.pid_path.display()))?;
    info!("Pid {} written to {}", pid_file.pid(), pid_file.path().display());

    let mut radio = match BleRadio::init().await {
        Ok(radio) => radio,
        Err(e) => {
            let mut teardown = Teardown::new();
            teardown.record("remove pid file", pid_file.remove());
            log_teardown(teardown);
            return Err(e).context("Bluetooth initialization failed");
        }
    };

    let link = match open_device(&radio, &config).await {
        Ok(link) => link,
        Err(e) => {
            let mut teardown = Teardown::new();
            teardown.record("remove pid file", pid_file.remove());
            teardown.record("power off adapter", radio.power_off().await);
            log_teardown(teardown);
            return Err(e).context("No device to connect to");
        }
    };

    let mut session = SessionLoop::new(link, radio, settings, Some(pid_file));
    let outcome = match session.start().await {
        Ok(()) => session.run(shutdown_signal()).await,
        Err(e) => {
            error!("Startup failed: {}", e);
            Err(e)
        }
    };
    let teardown = session.teardown().await;

    outcome.context("Session failed")?;
    teardown.context("Teardown incomplete")?;
    info!("Goodbye");
    Ok(())
}

/// Scan, pick a device and wrap it in a link
async fn open_device(radio: &BleRadio, config: &Config) -> BridgeResult<BtleUartLink> {
    radio.disconnect_stale_uarts().await;

    let mut found = radio.scan(config.scan_time()).await?;
    let infos: Vec<DeviceInfo> = found.iter().map(|(info, _)| info.clone()).collect();
    let chosen = config.selector().select(&infos)?;

    let (info, peripheral) = found.swap_remove(chosen);
    info!("Selected device {}: {}", chosen, info);
    Ok(BtleUartLink::new(peripheral, info, config.device.write_chunk_size))
}

fn log_teardown(teardown: Teardown) {
    if let Err(e) = teardown.finish() {
        error!("{}", e);
    }
}

/// The `convert` subcommand
async fn run_converter(log: &Path, table: &Path, format: TableFormat, poll_interval: Duration) -> Result<()> {
    let rows = tail_log(log, table, format, poll_interval, shutdown_signal())
        .await
        .with_context(|| format!("Failed to convert {}", log.display()))?;
    info!("Wrote {} rows to {}", rows, table.display());
    Ok(())
}
