//! Converter process supervision

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};

/// Program and leading arguments of the converter; the log and table paths
/// are appended as the last two arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Handle on a running converter process
#[derive(Debug)]
pub struct ConverterSupervisor {
    child: Child,
    program: PathBuf,
    exit_reported: bool,
}

impl ConverterSupervisor {
    /// Start the converter on `log_path`, writing to `table_path`
    ///
    /// # Errors
    ///
    /// Returns `ConverterLaunch` if the process cannot be spawned; the
    /// session must not start without its converter
    pub fn launch(command: &ConverterCommand, log_path: &Path, table_path: &Path) -> Result<Self> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .arg(log_path)
            .arg(table_path)
            .stdin(Stdio::null())
            // Own process group: a terminal Ctrl+C must not stop the converter
            // before the session has written its last lines
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::ConverterLaunch {
                program: command.program.clone(),
                source,
            })?;

        info!(
            "Converter {} started (pid {:?}): {} -> {}",
            command.program.display(),
            child.id(),
            log_path.display(),
            table_path.display()
        );

        Ok(Self { child, program: command.program.clone(), exit_reported: false })
    }

    /// Process id, while the converter is running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking health check. An unexpected exit is reported once.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` while the converter is still running
    pub fn check(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if !self.exit_reported {
                    error!(
                        "Converter {} exited unexpectedly ({}); table output has stopped",
                        self.program.display(),
                        status
                    );
                    self.exit_reported = true;
                }
                false
            }
            Err(e) => {
                debug!("Converter status unavailable: {}", e);
                true
            }
        }
    }

    /// Ask the converter to finish, wait up to `grace`, then kill it
    ///
    /// A converter that has already exited is not an error.
    pub async fn terminate(mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.child.try_wait()? {
            debug!("Converter already exited ({})", status);
            return Ok(Some(status));
        }

        if let Some(pid) = self.child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!("Converter stopped ({})", status);
                Ok(Some(status))
            }
            Err(_) => {
                warn!("Converter ignored SIGTERM for {}ms, killing", grace.as_millis());
                self.child.kill().await?;
                Ok(None)
            }
        }
    }
}
