//! # Session Module
//!
//! The session loop: owns the device link for the life of one run and
//! multiplexes its three event sources.
//!
//! Each iteration, in order:
//! 1. Pop the oldest notification and append it to the raw log
//! 2. Poll the command pipe (zero timeout) and enqueue a ready line
//! 3. Flush queued commands to the device, stopping at the first failure
//! 4. Check the link is alive and reconnect if it is not
//!
//! The loop stops when the shutdown future resolves; [`SessionLoop::teardown`]
//! then releases every resource exactly once.

pub mod queue;
pub mod teardown;

pub use queue::{NotifyBuffer, OutputQueue};
pub use teardown::Teardown;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::ble::{RadioControl, UartLink};
use crate::config::{invalid, Config};
use crate::converter::{ConverterCommand, ConverterSupervisor};
use crate::error::{BridgeError, Result};
use crate::pidfile::PidFile;
use crate::pipe::PipeChannel;
use crate::telemetry::RawLog;

/// Line terminator appended to every command sent to the device
pub const COMMAND_TERMINATOR: &str = "\r\n";

/// Connection lifecycle of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Identifying,
    Streaming,
    ShuttingDown,
    Terminated,
}

/// Paths and timings for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub log_path: PathBuf,
    pub pipe_path: PathBuf,
    pub table_path: PathBuf,
    /// `None` runs without a converter
    pub converter: Option<ConverterCommand>,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub converter_grace: Duration,
}

impl SessionSettings {
    /// Resolve defaults (log name, table path, converter command) from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let log_path = config.session.resolve_log_path();
        let table_path = config.converter.resolve_table_path(&log_path);
        if table_path == log_path {
            return Err(invalid("converter table path must differ from the log path"));
        }
        let converter = if config.converter.enabled {
            Some(config.converter.resolve_command()?)
        } else {
            None
        };

        Ok(Self {
            log_path,
            pipe_path: config.session.pipe_path.clone(),
            table_path,
            converter,
            connect_timeout: Duration::from_millis(config.device.connect_timeout_ms),
            poll_interval: config.session.poll_interval(),
            converter_grace: config.converter.shutdown_timeout(),
        })
    }
}

/// Counters reported at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines_logged: u64,
    pub commands_sent: u64,
    pub reconnects: u64,
}

/// One-device session state machine
pub struct SessionLoop<L: UartLink, R: RadioControl> {
    link: L,
    radio: R,
    settings: SessionSettings,
    state: SessionState,
    notify: NotifyBuffer,
    outbound: OutputQueue,
    /// Bytes of the front command already on the device
    front_sent: usize,
    log: Option<RawLog>,
    pipe: Option<PipeChannel>,
    converter: Option<ConverterSupervisor>,
    pid_file: Option<PidFile>,
    stats: SessionStats,
}

impl<L: UartLink, R: RadioControl> SessionLoop<L, R> {
    /// Create a session around an unconnected link
    ///
    /// The session takes over `pid_file` and removes it at teardown.
    pub fn new(link: L, radio: R, settings: SessionSettings, pid_file: Option<PidFile>) -> Self {
        Self {
            link,
            radio,
            settings,
            state: SessionState::Disconnected,
            notify: NotifyBuffer::new(),
            outbound: OutputQueue::new(),
            front_sent: 0,
            log: None,
            pipe: None,
            converter: None,
            pid_file,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn notify_buffer(&self) -> &NotifyBuffer {
        &self.notify
    }

    pub fn output_queue(&self) -> &OutputQueue {
        &self.outbound
    }

    /// Acquire session resources and connect
    ///
    /// Opens the raw log, creates the command pipe, launches the converter
    /// and performs the first connect. Resources acquired before a failure
    /// stay owned by the session, so [`teardown`](Self::teardown) must still
    /// be called.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: the loop must not start
    pub async fn start(&mut self) -> Result<()> {
        let log = RawLog::create(&self.settings.log_path)?;
        info!("Logging to {}", log.path().display());
        self.log = Some(log);

        self.pipe = Some(PipeChannel::create(&self.settings.pipe_path)?);

        if let Some(command) = &self.settings.converter {
            self.converter = Some(ConverterSupervisor::launch(
                command,
                &self.settings.log_path,
                &self.settings.table_path,
            )?);
        }

        self.reconnect().await
    }

    /// Drive iterations until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if self.state != SessionState::Streaming {
            return Err(BridgeError::NotConnected);
        }

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Streaming from {}", self.link.info());
        loop {
            // Keep draining without sleeping while notifications are backed up
            let backlog = !self.notify.is_empty();
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = async {
                    if backlog {
                        tokio::task::yield_now().await;
                    } else {
                        ticker.tick().await;
                    }
                } => {}
            }

            self.iterate().await;
        }

        info!("Shutdown requested");
        self.state = SessionState::ShuttingDown;
        Ok(())
    }

    /// One loop iteration
    pub async fn iterate(&mut self) {
        self.log_next_notification();
        self.poll_pipe();
        self.flush_outbound().await;
        self.check_liveness().await;
    }

    /// Step 1: append the oldest notification to the raw log
    ///
    /// # Returns
    ///
    /// * `bool` - whether a notification was taken from the buffer
    pub fn log_next_notification(&mut self) -> bool {
        let Some(payload) = self.notify.pop() else {
            return false;
        };

        match self.log.as_mut() {
            Some(log) => match log.append(&payload) {
                Ok(()) => self.stats.lines_logged += 1,
                Err(e) => error!("Failed to log notification {:?}: {}", payload, e),
            },
            None => warn!("No log open, dropping notification {:?}", payload),
        }
        true
    }

    /// Step 2: move one ready command from the pipe to the output queue
    pub fn poll_pipe(&mut self) {
        let Some(pipe) = self.pipe.as_mut() else {
            return;
        };
        if !pipe.ready_within_zero_timeout() {
            return;
        }

        match pipe.read_line_if_any() {
            Ok(Some(command)) => {
                info!("Input: {}", command);
                self.outbound.push(command);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read command pipe: {}", e),
        }
    }

    /// Step 3: send queued commands oldest-first, stopping at the first
    /// failure. Nothing is sent unless the link is streaming.
    ///
    /// Commands go out in chunks of the link's maximum write length. After a
    /// failed chunk the next flush resumes at that chunk, so no byte reaches
    /// the device twice.
    ///
    /// # Returns
    ///
    /// * `usize` - commands completed in this call
    pub async fn flush_outbound(&mut self) -> usize {
        if self.state != SessionState::Streaming {
            return 0;
        }

        let chunk_size = self.link.max_write_len().max(1);
        let mut sent = 0;
        while let Some(command) = self.outbound.front() {
            let payload = format!("{}{}", command, COMMAND_TERMINATOR);
            let bytes = payload.as_bytes();

            while self.front_sent < bytes.len() {
                let end = (self.front_sent + chunk_size).min(bytes.len());
                if let Err(e) = self.link.write(&bytes[self.front_sent..end]).await {
                    debug!(
                        "Send failed at byte {} of {:?}, {} command(s) kept queued: {}",
                        self.front_sent,
                        command,
                        self.outbound.len(),
                        e
                    );
                    return sent;
                }
                self.front_sent = end;
            }

            self.outbound.pop_front();
            self.front_sent = 0;
            self.stats.commands_sent += 1;
            sent += 1;
        }
        sent
    }

    /// Step 4: verify the link and reconnect if it dropped
    pub async fn check_liveness(&mut self) {
        if let Some(converter) = self.converter.as_mut() {
            converter.check();
        }

        match self.state {
            SessionState::ShuttingDown | SessionState::Terminated => return,
            SessionState::Streaming => {
                if self.link.is_connected().await {
                    return;
                }
                warn!("Lost connection to {}", self.link.info());
                self.state = SessionState::Disconnected;
            }
            _ => {}
        }

        match self.reconnect().await {
            Ok(()) if self.state == SessionState::Streaming => {
                self.stats.reconnects += 1;
                info!("Reconnected to {}", self.link.info());
            }
            Ok(()) => {}
            Err(e) => warn!("Reconnect failed, retrying next iteration: {}", e),
        }
    }

    /// Connect, identify and subscribe
    ///
    /// A no-op while a connect attempt is already in progress.
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.state == SessionState::Connecting {
            debug!("Connect already in progress");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        if let Err(e) = self.link.connect(self.settings.connect_timeout).await {
            self.state = SessionState::Disconnected;
            return Err(e);
        }

        self.state = SessionState::Identifying;
        if let Err(e) = self.identify_and_subscribe().await {
            // Force a full retry on the next liveness check
            if let Err(disconnect_err) = self.link.disconnect().await {
                debug!("Disconnect after failed setup also failed: {}", disconnect_err);
            }
            self.state = SessionState::Disconnected;
            return Err(e);
        }

        self.state = SessionState::Streaming;
        Ok(())
    }

    async fn identify_and_subscribe(&mut self) -> Result<()> {
        self.link.identify().await?;
        self.link.subscribe(self.notify.clone()).await
    }

    /// Release everything, in order, each step isolated from the others
    ///
    /// Order: converter, raw log, command pipe, pid file, device, adapter.
    /// Runs once; later calls return `Ok(())` without doing anything.
    ///
    /// # Errors
    ///
    /// Returns `Teardown` listing every step that failed
    pub async fn teardown(&mut self) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        self.state = SessionState::ShuttingDown;

        // Whatever is still buffered goes to the log before it closes
        while self.log.is_some() && self.log_next_notification() {}

        info!(
            "Session stats: {} lines logged, {} commands sent, {} reconnects",
            self.stats.lines_logged, self.stats.commands_sent, self.stats.reconnects
        );
        if !self.outbound.is_empty() {
            warn!("Dropping {} unsent command(s)", self.outbound.len());
        }

        let mut teardown = Teardown::new();

        // Converter must be gone before the log closes
        if let Some(converter) = self.converter.take() {
            teardown.record("stop converter", converter.terminate(self.settings.converter_grace).await);
        }
        if let Some(log) = self.log.take() {
            teardown.record("close log", log.close());
        }
        if let Some(pipe) = self.pipe.take() {
            teardown.record("close pipe", pipe.close());
        }
        if let Some(pid_file) = self.pid_file.take() {
            teardown.record("remove pid file", pid_file.remove());
        }
        teardown.record("disconnect device", self.link.disconnect().await);
        teardown.record("power off adapter", self.radio.power_off().await);

        self.state = SessionState::Terminated;
        teardown.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::link::{MockRadioControl, MockUartLink};
    use crate::ble::DeviceInfo;
    use crate::telemetry::raw_log::mocks::MemorySink;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const TELEMETRY: &str = "##00AB_0001_0010-0020-0030_12_00FF\r\n";

    fn settings(dir: &TempDir) -> SessionSettings {
        SessionSettings {
            log_path: dir.path().join("ble_log.txt"),
            pipe_path: dir.path().join("bleinput"),
            table_path: dir.path().join("ble_log.csv"),
            converter: None,
            connect_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
            converter_grace: Duration::from_millis(500),
        }
    }

    fn info() -> DeviceInfo {
        DeviceInfo {
            id: "mock".to_string(),
            name: Some("Hatch".to_string()),
            address: None,
        }
    }

    fn base_link() -> MockUartLink {
        let mut link = MockUartLink::new();
        link.expect_info().returning(info);
        link.expect_max_write_len().returning(|| 20);
        link
    }

    fn quiet_radio() -> MockRadioControl {
        let mut radio = MockRadioControl::new();
        radio.expect_power_off().times(1).returning(|| Ok(()));
        radio
    }

    fn open_writer(path: &std::path::Path) -> std::fs::File {
        std::fs::OpenOptions::new().write(true).open(path).unwrap()
    }

    #[tokio::test]
    async fn test_full_session_logs_notifications_and_forwards_commands() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let sent: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

        let mut link = base_link();
        link.expect_connect().times(1).returning(|_| Ok(()));
        link.expect_identify().times(1).returning(|| Ok(()));
        link.expect_subscribe().times(1).returning(|sink| {
            sink.push(TELEMETRY.to_string());
            sink.push("boot ".to_string());
            sink.push("ok\n".to_string());
            Ok(())
        });
        link.expect_is_connected().returning(|| true);
        let recorder = sent.clone();
        link.expect_write().returning(move |data| {
            recorder.lock().unwrap().push(data.to_vec());
            Ok(())
        });
        link.expect_disconnect().times(1).returning(|| Ok(()));

        let pid_path = dir.path().join("bridge.pid");
        let pid_file = PidFile::create(&pid_path).unwrap();
        let mut session = SessionLoop::new(link, quiet_radio(), settings.clone(), Some(pid_file));

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Streaming);

        let mut writer = open_writer(&settings.pipe_path);
        writer.write_all(b"A\nB\n").unwrap();

        session.run(tokio::time::sleep(Duration::from_millis(100))).await.unwrap();
        assert_eq!(session.state(), SessionState::ShuttingDown);

        session.teardown().await.unwrap();
        assert_eq!(session.state(), SessionState::Terminated);

        let log = std::fs::read_to_string(&settings.log_path).unwrap();
        assert_eq!(log, format!("{}boot ok\n", TELEMETRY));
        assert_eq!(*sent.lock().unwrap(), vec![b"A\r\n".to_vec(), b"B\r\n".to_vec()]);
        assert_eq!(session.stats().lines_logged, 3);
        assert_eq!(session.stats().commands_sent, 2);

        assert!(!settings.pipe_path.exists());
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn test_run_requires_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = SessionLoop::new(base_link(), MockRadioControl::new(), settings(&dir), None);

        let result = session.run(async {}).await;
        assert!(matches!(result, Err(BridgeError::NotConnected)));
    }

    #[tokio::test]
    async fn test_start_fails_when_initial_connect_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);

        let mut link = base_link();
        link.expect_connect().times(1).returning(|_| Err(BridgeError::ConnectTimeout(100)));
        link.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session = SessionLoop::new(link, quiet_radio(), settings.clone(), None);
        let result = session.start().await;

        assert!(matches!(result, Err(BridgeError::ConnectTimeout(100))));
        assert_eq!(session.state(), SessionState::Disconnected);

        // Resources acquired before the failure are still released
        assert!(settings.pipe_path.exists());
        session.teardown().await.unwrap();
        assert!(!settings.pipe_path.exists());
    }

    #[tokio::test]
    async fn test_start_fails_when_converter_cannot_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&dir);
        settings.converter = Some(ConverterCommand {
            program: PathBuf::from("/nonexistent/converter_12345"),
            args: vec![],
        });

        // Never reaches the connect step
        let mut link = base_link();
        link.expect_disconnect().returning(|| Ok(()));

        let mut session = SessionLoop::new(link, quiet_radio(), settings, None);
        let result = session.start().await;

        assert!(matches!(result, Err(BridgeError::ConverterLaunch { .. })));
        assert_eq!(session.state(), SessionState::Disconnected);
        session.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_stops_at_first_failure_and_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let sent: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

        let mut link = base_link();
        let counter = attempts.clone();
        let recorder = sent.clone();
        // First flush: cmd1 ok, cmd2 fails. Second flush: cmd2, cmd3 ok.
        link.expect_write().times(4).returning(move |data| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                return Err(BridgeError::NotConnected);
            }
            recorder.lock().unwrap().push(data.to_vec());
            Ok(())
        });

        let mut session = SessionLoop::new(link, MockRadioControl::new(), settings(&dir), None);
        session.state = SessionState::Streaming;
        for command in ["cmd1", "cmd2", "cmd3"] {
            session.output_queue().push(command.to_string());
        }

        assert_eq!(session.flush_outbound().await, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(session.output_queue().pending(), vec!["cmd2", "cmd3"]);

        assert_eq!(session.flush_outbound().await, 2);
        assert!(session.output_queue().is_empty());
        assert_eq!(
            *sent.lock().unwrap(),
            vec![b"cmd1\r\n".to_vec(), b"cmd2\r\n".to_vec(), b"cmd3\r\n".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_failed_chunk_resumes_without_resending_earlier_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let wire: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let mut link = MockUartLink::new();
        link.expect_info().returning(info);
        link.expect_max_write_len().returning(|| 4);
        let counter = attempts.clone();
        let recorder = wire.clone();
        // "ABCDEFGHIJ\r\n" goes out as ABCD, EFGH, IJ\r\n; the second chunk fails once
        link.expect_write().times(5).returning(move |data| {
            assert!(data.len() <= 4);
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(BridgeError::NotConnected);
            }
            recorder.lock().unwrap().extend_from_slice(data);
            Ok(())
        });

        let mut session = SessionLoop::new(link, MockRadioControl::new(), settings(&dir), None);
        session.state = SessionState::Streaming;
        session.output_queue().push("ABCDEFGHIJ".to_string());
        session.output_queue().push("K".to_string());

        assert_eq!(session.flush_outbound().await, 0);
        assert_eq!(*wire.lock().unwrap(), b"ABCD".to_vec());
        assert_eq!(session.output_queue().len(), 2);

        // Resumes at EFGH, then sends the next command
        assert_eq!(session.flush_outbound().await, 2);
        assert_eq!(*wire.lock().unwrap(), b"ABCDEFGHIJ\r\nK\r\n".to_vec());
        assert!(session.output_queue().is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_flush_holds_commands_while_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        // No write expectation: any send would panic
        let mut session = SessionLoop::new(base_link(), MockRadioControl::new(), settings(&dir), None);
        session.output_queue().push("hold".to_string());

        assert_eq!(session.flush_outbound().await, 0);
        assert_eq!(session.output_queue().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_is_noop_while_connecting() {
        let dir = tempfile::tempdir().unwrap();
        // No connect expectation: a second attempt would panic
        let mut session = SessionLoop::new(base_link(), MockRadioControl::new(), settings(&dir), None);
        session.state = SessionState::Connecting;

        session.reconnect().await.unwrap();
        session.check_liveness().await;
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_liveness_ok_does_not_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut link = base_link();
        link.expect_is_connected().times(2).returning(|| true);

        let mut session = SessionLoop::new(link, MockRadioControl::new(), settings(&dir), None);
        session.state = SessionState::Streaming;

        session.check_liveness().await;
        session.check_liveness().await;
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.stats().reconnects, 0);
    }

    #[tokio::test]
    async fn test_lost_connection_is_retried_until_it_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let connects = Arc::new(AtomicUsize::new(0));

        let mut link = base_link();
        link.expect_is_connected().times(1).returning(|| false);
        let counter = connects.clone();
        link.expect_connect().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BridgeError::ConnectTimeout(100))
            } else {
                Ok(())
            }
        });
        link.expect_identify().times(1).returning(|| Ok(()));
        link.expect_subscribe().times(1).returning(|_| Ok(()));

        let mut session = SessionLoop::new(link, MockRadioControl::new(), settings(&dir), None);
        session.state = SessionState::Streaming;

        session.check_liveness().await;
        assert_eq!(session.state(), SessionState::Disconnected);

        session.check_liveness().await;
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(session.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_failed_identify_disconnects_for_full_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut link = base_link();
        link.expect_connect().times(1).returning(|_| Ok(()));
        link.expect_identify().times(1).returning(|| Err(BridgeError::ServiceNotFound));
        link.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session = SessionLoop::new(link, MockRadioControl::new(), settings(&dir), None);
        let result = session.reconnect().await;

        assert!(matches!(result, Err(BridgeError::ServiceNotFound)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_teardown_isolates_failing_log_close() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);

        let mut link = base_link();
        link.expect_disconnect().times(1).returning(|| Ok(()));

        let pid_path = dir.path().join("bridge.pid");
        let pid_file = PidFile::create(&pid_path).unwrap();
        let mut session = SessionLoop::new(link, quiet_radio(), settings.clone(), Some(pid_file));

        let sink = MemorySink::default();
        sink.set_fail_sync(true);
        session.log = Some(RawLog::with_sink(Box::new(sink), settings.log_path.clone()));
        session.pipe = Some(PipeChannel::create(&settings.pipe_path).unwrap());

        match session.teardown().await {
            Err(BridgeError::Teardown(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step, "close log");
            }
            other => panic!("Expected Teardown error, got: {:?}", other),
        }

        assert!(!settings.pipe_path.exists());
        assert!(!pid_path.exists());
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_teardown_continues_after_device_failure_and_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut link = base_link();
        link.expect_disconnect().times(1).returning(|| Err(BridgeError::NotConnected));

        let mut session = SessionLoop::new(link, quiet_radio(), settings(&dir), None);

        let first = session.teardown().await;
        assert!(matches!(first, Err(BridgeError::Teardown(ref f)) if f[0].step == "disconnect device"));

        // Second call does nothing (times(1) expectations would panic otherwise)
        assert!(session.teardown().await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_flushes_buffered_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut link = base_link();
        link.expect_disconnect().returning(|| Ok(()));

        let mut session = SessionLoop::new(link, quiet_radio(), settings.clone(), None);
        session.log = Some(RawLog::create(&settings.log_path).unwrap());
        session.notify_buffer().push("late\n".to_string());

        session.teardown().await.unwrap();
        assert_eq!(std::fs::read_to_string(&settings.log_path).unwrap(), "late\n");
    }

    #[tokio::test]
    async fn test_poll_pipe_enqueues_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut session = SessionLoop::new(base_link(), MockRadioControl::new(), settings.clone(), None);
        session.pipe = Some(PipeChannel::create(&settings.pipe_path).unwrap());

        session.poll_pipe();
        assert!(session.output_queue().is_empty());

        open_writer(&settings.pipe_path).write_all(b"first\nsecond\n").unwrap();
        session.poll_pipe();
        assert_eq!(session.output_queue().pending(), vec!["first"]);
        session.poll_pipe();
        assert_eq!(session.output_queue().pending(), vec!["first", "second"]);
    }

    #[test]
    fn test_settings_keep_table_apart_from_log() {
        let mut config = Config::default();
        config.session.log_path = Some(PathBuf::from("capture.csv"));
        config.converter.enabled = false;

        let settings = SessionSettings::from_config(&config).unwrap();
        assert_eq!(settings.log_path, PathBuf::from("capture.csv"));
        assert_ne!(settings.table_path, settings.log_path);
    }

    #[test]
    fn test_settings_reject_table_equal_to_log() {
        let mut config = Config::default();
        config.session.log_path = Some(PathBuf::from("same.txt"));
        config.converter.table_path = Some(PathBuf::from("same.txt"));
        config.converter.enabled = false;

        let result = SessionSettings::from_config(&config);
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_settings_from_default_config() {
        let mut config = Config::default();
        config.session.log_path = Some(PathBuf::from("run.txt"));
        config.converter.enabled = false;

        let settings = SessionSettings::from_config(&config).unwrap();
        assert_eq!(settings.log_path, PathBuf::from("run.txt"));
        assert_eq!(settings.table_path, PathBuf::from("run.csv"));
        assert_eq!(settings.pipe_path, PathBuf::from("bleinput"));
        assert!(settings.converter.is_none());
        assert_eq!(settings.connect_timeout, Duration::from_millis(5000));
    }
}
