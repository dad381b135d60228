//! # Command Pipe Module
//!
//! Named pipe (FIFO) that delivers operator commands into the running session.
//!
//! This module handles:
//! - Creating the FIFO fresh each session (stale entries are removed first)
//! - Zero-timeout readiness checks with `poll(2)`
//! - Non-blocking, line-oriented reads
//! - Closing and unlinking the FIFO at teardown
//!
//! Any line written to the pipe, for example with
//! `echo "A" >> bleinput`, becomes one command.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use bytes::{Buf, BytesMut};
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Size of a single non-blocking read
const READ_CHUNK_SIZE: usize = 512;

/// Longest command line kept; longer lines are dropped whole
pub const MAX_LINE_LEN: usize = 4096;

/// Single-reader command FIFO
pub struct PipeChannel {
    /// Read end, opened non-blocking
    reader: File,
    /// Our own write end; keeps the FIFO from reporting end-of-file when
    /// external writers come and go
    _keepalive: File,
    /// Bytes read but not yet returned as a line
    pending: BytesMut,
    /// Skipping the rest of an over-long line
    discarding: bool,
    path: PathBuf,
}

impl std::fmt::Debug for PipeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeChannel")
            .field("path", &self.path)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl PipeChannel {
    /// Create the FIFO at `path` and open it for non-blocking reads
    ///
    /// # Errors
    ///
    /// Returns error if a stale entry cannot be removed, or the FIFO cannot be
    /// created or opened
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale pipe entry {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR)?;

        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)?;

        // Succeeds without blocking because a reader now exists
        let keepalive = OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)?;

        info!("Command pipe ready at {}", path.display());

        Ok(Self {
            reader,
            _keepalive: keepalive,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            discarding: false,
            path,
        })
    }

    /// Whether a line may be read right now, without waiting
    pub fn ready_within_zero_timeout(&self) -> bool {
        if self.has_complete_line() {
            return true;
        }

        let mut fds = [PollFd::new(self.reader.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(n) if n > 0 => fds[0]
                .revents()
                .is_some_and(|revents| revents.contains(PollFlags::POLLIN)),
            Ok(_) => false,
            Err(e) => {
                debug!("Pipe poll failed: {}", e);
                false
            }
        }
    }

    /// Return the next complete line, without its terminator, if one is
    /// available. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns error on a read failure other than "would block"
    pub fn read_line_if_any(&mut self) -> Result<Option<String>> {
        if !self.has_complete_line() && self.ready_within_zero_timeout() {
            self.fill()?;
        }
        Ok(self.take_line())
    }

    /// Path of the FIFO
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the handles and unlink the FIFO, tolerating an already removed
    /// entry
    pub fn close(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed pipe {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drain whatever the FIFO currently holds into `pending`
    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    self.limit_pending();
                    if n < chunk.len() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drop an unterminated line once it outgrows `MAX_LINE_LEN`, along with
    /// everything up to its eventual newline
    fn limit_pending(&mut self) {
        if self.discarding {
            match self.pending.iter().position(|&b| b == b'\n') {
                Some(newline) => {
                    self.pending.advance(newline + 1);
                    self.discarding = false;
                }
                None => self.pending.clear(),
            }
        }

        if !self.discarding && !self.has_complete_line() && self.pending.len() > MAX_LINE_LEN {
            warn!("Discarding command line longer than {} bytes", MAX_LINE_LEN);
            self.pending.clear();
            self.discarding = true;
        }
    }

    fn has_complete_line(&self) -> bool {
        self.pending.contains(&b'\n')
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line = self.pending.split_to(newline);
        self.pending.advance(1);

        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
