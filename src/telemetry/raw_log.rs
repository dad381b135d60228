//! # Raw Session Log
//!
//! Append-only text log of every notification payload received from the
//! device. Each write is flushed and synced before returning, so the
//! converter tailing the file never waits on buffered data.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Destination of the raw log, a file in production
pub trait LogSink: Write + Send {
    /// Push written data down to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Raw notification log
pub struct RawLog {
    sink: Box<dyn LogSink>,
    path: PathBuf,
    bytes_written: u64,
}

impl std::fmt::Debug for RawLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawLog")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl RawLog {
    /// Create (or truncate) the log file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self::with_sink(Box::new(file), path))
    }

    /// Wrap an arbitrary sink; `path` is only used for reporting
    pub fn with_sink(sink: Box<dyn LogSink>, path: PathBuf) -> Self {
        Self { sink, path, bytes_written: 0 }
    }

    /// Append one payload verbatim and sync it
    pub fn append(&mut self, payload: &str) -> Result<()> {
        self.sink.write_all(payload.as_bytes())?;
        self.sink.flush()?;
        self.sink.sync()?;
        self.bytes_written += payload.len() as u64;
        debug!("Logged {} bytes", payload.len());
        Ok(())
    }

    /// Final flush and sync; the handle is released on return
    pub fn close(mut self) -> Result<()> {
        self.sink.flush()?;
        self.sink.sync()?;
        debug!("Closed log {} ({} bytes)", self.path.display(), self.bytes_written);
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total payload bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
