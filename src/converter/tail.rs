//! Log-to-table conversion
//!
//! Follows the raw log as it grows, decodes every complete line and writes one
//! table row per telemetry record. Non-telemetry lines are skipped.

use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::Result;
use crate::telemetry::{decode, TableFormat};

/// Size of a single log read
const READ_CHUNK_SIZE: usize = 4096;

/// Incremental line splitter and row writer
pub struct TableWriter<W: Write> {
    out: W,
    format: TableFormat,
    partial: Vec<u8>,
    rows: u64,
    skipped: u64,
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W, format: TableFormat) -> Self {
        Self { out, format, partial: Vec::new(), rows: 0, skipped: 0 }
    }

    /// Consume raw log bytes; lines may be split across calls
    pub fn feed(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.partial.extend_from_slice(bytes);

        while let Some(newline) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=newline).collect();
            self.convert_line(&line)?;
        }
        Ok(())
    }

    /// Convert a trailing unterminated line, if any, and return the writer
    pub fn finish(mut self) -> io::Result<W> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.convert_line(&line)?;
        }
        self.out.flush()?;
        debug!("Converter wrote {} rows, skipped {} lines", self.rows, self.skipped);
        Ok(self.out)
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Lines that did not decode
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn convert_line(&mut self, line: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(line);
        match decode(&text) {
            Some(record) => {
                self.out.write_all(self.format.render(&record).as_bytes())?;
                self.out.flush()?;
                self.rows += 1;
            }
            None => self.skipped += 1,
        }
        Ok(())
    }
}

/// Tail `log_path` into `table_path` until `shutdown` resolves
///
/// Shutdown is honored between any two reads, even while the log keeps
/// growing. The log is then drained up to its length at that moment, so
/// nothing written before the signal is lost.
///
/// # Returns
///
/// * `Result<u64>` - Number of rows written
pub async fn tail_log<F>(
    log_path: &Path,
    table_path: &Path,
    format: TableFormat,
    poll_interval: Duration,
    shutdown: F,
) -> Result<u64>
where
    F: Future<Output = ()>,
{
    let mut log = tokio::fs::File::open(log_path).await?;
    let table = File::create(table_path)?;
    let mut writer = TableWriter::new(table, format);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut consumed: u64 = 0;

    info!("Converting {} -> {} ({})", log_path.display(), table_path.display(), format);

    tokio::pin!(shutdown);
    loop {
        let n = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            read = log.read(&mut buf) => read?,
        };
        if n > 0 {
            consumed += n as u64;
            writer.feed(&buf[..n])?;
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    let end = log.metadata().await?.len();
    debug!("Draining log from byte {} to {}", consumed, end);
    while consumed < end {
        let want = ((end - consumed) as usize).min(buf.len());
        let n = log.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        writer.feed(&buf[..n])?;
    }

    let rows = writer.rows();
    writer.finish()?;
    info!("Converter finished, {} rows", rows);
    Ok(rows)
}
