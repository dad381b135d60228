//! Trait abstraction for the device link and radio to enable testing

use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use super::DeviceInfo;
use crate::error::Result;
use crate::session::NotifyBuffer;

/// Operations the session loop performs on its one UART peripheral
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UartLink: Send {
    /// Cached identity of the peripheral
    fn info(&self) -> DeviceInfo;

    /// Open the connection, giving up after `timeout`.
    /// Connecting an already connected device is not an error.
    async fn connect(&mut self, timeout: Duration) -> Result<()>;

    /// Live connection state as reported by the radio stack
    async fn is_connected(&self) -> bool;

    /// Discover the UART service and its TX and RX characteristics
    async fn identify(&mut self) -> Result<()>;

    /// Subscribe to RX notifications; every payload is pushed onto `sink`
    async fn subscribe(&mut self, sink: NotifyBuffer) -> Result<()>;

    /// Largest payload a single [`write`](Self::write) may carry
    fn max_write_len(&self) -> usize;

    /// Write one payload of at most `max_write_len` bytes to the TX
    /// characteristic. Either all of `data` is sent or none of it.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&mut self) -> Result<()>;
}

/// Process-wide radio controls the session needs at teardown
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RadioControl: Send {
    /// Power the adapter down; the last teardown step
    async fn power_off(&mut self) -> Result<()>;
}
