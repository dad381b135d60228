//! # Line Queues
//!
//! Both queues are strict FIFOs: lines are pushed at the back and taken from
//! the front. Each is guarded by a mutex because its producer and consumer
//! may run on different tasks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutex-guarded FIFO of lines
#[derive(Debug, Clone, Default)]
struct LineQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LineQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panicking holder cannot leave a VecDeque half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Notification payloads waiting to be logged
///
/// Cloned into the notification forwarding task, which only ever calls
/// [`NotifyBuffer::push`].
#[derive(Debug, Clone, Default)]
pub struct NotifyBuffer {
    queue: LineQueue,
}

impl NotifyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload. Never blocks beyond the lock and never panics.
    pub fn push(&self, payload: String) {
        self.queue.lock().push_back(payload);
    }

    /// Take the oldest payload
    pub fn pop(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Commands waiting to be written to the device
#[derive(Debug, Clone, Default)]
pub struct OutputQueue {
    queue: LineQueue,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a command behind everything already pending
    pub fn push(&self, command: String) {
        self.queue.lock().push_back(command);
    }

    /// Oldest pending command, left in place
    pub fn front(&self) -> Option<String> {
        self.queue.lock().front().cloned()
    }

    /// Remove the oldest pending command after a successful send
    pub fn pop_front(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Snapshot of pending commands, oldest first
    pub fn pending(&self) -> Vec<String> {
        self.queue.lock().iter().cloned().collect()
    }
}
