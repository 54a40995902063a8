// src/queue.rs
//
// Application-facing byte-message queues. The engine never owns these: the
// caller hands the manager one inbound and one outbound queue through the
// ByteQueue capability trait, mirroring the get/get_nowait/put_nowait
// surface the instrument tooling expects.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Capability interface for the caller-owned message queues.
///
/// The deliverer produces into the inbound queue with [`ByteQueue::push`];
/// the writer consumes the outbound queue with [`ByteQueue::pop_timeout`]
/// and [`ByteQueue::pop_nowait`]. Each message is an independent byte
/// sequence; implementations must preserve FIFO order.
pub trait ByteQueue: Send + Sync {
    /// Append a message; never blocks.
    fn push(&self, msg: Vec<u8>);

    /// Remove the oldest message if one is immediately available.
    fn pop_nowait(&self) -> Option<Vec<u8>>;

    /// Remove the oldest message, waiting up to `timeout` for one to arrive.
    fn pop_timeout(&self, timeout: Duration) -> Option<Vec<u8>>;
}

/// Unbounded FIFO queue: the crate-provided [`ByteQueue`] implementation.
pub struct FrameQueue {
    inner: Mutex<VecDeque<Vec<u8>>>,
    cond: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        FrameQueue {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteQueue for FrameQueue {
    fn push(&self, msg: Vec<u8>) {
        self.inner.lock().unwrap().push_back(msg);
        self.cond.notify_one();
    }

    fn pop_nowait(&self) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().pop_front()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap();
        guard.pop_front()
    }
}

// ============================================================================
// Tests
// ============================================================================
