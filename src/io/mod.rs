// src/io/mod.rs
//
// Native serial I/O engine: the port adapter, the three worker loops
// (reader, deliverer, writer), and the manager that owns their lifecycle.
// The engine moves opaque byte frames; payload interpretation lives in the
// layers above.

mod deliver;
mod manager;
mod port;
mod reader;
mod rt;
mod writer;

pub use manager::{SerialConfig, SerialManager};
pub use port::NativePort;

use std::time::Duration;

use crate::error::IoError;

// ============================================================================
// Engine constants
// ============================================================================

/// Reader drain buffer: one non-blocking read pulls at most this much.
pub(crate) const READ_CHUNK: usize = 16 * 1024;

/// Frame accumulator and COBS scratch size. A frame longer than this is
/// garbage; the accumulator resets to resynchronise.
pub(crate) const FRAME_BUF: usize = 64 * 1024;

/// Writer coalescing buffer: one OS write carries at most this much.
pub(crate) const WRITE_BATCH: usize = 64 * 1024;

/// Frames the deliverer pops per ring-lock acquisition.
pub(crate) const DELIVER_BATCH: usize = 256;

/// Reader RX wait and idle back-off cap.
pub(crate) const RX_WAIT: Duration = Duration::from_millis(3);

/// Deliverer wait on an empty ring.
pub(crate) const DELIVER_WAIT: Duration = Duration::from_millis(10);

/// Writer timed dequeue. Load-bearing: lengthening this stalls small
/// follow-on messages and slows firmware download.
pub(crate) const WRITER_POLL: Duration = Duration::from_millis(1);

// ============================================================================
// Serial stream seam
// ============================================================================

/// Outcome of waiting for receive data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxWait {
    /// The port reports incoming data (or a break/error condition to drain).
    Ready,
    /// The wait expired with nothing to read.
    Timeout,
    /// The port is no longer usable.
    Gone,
}

/// Byte-stream interface the worker loops run against.
///
/// [`NativePort`] implements this over a real serial device; tests and
/// alternate transports supply their own implementation via
/// [`SerialManager::start_with_streams`].
pub trait SerialStream: Send {
    /// Best-effort non-blocking drain into `buf`. Returns 0 when nothing is
    /// buffered; transient conditions (interrupt, short bounded wait
    /// expiring) also read as 0.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Write up to `data.len()` bytes within a bounded wait. Returns the
    /// number written; 0 means the wait expired and the batch should be
    /// dropped.
    fn write_bounded(&mut self, data: &[u8]) -> Result<usize, IoError>;

    /// Block until the port reports incoming data, the timeout expires, or
    /// the port is lost.
    fn wait_rx(&mut self, timeout: Duration) -> RxWait;
}
