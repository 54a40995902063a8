// src/io/writer.rs
//
// Writer worker: dequeues byte messages from the caller's outbound queue,
// coalesces bursts into a single buffer, and issues one OS write per batch.
// The 1 ms timed dequeue is deliberate: a longer block stalls the small
// follow-on messages that firmware download emits between data chunks.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::io::manager::EngineShared;
use crate::io::{SerialStream, WRITER_POLL, WRITE_BATCH};

pub(crate) fn run(shared: Arc<EngineShared>, mut stream: Box<dyn SerialStream>) {
    let mut buf = vec![0u8; WRITE_BATCH];

    while shared.alive.load(Ordering::SeqCst) {
        if !shared.accepting.load(Ordering::SeqCst) {
            break;
        }

        let first = match shared.outbound.pop_timeout(WRITER_POLL) {
            Some(msg) => msg,
            None => continue,
        };
        if !shared.alive.load(Ordering::SeqCst) || !shared.accepting.load(Ordering::SeqCst) {
            break;
        }

        let mut total = fill(&mut buf, 0, &first);

        // Opportunistically drain further messages to coalesce the burst.
        while total < buf.len() {
            match shared.outbound.pop_nowait() {
                Some(msg) if total + msg.len() <= buf.len() => {
                    total = fill(&mut buf, total, &msg);
                }
                Some(msg) => {
                    // Batch full: send what we have, then the oversize tail.
                    flush(&mut stream, &buf[..total]);
                    total = fill(&mut buf, 0, &msg);
                }
                None => break,
            }
        }

        if total > 0 {
            flush(&mut stream, &buf[..total]);
        }
    }

    log::debug!("writer worker stopped");
}

fn fill(buf: &mut [u8], at: usize, msg: &[u8]) -> usize {
    // Messages longer than the batch buffer cannot be sent unsplit; the
    // command layer never produces them.
    let n = msg.len().min(buf.len() - at);
    buf[at..at + n].copy_from_slice(&msg[..n]);
    at + n
}

/// One bounded write for the batch. A timeout (0 written) drops the batch;
/// a hard error is logged and likewise drops it.
fn flush(stream: &mut Box<dyn SerialStream>, batch: &[u8]) {
    match stream.write_bounded(batch) {
        Ok(0) => log::warn!("serial write timed out, dropped {} bytes", batch.len()),
        Ok(n) if n < batch.len() => {
            log::warn!("short serial write: {} of {} bytes", n, batch.len())
        }
        Ok(_) => {}
        Err(e) => log::warn!("serial write error: {}", e),
    }
}
