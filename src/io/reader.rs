// src/io/reader.rs
//
// Reader worker: drains the serial port, splits the byte stream on 0x00
// delimiters, COBS-decodes each frame, and pushes decoded payloads into the
// ring. Arrival is bursty, so the loop stays tight while traffic flows and
// backs off adaptively while idle (0 -> 1 -> 2 -> 3 ms).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::cobs;
use crate::io::manager::EngineShared;
use crate::io::{rt, RxWait, SerialStream, FRAME_BUF, READ_CHUNK, RX_WAIT};

/// Pause after a transient read error.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Idle back-off ceiling, in milliseconds.
const MAX_BACKOFF_MS: u64 = 3;

pub(crate) fn run(shared: Arc<EngineShared>, mut stream: Box<dyn SerialStream>) {
    rt::promote_current_thread();

    let mut inbuf = vec![0u8; READ_CHUNK];
    let mut framebuf = vec![0u8; FRAME_BUF];
    let mut frame_len = 0usize;
    let mut scratch = vec![0u8; FRAME_BUF];
    let mut backoff_ms: u64 = 0;

    while shared.alive.load(Ordering::SeqCst) {
        let n = match stream.read_available(&mut inbuf) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("serial read error: {}", e);
                std::thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };
        if !shared.alive.load(Ordering::SeqCst) {
            break;
        }

        if n > 0 {
            backoff_ms = 0;
            split_and_push(&shared, &inbuf[..n], &mut framebuf, &mut frame_len, &mut scratch);
            continue;
        }

        // Nothing buffered: wait for RX instead of spinning.
        match stream.wait_rx(RX_WAIT) {
            RxWait::Ready => continue,
            RxWait::Gone => {
                log::warn!("serial port lost, reader exiting");
                shared.port_open.store(false, Ordering::SeqCst);
                break;
            }
            RxWait::Timeout => {
                if backoff_ms < MAX_BACKOFF_MS {
                    backoff_ms += 1;
                }
                std::thread::sleep(Duration::from_millis(backoff_ms));
            }
        }
    }

    log::debug!("reader worker stopped");
}

/// Walk one drained chunk: accumulate bytes between 0x00 delimiters into the
/// frame buffer and hand each completed frame to the decoder.
fn split_and_push(
    shared: &EngineShared,
    chunk: &[u8],
    framebuf: &mut [u8],
    frame_len: &mut usize,
    scratch: &mut [u8],
) {
    let mut p = 0usize;
    while p < chunk.len() {
        match chunk[p..].iter().position(|&b| b == 0x00) {
            Some(rel) => {
                accumulate(framebuf, frame_len, &chunk[p..p + rel]);
                if *frame_len > 0 && shared.accepting.load(Ordering::SeqCst) {
                    // Malformed frames are dropped silently; the next
                    // delimiter resynchronises the stream.
                    if let Ok(olen) = cobs::decode(&framebuf[..*frame_len], scratch) {
                        shared.ring.push(&scratch[..olen]);
                    }
                }
                *frame_len = 0;
                p += rel + 1;
            }
            None => {
                accumulate(framebuf, frame_len, &chunk[p..]);
                break;
            }
        }
    }
}

/// Append to the frame accumulator; on overflow drop the partial frame so
/// the reader resynchronises at the next delimiter.
fn accumulate(framebuf: &mut [u8], frame_len: &mut usize, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if *frame_len + bytes.len() <= framebuf.len() {
        framebuf[*frame_len..*frame_len + bytes.len()].copy_from_slice(bytes);
        *frame_len += bytes.len();
    } else {
        *frame_len = 0;
    }
}
