// src/ring.rs
//
// Single-producer / single-consumer byte ring between the reader and the
// deliverer. Frames are stored as [u16 length LE][payload] with wrap-around
// at the arena edge; the cursors are continuous 64-bit counters so occupancy
// is simply head - tail. On overflow the incoming frame is dropped (never
// the oldest) and the drop counter advances.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Default arena size: 1 MiB of frame storage.
pub const RING_ARENA_SIZE: usize = 1024 * 1024;

/// Size of the per-frame length prefix.
const LEN_PREFIX: usize = std::mem::size_of::<u16>();

struct RingState {
    data: Box<[u8]>,
    head: u64,
    tail: u64,
    dropped: u64,
}

impl RingState {
    #[inline]
    fn occupancy(&self) -> usize {
        (self.head - self.tail) as usize
    }

    /// Copy `src` into the arena starting at continuous offset `at`,
    /// wrapping at the arena edge. At most two copies.
    fn write_wrapped(&mut self, at: u64, src: &[u8]) {
        let size = self.data.len();
        let start = (at as usize) % size;
        let first = src.len().min(size - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        if first < src.len() {
            let rest = src.len() - first;
            self.data[..rest].copy_from_slice(&src[first..]);
        }
    }

    /// Copy `dst.len()` bytes out of the arena starting at continuous
    /// offset `at`.
    fn read_wrapped(&self, at: u64, dst: &mut [u8]) {
        let size = self.data.len();
        let start = (at as usize) % size;
        let first = dst.len().min(size - start);
        dst[..first].copy_from_slice(&self.data[start..start + first]);
        if first < dst.len() {
            let rest = dst.len() - first;
            dst[first..].copy_from_slice(&self.data[..rest]);
        }
    }

    /// Length of the frame at the tail, or None when empty.
    fn peek_len(&self) -> Option<usize> {
        if self.head == self.tail {
            return None;
        }
        let mut len = [0u8; LEN_PREFIX];
        self.read_wrapped(self.tail, &mut len);
        Some(u16::from_le_bytes(len) as usize)
    }
}

/// Bounded SPSC byte ring carrying length-prefixed frames.
pub struct FrameRing {
    state: Mutex<RingState>,
    cond: Condvar,
}

impl FrameRing {
    /// Create a ring with the default 1 MiB arena.
    pub fn new() -> Self {
        Self::with_capacity(RING_ARENA_SIZE)
    }

    /// Create a ring with an explicit arena size.
    pub fn with_capacity(size: usize) -> Self {
        FrameRing {
            state: Mutex::new(RingState {
                data: vec![0u8; size].into_boxed_slice(),
                head: 0,
                tail: 0,
                dropped: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Push one frame. Returns false (and counts a drop) when the frame plus
    /// its length prefix does not fit in the free space, or when the frame
    /// is too long for the u16 length field. Signals the consumer once on
    /// success.
    pub fn push(&self, frame: &[u8]) -> bool {
        let mut st = self.state.lock().unwrap();

        let needed = LEN_PREFIX + frame.len();
        let available = st.data.len() - st.occupancy();
        if frame.len() > u16::MAX as usize || needed > available {
            st.dropped += 1;
            return false;
        }

        let head = st.head;
        st.write_wrapped(head, &(frame.len() as u16).to_le_bytes());
        st.write_wrapped(head + LEN_PREFIX as u64, frame);
        st.head += needed as u64;

        self.cond.notify_one();
        true
    }

    /// Pop one frame into `out`, returning its length, or None when the ring
    /// is empty. `out` must hold at least 65,535 bytes.
    pub fn pop_into(&self, out: &mut [u8]) -> Option<usize> {
        let mut st = self.state.lock().unwrap();
        let len = st.peek_len()?;
        let tail = st.tail;
        st.read_wrapped(tail + LEN_PREFIX as u64, &mut out[..len]);
        st.tail += (LEN_PREFIX + len) as u64;
        Some(len)
    }

    /// Pop up to `max_frames` frames under a single lock acquisition,
    /// preserving order. Returns an empty vec when the ring is empty.
    pub fn pop_batch(&self, max_frames: usize) -> Vec<Vec<u8>> {
        let mut st = self.state.lock().unwrap();
        let mut batch = Vec::new();
        while batch.len() < max_frames {
            let Some(len) = st.peek_len() else { break };
            let mut frame = vec![0u8; len];
            let tail = st.tail;
            st.read_wrapped(tail + LEN_PREFIX as u64, &mut frame);
            st.tail += (LEN_PREFIX + len) as u64;
            batch.push(frame);
        }
        batch
    }

    /// Block until the ring is non-empty or the timeout expires. Returns
    /// true when data is available.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let st = self.state.lock().unwrap();
        if st.head != st.tail {
            return true;
        }
        let (st, _) = self
            .cond
            .wait_timeout_while(st, timeout, |st| st.head == st.tail)
            .unwrap();
        st.head != st.tail
    }

    /// Wake a waiting consumer without pushing data (shutdown path).
    pub fn signal(&self) {
        self.cond.notify_one();
    }

    /// Exact number of buffered bytes (prefixes included).
    pub fn occupancy(&self) -> usize {
        self.state.lock().unwrap().occupancy()
    }

    /// Number of frames dropped due to overflow.
    pub fn dropped(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }

    /// True when no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_pop_roundtrip() {
        let ring = FrameRing::new();
        assert!(ring.push(&[0x01, 0x02, 0x03]));
        assert_eq!(ring.occupancy(), 5);

        let mut out = [0u8; 16];
        assert_eq!(ring.pop_into(&mut out), Some(3));
        assert_eq!(&out[..3], &[0x01, 0x02, 0x03]);
        assert!(ring.is_empty());
        assert_eq!(ring.pop_into(&mut out), None);
    }

    #[test]
    fn test_empty_frame_is_valid() {
        let ring = FrameRing::new();
        assert!(ring.push(&[]));
        let mut out = [0u8; 4];
        assert_eq!(ring.pop_into(&mut out), Some(0));
    }

    #[test]
    fn test_wraparound_preserves_bytes() {
        // Small arena so frames straddle the edge repeatedly.
        let ring = FrameRing::with_capacity(64);
        for round in 0..100u8 {
            let frame: Vec<u8> = (0..23).map(|i| round.wrapping_add(i)).collect();
            assert!(ring.push(&frame));
            let mut out = [0u8; 64];
            let n = ring.pop_into(&mut out).unwrap();
            assert_eq!(&out[..n], frame.as_slice());
        }
    }

    #[test]
    fn test_overflow_drops_incoming() {
        let ring = FrameRing::with_capacity(32);
        assert!(ring.push(&[0xAA; 20])); // 22 bytes with prefix
        let occupancy = ring.occupancy();

        // Does not fit: dropped, occupancy unchanged, oldest retained.
        assert!(!ring.push(&[0xBB; 20]));
        assert_eq!(ring.dropped(), 1);
        assert_eq!(ring.occupancy(), occupancy);

        let mut out = [0u8; 32];
        let n = ring.pop_into(&mut out).unwrap();
        assert_eq!(&out[..n], &[0xAA; 20]);
    }

    #[test]
    fn test_oversize_frame_is_dropped() {
        let ring = FrameRing::new();
        let big = vec![0u8; u16::MAX as usize + 1];
        assert!(!ring.push(&big));
        assert_eq!(ring.dropped(), 1);
    }

    #[test]
    fn test_pop_batch_preserves_order() {
        let ring = FrameRing::new();
        for i in 0..10u8 {
            assert!(ring.push(&[i; 4]));
        }
        let batch = ring.pop_batch(256);
        assert_eq!(batch.len(), 10);
        for (i, frame) in batch.iter().enumerate() {
            assert_eq!(frame.as_slice(), &[i as u8; 4]);
        }

        for i in 0..10u8 {
            assert!(ring.push(&[i]));
        }
        assert_eq!(ring.pop_batch(4).len(), 4);
        assert_eq!(ring.pop_batch(256).len(), 6);
    }

    #[test]
    fn test_stalled_consumer_accounting() {
        // Producer keeps pushing against a consumer that never runs; every
        // frame is either buffered intact or counted as dropped.
        let ring = FrameRing::new();
        let frame = [0xC3u8; 1024];
        let total: u64 = 10_000;
        for _ in 0..total {
            ring.push(&frame);
        }
        assert!(ring.dropped() > 0);

        let mut delivered: u64 = 0;
        let mut out = [0u8; 2048];
        while let Some(n) = ring.pop_into(&mut out) {
            assert_eq!(&out[..n], &frame[..]);
            delivered += 1;
        }
        assert_eq!(delivered + ring.dropped(), total);
    }

    #[test]
    fn test_wait_for_data() {
        let ring = Arc::new(FrameRing::new());
        assert!(!ring.wait_for_data(Duration::from_millis(5)));

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                ring.push(&[0x42]);
            })
        };
        assert!(ring.wait_for_data(Duration::from_secs(2)));
        producer.join().unwrap();
    }

    #[test]
    fn test_spsc_stress_accounting() {
        let ring = Arc::new(FrameRing::with_capacity(16 * 1024));
        let total: u64 = 1_000_000;

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut pushed_ok: u64 = 0;
                for i in 0..total {
                    // Pseudo-random length and fill derived from the index.
                    let len = (i % 57) as usize + 1;
                    let fill = (i % 251) as u8;
                    let frame = vec![fill; len];
                    if ring.push(&frame) {
                        pushed_ok += 1;
                    }
                }
                pushed_ok
            })
        };

        let consumer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut out = [0u8; 128];
                let mut delivered: u64 = 0;
                loop {
                    match ring.pop_into(&mut out) {
                        Some(n) => {
                            // Frame must be uniform fill: torn reads show up here.
                            assert!(out[..n].iter().all(|&b| b == out[0]));
                            delivered += 1;
                        }
                        None => {
                            if delivered + ring.dropped() >= total {
                                break;
                            }
                            std::thread::yield_now();
                        }
                    }
                }
                delivered
            })
        };

        let pushed_ok = producer.join().unwrap();
        let delivered = consumer.join().unwrap();
        assert_eq!(delivered, pushed_ok);
        assert_eq!(delivered + ring.dropped(), total);
    }
}
