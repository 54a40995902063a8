// src/io/deliver.rs
//
// Deliverer worker: pops decoded frames from the ring and enqueues them into
// the caller's inbound queue. Frames are popped in batches of up to 256
// under a single ring-lock acquisition; at 2,500 frames/s, per-frame lock
// traffic is the dominant cost this avoids.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::io::manager::EngineShared;
use crate::io::{DELIVER_BATCH, DELIVER_WAIT};

pub(crate) fn run(shared: Arc<EngineShared>) {
    while shared.alive.load(Ordering::SeqCst) {
        if !shared.ring.wait_for_data(DELIVER_WAIT) {
            continue;
        }
        if !shared.alive.load(Ordering::SeqCst) {
            break;
        }

        let batch = shared.ring.pop_batch(DELIVER_BATCH);
        if !shared.accepting.load(Ordering::SeqCst) {
            // Shutdown barrier observed between pop and delivery: the batch
            // is discarded with the rest of the residue below.
            break;
        }
        for frame in batch {
            shared.inbound.push(frame);
        }
    }

    // Drain whatever the reader managed to push before it stopped.
    let residue = shared.ring.pop_batch(usize::MAX);
    if !residue.is_empty() {
        log::debug!("deliverer discarded {} residual frames", residue.len());
    }

    log::debug!("deliverer worker stopped");
}
