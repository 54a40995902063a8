// src/io/manager.rs
//
// Serial manager: owns the engine configuration, the ring, the cached queue
// handles, and the three worker threads. Lifecycle is Idle -> Running ->
// Stopped; shutdown is idempotent and safe from any thread that is not
// itself a worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::error::IoError;
use crate::io::port::{open_engine, PortControl};
use crate::io::{deliver, reader, writer, SerialStream};
use crate::queue::ByteQueue;
use crate::ring::FrameRing;

// ============================================================================
// Configuration
// ============================================================================

/// Serial engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Platform-native port identifier (e.g. "/dev/cu.usbmodem1101", "COM3").
    pub port: String,
    /// Baud rate. The link is USB CDC, so this does not bound throughput,
    /// but it is still applied to the device.
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_baud() -> u32 {
    115_200
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            baud: default_baud(),
        }
    }

    pub fn with_baud(port: impl Into<String>, baud: u32) -> Self {
        SerialConfig {
            port: port.into(),
            baud,
        }
    }
}

// ============================================================================
// Shared engine state
// ============================================================================

/// State shared by the manager and the three workers.
pub(crate) struct EngineShared {
    /// Worker loop control. Cleared second during shutdown.
    pub(crate) alive: AtomicBool,
    /// Delivery barrier. Cleared first during shutdown so workers stop
    /// touching the application queues before the join.
    pub(crate) accepting: AtomicBool,
    /// Set while the port (or substitute stream pair) is usable. The reader
    /// clears it when the device disappears.
    pub(crate) port_open: AtomicBool,
    /// Reader -> deliverer frame ring.
    pub(crate) ring: FrameRing,
    /// Caller-owned destination for decoded inbound frames.
    pub(crate) inbound: Arc<dyn ByteQueue>,
    /// Caller-owned source of outbound byte messages.
    pub(crate) outbound: Arc<dyn ByteQueue>,
}

// ============================================================================
// Manager
// ============================================================================

/// Owner of the serial engine lifecycle.
///
/// The caller supplies both queues; the manager only caches handles to them.
/// Outbound messages are written verbatim (the command layer COBS-encodes
/// before enqueueing); inbound messages are already COBS-decoded payloads.
pub struct SerialManager {
    config: SerialConfig,
    shared: Arc<EngineShared>,
    control: Option<PortControl>,
    workers: Vec<JoinHandle<()>>,
}

impl SerialManager {
    /// Create an idle manager. `inbound` receives decoded device frames;
    /// `outbound` carries byte messages to write to the device.
    pub fn new(
        config: SerialConfig,
        inbound: Arc<dyn ByteQueue>,
        outbound: Arc<dyn ByteQueue>,
    ) -> Self {
        SerialManager {
            config,
            shared: Arc::new(EngineShared {
                alive: AtomicBool::new(false),
                accepting: AtomicBool::new(false),
                port_open: AtomicBool::new(false),
                ring: FrameRing::new(),
                inbound,
                outbound,
            }),
            control: None,
            workers: Vec::new(),
        }
    }

    /// Open the configured port and spawn the workers. No-op when already
    /// running; on open failure the manager stays idle.
    pub fn start(&mut self) -> Result<(), IoError> {
        if self.is_running() {
            return Ok(());
        }
        let (read_half, write_half, control) = open_engine(&self.config.port, self.config.baud)?;
        self.control = Some(control);
        self.spawn_workers(Box::new(read_half), Box::new(write_half));
        Ok(())
    }

    /// Spawn the workers over caller-supplied streams instead of a native
    /// port. Used for loopback testing and alternate transports.
    pub fn start_with_streams(&mut self, rx: Box<dyn SerialStream>, tx: Box<dyn SerialStream>) {
        if self.is_running() {
            return;
        }
        self.spawn_workers(rx, tx);
    }

    fn spawn_workers(&mut self, rx: Box<dyn SerialStream>, tx: Box<dyn SerialStream>) {
        self.shared.accepting.store(true, Ordering::SeqCst);
        self.shared.alive.store(true, Ordering::SeqCst);
        self.shared.port_open.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        self.workers.push(
            std::thread::Builder::new()
                .name("plink-reader".to_string())
                .spawn(move || reader::run(shared, rx))
                .expect("failed to spawn reader thread"),
        );

        let shared = Arc::clone(&self.shared);
        self.workers.push(
            std::thread::Builder::new()
                .name("plink-writer".to_string())
                .spawn(move || writer::run(shared, tx))
                .expect("failed to spawn writer thread"),
        );

        let shared = Arc::clone(&self.shared);
        self.workers.push(
            std::thread::Builder::new()
                .name("plink-deliver".to_string())
                .spawn(move || deliver::run(shared))
                .expect("failed to spawn deliver thread"),
        );

        log::info!("serial engine started on {}", self.config.port);
    }

    /// True while the workers run against a usable port.
    pub fn is_running(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
            && self.shared.accepting.load(Ordering::SeqCst)
            && self.shared.port_open.load(Ordering::SeqCst)
    }

    /// Stop the workers, cancel in-flight I/O, and close the port.
    /// Idempotent; target is all-joined in well under 200 ms.
    pub fn shutdown(&mut self) {
        let was_running = !self.workers.is_empty();

        // Barrier first: workers stop touching the application queues.
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.alive.store(false, Ordering::SeqCst);

        if let Some(control) = self.control.as_mut() {
            control.cancel_io();
            control.drop_control_lines();
        }

        // Wake a deliverer blocked on the ring condition.
        self.shared.ring.signal();

        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                log::warn!("worker thread panicked: {:?}", e);
            }
        }

        // Dropping the control handle closes the last reference after the
        // worker-held halves are gone.
        self.control = None;
        self.shared.port_open.store(false, Ordering::SeqCst);

        if was_running {
            log::info!("serial engine stopped on {}", self.config.port);
        }
    }

    /// Frames dropped at the ring due to overflow since start.
    pub fn dropped(&self) -> u64 {
        self.shared.ring.dropped()
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
