//! probelink: host-side transport engine and log-frame decoder for
//! USB-attached current-measurement instruments.
//!
//! The instrument streams COBS-framed, CBOR-encoded telemetry at roughly
//! 2,500 frames/s over a serial CDC link. This crate provides the native
//! serial engine (reader / deliverer / writer workers around a byte ring),
//! the COBS codec, the stream mux, and the symbol-table-driven log decoder.
//! Instrument command semantics live in the layers above: they enqueue
//! encoded frames on the outbound queue and consume decoded payloads from
//! the inbound queue.
//!
//! ```no_run
//! use std::sync::Arc;
//! use probelink::{ByteQueue, FrameQueue, SerialConfig, SerialManager};
//!
//! let inbound = Arc::new(FrameQueue::new());
//! let outbound = Arc::new(FrameQueue::new());
//! let mut manager = SerialManager::new(
//!     SerialConfig::new("/dev/cu.usbmodem1101"),
//!     inbound.clone(),
//!     outbound.clone(),
//! );
//! manager.start()?;
//! outbound.push(probelink::cobs::encode_frame(&[0x01, 0x02, 0x03]));
//! # Ok::<(), probelink::IoError>(())
//! ```

pub mod cobs;
pub mod error;
pub mod io;
pub mod logdata;
pub mod mux;
pub mod queue;
pub mod ring;

pub use error::IoError;
pub use io::{NativePort, RxWait, SerialConfig, SerialManager, SerialStream};
pub use logdata::{LogData, LogDataset, LogRecord};
pub use mux::MuxFrame;
pub use queue::{ByteQueue, FrameQueue};
pub use ring::FrameRing;
