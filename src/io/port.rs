// src/io/port.rs
//
// Serial port adapter over the serialport crate. The device is a USB CDC
// endpoint, so the baud value is cosmetic for throughput but still applied;
// framing is fixed 8N1 with no flow control. The engine opens three handles
// on one device: a read half with a short bounded wait, a write half with a
// 2 s bounded wait, and a control half the manager keeps for shutdown work.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::IoError;
use crate::io::{RxWait, SerialStream};

/// Bounded wait applied to the read half. Short enough that the reader's
/// latency is governed by its own RX wait, not by the OS read call.
const READ_TIMEOUT: Duration = Duration::from_millis(3);

/// Bounded wait applied to the write half.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval inside the RX wait.
const RX_POLL: Duration = Duration::from_micros(500);

// ============================================================================
// Native port
// ============================================================================

/// One handle on a native serial device, usable as a [`SerialStream`].
pub struct NativePort {
    port: Box<dyn SerialPort>,
    device: String,
}

impl NativePort {
    /// Open a single handle on `path` at `baud`, configured 8N1 with no
    /// flow control and the engine's read timeout.
    pub fn open(path: &str, baud: u32) -> Result<Self, IoError> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| IoError::connection(path, e.to_string()))?;

        Ok(NativePort {
            port,
            device: path.to_string(),
        })
    }
}

impl SerialStream for NativePort {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(IoError::read(format!("{}: {}", self.device, e))),
        }
    }

    fn write_bounded(&mut self, data: &[u8]) -> Result<usize, IoError> {
        match self.port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(IoError::write(format!("{}: {}", self.device, e))),
        }
    }

    fn wait_rx(&mut self, timeout: Duration) -> RxWait {
        let deadline = Instant::now() + timeout;
        loop {
            match self.port.bytes_to_read() {
                Ok(n) if n > 0 => return RxWait::Ready,
                Ok(_) => {}
                // The handle went away underneath us (unplug, close).
                Err(_) => return RxWait::Gone,
            }
            if Instant::now() >= deadline {
                return RxWait::Timeout;
            }
            std::thread::sleep(RX_POLL);
        }
    }
}

// ============================================================================
// Control handle
// ============================================================================

/// Handle the manager retains for shutdown: cancelling in-flight transfers
/// and releasing the control lines.
pub(crate) struct PortControl {
    port: Box<dyn SerialPort>,
}

impl PortControl {
    /// Abort buffered transfers so the read and write halves come back from
    /// their bounded waits promptly.
    pub(crate) fn cancel_io(&mut self) {
        let _ = self.port.clear(ClearBuffer::All);
    }

    /// Drop RTS/DTR where the platform supports it.
    pub(crate) fn drop_control_lines(&mut self) {
        let _ = self.port.write_data_terminal_ready(false);
        let _ = self.port.write_request_to_send(false);
    }
}

// ============================================================================
// Engine open
// ============================================================================

/// Open the engine's three handles on one device and run the power-on line
/// sequence: RTS asserted, then a 10 ms DTR pulse.
pub(crate) fn open_engine(
    path: &str,
    baud: u32,
) -> Result<(NativePort, NativePort, PortControl), IoError> {
    let mut read_half = NativePort::open(path, baud)?;

    let _ = read_half.port.clear(ClearBuffer::All);
    let _ = read_half.port.write_request_to_send(true);
    let _ = read_half.port.write_data_terminal_ready(true);
    let _ = read_half.port.write_data_terminal_ready(false);
    std::thread::sleep(Duration::from_millis(10));
    let _ = read_half.port.write_data_terminal_ready(true);

    let mut write_port = read_half
        .port
        .try_clone()
        .map_err(|e| IoError::connection(path, format!("clone write half: {}", e)))?;
    write_port
        .set_timeout(WRITE_TIMEOUT)
        .map_err(|e| IoError::connection(path, format!("write timeout: {}", e)))?;

    let control_port = read_half
        .port
        .try_clone()
        .map_err(|e| IoError::connection(path, format!("clone control half: {}", e)))?;

    log::info!("opened {} at {} baud", path, baud);

    let write_half = NativePort {
        port: write_port,
        device: path.to_string(),
    };
    Ok((read_half, write_half, PortControl { port: control_port }))
}
