// src/mux.rs
//
// Stream multiplexing over decoded frames. The firmware tags every frame:
// port-data frames carry the port number and type in the first byte; log
// frames carry a 32-bit little-endian record address whose low two bits are
// the record kind and whose bits 20..23 are the target id.

/// Plain log record.
pub const LOG_TYPE_BASIC: u8 = 0x00;
/// Memory-dump log record.
pub const LOG_TYPE_MEM: u8 = 0x01;
/// Reserved.
pub const LOG_TYPE_RES: u8 = 0x02;
/// Port (application stream) data.
pub const LOG_TYPE_PORT: u8 = 0x03;

/// Bit position of the target id inside a record address.
pub const TARGET_DIGIT_SHIFT: u32 = 20;

/// Highest port number the host side routes.
pub const LOG_PORT_MAX: u8 = 8;

/// A decoded frame classified by its stream tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxFrame {
    /// Application stream data for one port.
    Port { port: u8, payload: Vec<u8> },
    /// Log record: target id, record address, and the parameter bytes.
    Log {
        target: u8,
        addr: u32,
        payload: Vec<u8>,
    },
    /// Too short to carry a record address; seen from old bootloaders.
    Runt(Vec<u8>),
}

/// Classify one decoded frame. Empty frames produce `None`: a known
/// bootloader revision emits stray garbage that decodes to nothing, and it
/// must not choke the stream.
pub fn demux(frame: &[u8]) -> Option<MuxFrame> {
    if frame.is_empty() {
        return None;
    }

    if frame[0] & 3 == LOG_TYPE_PORT {
        return Some(MuxFrame::Port {
            port: frame[0] >> 2,
            payload: frame[1..].to_vec(),
        });
    }

    if frame.len() >= 4 {
        let addr = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let target = ((addr >> TARGET_DIGIT_SHIFT) & 0xF) as u8;
        return Some(MuxFrame::Log {
            target,
            addr,
            payload: frame[4..].to_vec(),
        });
    }

    Some(MuxFrame::Runt(frame.to_vec()))
}

/// Prefix `payload` with the stream tag for `port`. The result is the frame
/// body the command layer COBS-encodes before enqueueing.
pub fn mux_port(port: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push((port << 2) | LOG_TYPE_PORT);
    out.extend_from_slice(payload);
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_frame_roundtrip() {
        let framed = mux_port(5, &[0xDE, 0xAD]);
        assert_eq!(framed[0], (5 << 2) | LOG_TYPE_PORT);
        assert_eq!(
            demux(&framed),
            Some(MuxFrame::Port {
                port: 5,
                payload: vec![0xDE, 0xAD],
            })
        );
    }

    #[test]
    fn test_log_frame_carries_target_and_addr() {
        // Address 0x0070_1000: target 7, kind basic, clean address 0x701000.
        let mut frame = 0x0070_1000u32.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0x2A, 0x00, 0x00, 0x00]);
        match demux(&frame) {
            Some(MuxFrame::Log {
                target,
                addr,
                payload,
            }) => {
                assert_eq!(target, 7);
                assert_eq!(addr, 0x0070_1000);
                assert_eq!(payload, vec![0x2A, 0x00, 0x00, 0x00]);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_runt_and_empty() {
        assert_eq!(demux(&[]), None);
        assert_eq!(demux(&[0x01, 0x02]), Some(MuxFrame::Runt(vec![0x01, 0x02])));
    }
}
