// src/cobs.rs
//
// COBS (Consistent Overhead Byte Stuffing) codec for the instrument's wire
// framing. Every frame travels as a zero-free COBS body followed by a single
// 0x00 delimiter; the firmware omits the phantom trailing block after a
// maximal 254-byte run, and the decoder mirrors that.

use crate::error::IoError;

// ============================================================================
// Sizing
// ============================================================================

/// Worst-case encoded length for an `n`-byte payload.
///
/// One code byte is added per 254 payload bytes; the empty payload still
/// encodes to a single code byte.
pub fn max_encoded_len(n: usize) -> usize {
    (n + (n + 253) / 254).max(1)
}

// ============================================================================
// Encode
// ============================================================================

/// COBS-encode `input` into `out`, returning the encoded length.
///
/// `out` must hold at least [`max_encoded_len`]`(input.len())` bytes. The
/// output contains no 0x00 byte and no delimiter; callers append the frame
/// delimiter themselves (or use [`encode_frame`]).
pub fn encode(input: &[u8], out: &mut [u8]) -> usize {
    let mut code_idx = 0usize; // position of the open block's code byte
    let mut code: u8 = 1;
    let mut n = 1usize;
    let mut last_max = false;

    for &b in input {
        last_max = false;
        if b == 0 {
            // Logical zero closes the block; the code byte encodes it.
            out[code_idx] = code;
            code_idx = n;
            n += 1;
            code = 1;
        } else {
            out[n] = b;
            n += 1;
            code += 1;
            if code == 0xFF {
                // Maximal run: close the block with no logical zero.
                out[code_idx] = code;
                code_idx = n;
                n += 1;
                code = 1;
                last_max = true;
            }
        }
    }

    if last_max {
        // The staged follow-on block is empty and the terminator is implicit.
        n - 1
    } else {
        out[code_idx] = code;
        n
    }
}

/// Encode `payload` into the on-the-wire form the host sends: a leading
/// 0x00 (flushes any garbage in the receiver's accumulator), the COBS body,
/// and the trailing frame delimiter.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; max_encoded_len(payload.len()) + 2];
    let n = encode(payload, &mut out[1..]);
    out.truncate(1 + n);
    out.push(0x00);
    out
}

// ============================================================================
// Decode
// ============================================================================

/// COBS-decode `input` (delimiter already stripped) into `out`, returning
/// the decoded length.
///
/// Fails with [`IoError::MalformedFrame`] if the input contains a 0x00 byte,
/// a code byte runs past the end of the input, or the decoded payload would
/// overflow `out`.
pub fn decode(input: &[u8], out: &mut [u8]) -> Result<usize, IoError> {
    let mut in_idx = 0usize;
    let mut out_idx = 0usize;

    while in_idx < input.len() {
        let code = input[in_idx] as usize;
        in_idx += 1;
        if code == 0 {
            return Err(IoError::MalformedFrame);
        }

        let copy_len = code - 1;
        if in_idx + copy_len > input.len() {
            return Err(IoError::MalformedFrame);
        }

        let chunk = &input[in_idx..in_idx + copy_len];
        if chunk.contains(&0) {
            return Err(IoError::MalformedFrame);
        }

        // A non-maximal code implies a logical zero unless it ends the frame.
        let trailing_zero = code < 0xFF && in_idx + copy_len < input.len();
        if out_idx + copy_len + usize::from(trailing_zero) > out.len() {
            return Err(IoError::MalformedFrame);
        }

        out[out_idx..out_idx + copy_len].copy_from_slice(chunk);
        in_idx += copy_len;
        out_idx += copy_len;

        if trailing_zero {
            out[out_idx] = 0;
            out_idx += 1;
        }
    }

    Ok(out_idx)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: &[u8]) {
        let mut enc = vec![0u8; max_encoded_len(payload.len())];
        let n = encode(payload, &mut enc);
        assert!(n <= max_encoded_len(payload.len()));
        assert!(!enc[..n].contains(&0), "encoded form must be zero-free");

        let mut dec = vec![0u8; payload.len() + 1];
        let m = decode(&enc[..n], &mut dec).expect("decode failed");
        assert_eq!(&dec[..m], payload);
    }

    #[test]
    fn test_reference_vector() {
        let mut out = [0u8; 8];
        let n = encode(&[0x11, 0x22, 0x00, 0x33], &mut out);
        assert_eq!(&out[..n], &[0x03, 0x11, 0x22, 0x02, 0x33]);

        let mut dec = [0u8; 8];
        let m = decode(&out[..n], &mut dec).unwrap();
        assert_eq!(&dec[..m], &[0x11, 0x22, 0x00, 0x33]);
    }

    #[test]
    fn test_empty_payload() {
        let mut out = [0u8; 2];
        let n = encode(&[], &mut out);
        assert_eq!(&out[..n], &[0x01]);

        let mut dec = [0u8; 2];
        assert_eq!(decode(&[0x01], &mut dec).unwrap(), 0);
    }

    #[test]
    fn test_single_zero() {
        let mut out = [0u8; 4];
        let n = encode(&[0x00], &mut out);
        assert_eq!(&out[..n], &[0x01, 0x01]);
        roundtrip(&[0x00]);
    }

    #[test]
    fn test_all_zeros() {
        roundtrip(&[0x00; 16]);
    }

    #[test]
    fn test_trailing_zero() {
        roundtrip(&[0x11, 0x00]);
    }

    #[test]
    fn test_maximal_run() {
        // 254 non-zero bytes: one maximal block, no trailing code byte.
        let payload: Vec<u8> = (0..254u32).map(|i| (i % 255) as u8 + 1).collect();
        let mut out = vec![0u8; max_encoded_len(payload.len())];
        let n = encode(&payload, &mut out);
        assert_eq!(n, 255);
        assert_eq!(out[0], 0xFF);
        roundtrip(&payload);
    }

    #[test]
    fn test_just_over_maximal_run() {
        let payload = vec![0xAAu8; 255];
        roundtrip(&payload);

        let payload = vec![0xAAu8; 508];
        roundtrip(&payload);
    }

    #[test]
    fn test_roundtrip_mixed() {
        roundtrip(&[0x01, 0x02, 0x03]);
        roundtrip(b"hello world");
        let mixed: Vec<u8> = (0..1000u32).map(|i| (i % 7) as u8).collect();
        roundtrip(&mixed);
    }

    #[test]
    fn test_decode_rejects_interior_zero() {
        let mut out = [0u8; 8];
        assert!(matches!(
            decode(&[0x03, 0x11, 0x00], &mut out),
            Err(IoError::MalformedFrame)
        ));
    }

    #[test]
    fn test_decode_rejects_zero_code() {
        let mut out = [0u8; 8];
        assert!(matches!(
            decode(&[0x00, 0x11], &mut out),
            Err(IoError::MalformedFrame)
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_block() {
        // Code byte 0x05 promises four data bytes; only two follow.
        let mut out = [0u8; 8];
        assert!(matches!(
            decode(&[0x05, 0x11, 0x22], &mut out),
            Err(IoError::MalformedFrame)
        ));
    }

    #[test]
    fn test_decode_rejects_output_overflow() {
        let mut small = [0u8; 2];
        assert!(matches!(
            decode(&[0x04, 0x11, 0x22, 0x33], &mut small),
            Err(IoError::MalformedFrame)
        ));
    }

    #[test]
    fn test_encode_frame_is_delimited() {
        let framed = encode_frame(&[0x11, 0x22, 0x00, 0x33]);
        assert_eq!(framed[0], 0x00);
        assert_eq!(*framed.last().unwrap(), 0x00);
        assert_eq!(&framed[1..framed.len() - 1], &[0x03, 0x11, 0x22, 0x02, 0x33]);
    }
}
