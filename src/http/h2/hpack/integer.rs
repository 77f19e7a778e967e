//! HPACK primitive representations (RFC 7541 Section 5)
//!
//! Integers use an N-bit prefix followed by base-128 continuation octets.
//! Strings carry a 1-bit Huffman flag and a 7-bit prefixed length.

use super::huffman;
use super::{HpackError, Result};

/// Continuation octets may carry at most this many bits of shift before the
/// value is rejected. Table sizes, indices and lengths never need more.
const MAX_SHIFT: u32 = 28;

/// Encode `value` with an `prefix_bits`-bit prefix, OR-ing `flags` into the
/// first octet.
///
/// `flags` must only use the bits above the prefix.
pub fn encode_integer(value: usize, prefix_bits: u8, flags: u8, dst: &mut Vec<u8>) {
    debug_assert!((1..=8).contains(&prefix_bits));
    let max_prefix = (1usize << prefix_bits) - 1;

    if value < max_prefix {
        dst.push(flags | value as u8);
        return;
    }

    dst.push(flags | max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 128 {
        dst.push((rest % 128) as u8 | 0x80);
        rest /= 128;
    }
    dst.push(rest as u8);
}

/// Decode an integer whose prefix sits in the low `prefix_bits` of `src[0]`.
///
/// Returns the value and the number of octets consumed.
pub fn decode_integer(src: &[u8], prefix_bits: u8) -> Result<(usize, usize)> {
    debug_assert!((1..=8).contains(&prefix_bits));
    let first = *src.first().ok_or(HpackError::InvalidInteger)?;
    let max_prefix = (1usize << prefix_bits) - 1;
    let mut value = first as usize & max_prefix;
    if value < max_prefix {
        return Ok((value, 1));
    }

    let mut shift = 0u32;
    let mut pos = 1;
    loop {
        let byte = *src.get(pos).ok_or(HpackError::InvalidInteger)?;
        pos += 1;
        if shift > MAX_SHIFT {
            return Err(HpackError::InvalidInteger);
        }
        value += ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
    }
}

/// Encode a string literal, Huffman-coding it when `huffman` is set and
/// the coded form is strictly shorter.
pub fn encode_string(src: &[u8], huffman: bool, dst: &mut Vec<u8>) {
    if huffman && huffman::should_encode(src) {
        encode_integer(huffman::encoded_len(src), 7, 0x80, dst);
        huffman::encode_into(src, dst);
    } else {
        encode_integer(src.len(), 7, 0x00, dst);
        dst.extend_from_slice(src);
    }
}

/// Decode a string literal. Returns the octets and the number of input
/// octets consumed.
pub fn decode_string(src: &[u8]) -> Result<(Vec<u8>, usize)> {
    let first = *src.first().ok_or_else(|| {
        HpackError::DecompressionFailed("missing string literal".to_string())
    })?;
    let is_huffman = first & 0x80 != 0;
    let (len, used) = decode_integer(src, 7)?;
    let end = used
        .checked_add(len)
        .filter(|&end| end <= src.len())
        .ok_or_else(|| {
            HpackError::DecompressionFailed(format!(
                "string length {} exceeds remaining {} octets",
                len,
                src.len() - used
            ))
        })?;

    let raw = &src[used..end];
    let value = if is_huffman {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_small_integer() {
        // RFC 7541 C.1.1: 10 with a 5-bit prefix
        let mut buf = Vec::new();
        encode_integer(10, 5, 0, &mut buf);
        assert_eq!(buf, vec![0x0a]);
    }

    #[test]
    fn test_encode_large_integer() {
        // RFC 7541 C.1.2: 1337 with a 5-bit prefix
        let mut buf = Vec::new();
        encode_integer(1337, 5, 0, &mut buf);
        assert_eq!(buf, vec![0x1f, 0x9a, 0x0a]);
    }

    #[test]
    fn test_encode_octet_prefix() {
        // RFC 7541 C.1.3: 42 starting at an octet boundary
        let mut buf = Vec::new();
        encode_integer(42, 8, 0, &mut buf);
        assert_eq!(buf, vec![0x2a]);
    }

    #[test]
    fn test_encode_boundary_value() {
        let mut buf = Vec::new();
        encode_integer(31, 5, 0xe0, &mut buf);
        assert_eq!(buf, vec![0xff, 0x00]);
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode_integer(&[0x0a], 5).unwrap(), (10, 1));
        assert_eq!(decode_integer(&[0x1f, 0x9a, 0x0a], 5).unwrap(), (1337, 3));
        // flag bits above the prefix are ignored
        assert_eq!(decode_integer(&[0xea], 5).unwrap(), (10, 1));
    }

    #[test]
    fn test_decode_missing_continuation() {
        assert_eq!(decode_integer(&[0x1f, 0x9a], 5), Err(HpackError::InvalidInteger));
        assert_eq!(decode_integer(&[], 5), Err(HpackError::InvalidInteger));
    }

    #[test]
    fn test_decode_overflow_guard() {
        let src = [0x1f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert_eq!(decode_integer(&src, 5), Err(HpackError::InvalidInteger));
    }

    #[test]
    fn test_string_plain() {
        let mut buf = Vec::new();
        encode_string(b"custom-key", false, &mut buf);
        assert_eq!(buf[0], 0x0a);
        assert_eq!(&buf[1..], b"custom-key");

        let (value, used) = decode_string(&buf).unwrap();
        assert_eq!(value, b"custom-key");
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_string_huffman() {
        let mut buf = Vec::new();
        encode_string(b"www.example.com", true, &mut buf);
        assert_eq!(buf[0], 0x8c);

        let (value, used) = decode_string(&buf).unwrap();
        assert_eq!(value, b"www.example.com");
        assert_eq!(used, 13);
    }

    #[test]
    fn test_string_huffman_skipped_when_longer() {
        let mut buf = Vec::new();
        encode_string(b"\x00\x00", true, &mut buf);
        assert_eq!(buf, vec![0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_string_length_past_end() {
        let result = decode_string(&[0x05, b'a', b'b']);
        assert!(matches!(result, Err(HpackError::DecompressionFailed(_))));
    }
}
