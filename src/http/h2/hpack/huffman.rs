//! HPACK Huffman coding (RFC 7541 Section 5.2 and Appendix B)
//!
//! The code is static and canonical. Encoding pads the final octet with the
//! most significant bits of the EOS symbol (all ones); decoding walks a
//! binary trie built once per process.

use super::{HpackError, Result};
use std::sync::OnceLock;

/// EOS symbol index in the code table
const EOS: u16 = 256;

/// (code, bit length) for every symbol 0..=256, RFC 7541 Appendix B
static CODES: [(u32, u8); 257] = [
    (0x1ff8, 13), (0x7fffd8, 23), (0xfffffe2, 28), (0xfffffe3, 28), // 0
    (0xfffffe4, 28), (0xfffffe5, 28), (0xfffffe6, 28), (0xfffffe7, 28), // 4
    (0xfffffe8, 28), (0xffffea, 24), (0x3ffffffc, 30), (0xfffffe9, 28), // 8
    (0xfffffea, 28), (0x3ffffffd, 30), (0xfffffeb, 28), (0xfffffec, 28), // 12
    (0xfffffed, 28), (0xfffffee, 28), (0xfffffef, 28), (0xffffff0, 28), // 16
    (0xffffff1, 28), (0xffffff2, 28), (0x3ffffffe, 30), (0xffffff3, 28), // 20
    (0xffffff4, 28), (0xffffff5, 28), (0xffffff6, 28), (0xffffff7, 28), // 24
    (0xffffff8, 28), (0xffffff9, 28), (0xffffffa, 28), (0xffffffb, 28), // 28
    (0x14, 6), (0x3f8, 10), (0x3f9, 10), (0xffa, 12), // 32
    (0x1ff9, 13), (0x15, 6), (0xf8, 8), (0x7fa, 11), // 36
    (0x3fa, 10), (0x3fb, 10), (0xf9, 8), (0x7fb, 11), // 40
    (0xfa, 8), (0x16, 6), (0x17, 6), (0x18, 6), // 44
    (0x0, 5), (0x1, 5), (0x2, 5), (0x19, 6), // 48
    (0x1a, 6), (0x1b, 6), (0x1c, 6), (0x1d, 6), // 52
    (0x1e, 6), (0x1f, 6), (0x5c, 7), (0xfb, 8), // 56
    (0x7ffc, 15), (0x20, 6), (0xffb, 12), (0x3fc, 10), // 60
    (0x1ffa, 13), (0x21, 6), (0x5d, 7), (0x5e, 7), // 64
    (0x5f, 7), (0x60, 7), (0x61, 7), (0x62, 7), // 68
    (0x63, 7), (0x64, 7), (0x65, 7), (0x66, 7), // 72
    (0x67, 7), (0x68, 7), (0x69, 7), (0x6a, 7), // 76
    (0x6b, 7), (0x6c, 7), (0x6d, 7), (0x6e, 7), // 80
    (0x6f, 7), (0x70, 7), (0x71, 7), (0x72, 7), // 84
    (0xfc, 8), (0x73, 7), (0xfd, 8), (0x1ffb, 13), // 88
    (0x7fff0, 19), (0x1ffc, 13), (0x3ffc, 14), (0x22, 6), // 92
    (0x7ffd, 15), (0x3, 5), (0x23, 6), (0x4, 5), // 96
    (0x24, 6), (0x5, 5), (0x25, 6), (0x26, 6), // 100
    (0x27, 6), (0x6, 5), (0x74, 7), (0x75, 7), // 104
    (0x28, 6), (0x29, 6), (0x2a, 6), (0x7, 5), // 108
    (0x2b, 6), (0x76, 7), (0x2c, 6), (0x8, 5), // 112
    (0x9, 5), (0x2d, 6), (0x77, 7), (0x78, 7), // 116
    (0x79, 7), (0x7a, 7), (0x7b, 7), (0x7ffe, 15), // 120
    (0x7fc, 11), (0x3ffd, 14), (0x1ffd, 13), (0xffffffc, 28), // 124
    (0xfffe6, 20), (0x3fffd2, 22), (0xfffe7, 20), (0xfffe8, 20), // 128
    (0x3fffd3, 22), (0x3fffd4, 22), (0x3fffd5, 22), (0x7fffd9, 23), // 132
    (0x3fffd6, 22), (0x7fffda, 23), (0x7fffdb, 23), (0x7fffdc, 23), // 136
    (0x7fffdd, 23), (0x7fffde, 23), (0xffffeb, 24), (0x7fffdf, 23), // 140
    (0xffffec, 24), (0xffffed, 24), (0x3fffd7, 22), (0x7fffe0, 23), // 144
    (0xffffee, 24), (0x7fffe1, 23), (0x7fffe2, 23), (0x7fffe3, 23), // 148
    (0x7fffe4, 23), (0x1fffdc, 21), (0x3fffd8, 22), (0x7fffe5, 23), // 152
    (0x3fffd9, 22), (0x7fffe6, 23), (0x7fffe7, 23), (0xffffef, 24), // 156
    (0x3fffda, 22), (0x1fffdd, 21), (0xfffe9, 20), (0x3fffdb, 22), // 160
    (0x3fffdc, 22), (0x7fffe8, 23), (0x7fffe9, 23), (0x1fffde, 21), // 164
    (0x7fffea, 23), (0x3fffdd, 22), (0x3fffde, 22), (0xfffff0, 24), // 168
    (0x1fffdf, 21), (0x3fffdf, 22), (0x7fffeb, 23), (0x7fffec, 23), // 172
    (0x1fffe0, 21), (0x1fffe1, 21), (0x3fffe0, 22), (0x1fffe2, 21), // 176
    (0x7fffed, 23), (0x3fffe1, 22), (0x7fffee, 23), (0x7fffef, 23), // 180
    (0xfffea, 20), (0x3fffe2, 22), (0x3fffe3, 22), (0x3fffe4, 22), // 184
    (0x7ffff0, 23), (0x3fffe5, 22), (0x3fffe6, 22), (0x7ffff1, 23), // 188
    (0x3ffffe0, 26), (0x3ffffe1, 26), (0xfffeb, 20), (0x7fff1, 19), // 192
    (0x3fffe7, 22), (0x7ffff2, 23), (0x3fffe8, 22), (0x1ffffec, 25), // 196
    (0x3ffffe2, 26), (0x3ffffe3, 26), (0x3ffffe4, 26), (0x7ffffde, 27), // 200
    (0x7ffffdf, 27), (0x3ffffe5, 26), (0xfffff1, 24), (0x1ffffed, 25), // 204
    (0x7fff2, 19), (0x1fffe3, 21), (0x3ffffe6, 26), (0x7ffffe0, 27), // 208
    (0x7ffffe1, 27), (0x3ffffe7, 26), (0x7ffffe2, 27), (0xfffff2, 24), // 212
    (0x1fffe4, 21), (0x1fffe5, 21), (0x3ffffe8, 26), (0x3ffffe9, 26), // 216
    (0xffffffd, 28), (0x7ffffe3, 27), (0x7ffffe4, 27), (0x7ffffe5, 27), // 220
    (0xfffec, 20), (0xfffff3, 24), (0xfffed, 20), (0x1fffe6, 21), // 224
    (0x3fffe9, 22), (0x1fffe7, 21), (0x1fffe8, 21), (0x7ffff3, 23), // 228
    (0x3fffea, 22), (0x3fffeb, 22), (0x1ffffee, 25), (0x1ffffef, 25), // 232
    (0xfffff4, 24), (0xfffff5, 24), (0x3ffffea, 26), (0x7ffff4, 23), // 236
    (0x3ffffeb, 26), (0x7ffffe6, 27), (0x3ffffec, 26), (0x3ffffed, 26), // 240
    (0x7ffffe7, 27), (0x7ffffe8, 27), (0x7ffffe9, 27), (0x7ffffea, 27), // 244
    (0x7ffffeb, 27), (0xffffffe, 28), (0x7ffffec, 27), (0x7ffffed, 27), // 248
    (0x7ffffee, 27), (0x7ffffef, 27), (0x7fffff0, 27), (0x3ffffee, 26), // 252
    (0x3fffffff, 30), // 256
];

/// Trie node: child indices for bit 0 / bit 1 (0 = absent) and the symbol
/// terminating at this node, if any.
#[derive(Debug, Clone, Copy, Default)]
struct Node {
    next: [u16; 2],
    symbol: Option<u16>,
}

fn build_trie() -> Vec<Node> {
    let mut nodes = vec![Node::default()];
    for (symbol, &(code, len)) in CODES.iter().enumerate() {
        let mut at = 0usize;
        for shift in (0..len).rev() {
            let bit = ((code >> shift) & 1) as usize;
            if nodes[at].next[bit] == 0 {
                nodes.push(Node::default());
                nodes[at].next[bit] = (nodes.len() - 1) as u16;
            }
            at = nodes[at].next[bit] as usize;
        }
        nodes[at].symbol = Some(symbol as u16);
    }
    nodes
}

static TRIE: OnceLock<Vec<Node>> = OnceLock::new();

fn trie() -> &'static [Node] {
    TRIE.get_or_init(build_trie)
}

/// Huffman-encode `src`, padding the last octet with ones.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(src));
    encode_into(src, &mut out);
    out
}

/// Huffman-encode `src` appending to `dst`.
pub fn encode_into(src: &[u8], dst: &mut Vec<u8>) {
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;

    for &byte in src {
        let (code, len) = CODES[byte as usize];
        acc = (acc << len) | u64::from(code);
        bits += u32::from(len);
        while bits >= 8 {
            bits -= 8;
            dst.push((acc >> bits) as u8);
        }
        acc &= (1u64 << bits) - 1;
    }

    if bits > 0 {
        let pad = 8 - bits;
        dst.push(((acc << pad) | ((1u64 << pad) - 1)) as u8);
    }
}

/// Decode a Huffman string.
///
/// Fails with [`HpackError::InvalidHuffman`] when a bit sequence does not
/// lead to a symbol, when EOS is decoded, or when the trailing padding is
/// longer than 7 bits or contains a zero bit.
pub fn decode(src: &[u8]) -> Result<Vec<u8>> {
    let nodes = trie();
    let mut out = Vec::with_capacity(src.len() * 8 / 5);
    let mut at = 0usize;
    // bits consumed since the last complete symbol, and whether all were 1
    let mut pending = 0u32;
    let mut all_ones = true;

    for &byte in src {
        for shift in (0..8).rev() {
            let bit = ((byte >> shift) & 1) as usize;
            let next = nodes[at].next[bit];
            if next == 0 {
                return Err(HpackError::InvalidHuffman);
            }
            at = next as usize;
            pending += 1;
            all_ones &= bit == 1;

            if let Some(symbol) = nodes[at].symbol {
                if symbol == EOS {
                    return Err(HpackError::InvalidHuffman);
                }
                out.push(symbol as u8);
                at = 0;
                pending = 0;
                all_ones = true;
            }
        }
    }

    if pending > 7 || !all_ones {
        return Err(HpackError::InvalidHuffman);
    }

    Ok(out)
}

/// Number of octets `src` occupies once Huffman-encoded.
pub fn encoded_len(src: &[u8]) -> usize {
    let bits: usize = src.iter().map(|&b| CODES[b as usize].1 as usize).sum();
    (bits + 7) / 8
}

/// True iff the Huffman form of `src` is strictly shorter than the raw form.
pub fn should_encode(src: &[u8]) -> bool {
    encoded_len(src) < src.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7541_c4_vectors() {
        // RFC 7541 Appendix C.4.1
        assert_eq!(
            encode(b"www.example.com"),
            vec![0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff]
        );
        // RFC 7541 Appendix C.4.2
        assert_eq!(encode(b"no-cache"), vec![0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf]);
        // RFC 7541 Appendix C.4.3
        assert_eq!(
            encode(b"custom-key"),
            vec![0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f]
        );
    }

    #[test]
    fn test_decode_rfc_vectors() {
        let decoded = decode(&[0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf]).unwrap();
        assert_eq!(decoded, b"no-cache");

        let decoded = decode(&[0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f]).unwrap();
        assert_eq!(decoded, b"custom-key");
    }

    #[test]
    fn test_round_trip_all_symbols() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode(&encode(&all)).unwrap(), all);

        let text = b"Mon, 21 Oct 2013 20:13:21 GMT; path=/; max-age=3600";
        assert_eq!(decode(&encode(text)).unwrap(), text.to_vec());
    }

    #[test]
    fn test_empty() {
        assert!(encode(b"").is_empty());
        assert!(decode(b"").unwrap().is_empty());
        assert_eq!(encoded_len(b""), 0);
    }

    #[test]
    fn test_encoded_len_matches_encode() {
        for s in [&b"GET"[..], b"/index.html", b"text/html; charset=utf-8", b"\x00\x01\xff"] {
            assert_eq!(encoded_len(s), encode(s).len());
        }
    }

    #[test]
    fn test_should_encode() {
        assert!(should_encode(b"www.example.com"));
        // control bytes have 28+ bit codes
        assert!(!should_encode(b"\x00\x01\x02"));
        assert!(!should_encode(b""));
    }

    #[test]
    fn test_invalid_padding_zero_bits() {
        // 'a' is 00011 (5 bits); padding with zeros is invalid
        assert_eq!(decode(&[0x18]), Err(HpackError::InvalidHuffman));
        // padding with ones is valid
        assert_eq!(decode(&[0x1f]).unwrap(), b"a");
    }

    #[test]
    fn test_padding_longer_than_seven_bits() {
        // 'a' followed by a full octet of ones
        assert_eq!(decode(&[0x1f, 0xff]), Err(HpackError::InvalidHuffman));
    }

    #[test]
    fn test_code_table_ends_with_eos() {
        assert_eq!(CODES.len(), 257);
        assert_eq!(CODES[256], (0x3fffffff, 30));
    }

    #[test]
    fn test_eos_in_string() {
        // 30 one-bits form EOS
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xff]),
            Err(HpackError::InvalidHuffman)
        );
    }
}
