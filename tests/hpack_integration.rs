//! HPACK integration tests
//!
//! Decoding of the RFC 7541 Appendix C request sequences, interop with the
//! `hpack` crate in both directions, and table size negotiation between two
//! connection contexts.

use h2engine::http::h2::hpack::{huffman, Decoder, Encoder, HpackConfig, HpackContext, HpackError};
use h2engine::http::h2::{Error, ErrorCode};
use h2engine::http::HeaderMap;

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

fn hex(s: &str) -> Vec<u8> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    digits
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

#[test]
fn test_rfc7541_c3_requests_without_huffman() {
    let mut decoder = Decoder::new(4096);

    let first = decoder
        .decode(&hex("8286 8441 0f77 7777 2e65 7861 6d70 6c65 2e63 6f6d"))
        .unwrap();
    assert_eq!(
        first,
        headers(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
        ])
    );
    assert_eq!(decoder.table().size(), 57);

    let second = decoder
        .decode(&hex("8286 84be 5808 6e6f 2d63 6163 6865"))
        .unwrap();
    assert_eq!(second.get("cache-control"), Some(&b"no-cache"[..]));
    assert_eq!(second.get(":authority"), Some(&b"www.example.com"[..]));
    assert_eq!(decoder.table().size(), 110);

    let third = decoder
        .decode(&hex(
            "8287 85bf 400a 6375 7374 6f6d 2d6b 6579 0c63 7573 746f 6d2d 7661 6c75 65",
        ))
        .unwrap();
    assert_eq!(
        third,
        headers(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/index.html"),
            (":authority", "www.example.com"),
            ("custom-key", "custom-value"),
        ])
    );
    assert_eq!(decoder.table().len(), 3);
    assert_eq!(decoder.table().size(), 164);
}

#[test]
fn test_rfc7541_c4_requests_with_huffman() {
    let mut decoder = Decoder::new(4096);

    let first = decoder
        .decode(&hex("8286 8441 8cf1 e3c2 e5f2 3a6b a0ab 90f4 ff"))
        .unwrap();
    assert_eq!(first.get(":authority"), Some(&b"www.example.com"[..]));

    let second = decoder.decode(&hex("8286 84be 5886 a8eb 1064 9cbf")).unwrap();
    assert_eq!(second.get("cache-control"), Some(&b"no-cache"[..]));

    let third = decoder
        .decode(&hex(
            "8287 85bf 4088 25a8 49e9 5ba9 7d7f 8925 a849 e95b b8e8 b4bf",
        ))
        .unwrap();
    assert_eq!(third.get("custom-key"), Some(&b"custom-value"[..]));
    assert_eq!(decoder.table().size(), 164);
}

#[test]
fn test_huffman_known_vector() {
    let encoded = huffman::encode(b"www.example.com");
    assert_eq!(encoded, hex("f1e3 c2e5 f23a 6ba0 ab90 f4ff"));
    assert_eq!(huffman::decode(&encoded).unwrap(), b"www.example.com");
}

#[test]
fn test_encoder_output_decodes_with_hpack_crate() {
    let mut encoder = Encoder::new(4096);
    let mut reference = hpack::Decoder::new();

    let list = headers(&[
        (":method", "GET"),
        (":scheme", "https"),
        (":path", "/assets/app.js?v=3"),
        (":authority", "example.com"),
        ("accept-encoding", "gzip, deflate, br"),
        ("user-agent", "Mozilla/5.0 (X11; Linux x86_64)"),
        ("authorization", "Bearer secret-token"),
        ("x-custom", "\u{00e9}t\u{00e9}"),
    ]);

    for _ in 0..3 {
        let block = encoder.encode_map(&list);
        let decoded = reference.decode(&block).unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = list
            .iter()
            .map(|(n, v)| (n.to_vec(), v.to_vec()))
            .collect();
        assert_eq!(decoded, expected);
    }
}

#[test]
fn test_hpack_crate_output_decodes() {
    let mut reference = hpack::Encoder::new();
    let mut decoder = Decoder::new(4096);

    let pairs: Vec<(&[u8], &[u8])> = vec![
        (&b":status"[..], &b"200"[..]),
        (&b"content-type"[..], &b"text/html; charset=utf-8"[..]),
        (&b"cache-control"[..], &b"max-age=3600"[..]),
        (&b"set-cookie"[..], &b"id=a3fWa; Secure; HttpOnly"[..]),
    ];

    for _ in 0..3 {
        let block = reference.encode(pairs.iter().copied());
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded.len(), pairs.len());
        for (name, value) in &pairs {
            assert_eq!(decoded.get(std::str::from_utf8(name).unwrap()), Some(*value));
        }
    }
}

#[test]
fn test_context_pair_shrinks_and_regrows_table() {
    let mut client = HpackContext::default();
    let mut server = HpackContext::default();
    let list = headers(&[
        (":method", "GET"),
        (":path", "/"),
        ("x-request-id", "0123456789abcdef"),
    ]);

    server.decompress(&client.compress(&list)).unwrap();
    assert!(server.decoder().table().size() > 0);

    // peer shrinks the table it lets us use
    client.set_peer_header_table_size(0);
    let block = client.compress(&list);
    assert_eq!(server.decompress(&block).unwrap(), list);
    assert_eq!(server.decoder().table().size(), 0);

    client.set_peer_header_table_size(4096);
    let block = client.compress(&list);
    assert_eq!(server.decompress(&block).unwrap(), list);
    assert!(server.decoder().table().size() > 0);
}

#[test]
fn test_repeated_headers_compress_well() {
    let mut ctx = HpackContext::default();
    let list = headers(&[
        (":method", "GET"),
        (":scheme", "https"),
        (":authority", "cdn.example.com"),
        ("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)"),
        ("accept", "text/html,application/xhtml+xml"),
    ]);

    let first = ctx.compress(&list).len();
    let second = ctx.compress(&list).len();
    assert!(second < first / 4, "second block {} vs first {}", second, first);
    assert!(ctx.compression_ratio() < 0.6);
}

#[test]
fn test_decoder_rejects_oversized_table_update() {
    let mut ctx = HpackContext::new(HpackConfig {
        header_table_size: 1024,
        ..HpackConfig::default()
    });
    // dynamic table size update to 2048
    let err = ctx.decompress(&hex("3fe1 0f")).unwrap_err();
    assert_eq!(err, HpackError::TableSizeExceeded { size: 2048, max: 1024 });
}

#[test]
fn test_decode_errors_are_compression_errors() {
    let mut decoder = Decoder::new(4096);
    // index 70 is past the static table with an empty dynamic table
    let err: Error = decoder.decode(&[0xc6]).unwrap_err().into();
    assert_eq!(err.code(), ErrorCode::CompressionError);
    assert!(err.is_connection_error());

    let mut decoder = Decoder::new(4096);
    // literal with a truncated length prefix
    assert!(decoder.decode(&[0x40, 0x7f]).is_err());
}
