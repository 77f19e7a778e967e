//! Per-connection HPACK state
//!
//! Wraps one encoder and one decoder, keeps compression statistics and
//! coordinates dynamic table size negotiation in both directions.

use super::{Decoder, Encoder, Result, DEFAULT_TABLE_SIZE};
use crate::http::HeaderMap;
use bytes::Bytes;
use tracing::{debug, warn};

/// HPACK configuration for one connection
#[derive(Debug, Clone)]
pub struct HpackConfig {
    /// Our SETTINGS_HEADER_TABLE_SIZE: the largest table the peer's encoder may use
    pub header_table_size: usize,
    /// Huffman-code string literals when it makes them shorter
    pub huffman_enabled: bool,
    /// Allow literals with incremental indexing
    pub indexing_enabled: bool,
    /// Our SETTINGS_MAX_HEADER_LIST_SIZE
    pub max_header_list_size: Option<usize>,
}

impl Default for HpackConfig {
    fn default() -> Self {
        HpackConfig {
            header_table_size: DEFAULT_TABLE_SIZE,
            huffman_enabled: true,
            indexing_enabled: true,
            max_header_list_size: None,
        }
    }
}

/// Compression statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HpackStats {
    pub headers_encoded: u64,
    pub headers_decoded: u64,
    /// Raw `name + value` octets handed to the encoder
    pub bytes_before: u64,
    /// Header block octets produced by the encoder
    pub bytes_after: u64,
    pub static_hits: u64,
    pub dynamic_hits: u64,
}

impl HpackStats {
    /// Encoded size as a fraction of the raw size (lower is better).
    ///
    /// Returns 1.0 before anything has been encoded.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }
}

/// Encoder/decoder pair for one connection
#[derive(Debug)]
pub struct HpackContext {
    encoder: Encoder,
    decoder: Decoder,
    /// peer's SETTINGS_HEADER_TABLE_SIZE; our encoder never exceeds it
    encoder_table_size_limit: usize,
    stats: HpackStats,
}

impl HpackContext {
    /// Create a context from configuration
    pub fn new(config: HpackConfig) -> Self {
        let mut encoder = Encoder::new(DEFAULT_TABLE_SIZE);
        encoder.set_huffman(config.huffman_enabled);
        encoder.set_indexing(config.indexing_enabled);

        let mut decoder = Decoder::new(config.header_table_size);
        decoder.set_max_header_list_size(config.max_header_list_size);

        HpackContext {
            encoder,
            decoder,
            encoder_table_size_limit: DEFAULT_TABLE_SIZE,
            stats: HpackStats::default(),
        }
    }

    /// Encode an outbound header list
    pub fn compress(&mut self, headers: &HeaderMap) -> Bytes {
        let block = self.encoder.encode_map(headers);

        let raw: usize = headers.iter().map(|(n, v)| n.len() + v.len()).sum();
        self.stats.headers_encoded += headers.len() as u64;
        self.stats.bytes_before += raw as u64;
        self.stats.bytes_after += block.len() as u64;
        self.stats.static_hits = self.encoder.static_hits();
        self.stats.dynamic_hits = self.encoder.dynamic_hits();
        block
    }

    /// Decode an inbound header block.
    ///
    /// Any error leaves the decoder's table in an unknown state; the
    /// connection must be torn down.
    pub fn decompress(&mut self, block: &[u8]) -> Result<HeaderMap> {
        match self.decoder.decode(block) {
            Ok(headers) => {
                self.stats.headers_decoded += headers.len() as u64;
                Ok(headers)
            }
            Err(err) => {
                warn!(error = %err, len = block.len(), "hpack decode failed");
                Err(err)
            }
        }
    }

    /// Resize our encoder's dynamic table.
    ///
    /// The request is clamped to the peer's advertised
    /// SETTINGS_HEADER_TABLE_SIZE. A size update instruction goes out at the
    /// start of the next compressed block.
    pub fn update_table_size(&mut self, size: usize) {
        let size = size.min(self.encoder_table_size_limit);
        debug!(size, "hpack encoder table resized");
        self.encoder.set_max_table_size(size);
    }

    /// Apply the peer's SETTINGS_HEADER_TABLE_SIZE
    pub fn set_peer_header_table_size(&mut self, size: usize) {
        self.encoder_table_size_limit = size;
        if self.encoder.table().max_size() != size {
            self.update_table_size(size);
        }
    }

    /// Change our advertised SETTINGS_HEADER_TABLE_SIZE (decoder side)
    ///
    /// A lower limit takes effect once the peer sends a size update; see
    /// [`Decoder::set_max_table_size_limit`].
    pub fn set_max_dynamic_table_size_limit(&mut self, limit: usize) {
        self.decoder.set_max_table_size_limit(limit);
    }

    /// The peer ACKed the SETTINGS frame that carried our table size
    pub fn acknowledge_table_size_limit(&mut self) {
        self.decoder.acknowledge_table_size_limit();
    }

    /// Toggle Huffman coding for outbound literals
    pub fn set_huffman_enabled(&mut self, enabled: bool) {
        self.encoder.set_huffman(enabled);
    }

    /// Toggle incremental indexing for outbound literals
    pub fn set_indexing_enabled(&mut self, enabled: bool) {
        self.encoder.set_indexing(enabled);
    }

    /// Outbound side
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Inbound side
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Statistics snapshot
    pub fn stats(&self) -> HpackStats {
        self.stats
    }

    /// Encoded size divided by raw size over the connection's lifetime
    pub fn compression_ratio(&self) -> f64 {
        self.stats.compression_ratio()
    }

    /// Zero the counters
    pub fn reset_stats(&mut self) {
        self.stats = HpackStats::default();
    }
}

impl Default for HpackContext {
    fn default() -> Self {
        HpackContext::new(HpackConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::hpack::HpackError;

    fn request() -> HeaderMap {
        vec![
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/index.html"),
            (":authority", "example.com"),
            ("user-agent", "h2engine-test"),
            ("cookie", "session=abc"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_round_trip_between_contexts() {
        let mut client = HpackContext::default();
        let mut server = HpackContext::default();

        for _ in 0..3 {
            let block = client.compress(&request());
            assert_eq!(server.decompress(&block).unwrap(), request());
        }
    }

    #[test]
    fn test_stats_and_ratio() {
        let mut ctx = HpackContext::default();
        assert_eq!(ctx.compression_ratio(), 1.0);

        ctx.compress(&request());
        let first = ctx.stats();
        assert_eq!(first.headers_encoded, 6);
        assert!(first.static_hits >= 1);

        ctx.compress(&request());
        let stats = ctx.stats();
        assert!(stats.dynamic_hits >= 2);
        assert!(ctx.compression_ratio() < 1.0);

        ctx.reset_stats();
        assert_eq!(ctx.stats().bytes_before, 0);
    }

    #[test]
    fn test_update_table_size_propagates() {
        let mut client = HpackContext::default();
        let mut server = HpackContext::default();

        let block = client.compress(&request());
        server.decompress(&block).unwrap();
        assert!(!server.decoder().table().is_empty());

        client.update_table_size(0);
        let block = client.compress(&request());
        assert_eq!(block[0], 0x20);
        server.decompress(&block).unwrap();
        assert!(server.decoder().table().is_empty());
        assert!(client.encoder().table().is_empty());
    }

    #[test]
    fn test_update_table_size_clamped_to_peer_limit() {
        let mut ctx = HpackContext::default();
        ctx.update_table_size(65536);
        assert_eq!(ctx.encoder().table().max_size(), DEFAULT_TABLE_SIZE);

        ctx.set_peer_header_table_size(1024);
        assert_eq!(ctx.encoder().table().max_size(), 1024);
    }

    #[test]
    fn test_decoder_limit_enforced() {
        let mut ctx = HpackContext::new(HpackConfig {
            header_table_size: 256,
            ..HpackConfig::default()
        });
        // size update to 4096
        let result = ctx.decompress(&[0x3f, 0xe1, 0x1f]);
        assert_eq!(
            result,
            Err(HpackError::TableSizeExceeded { size: 4096, max: 256 })
        );
    }

    #[test]
    fn test_round_trip_repeated_and_empty() {
        let headers: HeaderMap = vec![
            (":method", "GET"),
            (":path", "/"),
            ("a", ""),
            ("a", ""),
            ("authorization", ""),
            ("accept", "text/html"),
            ("accept", "application/json"),
            ("cookie", "a=1"),
            ("cookie", "b=2"),
        ]
        .into_iter()
        .collect();

        let mut client = HpackContext::default();
        let mut server = HpackContext::default();
        for _ in 0..2 {
            let block = client.compress(&headers);
            let decoded = server.decompress(&block).unwrap();
            assert_eq!(decoded, headers);
            assert_eq!(decoded.get_all("a"), vec![&b""[..], &b""[..]]);
            assert_eq!(decoded.get("authorization"), Some(&b""[..]));
            assert_eq!(
                decoded.get_all("accept"),
                vec![&b"text/html"[..], &b"application/json"[..]]
            );
        }
    }

    #[test]
    fn test_lowered_limit_keeps_entries_until_size_update() {
        let mut client = HpackContext::default();
        let mut server = HpackContext::default();

        server.decompress(&client.compress(&request())).unwrap();
        server.set_max_dynamic_table_size_limit(0);

        // client has not seen the SETTINGS yet and still indexes into the table
        let block = client.compress(&request());
        assert_eq!(server.decompress(&block).unwrap(), request());

        server.acknowledge_table_size_limit();
        client.set_peer_header_table_size(0);
        let block = client.compress(&request());
        assert_eq!(block[0], 0x20);
        assert_eq!(server.decompress(&block).unwrap(), request());
        assert!(server.decoder().table().is_empty());
    }
}
