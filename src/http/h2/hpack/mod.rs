//! HPACK header compression (RFC 7541)
//!
//! One [`HpackContext`] exists per connection and pairs an [`Encoder`] for
//! outbound header blocks with a [`Decoder`] for inbound ones. Each side owns
//! its own dynamic table; the two evolve independently and are kept in step
//! with the peer only through the header blocks themselves.
//!
//! HPACK state is cumulative: after any decode error the decoder's dynamic
//! table can no longer be trusted, so callers must treat every
//! [`HpackError`] as fatal for the connection (COMPRESSION_ERROR).
//!
//! # Examples
//!
//! ```
//! use h2engine::http::HeaderMap;
//! use h2engine::http::h2::hpack::{HpackConfig, HpackContext};
//!
//! let mut client = HpackContext::new(HpackConfig::default());
//! let mut server = HpackContext::new(HpackConfig::default());
//!
//! let mut headers = HeaderMap::new();
//! headers.append(":method", "GET");
//! headers.append(":path", "/");
//!
//! let block = client.compress(&headers);
//! let decoded = server.decompress(&block).unwrap();
//! assert_eq!(decoded.get(":path"), Some(&b"/"[..]));
//! ```

pub mod context;
pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod integer;
pub mod static_table;
pub mod table;

pub use context::{HpackConfig, HpackContext, HpackStats};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use table::{DynamicTable, HeaderEntry};

/// Default dynamic table size (SETTINGS_HEADER_TABLE_SIZE)
pub const DEFAULT_TABLE_SIZE: usize = 4096;

/// First HPACK index that refers to the dynamic table
pub const DYNAMIC_TABLE_OFFSET: usize = static_table::STATIC_TABLE_LEN + 1;

/// Header names that are always sent as "never indexed" literals
pub const SENSITIVE_HEADERS: &[&[u8]] = &[
    b"authorization",
    b"cookie",
    b"set-cookie",
    b"proxy-authorization",
];

/// Whether a (lowercase) header name is treated as sensitive
pub fn is_sensitive(name: &[u8]) -> bool {
    SENSITIVE_HEADERS.contains(&name)
}

/// HPACK errors
///
/// All of these desynchronize the connection's compression state and must
/// propagate to connection teardown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HpackError {
    /// Index 0, or an index beyond the static and dynamic tables
    #[error("Invalid HPACK index: {0}")]
    InvalidIndex(u32),

    /// Malformed Huffman string (bad code, EOS, or bad padding)
    #[error("Invalid Huffman encoding")]
    InvalidHuffman,

    /// Truncated or overflowing integer
    #[error("Invalid HPACK integer")]
    InvalidInteger,

    /// Dynamic table size update above the negotiated limit
    #[error("Dynamic table size {size} exceeds limit {max}")]
    TableSizeExceeded { size: usize, max: usize },

    /// Any other malformed header block
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
}

/// Result type for HPACK operations
pub type Result<T> = std::result::Result<T, HpackError>;
