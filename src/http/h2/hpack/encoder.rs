//! HPACK encoder (RFC 7541 Section 6)

use super::integer::{encode_integer, encode_string};
use super::table::{entry_size, DynamicTable};
use super::{is_sensitive, static_table, DEFAULT_TABLE_SIZE, DYNAMIC_TABLE_OFFSET};
use crate::http::HeaderMap;
use bytes::Bytes;
use std::borrow::Cow;
use tracing::trace;

/// Field representation chosen for one header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// `1xxxxxxx`
    Indexed,
    /// `01xxxxxx`
    IncrementalIndexing,
    /// `0000xxxx`
    WithoutIndexing,
    /// `0001xxxx`
    NeverIndexed,
}

/// Header block encoder with its own dynamic table
#[derive(Debug)]
pub struct Encoder {
    table: DynamicTable,
    huffman: bool,
    indexing: bool,
    /// smallest and final size set since the last header block
    pending_size_update: Option<(usize, usize)>,
    static_hits: u64,
    dynamic_hits: u64,
}

impl Encoder {
    /// Create an encoder with the given dynamic table size
    pub fn new(max_table_size: usize) -> Self {
        Encoder {
            table: DynamicTable::new(max_table_size),
            huffman: true,
            indexing: true,
            pending_size_update: None,
            static_hits: 0,
            dynamic_hits: 0,
        }
    }

    /// Enable or disable Huffman coding of string literals
    pub fn set_huffman(&mut self, enabled: bool) {
        self.huffman = enabled;
    }

    /// Enable or disable insertion into the dynamic table
    pub fn set_indexing(&mut self, enabled: bool) {
        self.indexing = enabled;
    }

    /// Change the dynamic table size.
    ///
    /// The table shrinks immediately; a Dynamic Table Size Update is emitted
    /// at the start of the next header block so the peer's decoder follows.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
        self.pending_size_update = Some(match self.pending_size_update {
            Some((min, _)) => (min.min(size), size),
            None => (size, size),
        });
    }

    /// Dynamic table used by this encoder
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Fields encoded as a static-table index
    pub fn static_hits(&self) -> u64 {
        self.static_hits
    }

    /// Fields encoded as a dynamic-table index
    pub fn dynamic_hits(&self) -> u64 {
        self.dynamic_hits
    }

    /// Encode a header map into a new header block
    pub fn encode_map(&mut self, headers: &HeaderMap) -> Bytes {
        let mut dst = Vec::with_capacity(headers.list_size() / 2);
        self.encode(headers.iter(), &mut dst);
        Bytes::from(dst)
    }

    /// Encode a list of header fields, in order, appending to `dst`
    pub fn encode<'a, I>(&mut self, headers: I, dst: &mut Vec<u8>)
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        if let Some((min, last)) = self.pending_size_update.take() {
            if min < last {
                encode_integer(min, 5, 0x20, dst);
            }
            encode_integer(last, 5, 0x20, dst);
        }

        for (name, value) in headers {
            let name: Cow<'_, [u8]> = if name.iter().any(u8::is_ascii_uppercase) {
                Cow::Owned(name.to_ascii_lowercase())
            } else {
                Cow::Borrowed(name)
            };
            let repr = self.encode_field(&name, value, dst);
            trace!(
                name = %String::from_utf8_lossy(&name),
                representation = ?repr,
                "hpack field encoded"
            );
        }
    }

    fn encode_field(&mut self, name: &[u8], value: &[u8], dst: &mut Vec<u8>) -> Representation {
        if let Some(index) = static_table::find_pair(name, value) {
            self.static_hits += 1;
            encode_integer(index, 7, 0x80, dst);
            return Representation::Indexed;
        }
        if let Some(pos) = self.table.find_pair(name, value) {
            self.dynamic_hits += 1;
            encode_integer(DYNAMIC_TABLE_OFFSET + pos, 7, 0x80, dst);
            return Representation::Indexed;
        }

        let name_index = static_table::find_name(name)
            .or_else(|| self.table.find_name(name).map(|pos| DYNAMIC_TABLE_OFFSET + pos));

        let repr = if is_sensitive(name) {
            Representation::NeverIndexed
        } else if self.indexing && entry_size(name, value) <= self.table.max_size() {
            Representation::IncrementalIndexing
        } else {
            Representation::WithoutIndexing
        };

        let (prefix_bits, flags) = match repr {
            Representation::IncrementalIndexing => (6, 0x40),
            Representation::NeverIndexed => (4, 0x10),
            _ => (4, 0x00),
        };

        match name_index {
            Some(index) => encode_integer(index, prefix_bits, flags, dst),
            None => {
                encode_integer(0, prefix_bits, flags, dst);
                encode_string(name, self.huffman, dst);
            }
        }
        encode_string(value, self.huffman, dst);

        if repr == Representation::IncrementalIndexing {
            self.table
                .insert(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
        }
        repr
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new(DEFAULT_TABLE_SIZE)
    }
}
