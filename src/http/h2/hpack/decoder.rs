//! HPACK decoder (RFC 7541 Section 6)

use super::integer::{decode_integer, decode_string};
use super::table::{entry_size, DynamicTable};
use super::{static_table, HpackError, Result, DEFAULT_TABLE_SIZE, DYNAMIC_TABLE_OFFSET};
use crate::http::HeaderMap;
use bytes::Bytes;
use tracing::trace;

/// Header block decoder with its own dynamic table
#[derive(Debug)]
pub struct Decoder {
    table: DynamicTable,
    /// upper bound a size update may request (our SETTINGS_HEADER_TABLE_SIZE)
    max_table_size_limit: usize,
    /// SETTINGS_MAX_HEADER_LIST_SIZE, if advertised
    max_header_list_size: Option<usize>,
    /// limit lowered below the table size; no size update seen yet
    size_update_pending: bool,
    /// the lowered limit is acknowledged, so the next block must open with a
    /// size update
    size_update_required: bool,
}

impl Decoder {
    /// Create a decoder whose table size may never exceed `max_table_size_limit`
    pub fn new(max_table_size_limit: usize) -> Self {
        Decoder {
            table: DynamicTable::new(max_table_size_limit),
            max_table_size_limit,
            max_header_list_size: None,
            size_update_pending: false,
            size_update_required: false,
        }
    }

    /// Dynamic table used by this decoder
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Current limit for size update instructions
    pub fn max_table_size_limit(&self) -> usize {
        self.max_table_size_limit
    }

    /// Change the negotiated limit.
    ///
    /// The table itself is left alone: the peer's encoder may still
    /// reference its entries until it has seen our SETTINGS. Lowering the
    /// limit below the table size only marks a size update as due; the
    /// table shrinks when that update arrives (RFC 7541 Section 4.2).
    pub fn set_max_table_size_limit(&mut self, limit: usize) {
        self.max_table_size_limit = limit;
        self.size_update_pending = self.table.max_size() > limit;
        if !self.size_update_pending {
            self.size_update_required = false;
        }
    }

    /// The peer acknowledged our lowered limit.
    ///
    /// From here on a block that does not start with a Dynamic Table Size
    /// Update fails, until one arrives.
    pub fn acknowledge_table_size_limit(&mut self) {
        self.size_update_required = self.size_update_pending;
    }

    /// Check if a size update from the peer is still outstanding
    pub fn is_size_update_pending(&self) -> bool {
        self.size_update_pending
    }

    /// Limit the decoded header list size (sum of `name + value + 32`)
    pub fn set_max_header_list_size(&mut self, size: Option<usize>) {
        self.max_header_list_size = size;
    }

    /// Decode one complete header block
    pub fn decode(&mut self, src: &[u8]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut pos = 0;
        let mut list_size = 0usize;
        let mut seen_field = false;

        while pos < src.len() {
            let first = src[pos];
            let rest = &src[pos..];

            if !seen_field && self.size_update_required && first & 0xe0 != 0x20 {
                return Err(HpackError::DecompressionFailed(
                    "expected dynamic table size update".to_string(),
                ));
            }

            if first & 0x80 != 0 {
                // Indexed Header Field
                let (index, used) = decode_integer(rest, 7)?;
                pos += used;
                let (name, value) = self.lookup(index)?;
                trace!(index, "hpack indexed field");
                list_size += self.push(&mut headers, name, value, list_size)?;
            } else if first & 0x40 != 0 {
                // Literal Header Field with Incremental Indexing
                let (name, value, used) = self.literal(rest, 6)?;
                pos += used;
                if entry_size(&name, &value) > self.table.max_size() {
                    // RFC 7541 Section 4.4: an oversized entry empties the table
                    self.table.clear();
                } else {
                    self.table.insert(name.clone(), value.clone());
                }
                list_size += self.push(&mut headers, name, value, list_size)?;
            } else if first & 0x20 != 0 {
                // Dynamic Table Size Update
                if seen_field {
                    return Err(HpackError::DecompressionFailed(
                        "dynamic table size update after header field".to_string(),
                    ));
                }
                let (size, used) = decode_integer(rest, 5)?;
                pos += used;
                if size > self.max_table_size_limit {
                    return Err(HpackError::TableSizeExceeded {
                        size,
                        max: self.max_table_size_limit,
                    });
                }
                trace!(size, "hpack table size update");
                self.table.set_max_size(size);
                self.size_update_pending = false;
                self.size_update_required = false;
                continue;
            } else {
                // Literal without indexing (0000) or never indexed (0001)
                let (name, value, used) = self.literal(rest, 4)?;
                pos += used;
                list_size += self.push(&mut headers, name, value, list_size)?;
            }
            seen_field = true;
        }

        Ok(headers)
    }

    fn literal(&self, src: &[u8], prefix_bits: u8) -> Result<(Bytes, Bytes, usize)> {
        let (index, mut used) = decode_integer(src, prefix_bits)?;
        let name = if index == 0 {
            let (name, n) = decode_string(&src[used..])?;
            used += n;
            Bytes::from(name)
        } else {
            self.lookup(index)?.0
        };
        let (value, n) = decode_string(&src[used..])?;
        used += n;
        Ok((name, Bytes::from(value), used))
    }

    fn lookup(&self, index: usize) -> Result<(Bytes, Bytes)> {
        if index == 0 {
            return Err(HpackError::InvalidIndex(0));
        }
        if let Some((name, value)) = static_table::get(index) {
            return Ok((Bytes::from_static(name), Bytes::from_static(value)));
        }
        self.table
            .get(index - DYNAMIC_TABLE_OFFSET)
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .ok_or(HpackError::InvalidIndex(
                u32::try_from(index).unwrap_or(u32::MAX),
            ))
    }

    fn push(
        &self,
        headers: &mut HeaderMap,
        name: Bytes,
        value: Bytes,
        list_size: usize,
    ) -> Result<usize> {
        let size = entry_size(&name, &value);
        if let Some(max) = self.max_header_list_size {
            if list_size + size > max {
                return Err(HpackError::DecompressionFailed(format!(
                    "header list size exceeds {}",
                    max
                )));
            }
        }
        headers.append(name, value);
        Ok(size)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new(DEFAULT_TABLE_SIZE)
    }
}
