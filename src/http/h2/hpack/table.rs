//! HPACK dynamic table (RFC 7541 Section 2.3.2 and Section 4)
//!
//! Entries are kept newest-first. Each insertion is stamped with a sequence
//! number so that name and (name, value) lookups resolve through hash maps
//! instead of scanning the table.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Per-entry overhead added to name and value lengths (RFC 7541 Section 4.1)
pub const ENTRY_OVERHEAD: usize = 32;

/// A header field stored in a dynamic table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderEntry {
    /// Create a new entry
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        HeaderEntry {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Size used for table accounting: `len(name) + len(value) + 32`
    pub fn size(&self) -> usize {
        entry_size(&self.name, &self.value)
    }
}

/// Accounting size of a (name, value) pair
pub fn entry_size(name: &[u8], value: &[u8]) -> usize {
    name.len() + value.len() + ENTRY_OVERHEAD
}

/// Bounded FIFO of recently used header fields.
///
/// Invariant: `size() <= max_size()` after every mutation.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    /// newest at the front
    entries: VecDeque<HeaderEntry>,
    size: usize,
    max_size: usize,
    /// total insertions so far; the newest entry has sequence `inserted - 1`
    inserted: u64,
    by_pair: HashMap<(Bytes, Bytes), u64>,
    by_name: HashMap<Bytes, u64>,
}

impl DynamicTable {
    /// Create an empty table bounded by `max_size` octets
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
            inserted: 0,
            by_pair: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Current accounted size in octets
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maximum size in octets
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at 0-based position (0 = most recently inserted)
    pub fn get(&self, position: usize) -> Option<&HeaderEntry> {
        self.entries.get(position)
    }

    /// Iterate newest-first
    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    /// Insert a new entry at the front, evicting from the back until it fits.
    ///
    /// An entry larger than `max_size` is not inserted and the table is left
    /// untouched; returns whether the entry was added.
    pub fn insert(&mut self, name: Bytes, value: Bytes) -> bool {
        let entry_size = entry_size(&name, &value);
        if entry_size > self.max_size {
            return false;
        }

        self.evict_to(self.max_size - entry_size);

        let seq = self.inserted;
        self.inserted += 1;
        self.by_name.insert(name.clone(), seq);
        self.by_pair.insert((name.clone(), value.clone()), seq);
        self.entries.push_front(HeaderEntry { name, value });
        self.size += entry_size;
        true
    }

    /// Change the maximum size, evicting as needed
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to(max_size);
    }

    /// Drop every entry, keeping the maximum size
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_pair.clear();
        self.by_name.clear();
        self.size = 0;
    }

    /// Position of the newest exact (name, value) match
    pub fn find_pair(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        let key = (Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
        self.by_pair.get(&key).map(|&seq| self.position(seq))
    }

    /// Position of the newest entry carrying `name`
    pub fn find_name(&self, name: &[u8]) -> Option<usize> {
        self.by_name.get(name).map(|&seq| self.position(seq))
    }

    fn position(&self, seq: u64) -> usize {
        (self.inserted - 1 - seq) as usize
    }

    fn evict_to(&mut self, target: usize) {
        while self.size > target {
            let seq = self.inserted - self.entries.len() as u64;
            let Some(entry) = self.entries.pop_back() else {
                break;
            };
            self.size -= entry.size();
            if self.by_name.get(&entry.name) == Some(&seq) {
                self.by_name.remove(&entry.name);
            }
            let key = (entry.name, entry.value);
            if self.by_pair.get(&key) == Some(&seq) {
                self.by_pair.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &'static str, value: &'static str) -> (Bytes, Bytes) {
        (Bytes::from_static(name.as_bytes()), Bytes::from_static(value.as_bytes()))
    }

    #[test]
    fn test_entry_size() {
        assert_eq!(HeaderEntry::new("custom-key", "custom-header").size(), 55);
    }

    #[test]
    fn test_insert_newest_first() {
        let mut table = DynamicTable::new(4096);
        let (n, v) = entry("a", "1");
        table.insert(n, v);
        let (n, v) = entry("b", "2");
        table.insert(n, v);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().name, "b");
        assert_eq!(table.get(1).unwrap().name, "a");
        assert_eq!(table.size(), 68);
    }

    #[test]
    fn test_eviction_keeps_bound() {
        // three 40-octet entries into a 100-octet table
        let mut table = DynamicTable::new(100);
        for (n, v) in [entry("n1", "va"), entry("n2", "vb"), entry("n3", "vc")] {
            table.insert(n, v);
            assert!(table.size() <= 100);
        }
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().name, "n3");
        assert_eq!(table.get(1).unwrap().name, "n2");
        assert_eq!(table.find_name(b"n1"), None);
    }

    #[test]
    fn test_oversized_entry_not_inserted() {
        let mut table = DynamicTable::new(64);
        let (n, v) = entry("k", "v");
        table.insert(n, v);
        let before = table.size();

        let big = Bytes::from(vec![b'x'; 100]);
        assert!(!table.insert(Bytes::from_static(b"big"), big));
        assert_eq!(table.size(), before);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_after_eviction_and_duplicates() {
        let mut table = DynamicTable::new(200);
        let (n, v) = entry("dup", "one");
        table.insert(n, v);
        let (n, v) = entry("dup", "one");
        table.insert(n, v);
        assert_eq!(table.find_pair(b"dup", b"one"), Some(0));

        let (n, v) = entry("other", "x");
        table.insert(n, v);
        assert_eq!(table.find_pair(b"dup", b"one"), Some(1));
        assert_eq!(table.find_name(b"dup"), Some(1));

        // shrinking evicts the older duplicate, the newer one must stay found
        table.set_max_size(80);
        assert_eq!(table.len(), 2);
        assert_eq!(table.find_pair(b"dup", b"one"), Some(1));
    }

    #[test]
    fn test_set_max_size_zero_empties() {
        let mut table = DynamicTable::new(4096);
        let (n, v) = entry("a", "b");
        table.insert(n, v);
        table.set_max_size(0);
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
        assert_eq!(table.find_name(b"a"), None);
    }
}
