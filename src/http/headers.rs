//! Header map for HTTP/2 messages
//!
//! HTTP/2 field names are lowercase on the wire, so names are lowercased on
//! insertion and all lookups are exact byte comparisons. Entries keep their
//! insertion order and a name may appear more than once.

use bytes::Bytes;
use std::fmt;

/// Insertion-ordered header multimap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(Bytes, Bytes)>,
}

fn lowercase(name: Bytes) -> Bytes {
    if name.iter().any(u8::is_ascii_uppercase) {
        Bytes::from(name.to_ascii_lowercase())
    } else {
        name
    }
}

impl HeaderMap {
    /// Create a new empty header map
    pub fn new() -> Self {
        HeaderMap {
            entries: Vec::new(),
        }
    }

    /// Create an empty header map with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        HeaderMap {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Add a header, keeping any existing values for the same name
    pub fn append(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push((lowercase(name.into()), value.into()));
    }

    /// Set a header, replacing every existing value for the same name
    pub fn insert(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        let name = lowercase(name.into());
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, value.into()));
    }

    /// Get the first value for a header
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_ref() == name.as_bytes())
            .map(|(_, v)| v.as_ref())
    }

    /// Get the first value for a header as UTF-8
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Get all values for a header
    pub fn get_all(&self, name: &str) -> Vec<&[u8]> {
        self.entries
            .iter()
            .filter(|(n, _)| n.as_ref() == name.as_bytes())
            .map(|(_, v)| v.as_ref())
            .collect()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.as_ref() == name.as_bytes())
    }

    /// Remove all instances of a header, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.entries.len();
        self.entries.retain(|(n, _)| n.as_ref() != name.as_bytes());
        initial_len - self.entries.len()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all headers
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(n, v)| (n.as_ref(), v.as_ref()))
    }

    /// Sum of `name + value + 32` over all entries (SETTINGS_MAX_HEADER_LIST_SIZE)
    pub fn list_size(&self) -> usize {
        self.entries
            .iter()
            .map(|(n, v)| n.len() + v.len() + 32)
            .sum()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(
                f,
                "{}: {}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value)
            )?;
        }
        Ok(())
    }
}

impl<N, V> FromIterator<(N, V)> for HeaderMap
where
    N: Into<Bytes>,
    V: Into<Bytes>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_get() {
        let mut headers = HeaderMap::new();
        headers.append("content-type", "text/html");
        headers.append("content-length", "42");

        assert_eq!(headers.get("content-type"), Some(&b"text/html"[..]));
        assert_eq!(headers.get_str("content-length"), Some("42"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn test_names_lowercased() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "text/html");

        assert_eq!(headers.get("content-type"), Some(&b"text/html"[..]));
        let (name, _) = headers.iter().next().unwrap();
        assert_eq!(name, b"content-type");
    }

    #[test]
    fn test_multiple_values() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1");
        headers.append("set-cookie", "b=2");

        let values = headers.get_all("set-cookie");
        assert_eq!(values, vec![&b"a=1"[..], &b"b=2"[..]]);
        assert_eq!(headers.get("set-cookie"), Some(&b"a=1"[..]));
    }

    #[test]
    fn test_insert_replaces() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", "1");
        headers.append("x-a", "2");
        headers.insert("x-a", "3");

        assert_eq!(headers.get_all("x-a"), vec![&b"3"[..]]);
    }

    #[test]
    fn test_remove() {
        let mut headers = HeaderMap::new();
        headers.append("x-remove", "value1");
        headers.append("x-keep", "value2");
        headers.append("x-remove", "value3");

        assert_eq!(headers.remove("x-remove"), 2);
        assert!(!headers.contains("x-remove"));
        assert!(headers.contains("x-keep"));
    }

    #[test]
    fn test_iter_order_and_list_size() {
        let headers: HeaderMap = vec![("a", "1"), ("b", "22")].into_iter().collect();
        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![(&b"a"[..], &b"1"[..]), (&b"b"[..], &b"22"[..])]);
        assert_eq!(headers.list_size(), 34 + 35);
    }
}
