//! HPACK static table (RFC 7541 Appendix A)

use std::collections::HashMap;
use std::sync::OnceLock;

/// Number of entries in the static table
pub const STATIC_TABLE_LEN: usize = 61;

/// Static entries; index `i` in this array is HPACK index `i + 1`.
pub static STATIC_TABLE: [(&str, &str); STATIC_TABLE_LEN] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

struct Lookup {
    /// first index carrying each name
    names: HashMap<&'static [u8], usize>,
    /// (value, index) pairs grouped by name
    values: HashMap<&'static [u8], Vec<(&'static [u8], usize)>>,
}

static LOOKUP: OnceLock<Lookup> = OnceLock::new();

fn lookup() -> &'static Lookup {
    LOOKUP.get_or_init(|| {
        let mut names = HashMap::new();
        let mut values: HashMap<&'static [u8], Vec<(&'static [u8], usize)>> = HashMap::new();
        for (i, (name, value)) in STATIC_TABLE.iter().enumerate() {
            names.entry(name.as_bytes()).or_insert(i + 1);
            values
                .entry(name.as_bytes())
                .or_default()
                .push((value.as_bytes(), i + 1));
        }
        Lookup { names, values }
    })
}

/// Look up an entry by its 1-based HPACK index.
pub fn get(index: usize) -> Option<(&'static [u8], &'static [u8])> {
    let (name, value) = STATIC_TABLE.get(index.checked_sub(1)?)?;
    Some((name.as_bytes(), value.as_bytes()))
}

/// Index of an exact (name, value) match.
pub fn find_pair(name: &[u8], value: &[u8]) -> Option<usize> {
    lookup()
        .values
        .get(name)?
        .iter()
        .find(|(v, _)| *v == value)
        .map(|&(_, index)| index)
}

/// Index of the first entry with this name.
pub fn find_name(name: &[u8]) -> Option<usize> {
    lookup().names.get(name).copied()
}
