//! HTTP message views
//!
//! Requests and responses as seen by an HTTP/2 stream: pseudo-headers are
//! lifted into typed fields, the remaining fields stay in a [`HeaderMap`].

use super::{Error, HeaderMap, Result};
use bytes::Bytes;
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse method from its token
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }

    /// Convert method to its token
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    /// Safe and cacheable, hence eligible to trigger or be a server push
    pub fn is_pushable(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(code.to_string()))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub const OK: Status = Status { code: 200 };
    pub const NO_CONTENT: Status = Status { code: 204 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Request carried on one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub scheme: String,
    pub authority: String,
    pub path: String,
    /// Regular (non-pseudo) header fields
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// Create a GET request for `path`
    pub fn get(authority: impl Into<String>, path: impl Into<String>) -> Self {
        Request {
            method: Method::Get,
            scheme: "https".to_string(),
            authority: authority.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build a request from a decoded header block
    pub fn from_headers(headers: &HeaderMap, body: Bytes) -> Result<Self> {
        let pseudo = |name: &'static str| {
            headers
                .get_str(name)
                .map(str::to_string)
                .ok_or(Error::MissingPseudoHeader(name))
        };
        let method = Method::parse(&pseudo(":method")?)?;
        let scheme = headers.get_str(":scheme").unwrap_or("https").to_string();
        let authority = headers
            .get_str(":authority")
            .or_else(|| headers.get_str("host"))
            .unwrap_or_default()
            .to_string();
        let path = pseudo(":path")?;

        let regular = headers
            .iter()
            .filter(|(name, _)| !name.starts_with(b":"))
            .map(|(n, v)| (Bytes::copy_from_slice(n), Bytes::copy_from_slice(v)))
            .collect();

        Ok(Request {
            method,
            scheme,
            authority,
            path,
            headers: regular,
            body,
        })
    }

    /// Header list with pseudo-headers first, as sent on the wire
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 4);
        map.append(":method", self.method.as_str());
        map.append(":scheme", self.scheme.clone());
        map.append(":authority", self.authority.clone());
        map.append(":path", self.path.clone());
        for (name, value) in self.headers.iter() {
            map.append(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
        }
        map
    }
}

/// Response produced for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response with a status and body
    pub fn new(status: Status, body: impl Into<Bytes>) -> Self {
        Response {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Add a header, builder style
    pub fn with_header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// `content-type` value, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_str("content-type")
    }

    /// Header list with `:status` first, as sent on the wire
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 1);
        map.append(":status", self.status.code().to_string());
        for (name, value) in self.headers.iter() {
            map.append(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("GET").unwrap(), Method::Get);
        assert_eq!(Method::parse("PATCH").unwrap(), Method::Patch);
        assert!(Method::parse("get").is_err());
        assert!(Method::Head.is_pushable());
        assert!(!Method::Post.is_pushable());
    }

    #[test]
    fn test_status() {
        assert!(Status::new(99).is_err());
        assert!(Status::new(600).is_err());
        assert!(Status::OK.is_success());
        assert!(!Status::NOT_FOUND.is_success());
    }

    #[test]
    fn test_request_from_headers() {
        let headers: HeaderMap = vec![
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/index.html"),
            ("accept", "text/html"),
        ]
        .into_iter()
        .collect();

        let request = Request::from_headers(&headers, Bytes::new()).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.authority, "example.com");
        assert_eq!(request.path, "/index.html");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.to_header_map().len(), 5);
    }

    #[test]
    fn test_request_missing_path() {
        let headers: HeaderMap = vec![(":method", "GET")].into_iter().collect();
        let result = Request::from_headers(&headers, Bytes::new());
        assert!(matches!(result, Err(Error::MissingPseudoHeader(":path"))));
    }

    #[test]
    fn test_response_header_map() {
        let response = Response::new(Status::OK, "hi").with_header("content-type", "text/plain");
        let map = response.to_header_map();
        assert_eq!(map.get(":status"), Some(&b"200"[..]));
        assert_eq!(response.content_type(), Some("text/plain"));
    }
}
