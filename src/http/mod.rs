//! HTTP message model and the HTTP/2 connection engine
//!
//! The [`h2`] module holds the per-connection protocol engine. This module
//! provides the message types that flow through it: an insertion-ordered
//! [`HeaderMap`] and request/response views built from decoded header
//! blocks.

pub mod h2;
pub mod headers;
pub mod message;

pub use headers::HeaderMap;
pub use message::{Method, Request, Response, Status};

/// Result type for HTTP message operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP message errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Missing pseudo-header: {0}")]
    MissingPseudoHeader(&'static str),
}
