//! HTTP/2 error types
//!
//! This module defines error types for the connection engine, mapping to
//! the error codes defined in RFC 7540 Section 7.

use super::hpack::HpackError;
use super::stream::StreamState;
use std::fmt;

/// HTTP/2 errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// HTTP error from underlying HTTP layer
    #[error("HTTP error: {0}")]
    Http(#[from] crate::http::Error),

    /// Header compression failure; the connection's HPACK state is unusable
    #[error("HPACK error: {0}")]
    Hpack(#[from] HpackError),

    /// Protocol error detected (RFC 7540 Section 7 - Error code 0x1)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error (RFC 7540 Section 7 - Error code 0x2)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Flow control error (RFC 7540 Section 7 - Error code 0x3)
    #[error("Flow control error: {0}")]
    FlowControl(String),

    /// Stream closed (RFC 7540 Section 7 - Error code 0x5)
    #[error("Stream closed: {0}")]
    StreamClosed(u32),

    /// Frame size error (RFC 7540 Section 7 - Error code 0x6)
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Refused stream (RFC 7540 Section 7 - Error code 0x7)
    #[error("Refused stream: {0}")]
    RefusedStream(u32),

    /// Stream cancelled (RFC 7540 Section 7 - Error code 0x8)
    #[error("Stream {stream_id} cancelled: {reason}")]
    Cancel { stream_id: u32, reason: String },

    /// Enhance your calm (RFC 7540 Section 7 - Error code 0xb)
    #[error("Enhance your calm: {0}")]
    EnhanceYourCalm(String),

    /// Invalid stream ID
    #[error("Invalid stream ID: {0}")]
    InvalidStreamId(u32),

    /// Stream not found
    #[error("Stream not found: {0}")]
    StreamNotFound(u32),

    /// Concurrent stream limit reached
    #[error("Too many concurrent streams (max {max})")]
    StreamLimitExceeded { max: u32 },

    /// Stream was dispatched without a handler
    #[error("No handler registered for stream {0}")]
    NoHandlerRegistered(u32),

    /// A blocked sender was woken because its stream went away
    #[error("Flow control window closed for stream {0}")]
    FlowControlWindowClosed(u32),

    /// Event not allowed in the stream's current state
    #[error("Stream {stream_id}: cannot {event} in state {from}")]
    InvalidStateTransition {
        stream_id: u32,
        from: StreamState,
        event: &'static str,
    },

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Stream handler failed
    #[error("Handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Get the RFC 7540 error code to report for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Http(_) => ErrorCode::ProtocolError,
            Error::Hpack(_) => ErrorCode::CompressionError,
            Error::Protocol(_) => ErrorCode::ProtocolError,
            Error::Internal(_) => ErrorCode::InternalError,
            Error::FlowControl(_) => ErrorCode::FlowControlError,
            Error::StreamClosed(_) => ErrorCode::StreamClosed,
            Error::FrameSize(_) => ErrorCode::FrameSizeError,
            Error::RefusedStream(_) => ErrorCode::RefusedStream,
            Error::Cancel { .. } => ErrorCode::Cancel,
            Error::EnhanceYourCalm(_) => ErrorCode::EnhanceYourCalm,
            Error::InvalidStreamId(_) => ErrorCode::ProtocolError,
            Error::StreamNotFound(_) => ErrorCode::StreamClosed,
            Error::StreamLimitExceeded { .. } => ErrorCode::RefusedStream,
            Error::NoHandlerRegistered(_) => ErrorCode::InternalError,
            Error::FlowControlWindowClosed(_) => ErrorCode::Cancel,
            Error::InvalidStateTransition { .. } => ErrorCode::StreamClosed,
            Error::InvalidSettings(_) => ErrorCode::ProtocolError,
            Error::ConnectionClosed => ErrorCode::NoError,
            Error::Handler(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error must tear down the whole connection
    /// rather than a single stream
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Hpack(_)
                | Error::ConnectionClosed
                | Error::Protocol(_)
                | Error::FrameSize(_)
                | Error::InvalidSettings(_)
        )
    }

    /// Get the stream this error is scoped to, if any
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Error::StreamClosed(id)
            | Error::RefusedStream(id)
            | Error::InvalidStreamId(id)
            | Error::StreamNotFound(id)
            | Error::NoHandlerRegistered(id)
            | Error::FlowControlWindowClosed(id) => Some(*id),
            Error::Cancel { stream_id, .. } | Error::InvalidStateTransition { stream_id, .. } => {
                Some(*stream_id)
            }
            _ => None,
        }
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::NoError.as_u32(), 0x0);
        assert_eq!(ErrorCode::ProtocolError.as_u32(), 0x1);
        assert_eq!(ErrorCode::Http11Required.as_u32(), 0xd);

        assert_eq!(ErrorCode::from_u32(0x0), Some(ErrorCode::NoError));
        assert_eq!(ErrorCode::from_u32(0x9), Some(ErrorCode::CompressionError));
        assert_eq!(ErrorCode::from_u32(0xff), None);
    }

    #[test]
    fn test_error_code_name() {
        assert_eq!(ErrorCode::NoError.name(), "NO_ERROR");
        assert_eq!(ErrorCode::CompressionError.name(), "COMPRESSION_ERROR");
        assert_eq!(ErrorCode::FlowControlError.to_string(), "FLOW_CONTROL_ERROR (0x3)");
    }

    #[test]
    fn test_error_display() {
        let err = Error::Protocol("test error".to_string());
        assert_eq!(err.to_string(), "Protocol error: test error");

        let err = Error::StreamLimitExceeded { max: 100 };
        assert_eq!(err.to_string(), "Too many concurrent streams (max 100)");

        let err = Error::InvalidStateTransition {
            stream_id: 3,
            from: StreamState::Closed,
            event: "send data",
        };
        assert_eq!(err.to_string(), "Stream 3: cannot send data in state closed");
    }

    #[test]
    fn test_hpack_errors_are_connection_errors() {
        let err: Error = HpackError::InvalidIndex(0).into();
        assert_eq!(err.code(), ErrorCode::CompressionError);
        assert!(err.is_connection_error());

        let err = Error::FlowControlWindowClosed(5);
        assert_eq!(err.code(), ErrorCode::Cancel);
        assert!(!err.is_connection_error());
        assert_eq!(err.stream_id(), Some(5));
    }

    #[test]
    fn test_limit_maps_to_refused_stream() {
        let err = Error::StreamLimitExceeded { max: 1 };
        assert_eq!(err.code(), ErrorCode::RefusedStream);
        assert_eq!(err.stream_id(), None);
    }
}
