//! h2engine - HTTP/2 connection engine
//!
//! Protocol state for one HTTP/2 connection, independent of any socket or
//! frame codec: HPACK header compression, the stream state machine,
//! connection and stream flow control, priority scheduling, bounded
//! concurrent stream processing and server push.
//!
//! See [`http::h2`] for the engine and [`http`] for the message types.

pub mod http;
