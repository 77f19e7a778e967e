//! HTTP/2 connection engine
//!
//! Everything an HTTP/2 endpoint needs between the frame codec and the
//! application, for one connection:
//!
//! - **HPACK**: header compression with static and dynamic tables and
//!   Huffman coding ([`hpack`])
//! - **Stream lifecycle**: the RFC 7540 state machine and a registry that
//!   allocates IDs and enforces the concurrency limit ([`stream`])
//! - **Flow control**: connection and stream windows with async senders
//!   that park until WINDOW_UPDATE credit arrives ([`flow_control`])
//! - **Priority**: the dependency tree and a weighted scheduler
//!   ([`priority`])
//! - **Multiplexing**: bounded-concurrency dispatch of streams to handlers
//!   ([`multiplex`])
//! - **Server push**: choosing resources to push and tracking promises
//!   ([`push`])
//!
//! Framing, TLS and sockets are not handled here; the engine consumes
//! decoded frame contents and produces [`Outbound`] items for a writer.
//!
//! # Example
//!
//! ```no_run
//! use h2engine::http::h2::{EngineConfig, Error, FnHandler, MultiplexingManager};
//! use h2engine::http::{Request, Response, Status};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(header_block: &[u8]) -> h2engine::http::h2::Result<()> {
//! let (tx, mut frames) = mpsc::unbounded_channel();
//! let mux = MultiplexingManager::new(EngineConfig::default(), tx)?;
//! mux.set_default_handler(Arc::new(FnHandler(|request: Request| async move {
//!     Ok::<_, Error>(Response::new(Status::OK, format!("hello from {}", request.path)))
//! })));
//!
//! // HEADERS with END_STREAM arrived on stream 1
//! mux.receive_headers(1, header_block, true)?;
//! let response = mux.submit(1)?.await?;
//! println!("status {}", response.status);
//!
//! while let Ok(frame) = frames.try_recv() {
//!     println!("write {:?}", frame);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod flow_control;
pub mod hpack;
pub mod multiplex;
pub mod priority;
pub mod push;
pub mod settings;
pub mod stream;

pub use error::{Error, ErrorCode, Result};
pub use flow_control::{FlowControlWindow, FlowController, WindowHandle};
pub use hpack::{HpackConfig, HpackContext, HpackError};
pub use multiplex::{
    FnHandler, MultiplexStats, MultiplexingManager, Outbound, ResponseFuture, StreamHandler,
};
pub use priority::{PrioritySpec, StreamScheduler};
pub use push::{PushPromise, PushResource, ResourceType, ServerPushManager};
pub use settings::{EngineConfig, EngineConfigBuilder, Settings, SettingsBuilder};
pub use stream::{Stream, StreamId, StreamRegistry, StreamState};

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Largest SETTINGS_MAX_FRAME_SIZE a peer may announce (2^24 - 1)
pub const MAX_FRAME_SIZE_LIMIT: u32 = 16_777_215;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Largest flow control window (2^31 - 1)
pub const MAX_WINDOW_SIZE: u32 = 0x7FFFFFFF;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
