//! HTTP/2 stream management
//!
//! This module implements the stream lifecycle defined in RFC 7540
//! Section 5.1 and the per-connection registry that owns live streams.
//!
//! The state machine is local bookkeeping only: it never emits frames, it
//! only gates whether a stream may still be fed or drained.

use super::error::{Error, Result};
use super::flow_control::{FlowController, WindowHandle};
use super::MAX_STREAM_ID;
use crate::http::HeaderMap;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }

    /// Counts toward SETTINGS_MAX_CONCURRENT_STREAMS
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamState::Idle
                | StreamState::Open
                | StreamState::HalfClosedLocal
                | StreamState::HalfClosedRemote
        )
    }

    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::ReservedLocal => "reserved (local)",
            StreamState::ReservedRemote => "reserved (remote)",
            StreamState::Open => "open",
            StreamState::HalfClosedLocal => "half-closed (local)",
            StreamState::HalfClosedRemote => "half-closed (remote)",
            StreamState::Closed => "closed",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HTTP/2 stream
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    window: WindowHandle,
    headers: HeaderMap,
    trailers: Option<HeaderMap>,
    body: BytesMut,
    bytes_sent: u64,
    end_stream_sent: bool,
    end_stream_received: bool,
    created_at: Instant,
    closed_at: Option<Instant>,
}

impl Stream {
    /// Create an idle stream owning `window`
    pub fn new(id: StreamId, window: WindowHandle) -> Self {
        Stream {
            id,
            state: StreamState::Idle,
            window,
            headers: HeaderMap::new(),
            trailers: None,
            body: BytesMut::new(),
            bytes_sent: 0,
            end_stream_sent: false,
            end_stream_received: false,
            created_at: Instant::now(),
            closed_at: None,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        self.state.can_send()
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        self.state.can_receive()
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Get flow control handle
    pub fn window(&self) -> &WindowHandle {
        &self.window
    }

    /// Get request (or pushed request) headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace headers; used for the synthesized request of a pushed stream
    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    /// Get trailing headers, if any arrived
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Get accumulated body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take body (consumes the body data)
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// Get DATA payload bytes sent so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Check if END_STREAM was sent
    pub fn end_stream_sent(&self) -> bool {
        self.end_stream_sent
    }

    /// Check if END_STREAM was received
    pub fn end_stream_received(&self) -> bool {
        self.end_stream_received
    }

    /// Get creation time
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the time the stream reached `Closed`
    pub fn closed_at(&self) -> Option<Instant> {
        self.closed_at
    }

    fn invalid(&self, event: &'static str) -> Error {
        Error::InvalidStateTransition {
            stream_id: self.id,
            from: self.state,
            event,
        }
    }

    fn transition(&mut self, to: StreamState) {
        if self.state != to {
            debug!(stream_id = self.id, from = %self.state, to = %to, "stream state");
            self.state = to;
            if to.is_closed() && self.closed_at.is_none() {
                self.closed_at = Some(Instant::now());
            }
        }
    }

    /// Idle -> Open
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.transition(StreamState::Open);
                Ok(())
            }
            _ => Err(self.invalid("open")),
        }
    }

    /// Our side is done sending
    pub fn close_local(&mut self) -> Result<()> {
        match self.state {
            StreamState::Open => self.transition(StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote => self.transition(StreamState::Closed),
            _ => return Err(self.invalid("close local")),
        }
        self.end_stream_sent = true;
        Ok(())
    }

    /// The peer is done sending
    pub fn close_remote(&mut self) -> Result<()> {
        match self.state {
            StreamState::Open => self.transition(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => self.transition(StreamState::Closed),
            _ => return Err(self.invalid("close remote")),
        }
        self.end_stream_received = true;
        Ok(())
    }

    /// Idle -> ReservedLocal (we sent PUSH_PROMISE)
    pub fn reserve_local(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.transition(StreamState::ReservedLocal);
                Ok(())
            }
            _ => Err(self.invalid("reserve local")),
        }
    }

    /// Idle -> ReservedRemote (peer sent PUSH_PROMISE)
    pub fn reserve_remote(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.transition(StreamState::ReservedRemote);
                Ok(())
            }
            _ => Err(self.invalid("reserve remote")),
        }
    }

    /// Process an inbound header block.
    ///
    /// The first block is the request; a later one on an open stream is
    /// treated as trailers.
    pub fn receive_headers(&mut self, headers: HeaderMap, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.transition(StreamState::Open);
                self.headers = headers;
            }
            StreamState::ReservedRemote => {
                self.transition(StreamState::HalfClosedLocal);
                self.headers = headers;
            }
            StreamState::Open | StreamState::HalfClosedLocal => {
                self.trailers = Some(headers);
            }
            _ => return Err(self.invalid("receive headers")),
        }

        if end_stream {
            self.close_remote()?;
        }
        Ok(())
    }

    /// Process inbound DATA; accounts it against the receive windows
    pub fn receive_data(&mut self, data: &[u8], end_stream: bool) -> Result<()> {
        if !self.state.can_receive() {
            return Err(self.invalid("receive data"));
        }

        self.window.consume_receive(data.len())?;
        self.body.extend_from_slice(data);

        if end_stream {
            self.close_remote()?;
        }
        Ok(())
    }

    /// Prepare to send HEADERS
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => self.transition(StreamState::Open),
            StreamState::ReservedLocal => self.transition(StreamState::HalfClosedRemote),
            StreamState::Open | StreamState::HalfClosedRemote => {}
            _ => return Err(self.invalid("send headers")),
        }

        if end_stream {
            self.close_local()?;
        }
        Ok(())
    }

    /// Prepare to send `len` bytes of DATA.
    ///
    /// Flow control credit must already have been obtained from the window.
    pub fn send_data(&mut self, len: usize, end_stream: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(self.invalid("send data"));
        }
        self.bytes_sent += len as u64;

        if end_stream {
            self.close_local()?;
        }
        Ok(())
    }

    /// Force the stream closed (RST_STREAM sent or received)
    pub fn reset(&mut self) {
        self.transition(StreamState::Closed);
        self.body.clear();
    }
}

/// Stream registry
///
/// Owns all streams of one connection, allocates local stream IDs and
/// enforces the concurrent stream limit.
#[derive(Debug)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, Stream>,
    flow: FlowController,
    is_server: bool,
    /// Next locally initiated ID (client: odd, server: even)
    next_stream_id: StreamId,
    last_peer_stream_id: StreamId,
    max_concurrent_streams: u32,
    exhausted: bool,
}

impl StreamRegistry {
    /// Create a registry
    ///
    /// # Arguments
    /// * `is_server` - True for the server side (even local IDs), false for a client (odd)
    /// * `max_concurrent_streams` - Limit on active streams
    /// * `flow` - Flow controller that will track each stream's window
    pub fn new(is_server: bool, max_concurrent_streams: u32, flow: FlowController) -> Self {
        StreamRegistry {
            streams: HashMap::new(),
            flow,
            is_server,
            next_stream_id: if is_server { 2 } else { 1 },
            last_peer_stream_id: 0,
            max_concurrent_streams,
            exhausted: false,
        }
    }

    /// Set maximum concurrent streams
    pub fn set_max_concurrent_streams(&mut self, max: u32) {
        self.max_concurrent_streams = max;
    }

    /// Get maximum concurrent streams
    pub fn max_concurrent_streams(&self) -> u32 {
        self.max_concurrent_streams
    }

    /// Get next local stream ID (without incrementing)
    pub fn peek_next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    /// Highest peer-initiated stream ID seen, for GOAWAY
    pub fn last_peer_stream_id(&self) -> StreamId {
        self.last_peer_stream_id
    }

    fn is_local(&self, stream_id: StreamId) -> bool {
        (stream_id % 2 == 0) == self.is_server
    }

    fn check_limit(&self) -> Result<()> {
        if self.active_count() >= self.max_concurrent_streams as usize {
            return Err(Error::StreamLimitExceeded {
                max: self.max_concurrent_streams,
            });
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> Result<StreamId> {
        if self.exhausted {
            return Err(Error::Protocol("Stream IDs exhausted".to_string()));
        }
        let stream_id = self.next_stream_id;
        match self.next_stream_id.checked_add(2) {
            Some(next) if next <= MAX_STREAM_ID => self.next_stream_id = next,
            _ => self.exhausted = true,
        }
        Ok(stream_id)
    }

    fn insert(&mut self, stream_id: StreamId) -> &mut Stream {
        let window = self.flow.register_stream(stream_id);
        debug!(stream_id, "stream created");
        self.streams
            .entry(stream_id)
            .or_insert_with(|| Stream::new(stream_id, window))
    }

    /// Allocate the next local stream ID and create an idle stream
    pub fn create_stream(&mut self) -> Result<StreamId> {
        self.check_limit()?;
        let stream_id = self.allocate_id()?;
        self.insert(stream_id);
        Ok(stream_id)
    }

    /// Allocate a local stream and reserve it for a server push.
    ///
    /// Reserved streams do not count toward the concurrency limit.
    pub fn reserve_push_stream(&mut self) -> Result<StreamId> {
        if !self.is_server {
            return Err(Error::Protocol("Clients cannot push".to_string()));
        }
        let stream_id = self.allocate_id()?;
        self.insert(stream_id).reserve_local()?;
        Ok(stream_id)
    }

    /// Look up a stream, creating it on first reference by the peer.
    ///
    /// A new peer stream must use the peer's parity and an ID above every
    /// peer stream seen so far.
    pub fn get_or_create(&mut self, stream_id: StreamId) -> Result<&mut Stream> {
        if !self.streams.contains_key(&stream_id) {
            if stream_id == 0 || stream_id > MAX_STREAM_ID {
                return Err(Error::InvalidStreamId(stream_id));
            }
            if self.is_local(stream_id) {
                return Err(Error::StreamNotFound(stream_id));
            }
            if stream_id <= self.last_peer_stream_id {
                return Err(Error::StreamClosed(stream_id));
            }
            self.check_limit()?;
            self.last_peer_stream_id = stream_id;
            return Ok(self.insert(stream_id));
        }

        self.streams
            .get_mut(&stream_id)
            .ok_or(Error::StreamNotFound(stream_id))
    }

    /// Get a stream by ID
    pub fn get(&self, stream_id: StreamId) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    /// Get a mutable stream by ID
    pub fn get_mut(&mut self, stream_id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id)
    }

    /// Check if a stream is registered
    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.streams.contains_key(&stream_id)
    }

    /// Close and remove a stream immediately.
    ///
    /// Its flow control window goes with it, failing any parked sender.
    pub fn close_stream(&mut self, stream_id: StreamId) -> Option<Stream> {
        let mut stream = self.streams.remove(&stream_id)?;
        stream.reset();
        self.flow.remove_stream(stream_id);
        debug!(stream_id, "stream removed");
        Some(stream)
    }

    /// Remove streams that have been closed for at least `drain_delay`.
    ///
    /// Returns the removed IDs in ascending order.
    pub fn cleanup_closed(&mut self, drain_delay: Duration) -> Vec<StreamId> {
        let mut drained: Vec<StreamId> = self
            .streams
            .values()
            .filter(|s| s.closed_at().is_some_and(|at| at.elapsed() >= drain_delay))
            .map(Stream::id)
            .collect();
        drained.sort_unstable();

        for stream_id in &drained {
            self.streams.remove(stream_id);
            self.flow.remove_stream(*stream_id);
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "closed streams drained");
        }
        drained
    }

    /// Get number of active streams
    pub fn active_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.state().is_active())
            .count()
    }

    /// Get number of registered streams, closed ones included
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Check if no streams are registered
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Get all stream IDs in ascending order
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get the flow controller shared by all streams
    pub fn flow(&self) -> &FlowController {
        &self.flow
    }
}
