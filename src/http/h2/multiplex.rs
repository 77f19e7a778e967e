//! Stream multiplexing
//!
//! [`MultiplexingManager`] drives every stream of one connection: inbound
//! header blocks and DATA are fed into the registry, complete requests are
//! queued for a [`StreamHandler`], and up to `max_concurrent_processing`
//! handlers run at once as Tokio tasks. Responses are compressed through the
//! connection's HPACK context and chunked under flow control into
//! [`Outbound`] items for the frame writer.
//!
//! All connection state sits behind one lock. The lock is never held across
//! an await; header blocks are compressed and queued for output under the
//! same lock, so the peer's decoder sees them in compression order.

use super::error::{Error, ErrorCode, Result};
use super::flow_control::FlowController;
use super::hpack::{HpackContext, HpackStats};
use super::priority::{PrioritySpec, StreamScheduler};
use super::push::{PushPromise, ServerPushManager};
use super::settings::{EngineConfig, Settings};
use super::stream::{StreamId, StreamRegistry, StreamState};
use crate::http::{Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Work for the frame writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// HEADERS (plus CONTINUATION) carrying an HPACK block
    Headers {
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
    },
    /// One DATA frame payload, never above the peer's max frame size
    Data {
        stream_id: StreamId,
        payload: Bytes,
        end_stream: bool,
    },
    /// PUSH_PROMISE on the parent stream
    PushPromise {
        parent_stream_id: StreamId,
        promised_stream_id: StreamId,
        block: Bytes,
    },
    /// WINDOW_UPDATE (stream 0 for the connection)
    WindowUpdate { stream_id: StreamId, increment: u32 },
    /// RST_STREAM
    Reset { stream_id: StreamId, code: ErrorCode },
}

impl Outbound {
    /// Get the stream the frame is sent on
    pub fn stream_id(&self) -> StreamId {
        match self {
            Outbound::Headers { stream_id, .. }
            | Outbound::Data { stream_id, .. }
            | Outbound::WindowUpdate { stream_id, .. }
            | Outbound::Reset { stream_id, .. } => *stream_id,
            Outbound::PushPromise {
                parent_stream_id, ..
            } => *parent_stream_id,
        }
    }
}

/// Produces the response for one stream
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response>;
}

/// Simple handler function wrapper
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> StreamHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn handle(&self, request: Request) -> Result<Response> {
        (self.0)(request).await
    }
}

/// Resolves once a submitted stream finishes, fails or is cancelled
#[derive(Debug)]
pub struct ResponseFuture {
    stream_id: StreamId,
    rx: oneshot::Receiver<Result<Response>>,
}

impl ResponseFuture {
    /// Get stream ID
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(Error::ConnectionClosed)))
    }
}

/// Multiplexing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexStats {
    pub streams_created: u64,
    pub streams_completed: u64,
    pub streams_failed: u64,
    pub streams_cancelled: u64,
    pub headers_sent: u64,
    pub headers_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub window_updates_sent: u64,
    pub window_updates_received: u64,
    pub priority_changes: u64,
    pub pushes_promised: u64,
    /// Streams waiting for a processing slot
    pub queued: usize,
    /// Streams whose handler is running
    pub in_flight: usize,
}

struct Queued {
    stream_id: StreamId,
    handler: Arc<dyn StreamHandler>,
    priority: PrioritySpec,
}

struct State {
    registry: StreamRegistry,
    scheduler: StreamScheduler,
    hpack: HpackContext,
    push: ServerPushManager,
    queue: Vec<Queued>,
    pending: HashMap<StreamId, oneshot::Sender<Result<Response>>>,
    running: HashSet<StreamId>,
    tasks: HashMap<StreamId, JoinHandle<()>>,
    default_handler: Option<Arc<dyn StreamHandler>>,
    max_frame_size: usize,
    peer_push_enabled: bool,
    closed: bool,
    stats: MultiplexStats,
}

struct Inner {
    config: EngineConfig,
    flow: FlowController,
    output: mpsc::UnboundedSender<Outbound>,
    state: Mutex<State>,
}

/// Per-connection stream orchestrator
///
/// Cheap to clone; clones share the connection. Submitting, cancelling and
/// closing spawn or abort Tokio tasks and must run inside a Tokio runtime.
#[derive(Clone)]
pub struct MultiplexingManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for MultiplexingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexingManager")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl MultiplexingManager {
    /// Create a manager writing frames to `output`
    ///
    /// Fails with [`Error::InvalidSettings`] when `config` does not validate.
    pub fn new(config: EngineConfig, output: mpsc::UnboundedSender<Outbound>) -> Result<Self> {
        config.validate()?;
        let flow = FlowController::new(
            config.initial_window_size,
            config.window_update_threshold(),
        );
        let state = State {
            registry: StreamRegistry::new(
                config.is_server,
                config.max_concurrent_streams,
                flow.clone(),
            ),
            scheduler: StreamScheduler::new(),
            hpack: HpackContext::new(config.hpack_config()),
            push: ServerPushManager::from_config(&config),
            queue: Vec::new(),
            pending: HashMap::new(),
            running: HashSet::new(),
            tasks: HashMap::new(),
            default_handler: None,
            max_frame_size: config.max_frame_size as usize,
            peer_push_enabled: true,
            closed: false,
            stats: MultiplexStats::default(),
        };

        Ok(MultiplexingManager {
            inner: Arc::new(Inner {
                config,
                flow,
                output,
                state: Mutex::new(state),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Get the connection's flow controller
    pub fn flow(&self) -> &FlowController {
        &self.inner.flow
    }

    fn emit(&self, frame: Outbound) -> Result<()> {
        self.inner
            .output
            .send(frame)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Create a stream and register its priority.
    ///
    /// `None` allocates the next local ID; `Some(id)` creates a peer
    /// stream.
    pub fn create_stream(
        &self,
        stream_id: Option<StreamId>,
        priority: PrioritySpec,
    ) -> Result<StreamId> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        let stream_id = match stream_id {
            Some(id) => state.registry.get_or_create(id)?.id(),
            None => state.registry.create_stream()?,
        };
        if let Err(err) = state.scheduler.add_stream(stream_id, priority) {
            state.registry.close_stream(stream_id);
            return Err(err);
        }
        state.stats.streams_created += 1;
        Ok(stream_id)
    }

    /// Decode an inbound header block onto a stream, creating it on first
    /// reference.
    ///
    /// HPACK failures are connection errors; the block is always decoded
    /// before any stream check so the decoder stays in sync.
    pub fn receive_headers(
        &self,
        stream_id: StreamId,
        block: &[u8],
        end_stream: bool,
    ) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        let headers = state.hpack.decompress(block)?;
        let is_new = !state.registry.contains(stream_id);
        state
            .registry
            .get_or_create(stream_id)?
            .receive_headers(headers, end_stream)?;

        if is_new {
            state.stats.streams_created += 1;
            if !state.scheduler.contains(stream_id) {
                state.scheduler.add_stream(stream_id, PrioritySpec::default())?;
            }
        }
        state.stats.headers_received += 1;
        trace!(stream_id, len = block.len(), end_stream, "headers received");
        Ok(())
    }

    /// Append inbound DATA to a stream, charging the receive windows
    pub fn receive_data(&self, stream_id: StreamId, data: &[u8], end_stream: bool) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?
            .receive_data(data, end_stream)?;
        state.stats.bytes_received += data.len() as u64;
        Ok(())
    }

    /// Apply a PRIORITY frame
    pub fn update_priority(&self, stream_id: StreamId, priority: PrioritySpec) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.scheduler.update_priority(stream_id, priority)?;
        state.stats.priority_changes += 1;
        Ok(())
    }

    /// Apply a WINDOW_UPDATE frame
    pub fn process_window_update(&self, stream_id: StreamId, increment: u32) {
        self.inner.flow.process_window_update(stream_id, increment);
        self.inner.state.lock().stats.window_updates_received += 1;
    }

    /// Apply the peer's SETTINGS
    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if let Some(size) = settings.initial_window_size {
            self.inner.flow.update_initial_window_size(size)?;
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if let Some(max) = settings.max_concurrent_streams {
            state.registry.set_max_concurrent_streams(max);
        }
        if let Some(size) = settings.header_table_size {
            state.hpack.set_peer_header_table_size(size as usize);
        }
        if let Some(size) = settings.max_frame_size {
            state.max_frame_size = size as usize;
        }
        if let Some(push) = settings.enable_push {
            state.peer_push_enabled = push;
        }
        debug!(?settings, "peer settings applied");
        Ok(())
    }

    /// Emit WINDOW_UPDATEs for every receive window below the threshold.
    ///
    /// Returns the number of updates queued.
    pub fn flush_window_updates(&self) -> Result<usize> {
        let updates = self.inner.flow.generate_window_updates();
        let mut state = self.inner.state.lock();
        for (&stream_id, &increment) in &updates {
            self.emit(Outbound::WindowUpdate {
                stream_id,
                increment,
            })?;
        }
        state.stats.window_updates_sent += updates.len() as u64;
        Ok(updates.len())
    }

    /// Set the handler used by [`submit`](MultiplexingManager::submit)
    pub fn set_default_handler(&self, handler: Arc<dyn StreamHandler>) {
        self.inner.state.lock().default_handler = Some(handler);
    }

    /// Submit a stream to the default handler.
    ///
    /// Without one, the stream is cancelled and
    /// [`Error::NoHandlerRegistered`] returned.
    pub fn submit(&self, stream_id: StreamId) -> Result<ResponseFuture> {
        let handler = self.inner.state.lock().default_handler.clone();
        match handler {
            Some(handler) => self.submit_stream(stream_id, handler),
            None => {
                self.cancel_stream(stream_id, "no handler registered");
                Err(Error::NoHandlerRegistered(stream_id))
            }
        }
    }

    /// Queue a stream for processing by `handler` and start whatever the
    /// concurrency cap allows
    pub fn submit_stream(
        &self,
        stream_id: StreamId,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<ResponseFuture> {
        let rx = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            if !state.registry.contains(stream_id) {
                return Err(Error::StreamNotFound(stream_id));
            }
            if state.pending.contains_key(&stream_id) {
                return Err(Error::Protocol(format!(
                    "Stream {} already submitted",
                    stream_id
                )));
            }

            let priority = state.scheduler.get_priority(stream_id).unwrap_or_default();
            let (tx, rx) = oneshot::channel();
            state.queue.push(Queued {
                stream_id,
                handler,
                priority,
            });
            state.pending.insert(stream_id, tx);
            trace!(stream_id, weight = priority.weight, "stream queued");
            rx
        };

        self.schedule();
        Ok(ResponseFuture { stream_id, rx })
    }

    /// Pick queued streams for free slots: highest weight first, skipping
    /// entries whose dependency is itself still queued
    fn drain_queue(state: &mut State, max: usize) -> Vec<(StreamId, Arc<dyn StreamHandler>)> {
        let mut batch = Vec::new();
        while !state.closed && state.running.len() < max && !state.queue.is_empty() {
            let queued: HashSet<StreamId> = state.queue.iter().map(|q| q.stream_id).collect();
            let next = state
                .queue
                .iter()
                .enumerate()
                .filter(|(_, q)| {
                    q.priority.dependency == 0 || !queued.contains(&q.priority.dependency)
                })
                .max_by_key(|(i, q)| (q.priority.weight, Reverse(*i)))
                .map(|(i, _)| i)
                // stale snapshots can block each other; never stall an idle connection
                .or_else(|| state.running.is_empty().then_some(0));
            let Some(index) = next else { break };

            let entry = state.queue.remove(index);
            state.running.insert(entry.stream_id);
            state.scheduler.mark_ready(entry.stream_id);
            batch.push((entry.stream_id, entry.handler));
        }
        batch
    }

    fn schedule(&self) {
        let batch = {
            let mut state = self.inner.state.lock();
            Self::drain_queue(&mut state, self.inner.config.max_concurrent_processing)
        };

        for (stream_id, handler) in batch {
            debug!(stream_id, "stream dispatched");
            let manager = self.clone();
            let task = tokio::spawn(async move {
                manager.run_stream(stream_id, handler).await;
            });

            let mut state = self.inner.state.lock();
            if state.running.contains(&stream_id) {
                state.tasks.insert(stream_id, task);
            } else {
                task.abort();
            }
        }
    }

    async fn run_stream(self, stream_id: StreamId, handler: Arc<dyn StreamHandler>) {
        let result = self.process(stream_id, &handler).await;
        self.finish(stream_id, result);
        self.schedule();
    }

    fn take_request(&self, stream_id: StreamId) -> Result<Request> {
        let mut state = self.inner.state.lock();
        let stream = state
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;
        let body = stream.take_body();
        Ok(Request::from_headers(stream.headers(), body)?)
    }

    async fn process(
        &self,
        stream_id: StreamId,
        handler: &Arc<dyn StreamHandler>,
    ) -> Result<Response> {
        let request = self.take_request(stream_id)?;
        let response = handler.handle(request.clone()).await?;
        self.push_for(stream_id, &request, &response, handler);
        self.send_response(stream_id, &response).await?;
        Ok(response)
    }

    fn finish(&self, stream_id: StreamId, result: Result<Response>) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if !state.running.remove(&stream_id) {
            // cancelled while running
            return;
        }
        state.tasks.remove(&stream_id);
        state.scheduler.mark_not_ready(stream_id);

        match &result {
            Ok(response) => {
                state.stats.streams_completed += 1;
                state.push.complete_promise(stream_id);
                debug!(stream_id, status = %response.status, "stream completed");
            }
            Err(err) => {
                state.stats.streams_failed += 1;
                state.push.fail_promise(stream_id);
                warn!(stream_id, error = %err, "stream failed");
                if state.registry.close_stream(stream_id).is_some() {
                    let _ = self.emit(Outbound::Reset {
                        stream_id,
                        code: err.code(),
                    });
                }
                state.scheduler.remove_stream(stream_id);
            }
        }

        if let Some(tx) = state.pending.remove(&stream_id) {
            let _ = tx.send(result);
        }
    }

    fn push_for(
        &self,
        parent_stream_id: StreamId,
        request: &Request,
        response: &Response,
        handler: &Arc<dyn StreamHandler>,
    ) {
        let promises = {
            let mut state = self.inner.state.lock();
            if !state.peer_push_enabled {
                return;
            }
            state.push.create_push_promises(request, response, parent_stream_id)
        };

        for mut promise in promises {
            match self.push(parent_stream_id, &mut promise) {
                Ok(promised_stream_id) => {
                    if let Err(err) = self.submit_stream(promised_stream_id, handler.clone()) {
                        warn!(promised_stream_id, error = %err, "pushed stream not submitted");
                    }
                }
                Err(err) => {
                    let _ = promise.fail();
                    warn!(parent_stream_id, path = %promise.path, error = %err, "push failed");
                }
            }
        }
    }

    /// Reserve a stream for `promise` and emit its PUSH_PROMISE on the
    /// parent stream.
    ///
    /// The promised stream depends on the parent with the promise's
    /// priority as weight; submit it to produce the pushed response.
    pub fn push(&self, parent_stream_id: StreamId, promise: &mut PushPromise) -> Result<StreamId> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        if !state.peer_push_enabled || !state.push.is_enabled() {
            return Err(Error::Protocol("Server push is disabled".to_string()));
        }
        if !state
            .registry
            .get(parent_stream_id)
            .is_some_and(|s| s.can_send())
        {
            return Err(Error::StreamClosed(parent_stream_id));
        }

        let promised_stream_id = state.registry.reserve_push_stream()?;
        let headers = promise.request_headers();
        let block = state.hpack.compress(&headers);
        if let Some(stream) = state.registry.get_mut(promised_stream_id) {
            stream.set_headers(headers);
        }
        state.scheduler.add_stream(
            promised_stream_id,
            PrioritySpec::new(parent_stream_id, false, promise.priority),
        )?;
        self.emit(Outbound::PushPromise {
            parent_stream_id,
            promised_stream_id,
            block,
        })?;

        promise.mark_sent(promised_stream_id)?;
        state.push.track(promise.clone());
        state.stats.pushes_promised += 1;
        debug!(parent_stream_id, promised_stream_id, path = %promise.path, "push promised");
        Ok(promised_stream_id)
    }

    fn send_headers(
        &self,
        stream_id: StreamId,
        response: &Response,
        end_stream: bool,
    ) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        state
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?
            .send_headers(end_stream)?;

        let block = state.hpack.compress(&response.to_header_map());
        self.emit(Outbound::Headers {
            stream_id,
            block,
            end_stream,
        })?;
        state.stats.headers_sent += 1;
        Ok(())
    }

    /// Send response headers, then the body, ending the stream
    pub async fn send_response(&self, stream_id: StreamId, response: &Response) -> Result<()> {
        let end_stream = response.body.is_empty();
        self.send_headers(stream_id, response, end_stream)?;
        if !end_stream {
            self.send_data(stream_id, response.body.clone(), true).await?;
        }
        Ok(())
    }

    fn max_frame_size(&self) -> usize {
        self.inner.state.lock().max_frame_size
    }

    /// Write one chunk of at most `wanted` bytes if credit allows.
    ///
    /// Returns the chunk size; 0 if another stream took the credit first.
    fn write_chunk(
        &self,
        stream_id: StreamId,
        data: &Bytes,
        offset: usize,
        wanted: usize,
        end_stream: bool,
    ) -> Result<usize> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        let chunk = wanted.min(self.inner.flow.available(stream_id));
        if chunk == 0 {
            return Ok(0);
        }
        let end_stream = end_stream && offset + chunk == data.len();

        state
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?
            .send_data(chunk, end_stream)?;
        self.inner.flow.consume_send_window(stream_id, chunk)?;
        self.emit(Outbound::Data {
            stream_id,
            payload: data.slice(offset..offset + chunk),
            end_stream,
        })?;
        state.stats.bytes_sent += chunk as u64;
        trace!(stream_id, chunk, offset, end_stream, "data sent");
        Ok(chunk)
    }

    /// Send `data` on a stream in DATA chunks no larger than the peer's
    /// max frame size, waiting for flow control credit as needed.
    ///
    /// Chunks of one stream go out in call order. Returns the bytes sent.
    pub async fn send_data(
        &self,
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    ) -> Result<usize> {
        if data.is_empty() {
            self.write_empty(stream_id, end_stream)?;
            return Ok(0);
        }

        self.set_ready(stream_id, true);
        let mut offset = 0;
        while offset < data.len() {
            let wanted = (data.len() - offset).min(self.max_frame_size());
            self.inner.flow.request_send(stream_id, wanted).await?;
            offset += self.write_chunk(stream_id, &data, offset, wanted, end_stream)?;
        }
        self.set_ready(stream_id, false);
        Ok(data.len())
    }

    fn write_empty(&self, stream_id: StreamId, end_stream: bool) -> Result<()> {
        let mut state = self.inner.state.lock();
        state
            .registry
            .get_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?
            .send_data(0, end_stream)?;
        self.emit(Outbound::Data {
            stream_id,
            payload: Bytes::new(),
            end_stream,
        })
    }

    fn set_ready(&self, stream_id: StreamId, ready: bool) {
        let mut state = self.inner.state.lock();
        if ready {
            state.scheduler.mark_ready(stream_id);
        } else {
            state.scheduler.mark_not_ready(stream_id);
        }
    }

    /// Cancel a stream wherever it is: queued, running or idle.
    ///
    /// Fails its pending result, closes it and emits RST_STREAM(CANCEL).
    /// Returns false if there was nothing to cancel.
    pub fn cancel_stream(&self, stream_id: StreamId, reason: &str) -> bool {
        let found = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let mut found = false;

            if let Some(pos) = state.queue.iter().position(|q| q.stream_id == stream_id) {
                state.queue.remove(pos);
                found = true;
            }
            if state.running.remove(&stream_id) {
                found = true;
                if let Some(task) = state.tasks.remove(&stream_id) {
                    task.abort();
                }
            }
            if let Some(tx) = state.pending.remove(&stream_id) {
                let _ = tx.send(Err(Error::Cancel {
                    stream_id,
                    reason: reason.to_string(),
                }));
                found = true;
            }
            if state.registry.close_stream(stream_id).is_some() {
                found = true;
                let _ = self.emit(Outbound::Reset {
                    stream_id,
                    code: ErrorCode::Cancel,
                });
            }
            state.scheduler.remove_stream(stream_id);

            if found {
                state.stats.streams_cancelled += 1;
                state.push.cancel_promise(stream_id);
                warn!(stream_id, reason, "stream cancelled");
            }
            found
        };

        if found {
            self.schedule();
        }
        found
    }

    /// Tear down the connection: every queued or running stream fails with
    /// [`Error::ConnectionClosed`], blocked senders are released and later
    /// submissions are rejected
    pub fn close(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.closed {
                return;
            }
            state.closed = true;

            let pending = state.pending.len();
            state.queue.clear();
            for (_, tx) in state.pending.drain() {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
            state.running.clear();
            state.stats.streams_cancelled += pending as u64;
            warn!(pending, "connection closed");
            state.tasks.drain().map(|(_, task)| task).collect()
        };

        for task in tasks {
            task.abort();
        }
        self.inner.flow.close();
    }

    /// Check if the connection was closed
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Drop streams closed for longer than the drain delay
    ///
    /// Finished push promises and pushes older than the push TTL are
    /// forgotten as well.
    pub fn cleanup(&self) -> Vec<StreamId> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let drained = state
            .registry
            .cleanup_closed(self.inner.config.stream_drain_delay);
        for &stream_id in &drained {
            state.scheduler.remove_stream(stream_id);
        }
        state.push.clear_finished();
        let expired = state.push.prune_expired();
        if !drained.is_empty() || expired > 0 {
            trace!(streams = drained.len(), expired, "cleanup");
        }
        drained
    }

    /// Ask the priority scheduler which ready stream to serve next
    pub fn next_ready_stream(&self) -> Option<StreamId> {
        self.inner.state.lock().scheduler.get_next_stream()
    }

    /// Get a stream's current state
    pub fn stream_state(&self, stream_id: StreamId) -> Option<StreamState> {
        self.inner.state.lock().registry.get(stream_id).map(|s| s.state())
    }

    /// Get a stream's priority
    pub fn priority(&self, stream_id: StreamId) -> Option<PrioritySpec> {
        self.inner.state.lock().scheduler.get_priority(stream_id)
    }

    /// Get children of a stream in the priority tree (0 for the root)
    pub fn priority_children(&self, stream_id: StreamId) -> Vec<StreamId> {
        self.inner.state.lock().scheduler.children(stream_id)
    }

    /// Highest peer stream ID seen, for GOAWAY
    pub fn last_peer_stream_id(&self) -> StreamId {
        self.inner.state.lock().registry.last_peer_stream_id()
    }

    /// Run `f` against the push manager (to register resources and rules)
    pub fn with_push_manager<R>(&self, f: impl FnOnce(&mut ServerPushManager) -> R) -> R {
        f(&mut self.inner.state.lock().push)
    }

    /// Get HPACK statistics
    pub fn hpack_stats(&self) -> HpackStats {
        self.inner.state.lock().hpack.stats()
    }

    /// Get statistics
    pub fn stats(&self) -> MultiplexStats {
        let state = self.inner.state.lock();
        MultiplexStats {
            queued: state.queue.len(),
            in_flight: state.running.len(),
            ..state.stats
        }
    }
}
