//! HTTP/2 flow control
//!
//! This module implements flow control as defined in RFC 7540 Section 5.2.
//!
//! One [`FlowController`] tracks the connection window plus one window per
//! stream. Senders that find a window exhausted park on a wait queue until a
//! WINDOW_UPDATE or a SETTINGS-driven increase of the initial window size
//! gives them credit again. Removing a stream or closing the connection fails
//! every parked sender so no waiter is left pending forever.

use super::error::{Error, Result};
use super::stream::StreamId;
use super::{CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Flow control window
///
/// Send and receive credit for one scope (the connection or one stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlWindow {
    /// Outbound credit; negative after an initial window size decrease
    send: i64,
    /// Inbound credit we have granted the peer
    receive: i64,
}

impl FlowControlWindow {
    /// Create a window with the same initial send and receive credit
    pub fn new(initial_size: u32) -> Self {
        FlowControlWindow {
            send: initial_size as i64,
            receive: initial_size as i64,
        }
    }

    /// Create a window with separate send and receive credit
    pub fn with_sizes(send: u32, receive: u32) -> Self {
        FlowControlWindow {
            send: send as i64,
            receive: receive as i64,
        }
    }

    /// Get send window
    pub fn send(&self) -> i64 {
        self.send
    }

    /// Get receive window
    pub fn receive(&self) -> i64 {
        self.receive
    }

    /// Increase the send window, saturating at 2^31-1
    pub fn increase(&mut self, increment: u32) -> i64 {
        self.send = (self.send + increment as i64).min(MAX_WINDOW_SIZE as i64);
        self.send
    }

    fn consume_send(&mut self, amount: usize) {
        self.send -= amount as i64;
    }

    fn consume_receive(&mut self, amount: usize) {
        self.receive -= amount as i64;
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        FlowControlWindow::new(DEFAULT_INITIAL_WINDOW_SIZE)
    }
}

/// Flow control counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowControlStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub window_updates_sent: u64,
    pub window_updates_received: u64,
    /// Times a sender had to park on a wait queue
    pub blocked_waits: u64,
}

type Waiter = oneshot::Sender<Result<()>>;

#[derive(Debug)]
struct State {
    connection: FlowControlWindow,
    streams: HashMap<StreamId, FlowControlWindow>,
    /// Peer's SETTINGS_INITIAL_WINDOW_SIZE, the send baseline for new streams
    send_initial: u32,
    /// Our initial window size, the refill target for receive windows
    receive_initial: u32,
    threshold: u32,
    /// Parked senders, keyed by the stream they want to send on
    waiters: HashMap<StreamId, Vec<Waiter>>,
    stats: FlowControlStats,
    closed: bool,
}

impl State {
    fn wake(&mut self, stream_id: StreamId) {
        if let Some(waiters) = self.waiters.remove(&stream_id) {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    fn wake_all(&mut self) {
        for (_, waiters) in self.waiters.drain() {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    fn fail(&mut self, stream_id: StreamId, err: Error) {
        if let Some(waiters) = self.waiters.remove(&stream_id) {
            for waiter in waiters {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    fn available(&self, stream_id: StreamId) -> Option<i64> {
        let connection = self.connection.send;
        if stream_id == CONNECTION_STREAM_ID {
            return Some(connection);
        }
        self.streams
            .get(&stream_id)
            .map(|window| connection.min(window.send))
    }
}

/// Connection and stream flow control
///
/// Cheap to clone; all clones share the same windows.
#[derive(Debug, Clone)]
pub struct FlowController {
    inner: Arc<Mutex<State>>,
}

impl FlowController {
    /// Create a controller.
    ///
    /// `initial_window_size` seeds the connection window and every stream
    /// window; receive windows are refilled once they fall below `threshold`.
    pub fn new(initial_window_size: u32, threshold: u32) -> Self {
        FlowController {
            inner: Arc::new(Mutex::new(State {
                connection: FlowControlWindow::new(initial_window_size),
                streams: HashMap::new(),
                send_initial: initial_window_size,
                receive_initial: initial_window_size,
                threshold,
                waiters: HashMap::new(),
                stats: FlowControlStats::default(),
                closed: false,
            })),
        }
    }

    /// Start tracking a stream and get its window handle.
    ///
    /// Registering an already tracked stream returns a handle to the
    /// existing window.
    pub fn register_stream(&self, stream_id: StreamId) -> WindowHandle {
        let mut state = self.inner.lock();
        let window = FlowControlWindow::with_sizes(state.send_initial, state.receive_initial);
        state.streams.entry(stream_id).or_insert(window);
        WindowHandle {
            controller: self.clone(),
            stream_id,
        }
    }

    /// Stop tracking a stream; parked senders on it fail with
    /// [`Error::FlowControlWindowClosed`]
    pub fn remove_stream(&self, stream_id: StreamId) {
        let mut state = self.inner.lock();
        state.streams.remove(&stream_id);
        state.fail(stream_id, Error::FlowControlWindowClosed(stream_id));
    }

    /// Wait for send credit on `stream_id` (0 for connection-only).
    ///
    /// Returns `min(connection window, stream window, size)`, which may be
    /// less than requested; the caller loops for the remainder and must
    /// report what it actually sent through [`consume_send_window`].
    ///
    /// [`consume_send_window`]: FlowController::consume_send_window
    pub async fn request_send(&self, stream_id: StreamId, size: usize) -> Result<usize> {
        loop {
            let rx = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(Error::ConnectionClosed);
                }
                let available = state
                    .available(stream_id)
                    .ok_or(Error::StreamNotFound(stream_id))?;
                if size == 0 {
                    return Ok(0);
                }
                if available > 0 {
                    return Ok(available.min(size as i64) as usize);
                }

                let (tx, rx) = oneshot::channel();
                let queue = state.waiters.entry(stream_id).or_default();
                queue.retain(|waiter| !waiter.is_closed());
                queue.push(tx);
                state.stats.blocked_waits += 1;
                trace!(stream_id, size, available, "sender blocked on flow control");
                rx
            };

            match rx.await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(Error::ConnectionClosed),
            }
        }
    }

    /// Apply a WINDOW_UPDATE from the peer.
    ///
    /// Windows saturate at 2^31-1. An increment of zero is a protocol
    /// violation the frame layer must reject before calling this; here it
    /// changes nothing. Updates for streams no longer tracked are ignored.
    pub fn process_window_update(&self, stream_id: StreamId, increment: u32) {
        if increment == 0 {
            return;
        }
        let mut state = self.inner.lock();
        state.stats.window_updates_received += 1;

        if stream_id == CONNECTION_STREAM_ID {
            let window = state.connection.increase(increment);
            debug!(stream_id, increment, window, "connection window update");
            state.wake_all();
        } else if let Some(stream) = state.streams.get_mut(&stream_id) {
            let window = stream.increase(increment);
            debug!(stream_id, increment, window, "stream window update");
            state.wake(stream_id);
        } else {
            trace!(stream_id, increment, "window update for unknown stream ignored");
        }
    }

    /// Apply the peer's new SETTINGS_INITIAL_WINDOW_SIZE.
    ///
    /// The difference is added to every stream's send window (RFC 7540
    /// Section 6.9.2); the connection window is unaffected. Fails without
    /// changing anything if a window would exceed 2^31-1.
    pub fn update_initial_window_size(&self, new_size: u32) -> Result<()> {
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "Initial window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        let mut state = self.inner.lock();
        let delta = new_size as i64 - state.send_initial as i64;
        if let Some((id, window)) = state
            .streams
            .iter()
            .find(|(_, window)| window.send + delta > MAX_WINDOW_SIZE as i64)
        {
            return Err(Error::FlowControl(format!(
                "Stream {} window {} would exceed maximum (2^31-1)",
                id,
                window.send + delta
            )));
        }

        for window in state.streams.values_mut() {
            window.send += delta;
        }
        state.send_initial = new_size;
        debug!(new_size, delta, "initial window size updated");

        if delta > 0 {
            state.wake_all();
        }
        Ok(())
    }

    /// Account for outbound DATA of `amount` bytes on both windows
    pub fn consume_send_window(&self, stream_id: StreamId, amount: usize) -> Result<()> {
        let mut state = self.inner.lock();
        let available = state
            .available(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;
        if amount as i64 > available {
            return Err(Error::FlowControl(format!(
                "Sending {} bytes on stream {} exceeds window {}",
                amount, stream_id, available
            )));
        }

        state.connection.consume_send(amount);
        if let Some(stream) = state.streams.get_mut(&stream_id) {
            stream.consume_send(amount);
        }
        state.stats.bytes_sent += amount as u64;
        trace!(stream_id, amount, "send window consumed");
        Ok(())
    }

    /// Account for inbound DATA of `amount` bytes on both windows.
    ///
    /// Fails with a flow control error if the peer overran a window.
    pub fn consume_receive_window(&self, stream_id: StreamId, amount: usize) -> Result<()> {
        let mut state = self.inner.lock();
        if amount as i64 > state.connection.receive {
            warn!(stream_id, amount, "peer exceeded connection receive window");
            return Err(Error::FlowControl(format!(
                "Received {} bytes, connection window is {}",
                amount, state.connection.receive
            )));
        }
        if stream_id != CONNECTION_STREAM_ID {
            let stream = state
                .streams
                .get(&stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?;
            if amount as i64 > stream.receive {
                warn!(stream_id, amount, "peer exceeded stream receive window");
                return Err(Error::FlowControl(format!(
                    "Received {} bytes on stream {}, window is {}",
                    amount, stream_id, stream.receive
                )));
            }
        }

        state.connection.consume_receive(amount);
        if let Some(stream) = state.streams.get_mut(&stream_id) {
            stream.consume_receive(amount);
        }
        state.stats.bytes_received += amount as u64;
        Ok(())
    }

    /// Collect the WINDOW_UPDATE increments due.
    ///
    /// Every receive window (connection under id 0, and each stream) below
    /// the threshold is refilled to the initial size; the returned map holds
    /// the increment to announce for each.
    pub fn generate_window_updates(&self) -> BTreeMap<StreamId, u32> {
        let mut state = self.inner.lock();
        let target = state.receive_initial as i64;
        let threshold = state.threshold as i64;
        let mut updates = BTreeMap::new();

        if state.connection.receive < threshold && state.connection.receive < target {
            updates.insert(
                CONNECTION_STREAM_ID,
                (target - state.connection.receive) as u32,
            );
            state.connection.receive = target;
        }
        for (id, window) in state.streams.iter_mut() {
            if window.receive < threshold && window.receive < target {
                updates.insert(*id, (target - window.receive) as u32);
                window.receive = target;
            }
        }

        state.stats.window_updates_sent += updates.len() as u64;
        if !updates.is_empty() {
            debug!(count = updates.len(), "window updates generated");
        }
        updates
    }

    /// Fail every parked sender and refuse further requests
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        let ids: Vec<StreamId> = state.waiters.keys().copied().collect();
        for id in ids {
            state.fail(id, Error::ConnectionClosed);
        }
        debug!("flow controller closed");
    }

    /// Check if the controller was closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Get a copy of a stream's window (0 for the connection)
    pub fn window(&self, stream_id: StreamId) -> Option<FlowControlWindow> {
        let state = self.inner.lock();
        if stream_id == CONNECTION_STREAM_ID {
            Some(state.connection)
        } else {
            state.streams.get(&stream_id).copied()
        }
    }

    /// Get connection send window
    pub fn connection_send_window(&self) -> i64 {
        self.inner.lock().connection.send
    }

    /// Get a stream's send window
    pub fn stream_send_window(&self, stream_id: StreamId) -> Option<i64> {
        self.inner.lock().streams.get(&stream_id).map(|w| w.send)
    }

    /// Bytes sendable right now on a stream without waiting
    pub fn available(&self, stream_id: StreamId) -> usize {
        self.inner
            .lock()
            .available(stream_id)
            .map_or(0, |available| available.max(0) as usize)
    }

    /// Get the current send baseline for new streams
    pub fn initial_window_size(&self) -> u32 {
        self.inner.lock().send_initial
    }

    /// Number of senders currently parked
    pub fn blocked_senders(&self) -> usize {
        self.inner
            .lock()
            .waiters
            .values()
            .map(|queue| queue.iter().filter(|w| !w.is_closed()).count())
            .sum()
    }

    /// Get statistics
    pub fn stats(&self) -> FlowControlStats {
        self.inner.lock().stats
    }
}

impl Default for FlowController {
    fn default() -> Self {
        FlowController::new(DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE / 2)
    }
}

/// A stream's view of the shared flow controller
#[derive(Debug, Clone)]
pub struct WindowHandle {
    controller: FlowController,
    stream_id: StreamId,
}

impl WindowHandle {
    /// Get stream ID
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Get the controller this handle belongs to
    pub fn controller(&self) -> &FlowController {
        &self.controller
    }

    /// Get stream send window, if the stream is still tracked
    pub fn send_window(&self) -> Option<i64> {
        self.controller.stream_send_window(self.stream_id)
    }

    /// Bytes sendable right now without waiting
    pub fn available(&self) -> usize {
        self.controller.available(self.stream_id)
    }

    /// Wait for send credit on this stream
    pub async fn request_send(&self, size: usize) -> Result<usize> {
        self.controller.request_send(self.stream_id, size).await
    }

    /// Account for outbound DATA on this stream
    pub fn consume_send(&self, amount: usize) -> Result<()> {
        self.controller.consume_send_window(self.stream_id, amount)
    }

    /// Account for inbound DATA on this stream
    pub fn consume_receive(&self, amount: usize) -> Result<()> {
        self.controller.consume_receive_window(self.stream_id, amount)
    }
}
