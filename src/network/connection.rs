//! The connection façade.
//!
//! A [`Connection`] exclusively owns one bidirectional socket and drives
//! its lifecycle: `Init → Connecting → Active → Closing → Closed`,
//! strictly monotonic and terminal at `Closed`. One read-loop task and
//! one write task run per active connection; every terminal condition
//! (local request, peer disconnect, IO error) funnels into a single
//! idempotent close guarded by an atomic check-and-set, so the close
//! side effects and listener notifications happen exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use super::config::ConnectionConfig;
use super::dialer;
use super::error::{ConnectionError, ConnectionResult};
use super::listeners::{dispatch_bytes, dispatch_event, BytesListener, EventListener, ListenerSet};
use super::state::{CloseType, ConnectionEvent, ConnectionState, FlushMode};

/// Upper-layer consumer of bytes pulled off the socket by the read loop.
pub type ReadConsumer = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Global connection ID counter.
static CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// A connection to a remote peer, client- or server-originated.
///
/// Cheap to clone; all clones refer to the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    /// Connection ID for tracking.
    id: u64,

    /// IO engine tunables.
    config: ConnectionConfig,

    /// Deadline for outbound dials; zero means unbounded.
    connect_timeout: Duration,

    /// Remote peer address. Fixed at construction.
    remote_addr: Option<SocketAddr>,

    /// Local address; known after accept or successful connect.
    local_addr: Mutex<Option<SocketAddr>>,

    /// Latest committed state transition, observable from any thread.
    state_tx: watch::Sender<ConnectionState>,

    /// Exactly-once guard for the close side effects.
    close_guard: AtomicBool,

    /// Stop signal for the read loop.
    read_stop_tx: watch::Sender<bool>,

    /// Stop signal for the write task (used by non-draining closes).
    write_stop_tx: watch::Sender<bool>,

    /// Whether IO tasks were ever started for this connection.
    io_started: AtomicBool,

    /// Handle to the write queue; taken on close to refuse new writes.
    write_tx: Mutex<Option<mpsc::Sender<Bytes>>>,

    /// Set true by the write task once it has terminated.
    writer_done_rx: Mutex<Option<watch::Receiver<bool>>>,

    /// Connection event listeners, in registration order.
    event_listeners: ListenerSet<Arc<dyn EventListener>>,

    /// Byte-read listeners, invoked with the cumulative read count.
    read_listeners: ListenerSet<BytesListener>,

    /// Byte-sent listeners, invoked with the per-write sent count.
    sent_listeners: ListenerSet<BytesListener>,

    /// Upper-layer consumer for inbound data.
    read_consumer: Mutex<Option<ReadConsumer>>,

    /// Cumulative bytes read off the socket.
    bytes_read: AtomicU64,

    /// Cumulative bytes written to the socket.
    bytes_sent: AtomicU64,
}

impl Connection {
    /// Create a client connection in `Init`.
    ///
    /// Does not touch the network; call [`Connection::connect`] to dial.
    #[must_use]
    pub fn new_client(
        config: ConnectionConfig,
        connect_timeout: Duration,
        remote_addr: Option<SocketAddr>,
        event_listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner::new(
                config,
                connect_timeout,
                remote_addr,
                None,
                ConnectionState::Init,
                event_listeners,
            )),
        }
    }

    /// Wrap an accepted socket in a connection that is `Active`
    /// immediately, with its read loop already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer or local address cannot be determined.
    pub fn new_server(
        stream: TcpStream,
        event_listeners: Vec<Arc<dyn EventListener>>,
    ) -> ConnectionResult<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        let inner = Arc::new(Inner::new(
            ConnectionConfig::default(),
            Duration::ZERO,
            Some(peer_addr),
            Some(local_addr),
            ConnectionState::Active,
            event_listeners,
        ));
        Inner::start_io(&inner, stream);

        Ok(Self { inner })
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the remote peer address, if one is configured or known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Get the local address, once the transport is established.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    /// The latest committed state transition.
    ///
    /// Safe to call from any thread, concurrently with IO.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Total bytes read off the socket.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.inner.bytes_read.load(Ordering::Relaxed)
    }

    /// Total bytes written to the socket.
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::Relaxed)
    }

    /// Append a connection event listener. Listeners are never removed
    /// and are notified in registration order.
    pub fn add_connection_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.event_listeners.register(listener);
    }

    /// Append a byte-read listener, invoked with the cumulative read
    /// count after each successful read.
    pub fn add_bytes_read_listener(&self, listener: BytesListener) {
        self.inner.read_listeners.register(listener);
    }

    /// Append a byte-sent listener, invoked with the count written after
    /// each successful transport write.
    pub fn add_bytes_sent_listener(&self, listener: BytesListener) {
        self.inner.sent_listeners.register(listener);
    }

    /// Number of registered connection event listeners.
    #[must_use]
    pub fn event_listener_count(&self) -> usize {
        self.inner.event_listeners.len()
    }

    /// Install the upper-layer consumer for inbound data. Without one,
    /// inbound bytes are counted and discarded.
    pub fn set_read_consumer(&self, consumer: ReadConsumer) {
        *self.inner.read_consumer.lock().unwrap() = Some(consumer);
    }

    /// Dial the configured remote address and activate the connection.
    ///
    /// Valid only from `Init`/`Connecting`. On success the connection is
    /// `Active` with its read loop running and a `Connected` event has
    /// been delivered.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidRemoteAddress`] immediately when no
    ///   remote address is configured; no dial is attempted.
    /// - [`ConnectionError::ConnectTimeout`] when the dial deadline
    ///   elapses; the connection settles in `Closed`.
    /// - [`ConnectionError::Io`] for other dial failures.
    pub async fn connect(&self) -> ConnectionResult<()> {
        let inner = &self.inner;

        match inner.state() {
            ConnectionState::Init | ConnectionState::Connecting => {}
            state => return Err(ConnectionError::NotActive { state }),
        }
        if inner.remote_addr.is_none() {
            return Err(ConnectionError::InvalidRemoteAddress);
        }

        inner.transition(ConnectionState::Connecting);

        match dialer::dial(inner.remote_addr, inner.connect_timeout).await {
            Ok(stream) => {
                if inner.close_guard.load(Ordering::Acquire) {
                    // Closed while the dial was in flight.
                    return Err(ConnectionError::NotActive {
                        state: inner.state(),
                    });
                }
                if let Ok(local) = stream.local_addr() {
                    *inner.local_addr.lock().unwrap() = Some(local);
                }
                Inner::start_io(inner, stream);
                inner.transition(ConnectionState::Active);
                debug!(conn_id = inner.id, remote = ?inner.remote_addr, "connected");
                dispatch_event(&inner.event_listeners.snapshot(), ConnectionEvent::Connected);
                Ok(())
            }
            Err(e) => {
                // The dial failed before any IO task started, so there is
                // nothing to release; settle straight into Closed. A
                // concurrent close may have won the guard while the dial
                // was in flight; its terminal Closed event has already
                // been delivered, and nothing may follow it.
                if inner
                    .close_guard
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let event = if e.is_timeout() {
                        ConnectionEvent::ConnectTimeout
                    } else {
                        ConnectionEvent::ConnectFailed
                    };
                    inner.transition(ConnectionState::Closed);
                    dispatch_event(&inner.event_listeners.snapshot(), event);
                }
                Err(e)
            }
        }
    }

    /// Enqueue an outbound buffer on the connection's write task.
    ///
    /// Never blocks the caller: a full queue surfaces
    /// [`ConnectionError::WriteQueueFull`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotActive`] when the connection has no
    /// active transport (not yet connected, or already closing).
    pub fn write(&self, buf: Bytes) -> ConnectionResult<()> {
        let sender = self.inner.write_tx.lock().unwrap().clone();
        let Some(sender) = sender else {
            return Err(ConnectionError::NotActive {
                state: self.state(),
            });
        };

        match sender.try_send(buf) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ConnectionError::WriteQueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnectionError::NotActive {
                state: self.state(),
            }),
        }
    }

    /// Close the connection.
    ///
    /// Idempotent: the first invocation (by any caller, local or
    /// engine-internal) signals the read loop to stop, drains or discards
    /// the write queue per `flush`, releases the socket, commits the
    /// `Closed` state, and notifies every event listener exactly once in
    /// registration order with `Closed(close_type)`. Every subsequent
    /// invocation returns success without repeating any of that.
    ///
    /// # Errors
    ///
    /// Infallible in practice; the `Result` mirrors the rest of the
    /// engine surface.
    pub async fn close(&self, flush: FlushMode, close_type: CloseType) -> ConnectionResult<()> {
        self.inner.close(flush, close_type).await
    }

    /// Wait until the connection has fully settled in `Closed`.
    ///
    /// Returns immediately if it already has. This is the completion
    /// signal for the close guarantee; tests wait on it instead of
    /// sleeping.
    pub async fn wait_for_closed(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("remote_addr", &self.inner.remote_addr)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn new(
        config: ConnectionConfig,
        connect_timeout: Duration,
        remote_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
        initial_state: ConnectionState,
        event_listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(initial_state);
        let (read_stop_tx, _) = watch::channel(false);
        let (write_stop_tx, _) = watch::channel(false);

        Self {
            id: CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            config,
            connect_timeout,
            remote_addr,
            local_addr: Mutex::new(local_addr),
            state_tx,
            close_guard: AtomicBool::new(false),
            read_stop_tx,
            write_stop_tx,
            io_started: AtomicBool::new(false),
            write_tx: Mutex::new(None),
            writer_done_rx: Mutex::new(None),
            event_listeners: ListenerSet::with_entries(event_listeners),
            read_listeners: ListenerSet::new(),
            sent_listeners: ListenerSet::new(),
            read_consumer: Mutex::new(None),
            bytes_read: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Latest committed state.
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Advance the state machine. Transitions only move forward; an
    /// attempt to revisit an earlier state is ignored.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut advanced = false;
        self.state_tx.send_if_modified(|state| {
            if next > *state {
                trace!(from = %state, to = %next, "state transition");
                *state = next;
                advanced = true;
                true
            } else {
                false
            }
        });
        advanced
    }

    /// Split the socket and spawn the read loop and write task.
    fn start_io(inner: &Arc<Self>, stream: TcpStream) {
        if inner.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(conn_id = inner.id, error = %e, "failed to set nodelay");
            }
        }

        let (read_half, write_half) = stream.into_split();
        // A zero depth is rejected by `ConnectionConfig::validate`, but a
        // config that skipped validation still must not take the engine
        // down here.
        let (data_tx, data_rx) = mpsc::channel(inner.config.write_queue_depth.max(1));
        let (done_tx, done_rx) = watch::channel(false);

        *inner.write_tx.lock().unwrap() = Some(data_tx);
        *inner.writer_done_rx.lock().unwrap() = Some(done_rx);
        inner.io_started.store(true, Ordering::Release);

        let read_stop = inner.read_stop_tx.subscribe();
        let write_stop = inner.write_stop_tx.subscribe();

        tokio::spawn(read_loop(Arc::clone(inner), read_half, read_stop));
        tokio::spawn(write_loop(
            Arc::clone(inner),
            write_half,
            data_rx,
            write_stop,
            done_tx,
        ));
    }

    async fn close(&self, flush: FlushMode, close_type: CloseType) -> ConnectionResult<()> {
        // Exactly-once: whoever wins this check-and-set performs the close
        // side effects; every other caller gets a successful no-op.
        if self
            .close_guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        debug!(conn_id = self.id, close_type = %close_type, flush = ?flush, "closing connection");
        self.transition(ConnectionState::Closing);

        // Stop the read loop; it observes this at its next blocking-read
        // boundary and exits without leaking.
        let _ = self.read_stop_tx.send(true);

        // Detach the write queue so new external writes are refused.
        let sender = self.write_tx.lock().unwrap().take();
        drop(sender);

        if flush == FlushMode::NoFlush {
            let _ = self.write_stop_tx.send(true);
        }

        // Wait for the write task to finish: on FlushWrite it drains the
        // queue first, bounded by the drain deadline. The socket is
        // released once both IO tasks have dropped their halves.
        if self.io_started.load(Ordering::Acquire) {
            let done_rx = self.writer_done_rx.lock().unwrap().clone();
            if let Some(mut done_rx) = done_rx {
                let drain = self.config.drain_timeout();
                if tokio::time::timeout(drain, done_rx.wait_for(|done| *done))
                    .await
                    .is_err()
                {
                    warn!(
                        conn_id = self.id,
                        "drain deadline elapsed, discarding queued data"
                    );
                    let _ = self.write_stop_tx.send(true);
                }
            }
        }

        self.transition(ConnectionState::Closed);
        dispatch_event(
            &self.event_listeners.snapshot(),
            ConnectionEvent::Closed(close_type),
        );
        Ok(())
    }
}

/// Classify the outcome of one read operation.
///
/// A zero-byte read with no error is deliberately mapped to end-of-stream
/// rather than retried; upstream consumers and their tests depend on
/// exactly this mapping, so keep it even though a generic byte stream
/// would conventionally retry.
fn classify_read(result: std::io::Result<usize>) -> ConnectionResult<usize> {
    match result {
        Ok(0) => Err(ConnectionError::EndOfStream),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ConnectionError::EndOfStream),
        Err(e) => Err(ConnectionError::Io(e)),
    }
}

/// Which side a failed write implicates.
fn write_error_close_type(error: &std::io::Error) -> CloseType {
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            CloseType::RemoteClose
        }
        _ => CloseType::LocalClose,
    }
}

/// The per-connection read loop.
///
/// Repeatedly pulls bytes off the socket, hands them to the upper-layer
/// consumer, and fires byte-read listeners with the cumulative count.
/// Any error outcome stops the loop and triggers the autonomous close;
/// an external stop signal exits cleanly without one.
async fn read_loop<R>(inner: Arc<Inner>, mut reader: R, mut stop_rx: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin + Send,
{
    let chunk = inner.config.read_buffer_size.max(1);
    let mut buf = BytesMut::with_capacity(chunk);

    let error = loop {
        if *stop_rx.borrow() {
            trace!(conn_id = inner.id, "read loop stopped");
            return;
        }

        // Keep spare capacity so a zero-byte result can only come from
        // the transport itself.
        buf.reserve(chunk);

        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    trace!(conn_id = inner.id, "read loop stopped");
                    return;
                }
            }
            result = reader.read_buf(&mut buf) => {
                match classify_read(result) {
                    Ok(n) => {
                        let total =
                            inner.bytes_read.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
                        let data = buf.split().freeze();

                        let consumer = inner.read_consumer.lock().unwrap().clone();
                        if let Some(consumer) = consumer {
                            consumer(data);
                        }
                        dispatch_bytes(&inner.read_listeners.snapshot(), total);
                    }
                    Err(e) => break e,
                }
            }
        }
    };

    match &error {
        ConnectionError::EndOfStream => {
            debug!(conn_id = inner.id, "peer closed the stream");
        }
        e => warn!(conn_id = inner.id, error = %e, "read failed"),
    }

    drop(reader);
    // Autonomous close: peer-origin, nothing worth draining.
    let _ = inner.close(FlushMode::NoFlush, CloseType::RemoteClose).await;
}

/// The per-connection write task.
///
/// Serializes outbound buffers onto the socket and fires byte-sent
/// listeners with the count written. When the queue is detached by a
/// draining close it delivers everything still queued before exiting; a
/// non-draining close stops it immediately, discarding the queue.
async fn write_loop<W>(
    inner: Arc<Inner>,
    mut writer: W,
    mut data_rx: mpsc::Receiver<Bytes>,
    mut stop_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut stopped = false;
    let write_error: Option<std::io::Error> = loop {
        if *stop_rx.borrow() {
            stopped = true;
            break None;
        }

        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    stopped = true;
                    break None;
                }
            }
            next = data_rx.recv() => {
                let Some(buf) = next else {
                    // Queue detached and fully drained.
                    break None;
                };
                let len = buf.len() as u64;
                // A peer that stopped reading can stall this write
                // indefinitely; the stop signal must still terminate the
                // task, abandoning the write with the rest of the queue.
                tokio::select! {
                    result = writer.write_all(&buf) => match result {
                        Ok(()) => {
                            inner.bytes_sent.fetch_add(len, Ordering::Relaxed);
                            dispatch_bytes(&inner.sent_listeners.snapshot(), len);
                        }
                        Err(e) => break Some(e),
                    },
                    _ = stop_rx.wait_for(|stop| *stop) => {
                        stopped = true;
                        break None;
                    }
                }
            }
        }
    };

    if !stopped {
        // The flush can stall on the same dead peer as the writes, so it
        // too yields to the stop signal.
        tokio::select! {
            _ = writer.flush() => {}
            _ = stop_rx.wait_for(|stop| *stop) => {}
        }
    }
    drop(writer);

    // Signal termination before any close call below, so a concurrent
    // draining close never waits on this task while it waits on close.
    let _ = done_tx.send(true);

    if let Some(e) = write_error {
        let close_type = write_error_close_type(&e);
        warn!(conn_id = inner.id, error = %e, "write failed");
        let _ = inner.close(FlushMode::NoFlush, close_type).await;
    }
}
