//! Hub-side handle to one connected session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

/// Capacity of each session's outbound queue. Producers must never block on
/// this queue; a full queue marks the session as a slow consumer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The registry's view of a session: its identity, its bounded outbound
/// queue, and the shutdown signal that terminates its writer loop.
///
/// Clones share the same queue and signal. The display name is immutable
/// after creation.
#[derive(Debug, Clone)]
pub struct Client {
    id: ConnectionId,
    username: String,
    outbound: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl Client {
    /// Create a handle with the default queue capacity, returning the
    /// receiving end for the session's writer loop.
    pub fn new(username: impl Into<String>) -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(username, OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        username: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let client = Self {
            id: ConnectionId::next(),
            username: username.into(),
            outbound,
            shutdown: Arc::new(Notify::new()),
        };
        (client, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Non-blocking enqueue of one serialized frame. A `Full` error means
    /// the consumer has stalled; the caller decides whether to evict.
    pub fn try_enqueue(&self, frame: String) -> Result<(), TrySendError<String>> {
        self.outbound.try_send(frame)
    }

    /// Tell the session's writer loop to drain its queue and close the wire.
    /// The notification is stored, so it is never lost to a race with the
    /// writer's select loop.
    pub fn signal_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// The signal the writer loop must select on alongside its queue.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }
}
