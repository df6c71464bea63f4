//! The hub actor: connection registry, presence history, and broadcast
//! dispatch, serialized through one command loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use relaycast_protocol::{ChatMessage, ControlFrame, MessageKind, UserStatus};

use crate::client::{Client, ConnectionId};

/// Buffered capacity of the broadcast channel; inbound sessions drop
/// messages rather than block once it is full.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 1000;
pub const REGISTER_CHANNEL_CAPACITY: usize = 100;
pub const UNREGISTER_CHANNEL_CAPACITY: usize = 100;

/// Default number of chat messages retained in memory.
pub const DEFAULT_MESSAGE_HISTORY: usize = 100;

/// Delay before closing a connection rejected for a duplicate name, giving
/// the error frame a chance to flush.
const REJECT_CLOSE_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub command loop is no longer running")]
    Closed,

    #[error("broadcast channel is saturated")]
    Saturated,
}

struct HubState {
    clients: HashMap<ConnectionId, Client>,
    user_history: HashMap<String, UserStatus>,
    recent_messages: VecDeque<ChatMessage>,
}

impl HubState {
    fn is_username_connected(&self, username: &str) -> bool {
        self.clients
            .values()
            .any(|client| client.username() == username)
            || self
                .user_history
                .get(username)
                .is_some_and(|status| status.connected)
    }

    fn upsert_connected(&mut self, username: &str) {
        let now = Utc::now();
        self.user_history
            .entry(username.to_string())
            .and_modify(|status| {
                status.connected = true;
                status.connected_at = now;
                status.last_seen = now;
            })
            .or_insert_with(|| UserStatus::connected_now(username));
    }

    fn mark_disconnected(&mut self, username: &str) {
        if let Some(status) = self.user_history.get_mut(username) {
            status.connected = false;
            status.last_seen = Utc::now();
        }
    }
}

/// The actor owning all registry state. Consumes register, unregister and
/// broadcast commands from its channels in arrival order, which gives a
/// total order over registry mutations.
pub struct Hub {
    state: Arc<RwLock<HubState>>,
    register_rx: mpsc::Receiver<Client>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<String>,
    history_limit: usize,
}

/// Cloneable front door to the hub: channel senders for mutations plus a
/// shared read view for snapshot queries. Queries never touch the command
/// loop and never hand out live references.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    broadcast_tx: mpsc::Sender<String>,
    state: Arc<RwLock<HubState>>,
}

impl Hub {
    pub fn new() -> (Hub, HubHandle) {
        Self::with_history_limit(DEFAULT_MESSAGE_HISTORY)
    }

    pub fn with_history_limit(history_limit: usize) -> (Hub, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_CHANNEL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(UNREGISTER_CHANNEL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CHANNEL_CAPACITY);

        let state = Arc::new(RwLock::new(HubState {
            clients: HashMap::new(),
            user_history: HashMap::new(),
            recent_messages: VecDeque::new(),
        }));

        let hub = Hub {
            state: Arc::clone(&state),
            register_rx,
            unregister_rx,
            broadcast_rx,
            history_limit,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            state,
        };
        (hub, handle)
    }

    /// Run the command loop until every [`HubHandle`] has been dropped.
    ///
    /// No session failure terminates the loop; errors are contained to the
    /// offending connection.
    pub async fn run(mut self) {
        info!("hub started, awaiting connections");

        loop {
            tokio::select! {
                Some(client) = self.register_rx.recv() => self.register_client(client).await,
                Some(id) = self.unregister_rx.recv() => self.unregister_client(id).await,
                Some(frame) = self.broadcast_rx.recv() => self.broadcast_frame(frame).await,
                else => break,
            }
        }

        info!("hub command channels closed, stopping");
    }

    async fn register_client(&self, client: Client) {
        let username = client.username().to_string();

        let taken = self.state.read().await.is_username_connected(&username);
        if taken {
            warn!(%username, "rejecting registration, username already connected");
            match serde_json::to_string(&ControlFrame::username_taken(&username)) {
                Ok(frame) => {
                    if client.try_enqueue(frame).is_err() {
                        debug!(%username, "could not deliver rejection frame");
                    }
                }
                Err(error) => warn!(%error, "failed to serialize rejection frame"),
            }

            // close after a short grace so the rejection can flush
            let shutdown = client.shutdown_signal();
            tokio::spawn(async move {
                tokio::time::sleep(REJECT_CLOSE_GRACE).await;
                shutdown.notify_one();
            });
            return;
        }

        let count = {
            let mut state = self.state.write().await;
            state.upsert_connected(&username);
            state.clients.insert(client.id(), client.clone());
            state.clients.len()
        };
        info!(%username, clients = count, "client connected");

        match serde_json::to_string(&ControlFrame::connection_success(&username)) {
            Ok(frame) => {
                let _ = client.try_enqueue(frame);
            }
            Err(error) => warn!(%error, "failed to serialize connection ack"),
        }

        if let Some(frame) = self.user_list_frame().await {
            self.broadcast_frame(frame).await;
        }

        let mut join = ChatMessage::system(format!("{username} joined the chat"));
        join.kind = MessageKind::Join;
        match serde_json::to_string(&join) {
            Ok(frame) => self.broadcast_frame(frame).await,
            Err(error) => warn!(%error, "failed to serialize join notice"),
        }
    }

    /// Idempotent: unregistering a connection that is no longer in the
    /// registry (already evicted or already removed) is a no-op.
    async fn unregister_client(&self, id: ConnectionId) {
        let removed = self.state.write().await.clients.remove(&id);
        match removed {
            Some(client) => self.run_disconnects(vec![client]).await,
            None => debug!(connection = %id, "unregister for unknown connection"),
        }
    }

    async fn broadcast_frame(&self, frame: String) {
        self.record_chat_message(&frame).await;
        let evicted = self.deliver(&frame).await;
        self.run_disconnects(evicted).await;
    }

    /// Chat envelopes enter the bounded in-memory history, oldest evicted
    /// first. Control frames and presence notices do not parse as
    /// `message`-kind and are not retained.
    async fn record_chat_message(&self, frame: &str) {
        let Ok(message) = serde_json::from_str::<ChatMessage>(frame) else {
            return;
        };
        if message.kind != MessageKind::Message {
            return;
        }

        let mut state = self.state.write().await;
        state.recent_messages.push_back(message);
        while state.recent_messages.len() > self.history_limit {
            state.recent_messages.pop_front();
        }
    }

    /// Fan one frame out to every registered session without blocking.
    ///
    /// Sessions whose queue cannot absorb the frame are removed from the
    /// registry immediately and returned for disconnect processing;
    /// delivery to the remaining sessions continues regardless.
    async fn deliver(&self, frame: &str) -> Vec<Client> {
        let targets: Vec<Client> = self.state.read().await.clients.values().cloned().collect();
        debug!(recipients = targets.len(), "fanning out frame");

        let mut evicted = Vec::new();
        for client in targets {
            if client.try_enqueue(frame.to_string()).is_ok() {
                continue;
            }
            let removed = self.state.write().await.clients.remove(&client.id());
            if let Some(removed) = removed {
                warn!(username = %removed.username(), "evicting client with saturated queue");
                evicted.push(removed);
            }
        }
        evicted
    }

    /// Drive the presence-update path for disconnected sessions. Notifying
    /// the remaining sessions can evict further slow consumers, so this
    /// works through a list until the registry settles.
    async fn run_disconnects(&self, mut pending: Vec<Client>) {
        while let Some(client) = pending.pop() {
            pending.extend(self.disconnect(client).await);
        }
    }

    async fn disconnect(&self, client: Client) -> Vec<Client> {
        client.signal_shutdown();

        let count = {
            let mut state = self.state.write().await;
            state.mark_disconnected(client.username());
            state.clients.len()
        };
        info!(username = %client.username(), clients = count, "client disconnected");

        let mut evicted = Vec::new();
        if let Some(frame) = self.user_list_frame().await {
            evicted.extend(self.deliver(&frame).await);
        }

        let mut leave = ChatMessage::system(format!("{} left the chat", client.username()));
        leave.kind = MessageKind::Leave;
        match serde_json::to_string(&leave) {
            Ok(frame) => evicted.extend(self.deliver(&frame).await),
            Err(error) => warn!(%error, "failed to serialize leave notice"),
        }
        evicted
    }

    /// Serialize the presence list from a deep copy of the history so no
    /// recipient can observe hub-owned state.
    async fn user_list_frame(&self) -> Option<String> {
        let users: Vec<UserStatus> = {
            let state = self.state.read().await;
            state.user_history.values().cloned().collect()
        };
        match serde_json::to_string(&ControlFrame::UserList { users }) {
            Ok(frame) => Some(frame),
            Err(error) => {
                warn!(%error, "failed to serialize user list");
                None
            }
        }
    }
}

impl HubHandle {
    /// Submit a session for registration. The hub enforces name uniqueness
    /// and replies on the session's own queue.
    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        self.register_tx
            .send(client)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Remove a session from the registry. Safe to call more than once.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.unregister_tx.send(id).await.map_err(|_| HubError::Closed)
    }

    /// Non-blocking submission of a serialized frame for fan-out. Returns
    /// [`HubError::Saturated`] when the hub cannot keep up; the caller is
    /// expected to drop the frame rather than wait.
    pub fn try_broadcast(&self, frame: String) -> Result<(), HubError> {
        self.broadcast_tx.try_send(frame).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => HubError::Saturated,
            mpsc::error::TrySendError::Closed(_) => HubError::Closed,
        })
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    pub async fn connected_users(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .clients
            .values()
            .map(|client| client.username().to_string())
            .collect()
    }

    /// Snapshot of the full presence history, keyed by display name.
    pub async fn user_history(&self) -> HashMap<String, UserStatus> {
        self.state.read().await.user_history.clone()
    }

    /// Most recent chat messages, oldest first.
    pub async fn recent_messages(&self) -> Vec<ChatMessage> {
        self.state
            .read()
            .await
            .recent_messages
            .iter()
            .cloned()
            .collect()
    }
}
