//! # Relaycast Hub Crate
//!
//! The connection registry and broadcast dispatcher. One actor task owns
//! all registry mutations, fed by three bounded channels (register,
//! unregister, broadcast); per-session queues are bounded and every
//! producer on the dispatch path uses non-blocking sends, evicting slow
//! consumers instead of stalling fan-out.

pub mod client;
pub mod hub;

pub use client::{Client, ConnectionId, OUTBOUND_QUEUE_CAPACITY};
pub use hub::{Hub, HubError, HubHandle, DEFAULT_MESSAGE_HISTORY};
