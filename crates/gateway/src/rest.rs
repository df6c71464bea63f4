//! Read-only REST endpoints over hub snapshots.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use relaycast_protocol::{ChatMessage, UserStatus};

use crate::GatewayState;

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub clients: usize,
    pub users: Vec<String>,
}

/// Currently connected client count and names.
pub async fn status(State(state): State<GatewayState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        clients: state.hub.client_count().await,
        users: state.hub.connected_users().await,
    })
}

/// Full presence history, every name that ever registered.
pub async fn users(State(state): State<GatewayState>) -> Json<Vec<UserStatus>> {
    let mut users: Vec<UserStatus> = state.hub.user_history().await.into_values().collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Json(users)
}

/// Recently broadcast chat messages, oldest first.
pub async fn messages(State(state): State<GatewayState>) -> Json<Vec<ChatMessage>> {
    Json(state.hub.recent_messages().await)
}
