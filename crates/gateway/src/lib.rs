//! # Relaycast Gateway Crate
//!
//! The HTTP edge of the hub: WebSocket upgrades with identity extraction,
//! the per-connection read/write pumps, and read-only REST endpoints over
//! hub snapshots.

pub mod rest;
pub mod session;

use axum::{routing::get, Router};
use relaycast_hub::HubHandle;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for all gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub hub: HubHandle,
}

impl GatewayState {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

/// Create the application router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(rest::health))
        .route("/api/status", get(rest::status))
        .route("/api/users", get(rest::users))
        .route("/api/messages", get(rest::messages))
        .route("/ws", get(session::websocket_handler))
        // clients connect cross-origin when the frontend is hosted elsewhere
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
