//! Per-connection session protocol: the read and write pumps.
//!
//! Exactly one task reads the wire and exactly one task writes it. All
//! application-level sends route through the session's bounded outbound
//! queue; nothing writes to the sink from anywhere else.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use relaycast_hub::{Client, HubError, HubHandle};
use relaycast_protocol::{
    validate_image, validate_username, ChatMessage, ControlFrame, ErrorCode, InboundFrame,
};

use crate::GatewayState;

/// Deadline for a single write to the wire.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// How long the peer may stay silent before the connection is presumed dead;
/// refreshed by every heartbeat acknowledgement.
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Heartbeat probe interval, deliberately shorter than [`PONG_WAIT`].
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Inbound frame size limit, sized for inline image payloads.
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    username: String,
}

/// Upgrade handler for `GET /ws?username=...`.
///
/// The identity arrives out-of-band as a query parameter; it is trimmed and
/// validated here, before the upgrade, so a bad name costs no socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<GatewayState>,
) -> Response {
    let username = params.username.trim().to_string();
    if username.is_empty() {
        return (StatusCode::BAD_REQUEST, "username required").into_response();
    }
    if let Err(error) = validate_username(&username) {
        debug!(%username, %error, "rejecting websocket upgrade");
        return (StatusCode::BAD_REQUEST, "invalid username").into_response();
    }

    let hub = state.hub.clone();
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, hub, username))
}

async fn handle_socket(socket: WebSocket, hub: HubHandle, username: String) {
    let (sink, stream) = socket.split();
    let (client, outbound_rx) = Client::new(&username);

    // registration may still be rejected for a duplicate name; the hub
    // answers on the session's own queue either way
    if hub.register(client.clone()).await.is_err() {
        warn!(%username, "hub unavailable, dropping connection");
        return;
    }

    let writer = tokio::spawn(write_pump(sink, outbound_rx, client.shutdown_signal()));

    read_pump(stream, &hub, &client).await;

    // the reader always unregisters its own session on the way out,
    // no matter how it ended
    if hub.unregister(client.id()).await.is_err() {
        client.signal_shutdown();
    }
    let _ = writer.await;
    debug!(%username, "session finished");
}

/// Pump frames from the wire into the hub until the connection dies.
async fn read_pump(mut stream: SplitStream<WebSocket>, hub: &HubHandle, client: &Client) {
    let mut deadline = Instant::now() + PONG_WAIT;

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = time::sleep_until(deadline) => {
                debug!(username = %client.username(), "liveness deadline exceeded");
                return;
            }
        };

        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                debug!(username = %client.username(), %error, "read error");
                return;
            }
            None => return,
        };

        match frame {
            Message::Text(text) => handle_text(&text, hub, client),
            Message::Pong(_) => {
                deadline = Instant::now() + PONG_WAIT;
            }
            Message::Close(_) => {
                debug!(username = %client.username(), "peer closed connection");
                return;
            }
            Message::Ping(_) | Message::Binary(_) => {}
        }
    }
}

fn handle_text(text: &str, hub: &HubHandle, client: &Client) {
    let inbound: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(username = %client.username(), %error, "discarding malformed frame");
            return;
        }
    };

    let message = match inbound.image {
        Some(image) if inbound.has_image => {
            if let Err(error) = validate_image(&image) {
                debug!(username = %client.username(), %error, "rejecting attachment");
                send_error(client, error.to_string(), ErrorCode::InvalidImage);
                return;
            }
            ChatMessage::with_image(client.username(), inbound.content, image)
        }
        _ => {
            if inbound.content.trim().is_empty() {
                return;
            }
            ChatMessage::new(client.username(), inbound.content)
        }
    };

    let frame = match serde_json::to_string(&message) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(username = %client.username(), %error, "failed to serialize envelope");
            return;
        }
    };

    // never block the reader on the hub; a saturated hub loses the message
    match hub.try_broadcast(frame) {
        Ok(()) => {}
        Err(HubError::Saturated) => {
            warn!(username = %client.username(), "hub saturated, dropping message");
        }
        Err(HubError::Closed) => {
            warn!(username = %client.username(), "hub gone, dropping message");
        }
    }
}

/// Queue an error frame for this session only.
fn send_error(client: &Client, message: String, code: ErrorCode) {
    match serde_json::to_string(&ControlFrame::Error { message, code }) {
        Ok(frame) => {
            if client.try_enqueue(frame).is_err() {
                debug!(username = %client.username(), "could not queue error frame");
            }
        }
        Err(error) => warn!(%error, "failed to serialize error frame"),
    }
}

/// Pump queued frames and heartbeats onto the wire.
///
/// One queue item maps to exactly one text frame; queued messages are never
/// concatenated. Shutdown drains whatever is still queued, then sends a
/// close frame.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
) {
    let mut heartbeat = time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(frame) = queued else { return };
                if write_frame(&mut sink, Message::Text(frame)).await.is_err() {
                    return;
                }
            }
            _ = shutdown.notified() => {
                while let Ok(frame) = outbound.try_recv() {
                    if write_frame(&mut sink, Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                let _ = write_frame(&mut sink, Message::Close(None)).await;
                return;
            }
            _ = heartbeat.tick() => {
                if write_frame(&mut sink, Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: Message,
) -> Result<(), axum::Error> {
    match time::timeout(WRITE_WAIT, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => {
            debug!(%error, "write error");
            Err(error)
        }
        Err(elapsed) => {
            debug!("write deadline exceeded");
            Err(axum::Error::new(elapsed))
        }
    }
}
