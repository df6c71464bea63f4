//! End-to-end tests driving the gateway over real sockets.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use relaycast_gateway::{build_router, GatewayState};
use relaycast_hub::{Hub, HubHandle};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (String, HubHandle) {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    let app = build_router(GatewayState::new(handle.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    (format!("ws://{addr}"), handle)
}

async fn connect(base: &str, username: &str) -> WsClient {
    let (socket, _) = connect_async(format!("{base}/ws?username={username}"))
        .await
        .expect("websocket connect");
    socket
}

/// Read frames until one satisfies the predicate, skipping everything else
/// (connection acks, presence updates, join and leave notices).
async fn wait_for(socket: &mut WsClient, predicate: impl Fn(&Value) -> bool) -> Value {
    timeout(RECV_TIMEOUT, async {
        loop {
            let frame = socket
                .next()
                .await
                .expect("connection closed while waiting")
                .expect("read frame");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).expect("json frame");
                if predicate(&value) {
                    return value;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

async fn send_chat(socket: &mut WsClient, content: &str) {
    let frame = json!({ "content": content, "hasImage": false }).to_string();
    socket
        .send(Message::Text(frame))
        .await
        .expect("send chat frame");
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn two_clients_exchange_messages() {
    let (base, _handle) = start_server().await;
    let mut alice = connect(&base, "alice").await;
    let mut bob = connect(&base, "bob").await;

    // both sides must have observed bob's join before alice sends, so the
    // broadcast is guaranteed to reach two registered sessions
    wait_for(&mut alice, |v| {
        v["type"] == "join" && v["content"].as_str().is_some_and(|c| c.contains("bob"))
    })
    .await;

    send_chat(&mut alice, "hello everyone").await;

    let seen_by_bob = wait_for(&mut bob, |v| v["type"] == "message").await;
    assert_eq!(seen_by_bob["username"], "alice");
    assert_eq!(seen_by_bob["content"], "hello everyone");

    // the sender hears their own message back
    let seen_by_alice = wait_for(&mut alice, |v| v["type"] == "message").await;
    assert_eq!(seen_by_alice["content"], "hello everyone");
}

#[tokio::test]
async fn duplicate_username_is_rejected_over_the_wire() {
    let (base, handle) = start_server().await;
    let mut first = connect(&base, "carol").await;
    wait_for(&mut first, |v| v["type"] == "connectionSuccess").await;

    let mut second = connect(&base, "carol").await;
    let rejection = wait_for(&mut second, |v| v["type"] == "error").await;
    assert_eq!(rejection["code"], "USERNAME_TAKEN");

    // the rejected connection is closed shortly after the error frame
    let closed = timeout(RECV_TIMEOUT, async {
        loop {
            match second.next().await {
                None | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("rejected connection never closed");
    assert!(closed);

    // the original session is untouched
    assert_eq!(handle.client_count().await, 1);
    send_chat(&mut first, "still here").await;
    let echoed = wait_for(&mut first, |v| v["type"] == "message").await;
    assert_eq!(echoed["content"], "still here");
}

#[tokio::test]
async fn invalid_username_fails_the_upgrade() {
    let (base, handle) = start_server().await;

    // too short
    assert!(connect_async(format!("{base}/ws?username=a")).await.is_err());
    // disallowed character
    assert!(connect_async(format!("{base}/ws?username=bad%20name"))
        .await
        .is_err());
    // missing entirely
    assert!(connect_async(format!("{base}/ws")).await.is_err());

    assert_eq!(handle.client_count().await, 0);
}

#[tokio::test]
async fn invalid_attachment_gets_error_frame_and_connection_survives() {
    let (base, _handle) = start_server().await;
    let mut dave = connect(&base, "dave").await;
    wait_for(&mut dave, |v| v["type"] == "connectionSuccess").await;

    let frame = json!({
        "content": "look at this",
        "hasImage": true,
        "image": {
            "data": "data:application/pdf;base64,AAAA",
            "name": "not-an-image.pdf",
            "type": "application/pdf",
            "size": 4
        }
    })
    .to_string();
    dave.send(Message::Text(frame)).await.expect("send frame");

    let rejection = wait_for(&mut dave, |v| v["type"] == "error").await;
    assert_eq!(rejection["code"], "INVALID_IMAGE");

    // the rejected attachment must not have been broadcast, and the
    // connection keeps working
    send_chat(&mut dave, "plain text instead").await;
    let echoed = wait_for(&mut dave, |v| v["type"] == "message").await;
    assert_eq!(echoed["content"], "plain text instead");
    assert_eq!(echoed["hasImage"], false);
}

#[tokio::test]
async fn valid_attachment_is_broadcast_with_metadata() {
    let (base, _handle) = start_server().await;
    let mut erin = connect(&base, "erin").await;
    wait_for(&mut erin, |v| v["type"] == "connectionSuccess").await;

    let frame = json!({
        "content": "photo",
        "hasImage": true,
        "image": {
            "data": "data:image/png;base64,iVBORw0KGgo=",
            "name": "photo.png",
            "type": "image/png",
            "size": 11
        }
    })
    .to_string();
    erin.send(Message::Text(frame)).await.expect("send frame");

    let echoed = wait_for(&mut erin, |v| v["type"] == "message").await;
    assert_eq!(echoed["hasImage"], true);
    assert_eq!(echoed["image"]["name"], "photo.png");
    assert_eq!(echoed["image"]["type"], "image/png");
}

#[tokio::test]
async fn blank_messages_are_discarded() {
    let (base, _handle) = start_server().await;
    let mut frank = connect(&base, "frank").await;
    wait_for(&mut frank, |v| v["type"] == "connectionSuccess").await;

    send_chat(&mut frank, "   ").await;
    send_chat(&mut frank, "").await;
    frank
        .send(Message::Text("{not json".into()))
        .await
        .expect("send garbage");
    send_chat(&mut frank, "real message").await;

    // the only chat envelope to come back is the real one
    let first = wait_for(&mut frank, |v| v["type"] == "message").await;
    assert_eq!(first["content"], "real message");
}

#[tokio::test]
async fn disconnect_broadcasts_leave_and_presence() {
    let (base, handle) = start_server().await;
    let mut grace = connect(&base, "grace").await;
    let mut heidi = connect(&base, "heidi").await;
    wait_for(&mut grace, |v| {
        v["type"] == "join" && v["content"].as_str().is_some_and(|c| c.contains("heidi"))
    })
    .await;

    heidi.close(None).await.expect("close heidi");

    // presence update first, then the leave notice
    let list = wait_for(&mut grace, |v| {
        v["type"] == "userList"
            && v["users"].as_array().is_some_and(|users| {
                users
                    .iter()
                    .any(|u| u["username"] == "heidi" && u["connected"] == false)
            })
    })
    .await;
    assert!(list["users"].as_array().is_some_and(|u| u.len() == 2));

    let leave = wait_for(&mut grace, |v| v["type"] == "leave").await;
    assert!(leave["content"].as_str().is_some_and(|c| c.contains("heidi")));

    let h = handle.clone();
    wait_until(|| {
        let h = h.clone();
        async move { h.client_count().await == 1 }
    })
    .await;
}

mod rest {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_endpoint_reports_connected_clients() {
        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run());
        let app = build_router(GatewayState::new(handle.clone()));

        let (client, _rx) = relaycast_hub::Client::new("ivy");
        handle.register(client).await.expect("register");
        let h = handle.clone();
        super::wait_until(|| {
            let h = h.clone();
            async move { h.client_count().await == 1 }
        })
        .await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("oneshot");
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.expect("body").to_bytes();
        let value: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(value["clients"], 1);
        assert_eq!(value["users"], json!(["ivy"]));
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run());
        let app = build_router(GatewayState::new(handle));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("oneshot");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
