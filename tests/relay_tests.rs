mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::test_context;
use deckflow::auth;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: std::net::SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("connect");
    socket
}

async fn authenticate(socket: &mut Socket, user_id: &str) -> Value {
    let token = auth::sign_user_token(common::TOKEN_SECRET, user_id);
    socket
        .send(Message::Text(
            json!({ "type": "authenticate", "token": token }).to_string(),
        ))
        .await
        .expect("send authenticate");

    let ack = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("ack timeout")
        .expect("ack frame")
        .expect("ack ok");
    match ack {
        Message::Text(text) => serde_json::from_str(&text).expect("ack json"),
        other => panic!("unexpected ack frame: {other:?}"),
    }
}

async fn next_event(socket: &mut Socket, within: Duration) -> Option<Value> {
    match tokio::time::timeout(within, socket.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

#[tokio::test]
async fn events_reach_only_the_owning_users_room() {
    let ctx = test_context(None).await;
    let addr = ctx.relay.local_addr();

    let mut alice = connect(addr).await;
    let ack = authenticate(&mut alice, "u-alice").await;
    assert_eq!(ack["event"], "authenticated");
    assert_eq!(ack["data"]["user_id"], "u-alice");

    let mut bob = connect(addr).await;
    authenticate(&mut bob, "u-bob").await;

    ctx.state
        .relay
        .emit_presentation_ready("u-alice", "p-1", 5)
        .await;

    let event = next_event(&mut alice, Duration::from_secs(2))
        .await
        .expect("alice event");
    assert_eq!(event["event"], "presentation:ready");
    assert_eq!(event["data"]["presentation_id"], "p-1");
    assert_eq!(event["data"]["slides_count"], 5);
    assert!(!event["timestamp"].as_str().unwrap().is_empty());

    // Bob's room saw nothing.
    assert!(next_event(&mut bob, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn multiple_sockets_in_one_room_all_receive() {
    let ctx = test_context(None).await;
    let addr = ctx.relay.local_addr();

    let mut first = connect(addr).await;
    authenticate(&mut first, "u-1").await;
    let mut second = connect(addr).await;
    authenticate(&mut second, "u-1").await;

    assert_eq!(ctx.state.relay.connection_count().await, 2);

    ctx.state
        .relay
        .emit_generation_progress("u-1", "p-9", 40, "Rendering")
        .await;

    for socket in [&mut first, &mut second] {
        let event = next_event(socket, Duration::from_secs(2)).await.expect("event");
        assert_eq!(event["event"], "generation:progress");
        assert_eq!(event["data"]["progress"], 40);
    }
}

#[tokio::test]
async fn invalid_token_gets_dropped() {
    let ctx = test_context(None).await;
    let mut socket = connect(ctx.relay.local_addr()).await;

    socket
        .send(Message::Text(
            json!({ "type": "authenticate", "token": "u-fake.deadbeef" }).to_string(),
        ))
        .await
        .expect("send");

    // The server closes without ever joining a room.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => panic!("received data on rejected connection"),
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(ctx.state.relay.connection_count().await, 0);
}

#[tokio::test]
async fn unauthenticated_connection_receives_nothing() {
    let ctx = test_context(None).await;
    let mut socket = connect(ctx.relay.local_addr()).await;

    // No authenticate message is sent; emissions must not reach it.
    ctx.state
        .relay
        .emit_presentation_error("u-1", "p-1", "boom")
        .await;

    assert!(next_event(&mut socket, Duration::from_millis(300)).await.is_none());
    assert_eq!(ctx.state.relay.connection_count().await, 0);
}

#[tokio::test]
async fn disconnect_clears_room_state() {
    let ctx = test_context(None).await;
    let mut socket = connect(ctx.relay.local_addr()).await;
    authenticate(&mut socket, "u-1").await;
    assert_eq!(ctx.state.relay.connection_count().await, 1);

    socket.close(None).await.expect("close");

    // Give the relay a moment to observe the close frame.
    for _ in 0..20 {
        if ctx.state.relay.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(ctx.state.relay.connection_count().await, 0);
}
