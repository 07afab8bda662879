//! Spectator WebSocket over a real socket.

mod common;

use arena::config::Config;
use arena::services::{Arena, ArenaBroadcaster, ArenaIntervals, PrecisionRegistry};
use arena::types::TradingMode;
use arena::websocket::SpectatorHub;
use arena::AppState;
use common::{bot, FakeMarket, RecordingGateway, ScriptedDecisions};
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Serve the app on an ephemeral port. Returns the ws URL and the arena.
async fn serve() -> (String, Arc<Arena>) {
    let config = Config::from_lookup(|key| match key {
        "RELAY_URL" => Some("http://relay.test".to_string()),
        _ => None,
    })
    .unwrap();

    let market = FakeMarket::standard();
    let gateway = RecordingGateway::new();
    let decisions = ScriptedDecisions::new(vec![]);
    let bots = vec![bot("bot_ws", TradingMode::Paper, 10_000.0, &market, &gateway, &decisions)];
    let broadcaster = ArenaBroadcaster::new();
    let trading_arena = Arena::new(
        bots,
        market.clone(),
        PrecisionRegistry::new(market),
        broadcaster.clone(),
        ArenaIntervals::default(),
    );
    let hub = SpectatorHub::new(broadcaster);
    hub.spawn_fanout();

    let state = AppState {
        config: Arc::new(config),
        arena: trading_arena.clone(),
        hub,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, arena::app(state)).await.unwrap();
    });

    (format!("ws://{}/ws", addr), trading_arena)
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_matching<S>(stream: &mut S, pred: impl Fn(&Value) -> bool) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = next_json(stream).await;
        if pred(&msg) {
            return msg;
        }
    }
}

#[tokio::test]
async fn test_subscriber_gets_snapshot_then_updates() {
    let (url, arena) = serve().await;
    arena.refresh_all().await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(Message::Text(
        r#"{"type":"subscribe","channel":"arena-state"}"#.to_string(),
    ))
    .await
    .unwrap();

    // Snapshot and acknowledgement travel separately and may arrive in either order.
    let (mut snapshot, mut ack) = (None, None);
    while snapshot.is_none() || ack.is_none() {
        let msg = next_json(&mut ws).await;
        if msg["type"] == "broadcast" {
            snapshot = snapshot.or(Some(msg));
        } else {
            ack = Some(msg);
        }
    }
    let (snapshot, ack) = (snapshot.unwrap(), ack.unwrap());
    assert_eq!(snapshot["event"], "broadcast");
    assert_eq!(snapshot["payload"]["bots"][0]["id"], "bot_ws");
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["channel"], "arena-state");

    arena.set_all_paused(true).await;
    let update = next_matching(&mut ws, |m| m["payload"]["bots"][0]["isPaused"] == true).await;
    assert_eq!(update["type"], "broadcast");
}

#[tokio::test]
async fn test_unknown_channel_and_bad_json() {
    let (url, _arena) = serve().await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(Message::Text(r#"{"type":"subscribe","channel":"prices"}"#.to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"], "Unknown channel: prices");

    ws.send(Message::Text("{oops".to_string())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert!(reply["error"].as_str().unwrap().starts_with("Invalid message"));
}
