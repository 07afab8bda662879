use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::SpectatorHub;
use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (client_id, mut feed) = state.hub.register(tx);
    info!("Spectator connected: {}", client_id);

    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
                changed = feed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = feed.borrow_and_update().clone();
                    match latest {
                        Some(snapshot) => snapshot.message.clone(),
                        None => continue,
                    }
                }
            };
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", client_id, text);
                handle_message(&state.hub, client_id, &text);
            }
            Ok(Message::Close(_)) => {
                info!("Spectator disconnecting: {}", client_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    state.hub.unregister(client_id);
    send_task.abort();
    info!("Spectator disconnected: {}", client_id);
}

/// Apply one client message and queue the reply.
pub fn handle_message(hub: &SpectatorHub, client_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(hub, client_id, &format!("Invalid message: {}", e));
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { channel } => {
            if hub.subscribe(client_id, &channel) {
                debug!("Client {} joined {}", client_id, channel);
                send_message(hub, client_id, &ServerMessage::Subscribed { channel });
            } else {
                send_error(hub, client_id, &format!("Unknown channel: {}", channel));
            }
        }
        ClientMessage::Unsubscribe { channel } => {
            hub.unsubscribe(client_id, &channel);
            send_message(hub, client_id, &ServerMessage::Unsubscribed { channel });
        }
    }
}

fn send_message(hub: &SpectatorHub, client_id: Uuid, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        hub.send_to(client_id, json);
    }
}

fn send_error(hub: &SpectatorHub, client_id: Uuid, error: &str) {
    let msg = ServerMessage::Error {
        error: error.to_string(),
    };
    send_message(hub, client_id, &msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ArenaBroadcaster;
    use crate::types::ArenaState;
    use serde_json::Value;

    fn reply(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_subscribe_flow() {
        let broadcaster = ArenaBroadcaster::new();
        broadcaster.publish(ArenaState::default());
        let hub = SpectatorHub::new(broadcaster);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (id, mut feed) = hub.register(tx);

        handle_message(&hub, id, r#"{"type":"subscribe","channel":"arena-state"}"#);
        assert_eq!(reply(&mut rx)["type"], "subscribed");
        let snapshot = feed.borrow_and_update().clone().unwrap();
        let snapshot: Value = serde_json::from_str(&snapshot.message).unwrap();
        assert_eq!(snapshot["type"], "broadcast");

        handle_message(&hub, id, r#"{"type":"unsubscribe","channel":"arena-state"}"#);
        assert_eq!(reply(&mut rx)["type"], "unsubscribed");
        assert_eq!(hub.spectator_count(), 0);
    }

    #[test]
    fn test_bad_messages_get_errors() {
        let hub = SpectatorHub::new(ArenaBroadcaster::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (id, _feed) = hub.register(tx);

        handle_message(&hub, id, "not json");
        let err = reply(&mut rx);
        assert_eq!(err["type"], "error");
        assert!(err["error"].as_str().unwrap().starts_with("Invalid message"));

        handle_message(&hub, id, r#"{"type":"subscribe","channel":"prices"}"#);
        assert_eq!(reply(&mut rx)["error"], "Unknown channel: prices");
    }
}
