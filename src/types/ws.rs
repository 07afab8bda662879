use super::ArenaState;
use serde::{Deserialize, Serialize};

/// The only channel spectators can join.
pub const ARENA_CHANNEL: &str = "arena-state";

/// The only event published on the arena channel.
pub const ARENA_EVENT: &str = "broadcast";

/// Incoming WebSocket message from a spectator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
}

/// Outgoing WebSocket message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full arena snapshot
    Broadcast {
        channel: String,
        event: String,
        payload: ArenaState,
    },
    Subscribed {
        channel: String,
    },
    Unsubscribed {
        channel: String,
    },
    Error {
        error: String,
    },
}

impl ServerMessage {
    pub fn arena(payload: ArenaState) -> Self {
        ServerMessage::Broadcast {
            channel: ARENA_CHANNEL.to_string(),
            event: ARENA_EVENT.to_string(),
            payload,
        }
    }
}
