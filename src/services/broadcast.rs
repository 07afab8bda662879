//! Snapshot Broadcaster
//!
//! Holds the latest arena snapshot, serialized once per publish, and wakes
//! every subscriber when it changes. Slow subscribers skip straight to the
//! newest snapshot instead of queueing stale ones; the spectator hub keeps
//! the same one-slot rule per connection.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::types::{ArenaState, ServerMessage};

/// A published arena state plus its wire form.
#[derive(Debug, Clone, Default)]
pub struct PublishedSnapshot {
    pub state: ArenaState,
    /// Serialized `broadcast` server message carrying `state`.
    pub message: String,
}

pub struct ArenaBroadcaster {
    tx: watch::Sender<Arc<PublishedSnapshot>>,
}

impl ArenaBroadcaster {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(Arc::new(PublishedSnapshot::default()));
        Arc::new(Self { tx })
    }

    /// Replace the current snapshot and notify subscribers.
    pub fn publish(&self, state: ArenaState) {
        let message = match serde_json::to_string(&ServerMessage::arena(state.clone())) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to serialize arena message: {}", e);
                return;
            }
        };

        debug!(
            "Publishing arena snapshot ({} bots, {} bytes)",
            state.bots.len(),
            message.len()
        );
        self.tx.send_replace(Arc::new(PublishedSnapshot { state, message }));
    }

    pub fn latest(&self) -> Arc<PublishedSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PublishedSnapshot>> {
        self.tx.subscribe()
    }

    /// Whether anything has been published yet.
    pub fn has_snapshot(&self) -> bool {
        !self.tx.borrow().message.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Market, ARENA_CHANNEL};
    use serde_json::Value;

    #[tokio::test]
    async fn test_publish_notifies_subscribers() {
        let broadcaster = ArenaBroadcaster::new();
        assert!(!broadcaster.has_snapshot());

        let mut rx = broadcaster.subscribe();
        broadcaster.publish(ArenaState {
            bots: vec![],
            market_data: vec![Market::new("BTCUSDT", 70000.0, 1.5)],
        });

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.state.market_data.len(), 1);

        let json: Value = serde_json::from_str(&snapshot.message).unwrap();
        assert_eq!(json["channel"], ARENA_CHANNEL);
        assert_eq!(json["payload"]["marketData"][0]["symbol"], "BTCUSDT");
        assert!(broadcaster.has_snapshot());
    }

    #[tokio::test]
    async fn test_latest_is_newest() {
        let broadcaster = ArenaBroadcaster::new();
        broadcaster.publish(ArenaState::default());
        broadcaster.publish(ArenaState {
            bots: vec![],
            market_data: vec![Market::new("ETHUSDT", 3500.0, 0.0)],
        });
        assert_eq!(broadcaster.latest().state.market_data[0].symbol, "ETHUSDT");
    }
}
