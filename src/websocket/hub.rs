use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::services::{ArenaBroadcaster, PublishedSnapshot};
use crate::types::ARENA_CHANNEL;

/// Newest arena snapshot addressed to one client. Holds at most one.
pub type SnapshotFeed = watch::Receiver<Option<Arc<PublishedSnapshot>>>;

/// A spectator's channel memberships.
pub struct ClientSubscription {
    /// Joined channels.
    pub channels: HashSet<String>,
    /// Control replies to the client's socket.
    pub tx: mpsc::UnboundedSender<String>,
    /// Snapshot mailbox; a newer publish overwrites an unsent one.
    pub snapshot: watch::Sender<Option<Arc<PublishedSnapshot>>>,
}

/// Tracks spectators and fans published snapshots out to them.
pub struct SpectatorHub {
    pub clients: DashMap<Uuid, ClientSubscription>,
    /// Channel name -> member client IDs.
    rooms: DashMap<String, HashSet<Uuid>>,
    broadcaster: Arc<ArenaBroadcaster>,
}

impl SpectatorHub {
    pub fn new(broadcaster: Arc<ArenaBroadcaster>) -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            broadcaster,
        })
    }

    /// Register a new client. Snapshots arrive on the returned feed.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> (Uuid, SnapshotFeed) {
        let client_id = Uuid::new_v4();
        let (snapshot, feed) = watch::channel(None);
        self.clients.insert(
            client_id,
            ClientSubscription {
                channels: HashSet::new(),
                tx,
                snapshot,
            },
        );
        (client_id, feed)
    }

    /// Unregister a client and remove it from every channel.
    pub fn unregister(&self, client_id: Uuid) {
        if let Some((_, subscription)) = self.clients.remove(&client_id) {
            for channel in subscription.channels {
                if let Some(mut room) = self.rooms.get_mut(&channel) {
                    room.remove(&client_id);
                }
            }
        }
    }

    /// Whether `channel` can be joined.
    pub fn is_known_channel(channel: &str) -> bool {
        channel == ARENA_CHANNEL
    }

    /// Join a channel. Returns false for an unknown channel or client.
    ///
    /// A new arena member immediately receives the latest snapshot.
    pub fn subscribe(&self, client_id: Uuid, channel: &str) -> bool {
        if !Self::is_known_channel(channel) {
            return false;
        }
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };

        if client.channels.insert(channel.to_string()) {
            self.rooms
                .entry(channel.to_string())
                .or_default()
                .insert(client_id);

            if self.broadcaster.has_snapshot() {
                client.snapshot.send_replace(Some(self.broadcaster.latest()));
            }
        }
        true
    }

    /// Leave a channel. Returns whether the client was a member.
    pub fn unsubscribe(&self, client_id: Uuid, channel: &str) -> bool {
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.channels.remove(channel) {
            return false;
        }
        if let Some(mut room) = self.rooms.get_mut(channel) {
            room.remove(&client_id);
        }
        true
    }

    /// Member IDs of `channel`.
    pub fn get_subscribers(&self, channel: &str) -> Vec<Uuid> {
        self.rooms
            .get(channel)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Put `snapshot` in every arena member's mailbox. Returns the recipient count.
    pub fn publish_snapshot(&self, snapshot: Arc<PublishedSnapshot>) -> usize {
        self.get_subscribers(ARENA_CHANNEL)
            .iter()
            .filter(|id| match self.clients.get(*id) {
                Some(client) => {
                    client.snapshot.send_replace(Some(snapshot.clone()));
                    true
                }
                None => false,
            })
            .count()
    }

    /// Send a message to one client.
    pub fn send_to(&self, client_id: Uuid, message: String) {
        if let Some(client) = self.clients.get(&client_id) {
            let _ = client.tx.send(message);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Members of the arena channel.
    pub fn spectator_count(&self) -> usize {
        self.rooms.get(ARENA_CHANNEL).map(|r| r.len()).unwrap_or(0)
    }

    /// Forward every published snapshot to the arena channel.
    pub fn spawn_fanout(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = self.clone();
        let mut rx = self.broadcaster.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                let sent = hub.publish_snapshot(snapshot);
                debug!("Arena snapshot sent to {} spectators", sent);
            }
        })
    }
}
