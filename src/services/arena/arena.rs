//! Arena Orchestrator
//!
//! Runs every bot on its own schedule and publishes a fresh snapshot after
//! each turn and each price refresh.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::runtime::BotRuntime;
use crate::services::broadcast::ArenaBroadcaster;
use crate::services::precision::PrecisionRegistry;
use crate::sources::MarketSource;
use crate::types::{ArenaState, Market};

/// Background task periods.
#[derive(Debug, Clone, Copy)]
pub struct ArenaIntervals {
    pub turn: Duration,
    pub refresh: Duration,
    pub precision_refresh: Duration,
}

impl Default for ArenaIntervals {
    fn default() -> Self {
        Self {
            turn: Duration::from_secs(300),
            refresh: Duration::from_secs(5),
            precision_refresh: Duration::from_secs(3600),
        }
    }
}

pub struct Arena {
    bots: Vec<Arc<BotRuntime>>,
    market: Arc<dyn MarketSource>,
    precision: Arc<PrecisionRegistry>,
    broadcaster: Arc<ArenaBroadcaster>,
    market_data: RwLock<Vec<Market>>,
    intervals: ArenaIntervals,
    shutdown_tx: broadcast::Sender<()>,
}

impl Arena {
    pub fn new(
        bots: Vec<Arc<BotRuntime>>,
        market: Arc<dyn MarketSource>,
        precision: Arc<PrecisionRegistry>,
        broadcaster: Arc<ArenaBroadcaster>,
        intervals: ArenaIntervals,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            bots,
            market,
            precision,
            broadcaster,
            market_data: RwLock::new(Vec::new()),
            intervals,
            shutdown_tx,
        })
    }

    pub fn bots(&self) -> &[Arc<BotRuntime>] {
        &self.bots
    }

    pub fn bot(&self, id: &str) -> Option<&Arc<BotRuntime>> {
        self.bots.iter().find(|b| b.id() == id)
    }

    pub fn broadcaster(&self) -> &Arc<ArenaBroadcaster> {
        &self.broadcaster
    }

    pub async fn market_data(&self) -> Vec<Market> {
        self.market_data.read().await.clone()
    }

    /// Current state of every bot plus the last market data.
    pub async fn snapshot(&self) -> ArenaState {
        let bots = join_all(self.bots.iter().map(|b| b.snapshot())).await;
        ArenaState {
            bots,
            market_data: self.market_data().await,
        }
    }

    pub async fn publish(&self) {
        let state = self.snapshot().await;
        self.broadcaster.publish(state);
    }

    /// Fetch prices once, mark every bot to market, publish.
    ///
    /// An empty fetch keeps the previous market data.
    pub async fn refresh_all(&self) {
        let fresh = self.market.market_data().await;
        let market_data = if fresh.is_empty() {
            debug!("No market data this refresh, keeping previous");
            self.market_data().await
        } else {
            *self.market_data.write().await = fresh.clone();
            fresh
        };

        join_all(self.bots.iter().map(|b| b.refresh(&market_data))).await;
        self.publish().await;
    }

    /// Run one turn for `bot_id` and publish the result.
    pub async fn run_turn(&self, bot_id: &str) -> bool {
        let Some(bot) = self.bot(bot_id) else {
            return false;
        };
        let ran = bot.turn().await.is_some();
        if ran {
            self.publish().await;
        }
        ran
    }

    pub async fn set_all_paused(&self, paused: bool) {
        join_all(self.bots.iter().map(|b| b.set_paused(paused))).await;
        info!("Arena {}", if paused { "paused" } else { "resumed" });
        self.publish().await;
    }

    /// Pause or resume one bot. Returns false for an unknown id.
    pub async fn set_paused(&self, bot_id: &str, paused: bool) -> bool {
        let Some(bot) = self.bot(bot_id) else {
            return false;
        };
        bot.set_paused(paused).await;
        self.publish().await;
        true
    }

    /// Bootstrap every bot and spawn the background loops.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.precision.refresh().await;

        let market_data = self.market.market_data().await;
        *self.market_data.write().await = market_data.clone();
        join_all(self.bots.iter().map(|b| b.bootstrap(&market_data))).await;
        self.publish().await;
        info!("Arena started with {} bots", self.bots.len());

        let mut handles = Vec::with_capacity(self.bots.len() + 2);

        let arena = self.clone();
        handles.push(self.spawn_every(self.intervals.refresh, move || {
            let arena = arena.clone();
            async move { arena.refresh_all().await }
        }));

        let precision = self.precision.clone();
        handles.push(self.spawn_every(self.intervals.precision_refresh, move || {
            let precision = precision.clone();
            async move {
                precision.refresh().await;
            }
        }));

        for bot in &self.bots {
            let arena = self.clone();
            let id = bot.id().to_string();
            handles.push(self.spawn_every(self.intervals.turn, move || {
                let arena = arena.clone();
                let id = id.clone();
                async move {
                    arena.run_turn(&id).await;
                }
            }));
        }

        handles
    }

    /// Stop every background loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Arena shutting down");
    }

    fn spawn_every<F, Fut>(&self, period: Duration, mut task: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => task().await,
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
