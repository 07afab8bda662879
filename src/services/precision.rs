//! Precision Registry
//!
//! Read-through cache of per-symbol rounding rules. The first lookup
//! populates it; later lookups only read. Unknown symbols resolve to
//! `SymbolPrecisionInfo::FALLBACK`.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::sources::MarketSource;
use crate::types::SymbolPrecisionInfo;

/// Process-wide precision cache.
pub struct PrecisionRegistry {
    source: Arc<dyn MarketSource>,
    rules: DashMap<String, SymbolPrecisionInfo>,
    loaded: AtomicBool,
    /// Serializes loads so concurrent first lookups fetch once.
    load_lock: Mutex<()>,
}

impl PrecisionRegistry {
    pub fn new(source: Arc<dyn MarketSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            rules: DashMap::new(),
            loaded: AtomicBool::new(false),
            load_lock: Mutex::new(()),
        })
    }

    /// Whether a fetch has populated the cache.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Rules for one symbol, falling back to the conservative default.
    pub async fn get(&self, symbol: &str) -> SymbolPrecisionInfo {
        self.ensure_loaded().await;
        self.rules
            .get(symbol)
            .map(|r| *r.value())
            .unwrap_or(SymbolPrecisionInfo::FALLBACK)
    }

    /// The whole mapping. Empty when the exchange could not be reached.
    pub async fn get_precision(&self) -> HashMap<String, SymbolPrecisionInfo> {
        self.ensure_loaded().await;
        self.snapshot()
    }

    /// Current contents without triggering a fetch.
    pub fn snapshot(&self) -> HashMap<String, SymbolPrecisionInfo> {
        self.rules
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }

    /// Fetch the rules again. A failed fetch keeps what is cached.
    pub async fn refresh(&self) -> usize {
        let _guard = self.load_lock.lock().await;
        self.load().await
    }

    async fn ensure_loaded(&self) {
        if self.is_loaded() {
            return;
        }
        let _guard = self.load_lock.lock().await;
        if self.is_loaded() {
            return;
        }
        self.load().await;
    }

    // Caller holds `load_lock`.
    async fn load(&self) -> usize {
        let fetched = self.source.precision_rules().await;
        if fetched.is_empty() {
            warn!("Exchange info unavailable, using default precision");
            return self.rules.len();
        }

        let count = fetched.len();
        self.rules.retain(|symbol, _| fetched.contains_key(symbol));
        for (symbol, info) in fetched {
            self.rules.insert(symbol, info);
        }
        self.loaded.store(true, Ordering::Release);

        info!("Loaded precision rules for {} symbols", count);
        count
    }
}
