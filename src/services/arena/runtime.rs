//! Bot Runtime
//!
//! Owns one persona's `BotState` and drives it: decision turns, price
//! refreshes, account sync and pause control. The state record itself stays
//! plain data; everything that talks to the network lives here.
//!
//! Locking: the state sits behind a `RwLock` that is never held across a
//! network call. Opens and closes additionally hold a per-symbol mutex for
//! their whole sequence, and refreshes skip symbols whose mutex is taken, so
//! a refresh never observes a half-finished open or close.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use super::personas::{initial_balance, BotConfig};
use crate::services::decision::DecisionProvider;
use crate::services::orders::{now_ms, OrderLifecycleManager, TradeError};
use crate::services::precision::PrecisionRegistry;
use crate::sources::MarketSource;
use crate::types::{
    price_of, AiAction, AiDecision, BotLog, BotState, CloseReason, Market, Order, OrderType,
    Position, SymbolPrecisionInfo, TradingMode,
};

/// Collaborators shared by every bot.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub market: Arc<dyn MarketSource>,
    pub precision: Arc<PrecisionRegistry>,
    pub lifecycle: Arc<OrderLifecycleManager>,
}

/// Live handle on one bot.
pub struct BotRuntime {
    id: String,
    mode: TradingMode,
    state: RwLock<BotState>,
    provider: Arc<dyn DecisionProvider>,
    deps: RuntimeDeps,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Held for the duration of a turn so turns never overlap.
    turn_lock: Mutex<()>,
    /// Set while a turn is in flight; reported as `isLoading`.
    loading: AtomicBool,
}

/// Clears the loading flag however the turn ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BotRuntime {
    pub fn new(
        config: &BotConfig,
        mode: TradingMode,
        provider: Arc<dyn DecisionProvider>,
        deps: RuntimeDeps,
    ) -> Arc<Self> {
        let state = BotState::new(
            config.id.clone(),
            config.name.clone(),
            config.prompt.clone(),
            config.provider,
            mode,
            initial_balance(mode),
        );
        Self::with_state(state, provider, deps)
    }

    /// Wrap an existing state record.
    pub fn with_state(
        state: BotState,
        provider: Arc<dyn DecisionProvider>,
        deps: RuntimeDeps,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: state.id.clone(),
            mode: state.trading_mode,
            state: RwLock::new(state),
            provider,
            deps,
            symbol_locks: DashMap::new(),
            turn_lock: Mutex::new(()),
            loading: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Serializable copy of the bot's state.
    pub async fn snapshot(&self) -> BotState {
        let mut state = self.state.read().await.clone();
        state.is_loading = self.loading.load(Ordering::SeqCst);
        state
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.is_paused
    }

    pub async fn set_paused(&self, paused: bool) {
        let mut state = self.state.write().await;
        if state.is_paused != paused {
            info!("[{}] {}", self.id, if paused { "Paused" } else { "Resumed" });
        }
        state.is_paused = paused;
    }

    /// Load what the exchange knows about a live bot.
    pub async fn bootstrap(&self, market_data: &[Market]) {
        if self.mode.is_real() {
            match self.deps.lifecycle.gateway().trade_history(&self.id).await {
                Ok(orders) => {
                    let mut state = self.state.write().await;
                    state.realized_pnl = orders.iter().map(|o| o.pnl).sum();
                    state.orders = orders;
                    state.recompute_stats();
                    info!("[{}] Loaded {} historical trades", self.id, state.orders.len());
                }
                Err(e) => error!("[{}] Failed to get real trade history: {}", self.id, e),
            }
        }
        self.refresh(market_data).await;
    }

    /// Run one decision turn unless paused or a turn is already running.
    pub async fn turn(&self) -> Option<BotLog> {
        if self.is_paused().await {
            debug!("[{}] Paused, skipping turn", self.id);
            return None;
        }
        let Ok(_turn) = self.turn_lock.try_lock() else {
            warn!("[{}] Previous turn still running, skipping", self.id);
            return None;
        };

        let _loading = LoadingGuard::set(&self.loading);
        let market_data = self.deps.market.market_data().await;
        Some(self.run_turn(&market_data).await)
    }

    /// Ask the model and carry out its decisions against `market_data`.
    ///
    /// Always appends a log entry, even when nothing was executed.
    pub async fn run_turn(&self, market_data: &[Market]) -> BotLog {
        let timestamp = now_ms();

        if market_data.is_empty() {
            warn!("[{}] No market data this cycle", self.id);
            let log = BotLog {
                timestamp,
                decisions: Vec::new(),
                prompt: String::new(),
                notes: vec!["No market data this cycle; turn skipped.".to_string()],
            };
            self.state.write().await.push_log(log.clone());
            return log;
        }

        let (portfolio, template) = {
            let state = self.state.read().await;
            (state.portfolio.clone(), state.prompt.clone())
        };

        let outcome = self
            .provider
            .get_decision(&portfolio, market_data, &template)
            .await;
        let precision = self.deps.precision.get_precision().await;

        let mut notes = Vec::new();
        for decision in &outcome.decisions {
            if let Err(e) = self.apply_decision(decision, market_data, &precision).await {
                let note = rejection_note(decision, &e);
                if e.is_fatal() {
                    error!("[{}] {}", self.id, note);
                } else {
                    warn!("[{}] {}", self.id, note);
                }
                notes.push(note);
            }
        }

        info!(
            "[{}] Turn complete: {} decisions, {} rejected",
            self.id,
            outcome.decisions.len(),
            notes.len()
        );

        let log = BotLog {
            timestamp,
            decisions: outcome.decisions,
            prompt: outcome.prompt,
            notes,
        };
        self.state.write().await.push_log(log.clone());
        log
    }

    async fn apply_decision(
        &self,
        decision: &AiDecision,
        market_data: &[Market],
        precision: &HashMap<String, SymbolPrecisionInfo>,
    ) -> Result<(), TradeError> {
        match decision.action {
            AiAction::Long | AiAction::Short => {
                self.open_position(decision, market_data, precision).await?;
            }
            AiAction::Close => {
                let position_id = self.resolve_close_target(decision).await?;
                self.close_position(&position_id, market_data, CloseReason::Decision)
                    .await?;
            }
            AiAction::Hold => {}
        }
        Ok(())
    }

    // Prefer the id; fall back to the symbol when the model omitted it.
    async fn resolve_close_target(&self, decision: &AiDecision) -> Result<String, TradeError> {
        if let Some(id) = decision.close_position_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        let symbol = decision
            .symbol
            .as_deref()
            .ok_or_else(|| TradeError::Validation("CLOSE without closePositionId".to_string()))?;
        self.state
            .read()
            .await
            .portfolio
            .position_for_symbol(symbol)
            .map(|p| p.id.clone())
            .ok_or_else(|| TradeError::PositionNotFound(symbol.to_string()))
    }

    /// Open a position for an open decision.
    pub async fn open_position(
        &self,
        decision: &AiDecision,
        market_data: &[Market],
        precision: &HashMap<String, SymbolPrecisionInfo>,
    ) -> Result<Position, TradeError> {
        let lifecycle = &self.deps.lifecycle;
        let plan = lifecycle.validate(decision, precision)?;

        let lock = self.symbol_lock(&plan.symbol);
        let _guard = lock.lock().await;

        let now = now_ms();
        let (mut positions, balance) = {
            let state = self.state.read().await;
            lifecycle.ensure_not_cooling(&state, &plan.symbol, now)?;
            (state.portfolio.positions.clone(), state.portfolio.balance)
        };

        let price = price_of(market_data, &plan.symbol)
            .ok_or_else(|| TradeError::MissingPrice(plan.symbol.clone()))?;
        let displaced = positions.iter().find(|p| p.symbol == plan.symbol).cloned();

        if !self.mode.is_real() {
            lifecycle.ensure_affordable(balance, &plan, displaced.as_ref().map(|p| (p, price)))?;
        }

        let result = lifecycle
            .execute(&self.id, decision, price, precision, self.mode, &mut positions)
            .await;

        let mut state = self.state.write().await;
        let position = match result {
            Ok(position) => position,
            Err(e) => {
                // The old exposure is still open; only its conditionals are gone.
                if let Some(old) = displaced.filter(|_| e.is_fatal() && self.mode.is_real()) {
                    if let Some(p) = state.portfolio.positions.iter_mut().find(|p| p.id == old.id) {
                        warn!(
                            "[{}] Keeping {} {} without exchange SL/TP after failed replace",
                            self.id, p.side, p.symbol
                        );
                        p.stop_loss_order_id = None;
                        p.take_profit_order_id = None;
                    }
                }
                state.portfolio.recompute();
                return Err(e);
            }
        };

        if let Some(old) = displaced {
            if let Some(old) = state.portfolio.take_position(&old.id) {
                if !self.mode.is_real() {
                    let order = lifecycle.settle(&old, price, self.mode, CloseReason::Replaced, now);
                    state.portfolio.balance += old.size + order.pnl;
                    state.record_order(order);
                }
            }
        }

        if !self.mode.is_real() {
            state.portfolio.balance -= position.size;
        }
        state.portfolio.positions.push(position.clone());
        state.portfolio.recompute();
        info!(
            "[{}] Opened {} {} size {} lev {}x @ {}",
            self.id, position.side, position.symbol, position.size, position.leverage, price
        );
        Ok(position)
    }

    /// Close a position by id and record the trade.
    pub async fn close_position(
        &self,
        position_id: &str,
        market_data: &[Market],
        reason: CloseReason,
    ) -> Result<Order, TradeError> {
        let symbol = self
            .state
            .read()
            .await
            .portfolio
            .position(position_id)
            .map(|p| p.symbol.clone())
            .ok_or_else(|| TradeError::PositionNotFound(position_id.to_string()))?;

        let lock = self.symbol_lock(&symbol);
        let _guard = lock.lock().await;

        // Re-read under the symbol lock: a refresh may have closed it meanwhile.
        let position = self
            .state
            .read()
            .await
            .portfolio
            .position(position_id)
            .cloned()
            .ok_or_else(|| TradeError::PositionNotFound(position_id.to_string()))?;
        let price = price_of(market_data, &symbol)
            .ok_or_else(|| TradeError::MissingPrice(symbol.clone()))?;

        self.deps
            .lifecycle
            .close(&self.id, &position, price, self.mode)
            .await?;

        let mut state = self.state.write().await;
        let order = self.settle_closed(&mut state, &position, price, reason, now_ms());
        Ok(order)
    }

    // Caller holds the symbol lock of `position`.
    fn settle_closed(
        &self,
        state: &mut BotState,
        position: &Position,
        exit_price: f64,
        reason: CloseReason,
        now: i64,
    ) -> Order {
        let lifecycle = &self.deps.lifecycle;
        let order = lifecycle.settle(position, exit_price, self.mode, reason, now);

        state.portfolio.take_position(&position.id);
        if !self.mode.is_real() {
            state.portfolio.balance += position.size + order.pnl;
        }
        state
            .symbol_cooldowns
            .insert(position.symbol.clone(), lifecycle.cooldown_expiry(now));
        state.record_order(order.clone());
        state.portfolio.recompute();

        info!(
            "[{}] Closed {} {} ({:?}) pnl {:.2}",
            self.id, position.side, position.symbol, reason, order.pnl
        );
        order
    }

    /// Mark positions to market and append a value point.
    ///
    /// Paper positions whose stop-loss, take-profit or liquidation price was
    /// crossed are closed at that level. Live bots re-read their account.
    pub async fn refresh(&self, market_data: &[Market]) {
        match self.mode {
            TradingMode::Paper => self.refresh_paper(market_data).await,
            TradingMode::Real => self.sync_real(market_data).await,
        }
    }

    async fn refresh_paper(&self, market_data: &[Market]) {
        let now = now_ms();
        let symbols: Vec<String> = {
            let state = self.state.read().await;
            state.portfolio.positions.iter().map(|p| p.symbol.clone()).collect()
        };
        let guards = self.try_lock_symbols(symbols);

        let mut state = self.state.write().await;
        let positions = state.portfolio.positions.clone();
        for position in positions {
            if !guards.contains_key(&position.symbol) {
                continue;
            }
            let Some(mark) = price_of(market_data, &position.symbol) else {
                continue;
            };

            if let Some((reason, level)) = trigger(&position, mark) {
                self.settle_closed(&mut state, &position, level, reason, now);
            } else if let Some(p) = state
                .portfolio
                .positions
                .iter_mut()
                .find(|p| p.id == position.id)
            {
                p.pnl = p.pnl_at(mark);
            }
        }

        state.portfolio.recompute();
        state.push_value_point(now);
    }

    async fn sync_real(&self, market_data: &[Market]) {
        let symbols: Vec<String> = {
            let state = self.state.read().await;
            state.portfolio.positions.iter().map(|p| p.symbol.clone()).collect()
        };
        let mut guards = self.try_lock_symbols(symbols);

        let account = match self.deps.lifecycle.gateway().account_state(&self.id).await {
            Ok(account) => account,
            Err(e) => {
                error!("[{}] Failed to get real account state: {}", self.id, e);
                return;
            }
        };

        let now = now_ms();
        let mut state = self.state.write().await;

        // Positions that appeared on the exchange without a local counterpart.
        let local_symbols: HashSet<String> = state
            .portfolio
            .positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect();
        let foreign: Vec<String> = account
            .positions
            .iter()
            .filter(|p| !local_symbols.contains(&p.symbol))
            .map(|p| p.symbol.clone())
            .collect();
        guards.extend(self.try_lock_symbols(foreign));

        let mut merged = Vec::with_capacity(account.positions.len());
        let mut vanished = Vec::new();
        for local in &state.portfolio.positions {
            if !guards.contains_key(&local.symbol) {
                merged.push(local.clone());
                continue;
            }
            match account.positions.iter().find(|p| p.symbol == local.symbol) {
                Some(remote) => merged.push(merge_position(local, remote)),
                None => vanished.push(local.clone()),
            }
        }
        for remote in &account.positions {
            if !local_symbols.contains(&remote.symbol) && guards.contains_key(&remote.symbol) {
                merged.push(remote.clone());
            }
        }

        state.portfolio.positions = merged;
        state.portfolio.balance = account.balance;

        for position in vanished {
            let mark = price_of(market_data, &position.symbol).unwrap_or(position.entry_price);
            let (reason, level) = match trigger(&position, mark) {
                Some((CloseReason::Liquidation, _)) | None => (CloseReason::External, mark),
                Some(hit) => hit,
            };
            warn!(
                "[{}] {} position closed on the exchange ({:?})",
                self.id, position.symbol, reason
            );
            // Already out of `positions`; settle only records it.
            self.settle_closed(&mut state, &position, level, reason, now);
        }

        state.portfolio.recompute();
        state.push_value_point(now);
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    /// Take the locks of every free symbol. Busy symbols are left out.
    fn try_lock_symbols(
        &self,
        symbols: impl IntoIterator<Item = String>,
    ) -> HashMap<String, OwnedMutexGuard<()>> {
        let mut guards = HashMap::new();
        for symbol in symbols {
            if guards.contains_key(&symbol) {
                continue;
            }
            match self.symbol_lock(&symbol).try_lock_owned() {
                Ok(guard) => {
                    guards.insert(symbol, guard);
                }
                Err(_) => debug!("[{}] {} busy, skipping refresh", self.id, symbol),
            }
        }
        guards
    }
}

/// Which protective level `mark` has crossed, if any, and the fill level.
fn trigger(position: &Position, mark: f64) -> Option<(CloseReason, f64)> {
    if position.take_profit > 0.0 && position.should_take_profit(mark) {
        return Some((CloseReason::TakeProfit, position.take_profit));
    }
    let stop_before_liquidation = match position.side {
        OrderType::Long => position.stop_loss >= position.liquidation_price,
        OrderType::Short => position.stop_loss <= position.liquidation_price,
    };
    if position.stop_loss > 0.0 && position.should_stop_loss(mark) && stop_before_liquidation {
        return Some((CloseReason::StopLoss, position.stop_loss));
    }
    if position.liquidation_price > 0.0 && position.should_liquidate(mark) {
        return Some((CloseReason::Liquidation, position.liquidation_price));
    }
    None
}

/// Exchange figures with the locally known id and protective orders.
fn merge_position(local: &Position, remote: &Position) -> Position {
    Position {
        id: local.id.clone(),
        stop_loss: if remote.stop_loss > 0.0 { remote.stop_loss } else { local.stop_loss },
        take_profit: if remote.take_profit > 0.0 { remote.take_profit } else { local.take_profit },
        stop_loss_order_id: remote
            .stop_loss_order_id
            .clone()
            .or_else(|| local.stop_loss_order_id.clone()),
        take_profit_order_id: remote
            .take_profit_order_id
            .clone()
            .or_else(|| local.take_profit_order_id.clone()),
        ..remote.clone()
    }
}

fn rejection_note(decision: &AiDecision, error: &TradeError) -> String {
    let target = decision
        .symbol
        .as_deref()
        .or(decision.close_position_id.as_deref())
        .unwrap_or("?");
    match error {
        TradeError::CoolingDown { symbol, until } => {
            let until = chrono::DateTime::from_timestamp_millis(*until)
                .map(|t| t.format("%H:%M:%S UTC").to_string())
                .unwrap_or_else(|| until.to_string());
            format!("{:?} {} skipped: {} is cooling down until {}", decision.action, symbol, symbol, until)
        }
        other => format!("{:?} {} rejected: {}", decision.action, target, other),
    }
}
