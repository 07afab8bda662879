//! In-memory fakes for the network seams.

#![allow(dead_code)]

use arena::error::{AppError, Result};
use arena::services::{
    BotRuntime, DecisionOutcome, DecisionProvider, ExchangeGateway, LifecycleConfig, OrderKind,
    OrderLifecycleManager, OrderRequest, PrecisionRegistry, RuntimeDeps,
};
use arena::sources::MarketSource;
use arena::types::{
    AiDecision, BotState, Market, ModelProvider, Order, Portfolio, SymbolPrecisionInfo,
    TradingMode,
};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Market with settable prices.
pub struct FakeMarket {
    markets: Mutex<Vec<Market>>,
    rules: HashMap<String, SymbolPrecisionInfo>,
}

impl FakeMarket {
    pub fn new(markets: Vec<Market>) -> Arc<Self> {
        let mut rules = HashMap::new();
        rules.insert(
            "BTCUSDT".to_string(),
            SymbolPrecisionInfo {
                quantity_precision: 3,
                price_precision: 1,
                min_qty: 0.001,
                max_qty: 1000.0,
                step_size: 0.001,
            },
        );
        rules.insert(
            "ETHUSDT".to_string(),
            SymbolPrecisionInfo {
                quantity_precision: 3,
                price_precision: 2,
                min_qty: 0.001,
                max_qty: 10000.0,
                step_size: 0.001,
            },
        );
        Arc::new(Self {
            markets: Mutex::new(markets),
            rules,
        })
    }

    pub fn standard() -> Arc<Self> {
        Self::new(vec![
            Market::new("BTCUSDT", 70000.0, 1.2),
            Market::new("ETHUSDT", 3500.0, -0.4),
        ])
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut markets = self.markets.lock().unwrap();
        match markets.iter_mut().find(|m| m.symbol == symbol) {
            Some(m) => m.price = price,
            None => markets.push(Market::new(symbol, price, 0.0)),
        }
    }

    pub fn clear(&self) {
        self.markets.lock().unwrap().clear();
    }

    pub fn snapshot(&self) -> Vec<Market> {
        self.markets.lock().unwrap().clone()
    }
}

impl MarketSource for FakeMarket {
    fn market_data(&self) -> BoxFuture<'_, Vec<Market>> {
        let markets = self.snapshot();
        async move { markets }.boxed()
    }

    fn precision_rules(&self) -> BoxFuture<'_, HashMap<String, SymbolPrecisionInfo>> {
        let rules = self.rules.clone();
        async move { rules }.boxed()
    }
}

/// One exchange call as seen by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Leverage { symbol: String, leverage: f64 },
    Place { symbol: String, kind: OrderKind, side: String, id: String },
    Cancel { symbol: String, order_id: String },
}

/// Exchange that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    pub fail_market: AtomicBool,
    pub fail_conditional: AtomicBool,
    pub fail_account: AtomicBool,
    account: Mutex<Option<Portfolio>>,
    history: Mutex<Vec<Order>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_account(&self, portfolio: Portfolio) {
        *self.account.lock().unwrap() = Some(portfolio);
    }

    pub fn set_history(&self, orders: Vec<Order>) {
        *self.history.lock().unwrap() = orders;
    }
}

impl ExchangeGateway for RecordingGateway {
    fn set_leverage<'a>(&'a self, _: &'a str, symbol: &'a str, leverage: f64) -> BoxFuture<'a, Result<()>> {
        self.calls.lock().unwrap().push(Call::Leverage {
            symbol: symbol.to_string(),
            leverage,
        });
        async { Ok(()) }.boxed()
    }

    fn place_order<'a>(&'a self, _: &'a str, order: &'a OrderRequest) -> BoxFuture<'a, Result<String>> {
        let fail = match order.kind {
            OrderKind::Market => self.fail_market.load(Ordering::SeqCst),
            _ => self.fail_conditional.load(Ordering::SeqCst),
        };
        let result = if fail {
            Err(AppError::ExternalApi("ASTER API Error (/fapi/v1/order): rejected".to_string()))
        } else {
            let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
            self.calls.lock().unwrap().push(Call::Place {
                symbol: order.symbol.clone(),
                kind: order.kind,
                side: order.side.to_string(),
                id: id.clone(),
            });
            Ok(id)
        };
        async move { result }.boxed()
    }

    fn cancel_order<'a>(&'a self, _: &'a str, symbol: &'a str, order_id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.calls.lock().unwrap().push(Call::Cancel {
            symbol: symbol.to_string(),
            order_id: order_id.to_string(),
        });
        async { Ok(()) }.boxed()
    }

    fn account_state<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Portfolio>> {
        let result = if self.fail_account.load(Ordering::SeqCst) {
            Err(AppError::ExternalApi("account unavailable".to_string()))
        } else {
            Ok(self
                .account
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(Portfolio::zeroed))
        };
        async move { result }.boxed()
    }

    fn trade_history<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Vec<Order>>> {
        let orders = self.history.lock().unwrap().clone();
        async move { Ok(orders) }.boxed()
    }
}

/// Replays one batch of decisions per turn, then nothing.
#[derive(Default)]
pub struct ScriptedDecisions {
    turns: Mutex<VecDeque<Vec<AiDecision>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedDecisions {
    pub fn new(turns: Vec<Vec<AiDecision>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, decisions: Vec<AiDecision>) {
        self.turns.lock().unwrap().push_back(decisions);
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn get_decision<'a>(
        &'a self,
        _portfolio: &'a Portfolio,
        _market_data: &'a [Market],
        template: &'a str,
    ) -> BoxFuture<'a, DecisionOutcome> {
        self.prompts.lock().unwrap().push(template.to_string());
        let decisions = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        async move {
            DecisionOutcome {
                prompt: template.to_string(),
                decisions,
            }
        }
        .boxed()
    }
}

/// A model that never answers.
pub struct StalledDecisions;

impl DecisionProvider for StalledDecisions {
    fn get_decision<'a>(
        &'a self,
        _portfolio: &'a Portfolio,
        _market_data: &'a [Market],
        _template: &'a str,
    ) -> BoxFuture<'a, DecisionOutcome> {
        futures_util::future::pending().boxed()
    }
}

/// Lifecycle settings with no pacing.
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        step_delay: Duration::ZERO,
        ..LifecycleConfig::default()
    }
}

pub struct Harness {
    pub market: Arc<FakeMarket>,
    pub gateway: Arc<RecordingGateway>,
    pub decisions: Arc<ScriptedDecisions>,
    pub bot: Arc<BotRuntime>,
}

/// A paper or real bot named after `id`, wired to the given fakes.
pub fn bot(
    id: &str,
    mode: TradingMode,
    balance: f64,
    market: &Arc<FakeMarket>,
    gateway: &Arc<RecordingGateway>,
    decisions: &Arc<ScriptedDecisions>,
) -> Arc<BotRuntime> {
    bot_with_provider(id, mode, balance, market, gateway, decisions.clone())
}

/// Like [`bot`], consulting an arbitrary model.
pub fn bot_with_provider(
    id: &str,
    mode: TradingMode,
    balance: f64,
    market: &Arc<FakeMarket>,
    gateway: &Arc<RecordingGateway>,
    provider: Arc<dyn DecisionProvider>,
) -> Arc<BotRuntime> {
    let deps = RuntimeDeps {
        market: market.clone(),
        precision: PrecisionRegistry::new(market.clone()),
        lifecycle: Arc::new(OrderLifecycleManager::new(gateway.clone(), fast_config())),
    };
    let state = BotState::new(id, "Tester", "{{marketData}}", ModelProvider::Gemini, mode, balance);
    BotRuntime::with_state(state, provider, deps)
}

/// A bot wired to fakes, starting with `balance`.
pub fn harness(mode: TradingMode, balance: f64) -> Harness {
    let market = FakeMarket::standard();
    let gateway = RecordingGateway::new();
    let decisions = ScriptedDecisions::new(vec![]);
    let bot = bot("bot_test", mode, balance, &market, &gateway, &decisions);

    Harness {
        market,
        gateway,
        decisions,
        bot,
    }
}
