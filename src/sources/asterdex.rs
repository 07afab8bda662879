//! AsterDEX perpetual-futures client, reached through the relay.

use futures_util::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, warn};

use super::relay::{RelayClient, TradeMethod};
use super::MarketSource;
use crate::error::{AppError, Result};
use crate::services::orders::{ExchangeGateway, OrderRequest};
use crate::types::{Market, Order, OrderType, Portfolio, Position, SymbolPrecisionInfo};

const TICKER_PATH: &str = "/asterdex";
const EXCHANGE_INFO_PATH: &str = "/asterdex/exchangeInfo";

const LEVERAGE_ENDPOINT: &str = "/fapi/v1/leverage";
const ORDER_ENDPOINT: &str = "/fapi/v1/order";
const BALANCE_ENDPOINT: &str = "/fapi/v2/balance";
const POSITION_RISK_ENDPOINT: &str = "/fapi/v2/positionRisk";
const USER_TRADES_ENDPOINT: &str = "/fapi/v1/userTrades";

/// Exchange leverage bounds.
pub const MIN_LEVERAGE: f64 = 1.0;
pub const MAX_LEVERAGE: f64 = 125.0;

/// 24hr ticker row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    symbol: String,
    last_price: String,
    price_change_percent: String,
}

/// Exchange metadata.
#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    quantity_precision: u32,
    #[serde(default)]
    price_precision: u32,
    #[serde(default)]
    filters: Vec<Value>,
}

/// AsterDEX client.
#[derive(Clone)]
pub struct AsterdexClient {
    relay: RelayClient,
    symbols: Vec<String>,
}

impl AsterdexClient {
    /// Create a client whose market data is limited to `symbols`.
    pub fn new(relay: RelayClient, symbols: Vec<String>) -> Self {
        Self { relay, symbols }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Fetch tickers for the allowlist.
    pub async fn fetch_market_data(&self) -> Result<Vec<Market>> {
        let body = self.relay.get_json(TICKER_PATH).await?;
        parse_tickers(body, &self.symbols)
    }

    /// Fetch tickers, substituting an empty snapshot on failure.
    pub async fn get_market_data(&self) -> Vec<Market> {
        match self.fetch_market_data().await {
            Ok(markets) => markets,
            Err(e) => {
                error!("Error fetching market data: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch per-symbol precision rules.
    pub async fn fetch_exchange_info(&self) -> Result<HashMap<String, SymbolPrecisionInfo>> {
        let body = self.relay.get_json(EXCHANGE_INFO_PATH).await?;
        parse_exchange_info(body)
    }

    /// Fetch precision rules, substituting an empty map on failure.
    pub async fn get_exchange_info(&self) -> HashMap<String, SymbolPrecisionInfo> {
        match self.fetch_exchange_info().await {
            Ok(map) => map,
            Err(e) => {
                error!("Failed to get exchange info: {}", e);
                HashMap::new()
            }
        }
    }

    /// Read balance and open positions of a live account.
    pub async fn fetch_account_state(&self, bot_id: &str) -> Result<Portfolio> {
        let (balances, positions) = tokio::try_join!(
            self.relay
                .trade(TradeMethod::Get, BALANCE_ENDPOINT, bot_id, json!({})),
            self.relay
                .trade(TradeMethod::Get, POSITION_RISK_ENDPOINT, bot_id, json!({})),
        )?;
        parse_account_state(&balances, &positions)
    }

    /// Read the last 100 fills of a live account, oldest first.
    pub async fn fetch_trade_history(&self, bot_id: &str) -> Result<Vec<Order>> {
        let body = self
            .relay
            .trade(
                TradeMethod::Get,
                USER_TRADES_ENDPOINT,
                bot_id,
                json!({ "limit": 100 }),
            )
            .await?;
        parse_trade_history(&body)
    }
}

impl MarketSource for AsterdexClient {
    fn market_data(&self) -> BoxFuture<'_, Vec<Market>> {
        self.get_market_data().boxed()
    }

    fn precision_rules(&self) -> BoxFuture<'_, HashMap<String, SymbolPrecisionInfo>> {
        self.get_exchange_info().boxed()
    }
}

impl ExchangeGateway for AsterdexClient {
    fn set_leverage<'a>(
        &'a self,
        bot_id: &'a str,
        symbol: &'a str,
        leverage: f64,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let capped = clamp_leverage(leverage).round() as u32;
            self.relay
                .trade(
                    TradeMethod::Post,
                    LEVERAGE_ENDPOINT,
                    bot_id,
                    json!({ "symbol": symbol, "leverage": capped }),
                )
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn place_order<'a>(
        &'a self,
        bot_id: &'a str,
        order: &'a OrderRequest,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            let body = self
                .relay
                .trade(TradeMethod::Post, ORDER_ENDPOINT, bot_id, order.to_params())
                .await?;
            order_id_of(&body).ok_or_else(|| {
                AppError::ExternalApi(format!("order response has no orderId: {}", body))
            })
        }
        .boxed()
    }

    fn cancel_order<'a>(
        &'a self,
        bot_id: &'a str,
        symbol: &'a str,
        order_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.relay
                .trade(
                    TradeMethod::Delete,
                    ORDER_ENDPOINT,
                    bot_id,
                    json!({ "symbol": symbol, "orderId": order_id }),
                )
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn account_state<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, Result<Portfolio>> {
        self.fetch_account_state(bot_id).boxed()
    }

    fn trade_history<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, Result<Vec<Order>>> {
        self.fetch_trade_history(bot_id).boxed()
    }
}

/// Clamp a requested leverage into the exchange's accepted range.
pub fn clamp_leverage(leverage: f64) -> f64 {
    if leverage.is_finite() {
        leverage.clamp(MIN_LEVERAGE, MAX_LEVERAGE)
    } else {
        MIN_LEVERAGE
    }
}

/// Parse ticker rows, keeping only allowlisted symbols.
fn parse_tickers(body: Value, allowlist: &[String]) -> Result<Vec<Market>> {
    let tickers: Vec<Ticker> = serde_json::from_value(body)?;
    Ok(tickers
        .into_iter()
        .filter(|t| allowlist.iter().any(|s| s == &t.symbol))
        .map(|t| Market {
            price: t.last_price.parse().unwrap_or(0.0),
            price_24h_change: t.price_change_percent.parse().unwrap_or(0.0),
            symbol: t.symbol,
        })
        .collect())
}

/// Derive precision rules from exchange metadata. Missing filters read as zero.
fn parse_exchange_info(body: Value) -> Result<HashMap<String, SymbolPrecisionInfo>> {
    let info: ExchangeInfo = serde_json::from_value(body)?;
    let mut map = HashMap::with_capacity(info.symbols.len());

    for s in info.symbols {
        let lot_size = find_filter(&s.filters, "LOT_SIZE");
        map.insert(
            s.symbol,
            SymbolPrecisionInfo {
                quantity_precision: s.quantity_precision,
                price_precision: s.price_precision,
                min_qty: lot_size.map(|f| num(f, "minQty")).unwrap_or(0.0),
                max_qty: lot_size.map(|f| num(f, "maxQty")).unwrap_or(0.0),
                step_size: lot_size.map(|f| num(f, "stepSize")).unwrap_or(0.0),
            },
        );
    }

    Ok(map)
}

fn find_filter<'a>(filters: &'a [Value], kind: &str) -> Option<&'a Value> {
    filters
        .iter()
        .find(|f| f.get("filterType").and_then(Value::as_str) == Some(kind))
}

fn parse_account_state(balances: &Value, positions: &Value) -> Result<Portfolio> {
    let balances = balances
        .as_array()
        .ok_or_else(|| AppError::ExternalApi("balance response is not an array".to_string()))?;
    let positions = positions
        .as_array()
        .ok_or_else(|| AppError::ExternalApi("positionRisk response is not an array".to_string()))?;

    let balance = balances
        .iter()
        .find(|b| b.get("asset").and_then(Value::as_str) == Some("USDT"))
        .map(|b| num(b, "availableBalance"))
        .unwrap_or(0.0);

    let positions: Vec<Position> = positions
        .iter()
        .filter(|p| num(p, "positionAmt") != 0.0)
        .map(|p| {
            let symbol = p.get("symbol").and_then(Value::as_str).unwrap_or_default().to_string();
            let leverage = num(p, "leverage").max(1.0);
            Position {
                id: symbol.clone(),
                side: if num(p, "positionAmt") > 0.0 {
                    OrderType::Long
                } else {
                    OrderType::Short
                },
                entry_price: num(p, "entryPrice"),
                size: num(p, "notional").abs() / leverage,
                leverage,
                liquidation_price: num(p, "liquidationPrice"),
                stop_loss: num(p, "stopLoss"),
                take_profit: num(p, "takeProfit"),
                stop_loss_order_id: p.get("stopLossOrderId").and_then(id_string),
                take_profit_order_id: p.get("takeProfitOrderId").and_then(id_string),
                pnl: num(p, "unRealizedProfit"),
                quantity: Some(num(p, "positionAmt").abs()),
                symbol,
            }
        })
        .collect();

    let mut portfolio = Portfolio {
        balance,
        pnl: 0.0,
        total_value: 0.0,
        positions,
    };
    portfolio.recompute();
    Ok(portfolio)
}

fn parse_trade_history(body: &Value) -> Result<Vec<Order>> {
    let trades = body
        .as_array()
        .ok_or_else(|| AppError::ExternalApi("userTrades response is not an array".to_string()))?;

    Ok(trades
        .iter()
        .rev()
        .map(|t| {
            let entry_price = num(t, "price");
            let qty = num(t, "qty");
            let pnl = num(t, "realizedPnl");
            Order {
                id: t.get("id").and_then(id_string).unwrap_or_default(),
                symbol: t.get("symbol").and_then(Value::as_str).unwrap_or_default().to_string(),
                side: if t.get("side").and_then(Value::as_str) == Some("BUY") {
                    OrderType::Long
                } else {
                    OrderType::Short
                },
                size: num(t, "quoteQty"),
                leverage: num(t, "leverage").trunc(),
                pnl,
                fee: num(t, "commission"),
                timestamp: t.get("time").and_then(Value::as_i64).unwrap_or(0),
                entry_price,
                exit_price: if qty != 0.0 { entry_price + pnl / qty } else { entry_price },
                was_stop_loss: None,
                was_take_profit: None,
            }
        })
        .collect())
}

/// Read a numeric field that the exchange may send as a string or a number.
fn num(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn order_id_of(body: &Value) -> Option<String> {
    body.get("orderId").and_then(id_string)
}
