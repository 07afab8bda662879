//! Bot runtime: cooldowns, pause, price refresh and live account sync.

mod common;

use arena::types::{
    liquidation_price, AiAction, AiDecision, CloseReason, Order, OrderType, Portfolio, Position,
    TradingMode,
};
use common::{bot_with_provider, harness, FakeMarket, RecordingGateway, StalledDecisions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn long(symbol: &str, size: f64, leverage: f64, stop_loss: f64, take_profit: f64) -> AiDecision {
    AiDecision::open(AiAction::Long, symbol, size, leverage, stop_loss, take_profit, "")
}

#[tokio::test]
async fn test_reopen_during_cooldown_is_noted() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("ETHUSDT", 500.0, 5.0, 3300.0, 3800.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    let id = h.bot.snapshot().await.portfolio.positions[0].id.clone();

    h.decisions.push(vec![AiDecision::close(id, "done")]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.decisions.push(vec![long("ETHUSDT", 500.0, 5.0, 3300.0, 3800.0)]);
    let log = h.bot.run_turn(&h.market.snapshot()).await;

    assert_eq!(log.notes.len(), 1);
    assert!(log.notes[0].contains("ETHUSDT is cooling down until"), "{}", log.notes[0]);
    let state = h.bot.snapshot().await;
    assert!(state.portfolio.positions.is_empty());
    assert_eq!(state.orders.len(), 1);
    assert_eq!(state.trade_count, 1);
}

#[tokio::test]
async fn test_cooldown_is_per_symbol() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("ETHUSDT", 500.0, 5.0, 3300.0, 3800.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    let id = h.bot.snapshot().await.portfolio.positions[0].id.clone();
    h.decisions.push(vec![AiDecision::close(id, "")]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.decisions.push(vec![long("BTCUSDT", 500.0, 5.0, 65000.0, 75000.0)]);
    let log = h.bot.run_turn(&h.market.snapshot()).await;
    assert!(log.notes.is_empty(), "{:?}", log.notes);
    assert_eq!(h.bot.snapshot().await.portfolio.positions.len(), 1);
}

#[tokio::test]
async fn test_close_by_symbol_fallback_and_fees() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 1000.0, 10.0, 65000.0, 75000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.market.set_price("BTCUSDT", 71400.0);
    let mut close = AiDecision::close("", "lock it in");
    close.symbol = Some("BTCUSDT".to_string());
    h.decisions.push(vec![close]);
    let log = h.bot.run_turn(&h.market.snapshot()).await;
    assert!(log.notes.is_empty(), "{:?}", log.notes);

    let state = h.bot.snapshot().await;
    let order = &state.orders[0];
    // +2% on 10000 notional, minus 30 fee on each side.
    assert!((order.fee - 60.0).abs() < 1e-9);
    assert!((order.pnl - 140.0).abs() < 1e-6);
    assert_eq!(order.was_stop_loss, None);
    assert!((state.portfolio.balance - 10_140.0).abs() < 1e-6);
    assert!((state.realized_pnl - 140.0).abs() < 1e-6);
    assert_eq!(state.win_rate, 100.0);
}

#[tokio::test]
async fn test_mixed_batch_executes_valid_siblings() {
    let h = harness(TradingMode::Paper, 10_000.0);
    let mut broken = long("ETHUSDT", 500.0, 5.0, 3300.0, 3800.0);
    broken.take_profit = None;
    h.decisions.push(vec![broken, long("BTCUSDT", 500.0, 5.0, 65000.0, 75000.0)]);

    let log = h.bot.run_turn(&h.market.snapshot()).await;

    assert_eq!(log.decisions.len(), 2);
    assert_eq!(log.notes.len(), 1);
    let state = h.bot.snapshot().await;
    assert_eq!(state.portfolio.positions.len(), 1);
    assert_eq!(state.portfolio.positions[0].symbol, "BTCUSDT");
}

#[tokio::test]
async fn test_insufficient_paper_balance() {
    let h = harness(TradingMode::Paper, 100.0);
    h.decisions.push(vec![long("BTCUSDT", 500.0, 5.0, 65000.0, 75000.0)]);

    let log = h.bot.run_turn(&h.market.snapshot()).await;

    assert!(log.notes[0].contains("Insufficient balance"));
    assert!(h.bot.snapshot().await.portfolio.positions.is_empty());
}

#[tokio::test]
async fn test_empty_market_skips_model() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 500.0, 5.0, 65000.0, 75000.0)]);

    let log = h.bot.run_turn(&[]).await;

    assert!(log.notes[0].contains("No market data"));
    assert!(h.decisions.prompts.lock().unwrap().is_empty());
    assert_eq!(h.bot.snapshot().await.bot_logs.len(), 1);
}

#[tokio::test]
async fn test_paused_bot_skips_turn() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 500.0, 5.0, 65000.0, 75000.0)]);
    h.bot.set_paused(true).await;

    assert!(h.bot.turn().await.is_none());
    assert!(h.decisions.prompts.lock().unwrap().is_empty());

    h.bot.set_paused(false).await;
    let log = h.bot.turn().await.unwrap();
    assert_eq!(log.decisions.len(), 1);
    let state = h.bot.snapshot().await;
    assert!(!state.is_loading);
    assert_eq!(state.portfolio.positions.len(), 1);
}

#[tokio::test]
async fn test_aborted_turn_clears_loading() {
    let market = FakeMarket::standard();
    let gateway = RecordingGateway::new();
    let bot = bot_with_provider(
        "bot_stalled",
        TradingMode::Paper,
        10_000.0,
        &market,
        &gateway,
        Arc::new(StalledDecisions),
    );

    let running = bot.clone();
    let turn = tokio::spawn(async move { running.turn().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bot.snapshot().await.is_loading);

    turn.abort();
    assert!(turn.await.unwrap_err().is_cancelled());

    let state = bot.snapshot().await;
    assert!(!state.is_loading);
    assert!(state.bot_logs.is_empty());
}

#[tokio::test]
async fn test_paper_refresh_marks_to_market() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 1000.0, 10.0, 65000.0, 75000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.market.set_price("BTCUSDT", 70700.0);
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    let position = &state.portfolio.positions[0];
    assert!((position.pnl - 100.0).abs() < 1e-6);
    assert!((state.portfolio.total_value - 10_100.0).abs() < 1e-6);
    assert_eq!(state.value_history.len(), 1);
    assert!((state.value_history[0].value - 10_100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_paper_take_profit_fills_at_level() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 1000.0, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.market.set_price("BTCUSDT", 72500.0);
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    assert!(state.portfolio.positions.is_empty());
    let order = &state.orders[0];
    assert_eq!(order.exit_price, 72000.0);
    assert_eq!(order.was_take_profit, Some(true));
    assert_eq!(order.was_stop_loss, Some(false));
    assert!(state.cooldown_until("BTCUSDT", order.timestamp).is_some());
}

#[tokio::test]
async fn test_paper_stop_loss_triggers_while_paused() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 1000.0, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    h.bot.set_paused(true).await;

    h.market.set_price("BTCUSDT", 67500.0);
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    let order = &state.orders[0];
    assert_eq!(order.exit_price, 68000.0);
    assert_eq!(order.was_stop_loss, Some(true));
    assert!(order.pnl < 0.0);
}

#[tokio::test]
async fn test_paper_liquidation_loses_margin() {
    let h = harness(TradingMode::Paper, 10_000.0);
    // Stop below the liquidation price: liquidation fills first.
    h.decisions.push(vec![long("BTCUSDT", 5000.0, 25.0, 60000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.market.set_price("BTCUSDT", 66000.0);
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    let order = &state.orders[0];
    assert!((order.exit_price - 66850.0).abs() < 1e-6);
    assert_eq!(order.was_stop_loss, Some(false));
    assert_eq!(order.was_take_profit, Some(false));
    assert!((order.pnl - (-5000.0 - 300.0)).abs() < 1e-6);
    assert!((state.portfolio.balance - 4700.0).abs() < 1e-6);
}

fn exchange_position(symbol: &str, entry: f64, margin: f64, pnl: f64) -> Position {
    Position {
        id: symbol.to_string(),
        symbol: symbol.to_string(),
        side: OrderType::Long,
        entry_price: entry,
        size: margin,
        leverage: 10.0,
        liquidation_price: liquidation_price(entry, 10.0, OrderType::Long),
        stop_loss: 0.0,
        take_profit: 0.0,
        stop_loss_order_id: None,
        take_profit_order_id: None,
        pnl,
        quantity: Some(margin * 10.0 / entry),
    }
}

fn account(balance: f64, positions: Vec<Position>) -> Portfolio {
    let mut portfolio = Portfolio::new(balance);
    portfolio.positions = positions;
    portfolio.recompute();
    portfolio
}

#[tokio::test]
async fn test_real_bootstrap_loads_history_and_account() {
    let h = harness(TradingMode::Real, 950.0);
    h.gateway.set_history(vec![Order {
        id: "1".to_string(),
        symbol: "BTCUSDT".to_string(),
        side: OrderType::Long,
        size: 700.0,
        leverage: 10.0,
        pnl: 12.5,
        fee: 0.3,
        timestamp: 1,
        entry_price: 70000.0,
        exit_price: 70000.0,
        was_stop_loss: None,
        was_take_profit: None,
    }]);
    h.gateway.set_account(account(900.0, vec![exchange_position("ETHUSDT", 3500.0, 35.0, 2.0)]));

    h.bot.bootstrap(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    assert_eq!(state.trade_count, 1);
    assert_eq!(state.realized_pnl, 12.5);
    assert_eq!(state.portfolio.balance, 900.0);
    assert_eq!(state.portfolio.positions.len(), 1);
    assert!((state.portfolio.total_value - 937.0).abs() < 1e-9);
    assert_eq!(state.value_history.len(), 1);
}

#[tokio::test]
async fn test_real_sync_keeps_local_protection() {
    let h = harness(TradingMode::Real, 950.0);
    h.decisions.push(vec![long("BTCUSDT", 0.01, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    let local = h.bot.snapshot().await.portfolio.positions[0].clone();

    h.gateway.set_account(account(880.0, vec![exchange_position("BTCUSDT", 70010.0, 70.0, 1.5)]));
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    let merged = &state.portfolio.positions[0];
    assert_eq!(merged.id, local.id);
    assert_eq!(merged.entry_price, 70010.0);
    assert_eq!(merged.pnl, 1.5);
    assert_eq!(merged.stop_loss, 68000.0);
    assert_eq!(merged.stop_loss_order_id, local.stop_loss_order_id);
    assert_eq!(state.portfolio.balance, 880.0);
}

#[tokio::test]
async fn test_real_position_closed_by_exchange_stop() {
    let h = harness(TradingMode::Real, 950.0);
    h.decisions.push(vec![long("BTCUSDT", 0.01, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;

    h.gateway.set_account(account(940.0, vec![]));
    h.market.set_price("BTCUSDT", 67900.0);
    h.bot.refresh(&h.market.snapshot()).await;

    let state = h.bot.snapshot().await;
    assert!(state.portfolio.positions.is_empty());
    assert_eq!(state.orders.len(), 1);
    assert_eq!(state.orders[0].was_stop_loss, Some(true));
    assert_eq!(state.orders[0].exit_price, 68000.0);
    assert!(state.cooldown_until("BTCUSDT", state.orders[0].timestamp).is_some());
}

#[tokio::test]
async fn test_real_sync_failure_keeps_state() {
    let h = harness(TradingMode::Real, 950.0);
    h.decisions.push(vec![long("BTCUSDT", 0.01, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    let before = h.bot.snapshot().await;

    h.gateway.fail_account.store(true, Ordering::SeqCst);
    h.bot.refresh(&h.market.snapshot()).await;

    let after = h.bot.snapshot().await;
    assert_eq!(after.portfolio, before.portfolio);
    assert_eq!(after.value_history.len(), before.value_history.len());
}

#[tokio::test]
async fn test_close_reason_flags_survive_serialization() {
    let h = harness(TradingMode::Paper, 10_000.0);
    h.decisions.push(vec![long("BTCUSDT", 1000.0, 10.0, 68000.0, 72000.0)]);
    h.bot.run_turn(&h.market.snapshot()).await;
    let id = h.bot.snapshot().await.portfolio.positions[0].id.clone();

    let order = h
        .bot
        .close_position(&id, &h.market.snapshot(), CloseReason::Decision)
        .await
        .unwrap();
    let json = serde_json::to_value(&order).unwrap();
    assert_eq!(json["type"], "LONG");
    assert_eq!(json["exitPrice"], 70000.0);
}
