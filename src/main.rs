use arena::config::Config;
use arena::services::{
    provider_for, Arena, ArenaBroadcaster, ArenaIntervals, BotConfig, BotRuntime,
    LifecycleConfig, ModelTransport, OrderLifecycleManager, PrecisionRegistry, RuntimeDeps,
};
use arena::sources::{AsterdexClient, MarketSource, RelayClient};
use arena::websocket::SpectatorHub;
use arena::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    info!("Starting Arena server on {}:{}", config.host, config.port);

    let relay = RelayClient::new(config.relay_url.clone(), config.request_timeout)?;
    let exchange = Arc::new(AsterdexClient::new(relay.clone(), config.trading_symbols.clone()));
    let market: Arc<dyn MarketSource> = exchange.clone();
    let transport: Arc<dyn ModelTransport> = Arc::new(relay);

    let deps = RuntimeDeps {
        market: market.clone(),
        precision: PrecisionRegistry::new(market.clone()),
        lifecycle: Arc::new(OrderLifecycleManager::new(
            exchange,
            LifecycleConfig {
                step_delay: config.order_step_delay,
                cooldown: config.cooldown,
                paper_fee_rate: config.paper_fee_rate,
            },
        )),
    };

    let bots: Vec<Arc<BotRuntime>> = BotConfig::enabled(&config.enabled_bots)
        .iter()
        .map(|persona| {
            let mode = persona.trading_mode(&config.real_trading_bots);
            info!("Bot {} ({:?}, {:?})", persona.id, persona.provider, mode);
            BotRuntime::new(
                persona,
                mode,
                provider_for(persona.provider, transport.clone()),
                deps.clone(),
            )
        })
        .collect();

    let broadcaster = ArenaBroadcaster::new();
    let trading_arena = Arena::new(
        bots,
        market,
        deps.precision.clone(),
        broadcaster.clone(),
        ArenaIntervals {
            turn: config.turn_interval,
            refresh: config.refresh_interval,
            precision_refresh: config.precision_refresh_interval,
        },
    );

    let hub = SpectatorHub::new(broadcaster);
    hub.spawn_fanout();
    trading_arena.start().await;

    let state = AppState {
        config: config.clone(),
        arena: trading_arena.clone(),
        hub,
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, arena::app(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            trading_arena.shutdown();
        })
        .await?;

    Ok(())
}
