use arena::config::RelayConfig;
use arena::relay::{routes, RelayState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    if config.credentials.is_empty() {
        warn!("BOT_CREDENTIALS is empty: trade and market routes will fail");
    }
    info!(
        "Starting relay on {}:{} ({} bot identities)",
        config.host,
        config.port,
        config.credentials.len()
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = RelayState::new(config)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Relay listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
