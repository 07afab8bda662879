use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Symbols traded when `TRADING_SYMBOLS` is not set.
pub const DEFAULT_TRADING_SYMBOLS: &[&str] =
    &["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "DOGEUSDT", "XRPUSDT"];

/// Exchange API key/secret pair for one bot identity.
#[derive(Clone)]
pub struct BotCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Base URL of the signing relay.
    pub relay_url: String,
    /// Symbol allowlist for market data and trading.
    pub trading_symbols: Vec<String>,
    /// Time between decision turns.
    pub turn_interval: Duration,
    /// Time between price refreshes.
    pub refresh_interval: Duration,
    /// Time between precision cache refreshes.
    pub precision_refresh_interval: Duration,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
    /// Pause between sequential exchange calls of one order sequence.
    pub order_step_delay: Duration,
    /// How long a symbol stays closed after a position on it is closed.
    pub cooldown: Duration,
    /// Per-side fee on paper trades, as a fraction of margin.
    pub paper_fee_rate: f64,
    /// Bot ids that place live orders.
    pub real_trading_bots: Vec<String>,
    /// Persona ids to run (empty = all).
    pub enabled_bots: Vec<String>,
    /// Shared secret for control endpoints (None = controls disabled).
    pub broadcast_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails when `RELAY_URL` is missing: nothing can trade without it.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_url = lookup("RELAY_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::Config("RELAY_URL is not set".to_string()))?;

        let secs = |key: &str, default: u64| {
            Duration::from_secs(lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default))
        };

        let trading_symbols = lookup("TRADING_SYMBOLS")
            .map(|s| parse_list(&s).into_iter().map(|s| s.to_uppercase()).collect::<Vec<_>>())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_TRADING_SYMBOLS.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(3001),
            relay_url,
            trading_symbols,
            turn_interval: secs("TURN_INTERVAL_SECS", 300),
            refresh_interval: secs("REFRESH_INTERVAL_SECS", 5),
            precision_refresh_interval: secs("PRECISION_REFRESH_SECS", 3600),
            request_timeout: secs("REQUEST_TIMEOUT_SECS", 15),
            order_step_delay: Duration::from_millis(
                lookup("ORDER_STEP_DELAY_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            ),
            cooldown: Duration::from_secs(
                lookup("COOLDOWN_MINUTES")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30)
                    * 60,
            ),
            paper_fee_rate: lookup("PAPER_FEE_RATE")
                .and_then(|v| v.parse().ok())
                .filter(|r: &f64| (0.0..1.0).contains(r))
                .unwrap_or(0.03),
            real_trading_bots: lookup("REAL_TRADING_BOTS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            enabled_bots: lookup("ENABLED_BOTS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            broadcast_secret: lookup("BROADCAST_SECRET").filter(|s| !s.is_empty()),
        })
    }
}

/// Signing relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Exchange REST base URL.
    pub exchange_base_url: String,
    pub gemini_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    /// Credentials keyed by bot id.
    pub credentials: HashMap<String, BotCredentials>,
    pub request_timeout: Duration,
}

impl RelayConfig {
    /// Load relay configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Format: "bot_id|api_key|api_secret,bot_id2|api_key2|api_secret2"
        let credentials = lookup("BOT_CREDENTIALS")
            .map(|s| {
                s.split(',')
                    .filter_map(|entry| {
                        let parts: Vec<&str> = entry.trim().split('|').collect();
                        if parts.len() >= 3 && parts.iter().all(|p| !p.is_empty()) {
                            Some((
                                parts[0].to_string(),
                                BotCredentials {
                                    api_key: parts[1].to_string(),
                                    api_secret: parts[2].to_string(),
                                },
                            ))
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: lookup("RELAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("RELAY_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8787),
            exchange_base_url: lookup("EXCHANGE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://fapi.asterdex.com".to_string()),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|s| !s.is_empty()),
            xai_api_key: lookup("XAI_API_KEY").filter(|s| !s.is_empty()),
            credentials,
            request_timeout: Duration::from_secs(
                lookup("REQUEST_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
        }
    }

    /// Credentials for a bot. An unknown id is a configuration error.
    pub fn credentials_for(&self, bot_id: &str) -> Result<&BotCredentials, AppError> {
        self.credentials.get(bot_id).ok_or_else(|| {
            AppError::Config(format!("No API key configuration found for botId: {}", bot_id))
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
