pub mod asterdex;
pub mod relay;

pub use asterdex::AsterdexClient;
pub use relay::{RelayClient, TradeMethod};

use futures_util::future::BoxFuture;
use std::collections::HashMap;

use crate::types::{Market, SymbolPrecisionInfo};

/// Public market data feed.
///
/// Both calls absorb failures: an unreachable feed yields an empty result.
pub trait MarketSource: Send + Sync {
    /// Latest ticker rows for the traded symbols.
    fn market_data(&self) -> BoxFuture<'_, Vec<Market>>;

    /// Rounding rules keyed by symbol.
    fn precision_rules(&self) -> BoxFuture<'_, HashMap<String, SymbolPrecisionInfo>>;
}
