pub mod arena;
pub mod broadcast;
pub mod decision;
pub mod orders;
pub mod precision;

pub use arena::{Arena, ArenaIntervals, BotConfig, BotRuntime, RuntimeDeps};
pub use broadcast::{ArenaBroadcaster, PublishedSnapshot};
pub use decision::{provider_for, DecisionOutcome, DecisionProvider, ModelTransport};
pub use orders::{
    ExchangeGateway, LifecycleConfig, OrderKind, OrderLifecycleManager, OrderRequest, TradeError,
};
pub use precision::PrecisionRegistry;
