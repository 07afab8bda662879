//! Trading arena: personas, their runtimes and the scheduler that drives them.

#[allow(clippy::module_inception)]
pub mod arena;
pub mod personas;
pub mod runtime;

pub use arena::{Arena, ArenaIntervals};
pub use personas::{initial_balance, BotConfig, PAPER_INITIAL_BALANCE, REAL_INITIAL_BALANCE};
pub use runtime::{BotRuntime, RuntimeDeps};
