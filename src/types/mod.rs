pub mod bot;
pub mod decision;
pub mod market;
pub mod trading;
pub mod ws;

pub use bot::*;
pub use decision::*;
pub use market::*;
pub use trading::*;
pub use ws::*;
