//! gem-hunter - Real-time token market-intelligence engine
//!
//! This crate aggregates polled pool and trade listings, a token-launch stream,
//! reference prices and portfolio prices into a single observable state, and
//! drives an audit pipeline against an external reasoning API.

pub mod types;
pub mod engine;

// Re-export main types for convenience
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineSnapshot};
pub use types::{Alert, AlertKind, NetworkId, PortfolioPosition};
