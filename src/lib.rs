//! ShadeSwap - Core Library
//! Persona-scoped trading on confidential-compute chains

// Public modules
pub mod core;
pub mod engine;
pub mod ledger;
pub mod wallet;

// Re-exports
pub use crate::core::{Config, Error, Result};
pub use engine::{EngineEvent, PersonaTradingEngine, TradeHistory, WalletEngines};
