//! Persona trading engine
//! Persona registry, active identity and persona-scoped swaps per wallet

pub mod book;
pub mod events;
pub mod pricing;
pub mod trading;
pub mod wallets;

pub use book::{PersonaBook, TradeHistory};
pub use events::{EngineEvent, EventBus};
pub use pricing::FixedRatePricer;
pub use trading::PersonaTradingEngine;
pub use wallets::WalletEngines;
