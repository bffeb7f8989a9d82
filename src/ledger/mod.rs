//! Ledger implementations

pub mod simulated;

pub use simulated::SimulatedLedger;
