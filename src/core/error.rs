//! Error handling - Flat, typed error taxonomy surfaced to the UI layer

use thiserror::Error;

use crate::core::types::{Amount, PersonaId};

pub type Result<T> = std::result::Result<T, Error>;

/// ShadeSwap error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (empty name, equal tokens, non-positive amount)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to a persona that does not exist
    #[error("Persona not found: {0}")]
    NotFound(PersonaId),

    /// Swap attempted before any persona was created
    #[error("No active persona")]
    NoActivePersona,

    /// Computed output below the caller's floor
    #[error("Slippage too high: output {amount_out} below minimum {min_amount_out}")]
    Slippage {
        amount_out: Amount,
        min_amount_out: Amount,
    },

    /// The ledger commit failed or was rejected
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wallet connected to a chain without confidential compute
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Ledger failures are the only ones a caller may sensibly retry
    pub fn is_ledger(&self) -> bool {
        matches!(self, Error::Ledger(_))
    }
}
