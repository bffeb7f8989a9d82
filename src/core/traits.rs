//! Core traits - Seams to the wallet provider and the chain

use async_trait::async_trait;

use crate::core::{Result, types::*};

/// Connected wallet - read-only from the engine's point of view
pub trait WalletSession: Send + Sync {
    /// Account currently selected in the wallet
    fn active_address(&self) -> WalletAddress;

    /// Chain the wallet is connected to
    fn chain_id(&self) -> ChainId;
}

/// Ledger operations, used for failure injection and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    CreateIdentity,
    SwitchIdentity,
    Swap,
}

impl std::fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerOp::CreateIdentity => write!(f, "createIdentity"),
            LedgerOp::SwitchIdentity => write!(f, "switchIdentity"),
            LedgerOp::Swap => write!(f, "swapTokens"),
        }
    }
}

/// System of record for identities and swaps (the persona contract)
///
/// Every `submit_*` resolves only once the transaction is committed. Any
/// error means nothing was committed. Retries and timeouts live behind this
/// trait, never in the engine.
#[async_trait]
pub trait ChainLedger: Send + Sync {
    /// Create an identity; the first one also becomes active on-chain
    async fn submit_create_identity(&self, name: &str, metadata: &Metadata) -> Result<Persona>;

    /// Point the on-chain active identity at `id`
    async fn submit_switch_identity(&self, id: &PersonaId) -> Result<()>;

    /// Swap under the on-chain active identity
    async fn submit_swap(
        &self,
        input_token: &Token,
        output_token: &Token,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> Result<Trade>;

    /// Identity ids in creation order
    async fn query_identity_ids(&self) -> Result<Vec<PersonaId>>;

    /// Display name of an identity
    async fn query_identity(&self, id: &PersonaId) -> Result<String>;

    /// Active identity, `None` before the first identity exists
    async fn query_active_identity(&self) -> Result<Option<PersonaId>>;

    /// Swap log of an identity, oldest first
    async fn query_swap_history(&self, id: &PersonaId) -> Result<Vec<Trade>>;
}
