//! Fixed wallet session, for the demo binary and tests

use crate::core::{ChainId, WalletAddress, WalletSession};

#[derive(Debug, Clone, Copy)]
pub struct StaticWallet {
    address: WalletAddress,
    chain_id: ChainId,
}

impl StaticWallet {
    pub fn new(address: WalletAddress, chain_id: ChainId) -> Self {
        Self { address, chain_id }
    }
}

impl WalletSession for StaticWallet {
    fn active_address(&self) -> WalletAddress {
        self.address
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }
}
