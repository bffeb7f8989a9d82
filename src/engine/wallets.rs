//! Per-wallet engine registry
//!
//! Each wallet address maps to exactly one engine, and therefore to one
//! serialization domain. Engines of different wallets run independently.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ChainLedger, Config, Result, WalletAddress, WalletSession};
use crate::engine::PersonaTradingEngine;

pub struct WalletEngines {
    config: Config,
    engines: RwLock<HashMap<WalletAddress, Arc<PersonaTradingEngine>>>,
}

impl WalletEngines {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Engine for the session's wallet, restored from `ledger` on first use
    pub async fn engine_for(
        &self,
        session: &dyn WalletSession,
        ledger: Arc<dyn ChainLedger>,
    ) -> Result<Arc<PersonaTradingEngine>> {
        let address = session.active_address();
        if let Some(engine) = self.get(&address) {
            return Ok(engine);
        }

        let engine = Arc::new(PersonaTradingEngine::restore(session, ledger, &self.config).await?);

        // A concurrent caller may have won the race; keep its engine
        let mut engines = self.engines.write();
        Ok(engines.entry(address).or_insert(engine).clone())
    }

    pub fn get(&self, address: &WalletAddress) -> Option<Arc<PersonaTradingEngine>> {
        self.engines.read().get(address).cloned()
    }

    /// Drop a wallet's engine, e.g. on disconnect
    pub fn remove(&self, address: &WalletAddress) -> Option<Arc<PersonaTradingEngine>> {
        let removed = self.engines.write().remove(address);
        if removed.is_some() {
            tracing::info!("Released engine for {}", address);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }
}
