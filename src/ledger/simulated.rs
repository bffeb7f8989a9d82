//! In-memory ledger mirroring the persona contract in simulation mode
//! (no router configured): swaps credit the input minus a flat rate (2%
//! unless configured otherwise) and are only logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::core::{
    Amount, ChainLedger, Error, LedgerOp, Metadata, Persona, PersonaId, Result, Token, Trade, WalletAddress,
};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct LedgerState {
    ids: Vec<PersonaId>,
    names: HashMap<PersonaId, String>,
    active: Option<PersonaId>,
    histories: HashMap<PersonaId, Vec<Trade>>,
    identity_nonce: u64,
    tx_nonce: u64,
    /// Call numbers (1-based, per op) that must fail
    failing: HashMap<LedgerOp, BTreeSet<usize>>,
    submissions: HashMap<LedgerOp, usize>,
}

impl LedgerState {
    /// Count the call and consume a pending injected failure
    fn begin(&mut self, op: LedgerOp) -> Result<()> {
        let count = self.submissions.entry(op).or_default();
        *count += 1;
        let call = *count;
        if self.failing.get_mut(&op).is_some_and(|calls| calls.remove(&call)) {
            return Err(Error::Ledger(format!("{} reverted (injected)", op)));
        }
        Ok(())
    }
}

/// Contract stand-in for a single owner
pub struct SimulatedLedger {
    owner: WalletAddress,
    state: Mutex<LedgerState>,
    clock: Clock,
    latency: Option<Duration>,
    slippage_rate: Decimal,
}

impl SimulatedLedger {
    pub fn new(owner: WalletAddress) -> Self {
        Self {
            owner,
            state: Mutex::new(LedgerState::default()),
            clock: Box::new(Utc::now),
            latency: None,
            slippage_rate: Decimal::new(2, 2),
        }
    }

    /// Use a custom block-time source
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Delay every submit, modelling confirmation time
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Flat rate shaved off every swap; keep in sync with the engine's pricer
    pub fn with_slippage_rate(mut self, rate: Decimal) -> Self {
        self.slippage_rate = rate;
        self
    }

    pub fn owner(&self) -> WalletAddress {
        self.owner
    }

    /// Make the next call of `op` fail once
    pub fn fail_next(&self, op: LedgerOp) {
        self.fail_nth(op, 1);
    }

    /// Make the `n`th upcoming call of `op` fail once (1 = next call)
    pub fn fail_nth(&self, op: LedgerOp, n: usize) {
        let mut state = self.state.lock();
        let call = state.submissions.get(&op).copied().unwrap_or(0) + n.max(1);
        state.failing.entry(op).or_default().insert(call);
    }

    /// Number of submit calls seen for `op`, failed ones included
    pub fn submissions(&self, op: LedgerOp) -> usize {
        self.state.lock().submissions.get(&op).copied().unwrap_or(0)
    }

    fn keccak(&self, domain: &[u8], nonce: u64) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(domain);
        hasher.update(self.owner.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.finalize().into()
    }

    async fn confirm(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChainLedger for SimulatedLedger {
    async fn submit_create_identity(&self, name: &str, metadata: &Metadata) -> Result<Persona> {
        self.confirm().await;
        let mut state = self.state.lock();
        state.begin(LedgerOp::CreateIdentity)?;

        state.identity_nonce += 1;
        let id = PersonaId::from_bytes(self.keccak(b"identity", state.identity_nonce));

        state.ids.push(id);
        state.names.insert(id, name.to_string());
        state.histories.insert(id, Vec::new());
        if state.active.is_none() {
            state.active = Some(id);
        }
        debug!("ledger: created identity {} for {}", id, self.owner);

        Ok(Persona {
            id,
            name: name.to_string(),
            metadata: metadata.clone(),
        })
    }

    async fn submit_switch_identity(&self, id: &PersonaId) -> Result<()> {
        self.confirm().await;
        let mut state = self.state.lock();
        state.begin(LedgerOp::SwitchIdentity)?;

        if !state.names.contains_key(id) {
            return Err(Error::Ledger("Identity does not exist".into()));
        }
        state.active = Some(*id);
        Ok(())
    }

    async fn submit_swap(
        &self,
        input_token: &Token,
        output_token: &Token,
        amount_in: Amount,
        min_amount_out: Amount,
    ) -> Result<Trade> {
        self.confirm().await;
        let mut state = self.state.lock();
        state.begin(LedgerOp::Swap)?;

        let persona_id = state.active.ok_or_else(|| Error::Ledger("No active identity".into()))?;
        if input_token == output_token {
            return Err(Error::Ledger("Tokens must differ".into()));
        }
        if !amount_in.is_positive() {
            return Err(Error::Ledger("Amount must be > 0".into()));
        }

        let amount_out = Amount::new(amount_in.as_decimal() * (Decimal::ONE - self.slippage_rate));
        if amount_out < min_amount_out {
            return Err(Error::Ledger("Slippage too high".into()));
        }

        state.tx_nonce += 1;
        let tx_hash = format!("0x{}", hex::encode(self.keccak(b"tx", state.tx_nonce)));
        let trade = Trade {
            persona_id,
            input_token: input_token.clone(),
            output_token: output_token.clone(),
            amount_in,
            min_amount_out,
            amount_out,
            timestamp: (self.clock)(),
            tx_hash: Some(tx_hash),
        };
        state.histories.entry(persona_id).or_default().push(trade.clone());
        Ok(trade)
    }

    async fn query_identity_ids(&self) -> Result<Vec<PersonaId>> {
        Ok(self.state.lock().ids.clone())
    }

    async fn query_identity(&self, id: &PersonaId) -> Result<String> {
        self.state
            .lock()
            .names
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Ledger("Identity does not exist".into()))
    }

    async fn query_active_identity(&self) -> Result<Option<PersonaId>> {
        Ok(self.state.lock().active)
    }

    async fn query_swap_history(&self, id: &PersonaId) -> Result<Vec<Trade>> {
        self.state
            .lock()
            .histories
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Ledger("Identity does not exist".into()))
    }
}
