//! Persona trading engine - identity management and persona-scoped swaps
//!
//! One engine per wallet. Every operation holds the book lock for its whole
//! duration, ledger round trips included, so operations on one wallet never
//! interleave. Local state changes only after the ledger has committed.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::{
    Amount, ChainId, ChainLedger, Config, Error, LedgerOp, Metadata, Persona, PersonaId, Result, SwapRequest,
    Trade, WalletAddress, WalletSession,
};
use crate::engine::book::{PersonaBook, TradeHistory};
use crate::engine::events::{EngineEvent, EventBus};
use crate::engine::pricing::FixedRatePricer;

/// Wrap any collaborator failure as a ledger error
fn ledger_err(op: LedgerOp) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::Ledger(msg) => Error::Ledger(format!("{}: {}", op, msg)),
        other => Error::Ledger(format!("{}: {}", op, other)),
    }
}

pub struct PersonaTradingEngine {
    wallet: WalletAddress,
    chain_id: ChainId,
    ledger: Arc<dyn ChainLedger>,
    pricer: FixedRatePricer,
    book: Mutex<PersonaBook>,
    events: EventBus,
}

impl PersonaTradingEngine {
    /// Empty engine for the session's wallet
    pub fn new(session: &dyn WalletSession, ledger: Arc<dyn ChainLedger>, config: &Config) -> Result<Self> {
        let wallet = session.active_address();
        let chain_id = session.chain_id();

        if !chain_id.is_confidential() {
            if config.network.require_confidential {
                return Err(Error::UnsupportedChain(chain_id.0));
            }
            warn!("Wallet {} is on chain {}; persona data will not be confidential", wallet, chain_id);
        }

        Ok(Self {
            wallet,
            chain_id,
            ledger,
            pricer: FixedRatePricer::new(config.slippage_rate()?)?,
            book: Mutex::new(PersonaBook::new()),
            events: EventBus::new(),
        })
    }

    /// Engine hydrated from the ledger's current state
    pub async fn restore(session: &dyn WalletSession, ledger: Arc<dyn ChainLedger>, config: &Config) -> Result<Self> {
        let engine = Self::new(session, ledger, config)?;
        engine.refresh().await?;
        Ok(engine)
    }

    pub fn wallet(&self) -> WalletAddress {
        self.wallet
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn subscribe(&self) -> flume::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Output the pricer would credit for `amount_in`
    pub fn quote(&self, amount_in: Amount) -> Amount {
        self.pricer.quote(amount_in)
    }

    pub async fn personas(&self) -> Vec<Persona> {
        self.book.lock().await.personas().cloned().collect()
    }

    pub async fn persona(&self, id: &PersonaId) -> Option<Persona> {
        self.book.lock().await.persona(id).cloned()
    }

    pub async fn active_persona(&self) -> Option<Persona> {
        let book = self.book.lock().await;
        book.active().and_then(|id| book.persona(&id).cloned())
    }

    /// Create a persona. The wallet's first persona becomes active.
    pub async fn create_identity(&self, name: &str, metadata: Metadata) -> Result<Persona> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("persona name must not be empty".into()));
        }

        let mut book = self.book.lock().await;
        let persona = self
            .ledger
            .submit_create_identity(name, &metadata)
            .await
            .map_err(ledger_err(LedgerOp::CreateIdentity))?;

        let activated = book.insert(persona.clone())?;
        info!(
            "Created persona {} ({}) for {}{}",
            persona.name,
            persona.id,
            self.wallet,
            if activated { ", now active" } else { "" }
        );

        self.events.publish(EngineEvent::IdentityCreated {
            wallet: self.wallet,
            persona: persona.clone(),
            activated,
        });
        Ok(persona)
    }

    /// Make `id` the active persona. Switching to the current one is a no-op.
    pub async fn switch_identity(&self, id: PersonaId) -> Result<()> {
        let mut book = self.book.lock().await;
        book.require(&id)?;

        if book.active() == Some(id) {
            debug!("Persona {} already active, skipping switch", id);
            return Ok(());
        }

        self.ledger
            .submit_switch_identity(&id)
            .await
            .map_err(ledger_err(LedgerOp::SwitchIdentity))?;

        let previous = book.set_active(id)?;
        info!("Active persona for {}: {:?} -> {}", self.wallet, previous, id);

        self.events.publish(EngineEvent::ActiveIdentityChanged {
            wallet: self.wallet,
            previous,
            current: id,
        });
        Ok(())
    }

    /// Swap under the active persona, optionally switching persona first.
    ///
    /// All checks run before the first ledger call. If the swap fails after a
    /// committed mid-trade switch, the switch is rolled back on the ledger.
    pub async fn execute_swap(&self, request: SwapRequest) -> Result<Trade> {
        request.validate()?;

        let mut book = self.book.lock().await;
        let current = book.active().ok_or(Error::NoActivePersona)?;

        let target = match request.switch_to {
            Some(id) => {
                book.require(&id)?;
                id
            }
            None => current,
        };
        let switching = target != current;

        let quoted = self.pricer.check(request.amount_in, request.min_amount_out)?;

        if switching {
            self.ledger
                .submit_switch_identity(&target)
                .await
                .map_err(ledger_err(LedgerOp::SwitchIdentity))?;
            debug!("Mid-trade switch {} -> {} committed", current, target);
        }

        let submitted = self
            .ledger
            .submit_swap(
                &request.input_token,
                &request.output_token,
                request.amount_in,
                request.min_amount_out,
            )
            .await
            .map_err(ledger_err(LedgerOp::Swap))
            .and_then(|trade| {
                if trade.persona_id != target {
                    return Err(Error::Ledger(format!(
                        "swap attributed to {} instead of {}",
                        trade.persona_id, target
                    )));
                }
                if trade.amount_out != quoted {
                    return Err(Error::Ledger(format!(
                        "ledger credited {} but quote was {}",
                        trade.amount_out, quoted
                    )));
                }
                Ok(trade)
            });

        let committed = match submitted {
            Ok(trade) => trade,
            Err(e) => {
                warn!("Swap {} -> {} failed: {}", request.input_token, request.output_token, e);
                if switching {
                    self.roll_back_switch(&mut book, current).await;
                }
                return Err(e);
            }
        };

        if switching {
            book.set_active(target)?;
        }
        let trade = book.append(committed)?;

        info!(
            "Swap {} {} -> {} {} under {}",
            trade.amount_in, trade.input_token, trade.amount_out, trade.output_token, trade.persona_id
        );

        if switching {
            self.events.publish(EngineEvent::ActiveIdentityChanged {
                wallet: self.wallet,
                previous: Some(current),
                current: target,
            });
        }
        self.events.publish(EngineEvent::SwapExecuted {
            wallet: self.wallet,
            trade: trade.clone(),
        });
        Ok(trade)
    }

    /// Trades of a persona, oldest first
    pub async fn get_history(&self, id: &PersonaId) -> Result<TradeHistory> {
        self.book.lock().await.history(id)
    }

    /// Rebuild local state from the ledger. Replaces the book only if every
    /// query succeeds and the ledger state is coherent.
    pub async fn refresh(&self) -> Result<()> {
        let mut book = self.book.lock().await;
        let restored = self.load_from_ledger().await?;
        info!(
            "Restored {} personas for {} (active: {:?})",
            restored.len(),
            self.wallet,
            restored.active()
        );
        *book = restored;
        Ok(())
    }

    async fn load_from_ledger(&self) -> Result<PersonaBook> {
        let query = |e: Error| Error::Ledger(format!("query failed: {}", e));
        let mut book = PersonaBook::new();

        for id in self.ledger.query_identity_ids().await.map_err(query)? {
            let name = self.ledger.query_identity(&id).await.map_err(query)?;
            // Metadata is confidential on-chain and never read back
            book.insert(Persona {
                id,
                name,
                metadata: Metadata::default(),
            })?;

            for trade in self.ledger.query_swap_history(&id).await.map_err(query)? {
                if trade.persona_id != id {
                    return Err(Error::Ledger(format!("history of {} holds a trade of {}", id, trade.persona_id)));
                }
                book.append(trade)?;
            }
        }

        match self.ledger.query_active_identity().await.map_err(query)? {
            Some(id) => {
                book.set_active(id)
                    .map_err(|_| Error::Ledger(format!("active identity {} is not registered", id)))?;
            }
            None if !book.is_empty() => {
                return Err(Error::Ledger("identities exist but none is active".into()));
            }
            None => {}
        }
        Ok(book)
    }

    /// Undo a committed mid-trade switch. If that fails too, adopt whatever
    /// the ledger reports so the local pointer never disagrees with it.
    async fn roll_back_switch(&self, book: &mut PersonaBook, previous: PersonaId) {
        match self.ledger.submit_switch_identity(&previous).await {
            Ok(()) => warn!("Rolled back mid-trade switch to {}", previous),
            Err(e) => {
                error!("Failed to roll back mid-trade switch to {}: {}", previous, e);
                match self.ledger.query_active_identity().await {
                    Ok(Some(id)) if id != previous => {
                        if let Ok(old) = book.set_active(id) {
                            self.events.publish(EngineEvent::ActiveIdentityChanged {
                                wallet: self.wallet,
                                previous: old,
                                current: id,
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!("Could not read active identity after failed rollback: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SimulatedLedger;
    use crate::wallet::StaticWallet;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    const OWNER: WalletAddress = WalletAddress::from_bytes([0x11; 20]);

    fn wallet() -> StaticWallet {
        StaticWallet::new(OWNER, ChainId::SAPPHIRE_TESTNET)
    }

    fn setup_with(ledger: SimulatedLedger) -> (PersonaTradingEngine, Arc<SimulatedLedger>) {
        setup_with_config(ledger, &Config::default())
    }

    fn setup_with_config(ledger: SimulatedLedger, config: &Config) -> (PersonaTradingEngine, Arc<SimulatedLedger>) {
        let ledger = Arc::new(ledger);
        let engine = PersonaTradingEngine::new(&wallet(), ledger.clone(), config).unwrap();
        (engine, ledger)
    }

    fn config_with_rate(rate: f64) -> Config {
        let mut config = Config::default();
        config.trading.slippage_rate = rate;
        config
    }

    /// Ledger answering with canned, possibly incoherent, results
    struct ScriptedLedger {
        created_id: PersonaId,
        swap_owner: PersonaId,
        ids: Vec<PersonaId>,
        active: Option<PersonaId>,
    }

    impl ScriptedLedger {
        fn new() -> Self {
            Self {
                created_id: PersonaId::from_bytes([0xaa; 32]),
                swap_owner: PersonaId::from_bytes([0xbb; 32]),
                ids: Vec::new(),
                active: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl ChainLedger for ScriptedLedger {
        async fn submit_create_identity(&self, name: &str, metadata: &Metadata) -> Result<Persona> {
            Ok(Persona {
                id: self.created_id,
                name: name.to_string(),
                metadata: metadata.clone(),
            })
        }

        async fn submit_switch_identity(&self, _id: &PersonaId) -> Result<()> {
            Ok(())
        }

        async fn submit_swap(
            &self,
            input_token: &crate::core::Token,
            output_token: &crate::core::Token,
            amount_in: Amount,
            min_amount_out: Amount,
        ) -> Result<Trade> {
            Ok(Trade {
                persona_id: self.swap_owner,
                input_token: input_token.clone(),
                output_token: output_token.clone(),
                amount_in,
                min_amount_out,
                amount_out: FixedRatePricer::default().quote(amount_in),
                timestamp: chrono::Utc::now(),
                tx_hash: None,
            })
        }

        async fn query_identity_ids(&self) -> Result<Vec<PersonaId>> {
            Ok(self.ids.clone())
        }

        async fn query_identity(&self, _id: &PersonaId) -> Result<String> {
            Ok("Scripted".to_string())
        }

        async fn query_active_identity(&self) -> Result<Option<PersonaId>> {
            Ok(self.active)
        }

        async fn query_swap_history(&self, _id: &PersonaId) -> Result<Vec<Trade>> {
            Ok(Vec::new())
        }
    }

    fn scripted(ledger: ScriptedLedger) -> PersonaTradingEngine {
        PersonaTradingEngine::new(&wallet(), Arc::new(ledger), &Config::default()).unwrap()
    }

    fn setup() -> (PersonaTradingEngine, Arc<SimulatedLedger>) {
        setup_with(SimulatedLedger::new(OWNER))
    }

    fn meta(s: &str) -> Metadata {
        Metadata::new(s.as_bytes().to_vec())
    }

    fn swap(amount_in: u64, min_out: u64) -> SwapRequest {
        SwapRequest::new("ETH", "DAI", amount_in, min_out)
    }

    #[tokio::test]
    async fn test_first_identity_becomes_active() {
        let (engine, _) = setup();
        let events = engine.subscribe();

        let first = engine.create_identity("Main Persona", meta("secret:alpha")).await.unwrap();
        assert_eq!(engine.active_persona().await.unwrap().id, first.id);

        engine.create_identity("Second", meta("b")).await.unwrap();
        engine.create_identity("Third", meta("c")).await.unwrap();
        assert_eq!(engine.active_persona().await.unwrap().id, first.id);
        assert_eq!(engine.personas().await.len(), 3);

        let activated: Vec<bool> = events
            .drain()
            .map(|e| match e {
                EngineEvent::IdentityCreated { activated, .. } => activated,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(activated, [true, false, false]);
    }

    #[tokio::test]
    async fn test_create_trims_and_rejects_empty_name() {
        let (engine, ledger) = setup();

        let err = engine.create_identity("   ", meta("x")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(ledger.submissions(LedgerOp::CreateIdentity), 0);

        let persona = engine.create_identity("  Alice  ", meta("x")).await.unwrap();
        assert_eq!(persona.name, "Alice");
    }

    #[tokio::test]
    async fn test_ledger_failure_on_create_changes_nothing() {
        let (engine, ledger) = setup();
        let events = engine.subscribe();
        ledger.fail_next(LedgerOp::CreateIdentity);

        let err = engine.create_identity("Alice", meta("x")).await.unwrap_err();
        assert!(err.is_ledger());
        assert!(engine.personas().await.is_empty());
        assert!(engine.active_persona().await.is_none());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_switch_to_active_is_noop() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let events = engine.subscribe();

        engine.switch_identity(alice.id).await.unwrap();

        assert!(events.is_empty());
        assert_eq!(ledger.submissions(LedgerOp::SwitchIdentity), 0);
        assert_eq!(engine.active_persona().await.unwrap().id, alice.id);
    }

    #[tokio::test]
    async fn test_switch_emits_one_event() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        let events = engine.subscribe();

        engine.switch_identity(bob.id).await.unwrap();

        let received: Vec<_> = events.drain().collect();
        assert_eq!(
            received,
            vec![EngineEvent::ActiveIdentityChanged {
                wallet: OWNER,
                previous: Some(alice.id),
                current: bob.id,
            }]
        );
        assert_eq!(ledger.query_active_identity().await.unwrap(), Some(bob.id));
    }

    #[tokio::test]
    async fn test_switch_unknown_persona() {
        let (engine, _) = setup();
        engine.create_identity("Alice", meta("x")).await.unwrap();

        let ghost = PersonaId::from_bytes([0xee; 32]);
        let err = engine.switch_identity(ghost).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == ghost));
    }

    #[tokio::test]
    async fn test_ledger_failure_on_switch_keeps_pointer() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        ledger.fail_next(LedgerOp::SwitchIdentity);

        assert!(engine.switch_identity(bob.id).await.unwrap_err().is_ledger());
        assert_eq!(engine.active_persona().await.unwrap().id, alice.id);
    }

    #[tokio::test]
    async fn test_slippage_floor() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Trader", meta("m")).await.unwrap();

        let trade = engine.execute_swap(swap(100, 98)).await.unwrap();
        assert_eq!(trade.amount_out, Amount::from(98));

        let err = engine.execute_swap(swap(100, 99)).await.unwrap_err();
        assert!(matches!(err, Error::Slippage { .. }));
        // Rejected locally, never submitted
        assert_eq!(ledger.submissions(LedgerOp::Swap), 1);
        assert_eq!(engine.get_history(&alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_swap_without_persona() {
        let (engine, ledger) = setup();
        let events = engine.subscribe();

        let err = engine.execute_swap(swap(100, 0)).await.unwrap_err();
        assert!(matches!(err, Error::NoActivePersona));
        assert_eq!(ledger.submissions(LedgerOp::Swap), 0);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_swap_validation() {
        let (engine, _) = setup();
        engine.create_identity("Trader", meta("m")).await.unwrap();

        let same = SwapRequest::new("ETH", "ETH", 100u64, 0u64);
        assert!(matches!(engine.execute_swap(same).await, Err(Error::Validation(_))));
        assert!(matches!(engine.execute_swap(swap(0, 0)).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_mid_trade_switch_attributes_to_new_persona() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        let events = engine.subscribe();

        let trade = engine.execute_swap(swap(100, 98).switching_to(bob.id)).await.unwrap();

        assert_eq!(trade.persona_id, bob.id);
        assert_eq!(engine.active_persona().await.unwrap().id, bob.id);
        assert!(engine.get_history(&alice.id).await.unwrap().is_empty());
        assert_eq!(engine.get_history(&bob.id).await.unwrap().len(), 1);
        assert_eq!(ledger.query_active_identity().await.unwrap(), Some(bob.id));

        let received: Vec<_> = events.drain().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(
            &received[0],
            EngineEvent::ActiveIdentityChanged { previous: Some(p), current, .. } if *p == alice.id && *current == bob.id
        ));
        assert!(matches!(&received[1], EngineEvent::SwapExecuted { trade: t, .. } if *t == trade));
    }

    #[tokio::test]
    async fn test_mid_trade_switch_to_active_persona_is_plain_swap() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();

        let trade = engine.execute_swap(swap(10, 0).switching_to(alice.id)).await.unwrap();
        assert_eq!(trade.persona_id, alice.id);
        assert_eq!(ledger.submissions(LedgerOp::SwitchIdentity), 0);
    }

    #[tokio::test]
    async fn test_mid_trade_switch_to_unknown_persona() {
        let (engine, ledger) = setup();
        engine.create_identity("Alice", meta("x")).await.unwrap();

        let ghost = PersonaId::from_bytes([0xee; 32]);
        let err = engine.execute_swap(swap(10, 0).switching_to(ghost)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(ledger.submissions(LedgerOp::Swap), 0);
    }

    #[tokio::test]
    async fn test_slippage_after_mid_switch_keeps_old_persona() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();

        let err = engine.execute_swap(swap(100, 99).switching_to(bob.id)).await.unwrap_err();
        assert!(matches!(err, Error::Slippage { .. }));
        assert_eq!(engine.active_persona().await.unwrap().id, alice.id);
        assert_eq!(ledger.submissions(LedgerOp::SwitchIdentity), 0);
    }

    #[tokio::test]
    async fn test_failed_swap_rolls_back_mid_switch() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        let events = engine.subscribe();
        ledger.fail_next(LedgerOp::Swap);

        let err = engine.execute_swap(swap(100, 98).switching_to(bob.id)).await.unwrap_err();
        assert!(err.is_ledger());

        assert_eq!(engine.active_persona().await.unwrap().id, alice.id);
        assert_eq!(ledger.query_active_identity().await.unwrap(), Some(alice.id));
        // switch, then rollback
        assert_eq!(ledger.submissions(LedgerOp::SwitchIdentity), 2);
        assert!(engine.get_history(&bob.id).await.unwrap().is_empty());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_history_order_and_amounts() {
        let (engine, _) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();

        for amount in [100u64, 250, 50] {
            engine.execute_swap(swap(amount, 0)).await.unwrap();
        }

        let history = engine.get_history(&alice.id).await.unwrap();
        let amounts: Vec<_> = history.iter().map(|t| t.amount_in).collect();
        assert_eq!(amounts, [Amount::from(100), Amount::from(250), Amount::from(50)]);
        for trade in &history {
            assert_eq!(trade.amount_out, engine.quote(trade.amount_in));
            assert_eq!(trade.persona_id, alice.id);
        }
        assert!(history.as_slice().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_new_persona_has_empty_history() {
        let (engine, _) = setup();
        let persona = engine.create_identity("X", meta("m")).await.unwrap();
        assert!(engine.get_history(&persona.id).await.unwrap().is_empty());

        let ghost = PersonaId::from_bytes([1; 32]);
        assert!(matches!(engine.get_history(&ghost).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_backwards_ledger_clock_is_clamped() {
        let ticks = AtomicI64::new(1_700_000_000);
        let ledger = SimulatedLedger::new(OWNER).with_clock(move || {
            let secs = ticks.fetch_sub(60, Ordering::SeqCst);
            DateTime::from_timestamp(secs, 0).unwrap()
        });
        let (engine, _) = setup_with(ledger);
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();

        let first = engine.execute_swap(swap(1, 0)).await.unwrap();
        let second = engine.execute_swap(swap(1, 0)).await.unwrap();
        assert_eq!(second.timestamp, first.timestamp);

        let history = engine.get_history(&alice.id).await.unwrap();
        assert!(history.as_slice().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_restore_matches_ledger() {
        let (engine, ledger) = setup();
        engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        engine.execute_swap(swap(100, 98).switching_to(bob.id)).await.unwrap();

        let restored = PersonaTradingEngine::restore(&wallet(), ledger.clone(), &Config::default())
            .await
            .unwrap();

        let names: Vec<_> = restored.personas().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert_eq!(restored.active_persona().await.unwrap().id, bob.id);
        assert_eq!(
            restored.get_history(&bob.id).await.unwrap(),
            engine.get_history(&bob.id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_unsupported_chain() {
        let ledger: Arc<dyn ChainLedger> = Arc::new(SimulatedLedger::new(OWNER));
        let local = StaticWallet::new(OWNER, ChainId(31337));

        let mut strict = Config::default();
        strict.network.require_confidential = true;
        let err = PersonaTradingEngine::new(&local, ledger.clone(), &strict).err().unwrap();
        assert!(matches!(err, Error::UnsupportedChain(31337)));

        let lenient = PersonaTradingEngine::new(&local, ledger, &Config::default()).unwrap();
        assert_eq!(lenient.chain_id(), ChainId(31337));
    }

    #[tokio::test]
    async fn test_concurrent_switch_and_swap_stay_consistent() {
        let (engine, ledger) = setup_with(SimulatedLedger::new(OWNER).with_latency(Duration::from_millis(5)));
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();

        let (swapped, switched) = tokio::join!(
            engine.execute_swap(swap(100, 98).switching_to(bob.id)),
            engine.switch_identity(alice.id),
        );
        let trade = swapped.unwrap();
        switched.unwrap();

        assert_eq!(trade.persona_id, bob.id);
        let local = engine.active_persona().await.map(|p| p.id);
        assert_eq!(local, ledger.query_active_identity().await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_swaps_all_logged() {
        let (engine, _) = setup_with(SimulatedLedger::new(OWNER).with_latency(Duration::from_millis(1)));
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();

        let results = futures::future::join_all((1..=8u64).map(|n| engine.execute_swap(swap(n, 0)))).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let history = engine.get_history(&alice.id).await.unwrap();
        assert_eq!(history.len(), 8);
        assert!(history.as_slice().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_configured_rate_flows_through_ledger() {
        for (rate, expected) in [(0.0, 100u64), (0.05, 95)] {
            let config = config_with_rate(rate);
            let ledger = SimulatedLedger::new(OWNER).with_slippage_rate(config.slippage_rate().unwrap());
            let (engine, _) = setup_with_config(ledger, &config);
            let trader = engine.create_identity("Trader", meta("m")).await.unwrap();

            let floor = engine.quote(Amount::from(100));
            assert_eq!(floor, Amount::from(expected));

            let trade = engine
                .execute_swap(SwapRequest::new("ETH", "DAI", 100u64, floor))
                .await
                .unwrap();
            assert_eq!(trade.amount_out, Amount::from(expected));
            assert_eq!(engine.get_history(&trader.id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_ledger_credit_differing_from_quote_is_rejected() {
        // Engine prices at 5%, ledger still credits 98%
        let (engine, ledger) = setup_with_config(SimulatedLedger::new(OWNER), &config_with_rate(0.05));
        let trader = engine.create_identity("Trader", meta("m")).await.unwrap();
        let events = engine.subscribe();

        let err = engine.execute_swap(swap(100, 95)).await.unwrap_err();
        assert!(err.is_ledger());
        assert_eq!(ledger.submissions(LedgerOp::Swap), 1);
        assert!(engine.get_history(&trader.id).await.unwrap().is_empty());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollback_adopts_ledger_pointer() {
        let (engine, ledger) = setup();
        let alice = engine.create_identity("Alice", meta("x")).await.unwrap();
        let bob = engine.create_identity("Bob", meta("y")).await.unwrap();
        let events = engine.subscribe();
        ledger.fail_next(LedgerOp::Swap);
        // first switch (mid-trade) commits, the rollback switch fails
        ledger.fail_nth(LedgerOp::SwitchIdentity, 2);

        let err = engine.execute_swap(swap(100, 98).switching_to(bob.id)).await.unwrap_err();
        assert!(err.is_ledger());

        assert_eq!(ledger.query_active_identity().await.unwrap(), Some(bob.id));
        assert_eq!(engine.active_persona().await.unwrap().id, bob.id);
        assert!(engine.get_history(&bob.id).await.unwrap().is_empty());
        assert_eq!(ledger.submissions(LedgerOp::SwitchIdentity), 2);

        let received: Vec<_> = events.drain().collect();
        assert_eq!(
            received,
            vec![EngineEvent::ActiveIdentityChanged {
                wallet: OWNER,
                previous: Some(alice.id),
                current: bob.id,
            }]
        );
    }

    #[tokio::test]
    async fn test_duplicate_committed_id_rejected() {
        let engine = scripted(ScriptedLedger::new());
        engine.create_identity("First", meta("a")).await.unwrap();
        let events = engine.subscribe();

        let err = engine.create_identity("Second", meta("b")).await.unwrap_err();
        assert!(err.is_ledger());

        let names: Vec<_> = engine.personas().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["First"]);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_misattributed_trade_rejected() {
        let engine = scripted(ScriptedLedger::new());
        let persona = engine.create_identity("Trader", meta("m")).await.unwrap();
        let events = engine.subscribe();

        let err = engine.execute_swap(swap(100, 98)).await.unwrap_err();
        assert!(err.is_ledger());
        assert!(engine.get_history(&persona.id).await.unwrap().is_empty());
        assert_eq!(engine.active_persona().await.unwrap().id, persona.id);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_restore_rejects_unregistered_active() {
        let registered = PersonaId::from_bytes([1; 32]);
        let ledger = ScriptedLedger {
            ids: vec![registered],
            active: Some(PersonaId::from_bytes([2; 32])),
            ..ScriptedLedger::new()
        };

        let err = PersonaTradingEngine::restore(&wallet(), Arc::new(ledger), &Config::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_ledger());
    }

    #[tokio::test]
    async fn test_refresh_without_active_keeps_local_state() {
        let ledger = ScriptedLedger {
            ids: vec![PersonaId::from_bytes([1; 32])],
            active: None,
            ..ScriptedLedger::new()
        };
        let engine = scripted(ledger);
        let local = engine.create_identity("Local", meta("m")).await.unwrap();

        let err = engine.refresh().await.unwrap_err();
        assert!(err.is_ledger());

        let personas = engine.personas().await;
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].id, local.id);
        assert_eq!(engine.active_persona().await.unwrap().id, local.id);
    }
}
