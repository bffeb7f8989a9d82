//! Domain events - deltas pushed to the UI instead of re-querying everything

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{Persona, PersonaId, Trade, WalletAddress};

/// Events emitted after a committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    IdentityCreated {
        wallet: WalletAddress,
        persona: Persona,
        /// First persona of the wallet, now active
        activated: bool,
    },
    ActiveIdentityChanged {
        wallet: WalletAddress,
        previous: Option<PersonaId>,
        current: PersonaId,
    },
    SwapExecuted {
        wallet: WalletAddress,
        trade: Trade,
    },
}

/// Fan-out of engine events to any number of subscribers
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<flume::Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> flume::Receiver<EngineEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber, pruning dropped ones
    pub fn publish(&self, event: EngineEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
