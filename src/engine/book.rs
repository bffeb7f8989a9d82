//! Persona book - registry, active pointer and per-persona trade logs
//!
//! Purely in-memory and synchronous. The engine only touches it after the
//! ledger has committed, so every method here either applies fully or
//! returns an error without mutating.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::{Error, Persona, PersonaId, Result, Trade};

struct Entry {
    persona: Persona,
    trades: Vec<Trade>,
}

/// State of one wallet: `NoPersonas` while `active` is `None`,
/// `HasPersonas(active)` afterwards.
#[derive(Default)]
pub struct PersonaBook {
    order: Vec<PersonaId>,
    entries: HashMap<PersonaId, Entry>,
    active: Option<PersonaId>,
}

impl PersonaBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &PersonaId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn active(&self) -> Option<PersonaId> {
        self.active
    }

    pub fn persona(&self, id: &PersonaId) -> Option<&Persona> {
        self.entries.get(id).map(|e| &e.persona)
    }

    /// Personas in creation order
    pub fn personas(&self) -> impl Iterator<Item = &Persona> + '_ {
        self.order.iter().filter_map(|id| self.persona(id))
    }

    /// Fails with `NotFound` unless `id` is registered
    pub fn require(&self, id: &PersonaId) -> Result<&Persona> {
        self.persona(id).ok_or(Error::NotFound(*id))
    }

    /// Register a committed persona. The first one becomes active.
    /// Returns true when the active pointer moved.
    pub fn insert(&mut self, persona: Persona) -> Result<bool> {
        if self.contains(&persona.id) {
            return Err(Error::Ledger(format!("duplicate persona id {}", persona.id)));
        }

        let id = persona.id;
        self.order.push(id);
        self.entries.insert(id, Entry { persona, trades: Vec::new() });

        if self.active.is_none() {
            self.active = Some(id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Move the active pointer, returning the previous value
    pub fn set_active(&mut self, id: PersonaId) -> Result<Option<PersonaId>> {
        self.require(&id)?;
        Ok(self.active.replace(id))
    }

    /// Append a committed trade to its owner's log. The timestamp is clamped
    /// so a log never goes backwards in time.
    pub fn append(&mut self, mut trade: Trade) -> Result<Trade> {
        let entry = self
            .entries
            .get_mut(&trade.persona_id)
            .ok_or(Error::NotFound(trade.persona_id))?;

        if let Some(last) = entry.trades.last() {
            if trade.timestamp < last.timestamp {
                debug!(
                    "Clamping trade timestamp {} to {} for {}",
                    trade.timestamp,
                    last.timestamp,
                    trade.persona_id
                );
                trade.timestamp = last.timestamp;
            }
        }

        entry.trades.push(trade.clone());
        Ok(trade)
    }

    /// Snapshot of a persona's log, oldest first
    pub fn history(&self, id: &PersonaId) -> Result<TradeHistory> {
        let entry = self.entries.get(id).ok_or(Error::NotFound(*id))?;
        Ok(TradeHistory::from(entry.trades.clone()))
    }
}

/// Immutable, restartable view of a persona's trades
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeHistory {
    trades: Arc<[Trade]>,
}

impl TradeHistory {
    pub fn iter(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn as_slice(&self) -> &[Trade] {
        &self.trades
    }
}

impl From<Vec<Trade>> for TradeHistory {
    fn from(trades: Vec<Trade>) -> Self {
        Self { trades: trades.into() }
    }
}

impl<'a> IntoIterator for &'a TradeHistory {
    type Item = &'a Trade;
    type IntoIter = std::slice::Iter<'a, Trade>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
