// Decision ledger — remembers the terminal Decision for every content id
// the orchestrator has finalized.
//
// A redelivered item (at-least-once ingress after a failed sink hand-off)
// hits the ledger and gets its stored Decision re-emitted instead of being
// scored again, so reputation is updated once and the Decision is stable.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::{Decision, ReviewTask};

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub decision: Decision,
    pub task: Option<ReviewTask>,
}

#[derive(Default)]
pub struct DecisionLedger {
    entries: DashMap<String, LedgerEntry>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, content_id: &str) -> Option<LedgerEntry> {
        self.entries.get(content_id).map(|e| e.clone())
    }

    /// Record a first-time decision. Returns the entry already present if a
    /// concurrent delivery of the same item won the race.
    pub fn insert_new(&self, entry: LedgerEntry) -> Result<(), LedgerEntry> {
        match self.entries.entry(entry.decision.content_id.clone()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Overwrite the entry for a content id (human review outcomes).
    pub fn replace(&self, entry: LedgerEntry) {
        self.entries.insert(entry.decision.content_id.clone(), entry);
    }

    pub fn remove(&self, content_id: &str) -> Option<LedgerEntry> {
        self.entries.remove(content_id).map(|(_, e)| e)
    }

    /// Drop entries decided before `older_than`. Returns how many were removed.
    pub fn evict(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.decision.decided_at >= older_than);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
