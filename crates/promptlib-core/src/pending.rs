//! Ledger of in-flight optimistic writes.
//!
//! At most one entry exists per (prompt, field). A second write to the same
//! field supersedes the first: the entry keeps its rollback value and only
//! the newest [`Ticket`] may settle it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{PromptField, PromptId, PromptPatch};

/// Identifies one write request within the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

/// One tracked optimistic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: PromptId,
    pub field: PromptField,
    /// Last value the remote is known to hold for `field`.
    pub rollback: PromptPatch,
    /// Store timestamp at which `rollback` was observed, when known.
    pub rollback_at: Option<DateTime<Utc>>,
    pub latest: Ticket,
    pub superseded: u32,
    pub state: MutationState,
}

/// Result of settling a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The ticket was the newest; the entry is removed and returned.
    Final(PendingMutation),
    /// A newer write owns the entry; nothing was removed.
    Superseded,
    /// No entry for this (prompt, field).
    Untracked,
}

#[derive(Debug, Default)]
pub struct PendingLedger {
    entries: HashMap<(PromptId, PromptField), PendingMutation>,
    next_ticket: u64,
}

impl PendingLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new write, superseding any in-flight write to the same field.
    pub fn register(
        &mut self,
        id: PromptId,
        field: PromptField,
        rollback: PromptPatch,
        rollback_at: Option<DateTime<Utc>>,
    ) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.entries
            .entry((id.clone(), field))
            .and_modify(|entry| {
                entry.latest = ticket;
                entry.superseded += 1;
            })
            .or_insert_with(|| PendingMutation {
                id,
                field,
                rollback,
                rollback_at,
                latest: ticket,
                superseded: 0,
                state: MutationState::Pending,
            });
        ticket
    }

    /// Record a remote value for a field that is being held locally.
    ///
    /// The value replaces the rollback unless it is older than the one
    /// already held. Returns `false` when the field is not tracked.
    pub fn observe(
        &mut self,
        id: &PromptId,
        field: PromptField,
        value: PromptPatch,
        at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(&(id.clone(), field)) else {
            return false;
        };
        let newer = match (at, entry.rollback_at) {
            (Some(at), Some(held)) => at >= held,
            _ => true,
        };
        if newer {
            entry.rollback = value;
            entry.rollback_at = at.or(entry.rollback_at);
        }
        true
    }

    pub fn confirm(&mut self, id: &PromptId, field: PromptField, ticket: Ticket) -> Settlement {
        self.settle(id, field, ticket, MutationState::Confirmed)
    }

    pub fn fail(&mut self, id: &PromptId, field: PromptField, ticket: Ticket) -> Settlement {
        self.settle(id, field, ticket, MutationState::Failed)
    }

    fn settle(
        &mut self,
        id: &PromptId,
        field: PromptField,
        ticket: Ticket,
        state: MutationState,
    ) -> Settlement {
        let key = (id.clone(), field);
        match self.entries.get(&key) {
            None => Settlement::Untracked,
            Some(entry) if entry.latest != ticket => Settlement::Superseded,
            Some(_) => match self.entries.remove(&key) {
                Some(mut entry) => {
                    entry.state = state;
                    Settlement::Final(entry)
                }
                None => Settlement::Untracked,
            },
        }
    }

    #[must_use]
    pub fn get(&self, id: &PromptId, field: PromptField) -> Option<&PendingMutation> {
        self.entries.get(&(id.clone(), field))
    }

    /// Fields of `id` currently held by an in-flight write.
    #[must_use]
    pub fn covered_fields(&self, id: &PromptId) -> Vec<PromptField> {
        let mut fields: Vec<PromptField> = self
            .entries
            .keys()
            .filter(|(pending_id, _)| pending_id == id)
            .map(|(_, field)| *field)
            .collect();
        fields.sort_unstable();
        fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0)
    }

    fn id() -> PromptId {
        PromptId::new("a")
    }

    #[test]
    fn single_write_settles_final() {
        let mut ledger = PendingLedger::new();
        let ticket = ledger.register(id(), PromptField::IsFavorite, PromptPatch::favorite(false), at(0));
        assert_eq!(ledger.covered_fields(&id()), vec![PromptField::IsFavorite]);

        let Settlement::Final(entry) = ledger.confirm(&id(), PromptField::IsFavorite, ticket) else {
            panic!("expected final settlement");
        };
        assert_eq!(entry.state, MutationState::Confirmed);
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.confirm(&id(), PromptField::IsFavorite, ticket),
            Settlement::Untracked
        );
    }

    #[test]
    fn second_write_supersedes_and_keeps_rollback() {
        let mut ledger = PendingLedger::new();
        let first = ledger.register(id(), PromptField::IsFavorite, PromptPatch::favorite(false), at(0));
        let second = ledger.register(id(), PromptField::IsFavorite, PromptPatch::favorite(true), at(1));
        assert_eq!(ledger.len(), 1);

        assert_eq!(ledger.fail(&id(), PromptField::IsFavorite, first), Settlement::Superseded);
        let entry = ledger.get(&id(), PromptField::IsFavorite).expect("still tracked");
        assert_eq!(entry.rollback, PromptPatch::favorite(false));
        assert_eq!(entry.superseded, 1);

        let Settlement::Final(entry) = ledger.fail(&id(), PromptField::IsFavorite, second) else {
            panic!("expected final settlement");
        };
        assert_eq!(entry.state, MutationState::Failed);
        assert_eq!(entry.rollback, PromptPatch::favorite(false));
    }

    #[test]
    fn observe_refreshes_rollback_unless_older() {
        let mut ledger = PendingLedger::new();
        ledger.register(id(), PromptField::IsFavorite, PromptPatch::favorite(false), at(10));

        assert!(ledger.observe(&id(), PromptField::IsFavorite, PromptPatch::favorite(true), at(5)));
        assert_eq!(
            ledger.get(&id(), PromptField::IsFavorite).map(|e| e.rollback.clone()),
            Some(PromptPatch::favorite(false))
        );

        assert!(ledger.observe(&id(), PromptField::IsFavorite, PromptPatch::favorite(true), at(20)));
        let entry = ledger.get(&id(), PromptField::IsFavorite).expect("tracked");
        assert_eq!(entry.rollback, PromptPatch::favorite(true));
        assert_eq!(entry.rollback_at, at(20));
    }

    #[test]
    fn observe_untracked_field_is_ignored() {
        let mut ledger = PendingLedger::new();
        assert!(!ledger.observe(&id(), PromptField::Title, PromptPatch::default(), None));
    }

    #[test]
    fn entries_are_per_prompt() {
        let mut ledger = PendingLedger::new();
        ledger.register(id(), PromptField::IsFavorite, PromptPatch::favorite(false), None);
        ledger.register(PromptId::new("b"), PromptField::IsFavorite, PromptPatch::favorite(true), None);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.covered_fields(&PromptId::new("c")).is_empty());
    }
}
