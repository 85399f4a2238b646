//! Authoritative document set for a simulation run.
//!
//! Every commit advances a logical clock by one second and yields the stored
//! document together with the raw feed message announcing it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use promptlib_core::event::{RawChangeEvent, Transition};
use promptlib_core::model::{Category, Prompt, PromptDraft, PromptId, PromptPatch};

/// 2024-01-01T00:00:00Z
const CLOCK_START: i64 = 1_704_067_200;

/// A committed write and the feed message it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub stored: Prompt,
    pub event: RawChangeEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStore {
    documents: Vec<Prompt>,
    clock: i64,
    next_id: u64,
    next_txn: u64,
}

impl SimStore {
    /// A store holding `count` prompts created before the run starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the logical clock leaves chrono's range.
    pub fn seeded(count: usize) -> Result<Self> {
        let mut store = Self {
            documents: Vec::new(),
            clock: CLOCK_START,
            next_id: 0,
            next_txn: 0,
        };
        for n in 0..count {
            let category = Category::ALL[n % Category::ALL.len()];
            let draft = store.draft(&format!("Seeded prompt {n}"), category)?;
            store.create(draft)?;
        }
        Ok(store)
    }

    /// Documents newest created first, as a full read returns them.
    #[must_use]
    pub fn documents(&self) -> &[Prompt] {
        &self.documents
    }

    #[must_use]
    pub fn find(&self, id: &PromptId) -> Option<&Prompt> {
        self.documents.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<PromptId> {
        self.documents.iter().map(|p| p.id.clone()).collect()
    }

    fn tick(&mut self) -> Result<DateTime<Utc>> {
        self.clock += 1;
        DateTime::from_timestamp(self.clock, 0)
            .with_context(|| format!("logical clock out of range: {}", self.clock))
    }

    fn transaction(&mut self) -> String {
        self.next_txn += 1;
        format!("sim-txn-{}", self.next_txn)
    }

    /// A draft dated at the current logical time.
    ///
    /// # Errors
    ///
    /// Returns an error if the logical clock leaves chrono's range.
    pub fn draft(&self, title: &str, category: Category) -> Result<PromptDraft> {
        let now = DateTime::from_timestamp(self.clock, 0)
            .with_context(|| format!("logical clock out of range: {}", self.clock))?;
        Ok(PromptDraft::new(
            title,
            format!("Body for {title}"),
            "Simulation",
            category,
        )
        .with_date_added(now))
    }

    /// Store a new prompt under a fresh id.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock overflows or the event cannot be encoded.
    pub fn create(&mut self, draft: PromptDraft) -> Result<Commit> {
        self.next_id += 1;
        let id = PromptId::new(format!("sim-{}", self.next_id));
        let stored_at = self.tick()?;
        let stored = draft.into_prompt(id, stored_at);
        let event = RawChangeEvent::mutation(&stored, self.transaction(), Transition::Appear)?;
        self.documents.insert(0, stored.clone());
        Ok(Commit { stored, event })
    }

    /// Apply `patch` to an existing prompt.
    ///
    /// Returns `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock overflows or the event cannot be encoded.
    pub fn patch(&mut self, id: &PromptId, patch: &PromptPatch) -> Result<Option<Commit>> {
        if self.find(id).is_none() {
            return Ok(None);
        }
        let updated_at = self.tick()?;
        let txn = self.transaction();
        let Some(document) = self.documents.iter_mut().find(|p| &p.id == id) else {
            return Ok(None);
        };
        patch.apply_to(document);
        document.updated_at = Some(updated_at);
        let stored = document.clone();
        let event = RawChangeEvent::mutation(&stored, txn, Transition::Update)?;
        Ok(Some(Commit { stored, event }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_is_newest_first() {
        let store = SimStore::seeded(3).expect("seed");
        let ids: Vec<String> = store.ids().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["sim-3", "sim-2", "sim-1"]);
    }

    #[test]
    fn patch_advances_clock_and_announces() {
        let mut store = SimStore::seeded(1).expect("seed");
        let id = PromptId::new("sim-1");
        let before = store.find(&id).and_then(|p| p.updated_at);
        let commit = store
            .patch(&id, &PromptPatch::favorite(true))
            .expect("patch")
            .expect("known id");
        assert!(commit.stored.is_favorite);
        assert!(commit.stored.updated_at > before);
        assert_eq!(commit.event.document_id.as_deref(), Some("sim-1"));
        assert_eq!(commit.event.transition.as_deref(), Some("update"));
    }

    #[test]
    fn patch_unknown_id_commits_nothing() {
        let mut store = SimStore::seeded(1).expect("seed");
        let outcome = store
            .patch(&PromptId::new("sim-99"), &PromptPatch::favorite(true))
            .expect("patch");
        assert!(outcome.is_none());
        assert_eq!(store.documents().len(), 1);
    }

    #[test]
    fn transactions_are_unique() {
        let mut store = SimStore::seeded(2).expect("seed");
        let a = store
            .patch(&PromptId::new("sim-1"), &PromptPatch::favorite(true))
            .expect("patch")
            .expect("known");
        let b = store
            .patch(&PromptId::new("sim-1"), &PromptPatch::favorite(false))
            .expect("patch")
            .expect("known");
        assert_ne!(a.event.transaction_id, b.event.transaction_id);
    }
}
