//! Reconciliation of change feed events with optimistic local writes.
//!
//! The [`Reconciler`] owns the [`LocalCache`] and the [`PendingLedger`].
//! Every cache change, whether it comes from the feed, a write completion or
//! the initial load, goes through one of its methods. None of them suspend,
//! so each update lands as a single replace.
//!
//! # Merge policy
//!
//! For a mutation snapshot on prompt `id`:
//!
//! 1. A transaction already seen for `id` is a duplicate and skipped.
//! 2. A snapshot whose `_updatedAt` is older than the newest one applied for
//!    `id` is stale and skipped.
//! 3. Unknown `id`: the snapshot is a remote creation and is prepended.
//! 4. Known `id`: fields held by an in-flight write are withheld (their
//!    remote value refreshes the write's rollback); the rest are merged.
//!
//! Snapshots without `_updatedAt` skip rule 2 and rely on rule 4 alone.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::error::LibraryError;
use crate::event::ChangeEvent;
use crate::model::{Prompt, PromptField, PromptId, PromptPatch};
use crate::pending::{PendingLedger, Settlement, Ticket};

/// Number of (document, transaction) pairs remembered for dedup.
pub const SEEN_WINDOW: usize = 1024;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What applying one event or write completion did to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A local write shown ahead of the store's answer.
    Optimistic,
    Created,
    Merged,
    /// Merged, except for fields held by in-flight writes.
    MergedAroundPending(Vec<PromptField>),
    RolledBack,
    Unchanged,
    Duplicate,
    Stale,
    Incomplete,
    Empty,
    Connectivity,
}

impl Applied {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Created => "created",
            Self::Merged => "merged",
            Self::MergedAroundPending(_) => "merged-around-pending",
            Self::RolledBack => "rolled-back",
            Self::Unchanged => "unchanged",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
            Self::Incomplete => "incomplete",
            Self::Empty => "empty",
            Self::Connectivity => "connectivity",
        }
    }

    /// Whether the cache may differ from before.
    #[must_use]
    pub const fn touched_cache(&self) -> bool {
        matches!(
            self,
            Self::Optimistic
                | Self::Created
                | Self::Merged
                | Self::MergedAroundPending(_)
                | Self::RolledBack
        )
    }
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub optimistic: usize,
    pub created: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub skipped: usize,
    pub connectivity: usize,
    pub rollbacks: usize,
}

impl ReconcileStats {
    fn record(&mut self, applied: &Applied) {
        match applied {
            Applied::Optimistic => self.optimistic += 1,
            Applied::Created => self.created += 1,
            Applied::Merged | Applied::MergedAroundPending(_) => self.merged += 1,
            Applied::RolledBack => self.rollbacks += 1,
            Applied::Unchanged => self.unchanged += 1,
            Applied::Duplicate => self.duplicates += 1,
            Applied::Stale => self.stale += 1,
            Applied::Incomplete | Applied::Empty => self.skipped += 1,
            Applied::Connectivity => self.connectivity += 1,
        }
    }
}

/// Handle for one optimistic favorite toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteToggle {
    pub id: PromptId,
    pub ticket: Ticket,
    /// Value written locally and sent to the store.
    pub value: bool,
}

// ---------------------------------------------------------------------------
// Dedup window
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SeenWindow {
    order: VecDeque<(PromptId, String)>,
    members: HashSet<(PromptId, String)>,
}

impl SeenWindow {
    /// Returns `false` if the pair was already in the window.
    fn insert(&mut self, id: &PromptId, transaction: &str) -> bool {
        let key = (id.clone(), transaction.to_string());
        if self.members.contains(&key) {
            return false;
        }
        if self.order.len() == SEEN_WINDOW {
            let evicted = self.order.pop_front();
            if let Some(evicted) = evicted {
                self.members.remove(&evicted);
            }
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Reconciler {
    cache: LocalCache,
    pending: PendingLedger,
    watermarks: HashMap<PromptId, DateTime<Utc>>,
    seen: SeenWindow,
    stats: ReconcileStats,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prompts(prompts: Vec<Prompt>) -> Self {
        let mut engine = Self::new();
        engine.seed(prompts);
        engine
    }

    #[must_use]
    pub const fn cache(&self) -> &LocalCache {
        &self.cache
    }

    #[must_use]
    pub const fn pending(&self) -> &PendingLedger {
        &self.pending
    }

    #[must_use]
    pub const fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    #[must_use]
    pub fn prompts(&self) -> &[Prompt] {
        self.cache.all()
    }

    #[must_use]
    pub fn find(&self, id: &PromptId) -> Option<&Prompt> {
        self.cache.find(id)
    }

    /// Apply one normalized change feed event.
    pub fn apply(&mut self, event: &ChangeEvent) -> Applied {
        let applied = match event {
            ChangeEvent::Mutation(mutation) => {
                let id = &mutation.document_id;
                let fresh = mutation
                    .transaction_id
                    .as_deref()
                    .is_none_or(|txn| self.seen.insert(id, txn));
                if fresh {
                    match &mutation.result {
                        Some(snapshot) if !snapshot.is_empty() => {
                            self.merge_snapshot(id, snapshot.clone())
                        }
                        _ => {
                            debug!(prompt = %id, transition = %mutation.transition, "mutation without snapshot");
                            Applied::Empty
                        }
                    }
                } else {
                    Applied::Duplicate
                }
            }
            ChangeEvent::Welcome => {
                debug!("change feed welcome");
                Applied::Connectivity
            }
            ChangeEvent::Reconnect => {
                debug!("change feed asked for reconnect");
                Applied::Connectivity
            }
            ChangeEvent::Disconnect { reason } => {
                debug!(reason = reason.as_deref().unwrap_or("unspecified"), "change feed disconnect");
                Applied::Connectivity
            }
        };
        if let Some(id) = event.document_id() {
            debug!(prompt = %id, outcome = applied.as_str(), "applied change event");
        }
        self.stats.record(&applied);
        applied
    }

    /// Merge a snapshot for `id` under the merge policy.
    fn merge_snapshot(&mut self, id: &PromptId, mut snapshot: PromptPatch) -> Applied {
        let at = snapshot.updated_at;
        let newest = self.watermarks.get(id).copied();
        if let Some(mark) = newest.filter(|mark| at.is_some_and(|at| at < *mark)) {
            warn!(prompt = %id, newest_at = %mark, "skipping stale snapshot");
            return Applied::Stale;
        }

        let Some(mut current) = self.cache.find(id).cloned() else {
            return match snapshot.into_prompt(id.clone()) {
                Ok(prompt) => {
                    self.bump_watermark(id, at);
                    if self.cache.prepend(prompt) {
                        Applied::Created
                    } else {
                        Applied::Unchanged
                    }
                }
                Err(err) => {
                    warn!(prompt = %id, error = %err, "skipping incomplete creation snapshot");
                    Applied::Incomplete
                }
            };
        };

        let mut held = Vec::new();
        for field in self.pending.covered_fields(id) {
            if let Some(value) = snapshot.take(field) {
                self.pending.observe(id, field, value, at);
                held.push(field);
            }
        }

        let changed = snapshot.apply_to(&mut current);
        self.cache.upsert(current);
        self.bump_watermark(id, at);

        if changed && !held.is_empty() {
            Applied::MergedAroundPending(held)
        } else if changed {
            Applied::Merged
        } else {
            Applied::Unchanged
        }
    }

    fn bump_watermark(&mut self, id: &PromptId, at: Option<DateTime<Utc>>) {
        if let Some(at) = at {
            self.watermarks
                .entry(id.clone())
                .and_modify(|mark| *mark = (*mark).max(at))
                .or_insert(at);
        }
    }

    // -----------------------------------------------------------------------
    // Favorite toggle
    // -----------------------------------------------------------------------

    /// Flip `is_favorite` locally and track the write.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] if `id` is not in the cache.
    pub fn begin_favorite_toggle(&mut self, id: &PromptId) -> Result<FavoriteToggle, LibraryError> {
        let Some(mut current) = self.cache.find(id).cloned() else {
            return Err(LibraryError::NotFound(id.clone()));
        };
        let previous = current.is_favorite;
        let ticket = self.pending.register(
            id.clone(),
            PromptField::IsFavorite,
            PromptPatch::favorite(previous),
            current.updated_at,
        );
        current.is_favorite = !previous;
        self.cache.upsert(current);
        self.stats.record(&Applied::Optimistic);
        debug!(prompt = %id, value = !previous, "optimistic favorite toggle");
        Ok(FavoriteToggle {
            id: id.clone(),
            ticket,
            value: !previous,
        })
    }

    /// Settle a toggle the store accepted, merging the stored document.
    pub fn confirm_favorite(&mut self, toggle: &FavoriteToggle, stored: &Prompt) -> Applied {
        let settlement =
            self.pending
                .confirm(&toggle.id, PromptField::IsFavorite, toggle.ticket);
        if let Settlement::Final(entry) = settlement {
            // The remote moved past this write while it was in flight.
            let overtaken = matches!(
                (entry.rollback_at, stored.updated_at),
                (Some(seen), Some(written)) if seen > written
            );
            if overtaken {
                self.restore(&toggle.id, &entry.rollback);
            }
        }
        let applied = self.merge_snapshot(&toggle.id, PromptPatch::from(stored));
        self.stats.record(&applied);
        applied
    }

    /// Settle a toggle the store refused.
    ///
    /// Restores the rollback value only if this was the newest write to the
    /// field; an older failure under a newer write changes nothing.
    pub fn fail_favorite(&mut self, toggle: &FavoriteToggle) -> Applied {
        let applied = match self
            .pending
            .fail(&toggle.id, PromptField::IsFavorite, toggle.ticket)
        {
            Settlement::Final(entry) => {
                warn!(prompt = %toggle.id, "rolling back favorite toggle");
                self.restore(&toggle.id, &entry.rollback);
                Applied::RolledBack
            }
            Settlement::Superseded | Settlement::Untracked => Applied::Unchanged,
        };
        self.stats.record(&applied);
        applied
    }

    fn restore(&mut self, id: &PromptId, rollback: &PromptPatch) {
        if let Some(mut current) = self.cache.find(id).cloned() {
            rollback.apply_to(&mut current);
            self.cache.upsert(current);
        }
    }

    // -----------------------------------------------------------------------
    // Create and initial load
    // -----------------------------------------------------------------------

    /// Insert a prompt the store just created.
    ///
    /// The feed echo may have arrived first; then the stored document is
    /// merged into the existing entry instead.
    pub fn insert_created(&mut self, prompt: Prompt) -> Applied {
        let applied = if self.cache.contains(&prompt.id) {
            let id = prompt.id.clone();
            self.merge_snapshot(&id, PromptPatch::from(&prompt))
        } else {
            self.bump_watermark(&prompt.id, prompt.updated_at);
            self.cache.prepend(prompt);
            Applied::Created
        };
        self.stats.record(&applied);
        applied
    }

    /// Replace the cache with the result of a full read.
    ///
    /// Entries that arrived over the feed while the read was in flight are
    /// kept when the read lacks them or holds an older revision. Returns the
    /// resulting cache length.
    pub fn seed(&mut self, fetched: Vec<Prompt>) -> usize {
        let fetched_ids: HashSet<PromptId> = fetched.iter().map(|p| p.id.clone()).collect();
        let mut merged: Vec<Prompt> = self
            .cache
            .all()
            .iter()
            .filter(|p| !fetched_ids.contains(&p.id))
            .cloned()
            .collect();

        for prompt in fetched {
            let keep_live = self.cache.find(&prompt.id).filter(|live| {
                matches!((live.updated_at, prompt.updated_at), (Some(live), Some(read)) if live > read)
            });
            merged.push(keep_live.cloned().unwrap_or(prompt));
        }

        for prompt in &merged {
            self.bump_watermark(&prompt.id, prompt.updated_at);
        }
        self.cache = LocalCache::from_entries(merged);
        self.cache.len()
    }
}
