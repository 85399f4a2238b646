//! promptlib-sim library.
//!
//! Runs one client [`Reconciler`] against a [`SimStore`] for a fixed number
//! of rounds. Feed events, write requests and write responses all travel
//! over fault-injecting [`Link`]s, so the client sees them late, twice, or
//! out of order. After the last round every link is drained and the
//! [`oracle`] checks what the client ended up with.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for return types.
//! - **Logging**: `tracing` macros (`info!`, `debug!`).
//! - **Determinism**: all randomness comes from [`rng::SimRng`] forks of
//!   the configured seed.

pub mod campaign;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod store;

use anyhow::{Context, Result, bail};
use promptlib_core::engine::{Applied, FavoriteToggle, ReconcileStats, Reconciler};
use promptlib_core::event::{ChangeEvent, RawChangeEvent};
use promptlib_core::model::{Category, Prompt, PromptDraft, PromptId, PromptPatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::network::{FaultConfig, Link};
use crate::rng::SimRng;
use crate::store::SimStore;

/// Rounds allowed after the last scheduled one for links to empty.
const DRAIN_LIMIT: u64 = 1_000;

/// Parameters for one seeded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    /// Prompts in the store before the client connects.
    pub initial_prompts: usize,
    /// Per-round chance the client toggles a favorite.
    pub local_toggle_percent: u8,
    /// Per-round chance the client adds a prompt.
    pub local_create_percent: u8,
    /// Per-round chance another writer edits a prompt.
    pub remote_edit_percent: u8,
    /// Per-round chance another writer adds a prompt.
    pub remote_create_percent: u8,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 32,
            initial_prompts: 4,
            local_toggle_percent: 40,
            local_create_percent: 10,
            remote_edit_percent: 35,
            remote_create_percent: 10,
            fault: FaultConfig::default(),
        }
    }
}

/// One step of a run, recorded for replay and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceKind {
    LocalToggle { id: String, value: bool },
    LocalCreate { title: String },
    RemoteEdit { id: String },
    RemoteCreate { id: String },
    WriteRejected { id: Option<String> },
    FeedApplied { id: Option<String>, outcome: String },
    WriteSettled { id: String, outcome: String },
    InitialLoad { prompts: usize },
}

/// Fault counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCounts {
    pub duplicated_events: usize,
    pub reordered_batches: usize,
    pub rejected_writes: usize,
    pub held_merges: usize,
}

/// Outcome of [`Simulator::run`].
#[derive(Debug)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    /// Client state after every link has drained.
    pub engine: Reconciler,
    /// Store documents at the end of the run.
    pub store: Vec<Prompt>,
    /// Every feed message the client received, in delivery order.
    pub feed_log: Vec<RawChangeEvent>,
    pub faults: FaultCounts,
    pub rounds_run: u64,
}

impl SimulationResult {
    #[must_use]
    pub fn stats(&self) -> &ReconcileStats {
        self.engine.stats()
    }

    /// Whether the run hit a rollback, a stale snapshot or a held field.
    #[must_use]
    pub fn interesting_state_reached(&self) -> bool {
        let stats = self.engine.stats();
        stats.rollbacks > 0 || stats.stale > 0 || self.faults.held_merges > 0
    }
}

#[derive(Debug, Clone)]
enum Request {
    Toggle(FavoriteToggle),
    Create(PromptDraft),
}

#[derive(Debug, Clone)]
enum Response {
    Loaded(Vec<Prompt>),
    ToggleStored(FavoriteToggle, Prompt),
    ToggleRefused(FavoriteToggle),
    Created(Prompt),
    CreateRefused,
}

/// Deterministic single-client simulation.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: SimRng,
    fault_rng: SimRng,
    store: SimStore,
    engine: Reconciler,
    feed: Link<RawChangeEvent>,
    requests: Link<Request>,
    responses: Link<Response>,
    trace: Vec<TraceEvent>,
    feed_log: Vec<RawChangeEvent>,
    faults: FaultCounts,
    created: u64,
}

impl Simulator {
    /// Build a simulator and its seeded store.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial store cannot be built.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let rng = SimRng::new(config.seed);
        Ok(Self {
            config,
            fault_rng: rng.fork(0xFA17),
            rng,
            store: SimStore::seeded(config.initial_prompts)?,
            engine: Reconciler::new(),
            feed: Link::lossy(config.fault),
            requests: Link::exactly_once(config.fault),
            responses: Link::exactly_once(config.fault),
            trace: Vec::new(),
            feed_log: Vec::new(),
            faults: FaultCounts::default(),
            created: 0,
        })
    }

    /// Run every round, then drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, an event cannot be decoded, or
    /// the links do not drain.
    pub fn run(mut self) -> Result<SimulationResult> {
        // Subscribe first, then read.
        self.publish(RawChangeEvent::welcome(), 0);
        let snapshot = self.store.documents().to_vec();
        self.respond(Response::Loaded(snapshot), 0);

        let mut round = 0;
        while round < self.config.rounds {
            self.act(round)?;
            self.step(round)?;
            round += 1;
        }

        let deadline = round.saturating_add(DRAIN_LIMIT);
        while self.in_flight() > 0 {
            if round >= deadline {
                bail!(
                    "links did not drain within {DRAIN_LIMIT} rounds ({} in flight)",
                    self.in_flight()
                );
            }
            self.step(round)?;
            round += 1;
        }

        info!(
            seed = self.config.seed,
            rounds = round,
            prompts = self.engine.prompts().len(),
            pending = self.engine.pending().len(),
            "simulation drained"
        );

        Ok(SimulationResult {
            trace: self.trace,
            engine: self.engine,
            store: self.store.documents().to_vec(),
            feed_log: self.feed_log,
            faults: self.faults,
            rounds_run: round,
        })
    }

    fn in_flight(&self) -> usize {
        self.feed.in_flight() + self.requests.in_flight() + self.responses.in_flight()
    }

    fn record(&mut self, round: u64, kind: TraceKind) {
        self.trace.push(TraceEvent { round, kind });
    }

    fn publish(&mut self, event: RawChangeEvent, round: u64) {
        let outcome = self.feed.send(event, round, &mut self.fault_rng);
        if outcome.duplicated {
            self.faults.duplicated_events += 1;
        }
    }

    fn respond(&mut self, response: Response, round: u64) {
        let _ = self.responses.send(response, round, &mut self.fault_rng);
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn act(&mut self, round: u64) -> Result<()> {
        if self.rng.chance(self.config.local_toggle_percent) {
            self.local_toggle(round);
        }
        if self.rng.chance(self.config.local_create_percent) {
            self.created += 1;
            let title = format!("Local prompt {}", self.created);
            let draft = self.store.draft(&title, Category::Writing)?;
            let _ = self
                .requests
                .send(Request::Create(draft), round, &mut self.fault_rng);
            self.record(round, TraceKind::LocalCreate { title });
        }
        if self.rng.chance(self.config.remote_edit_percent) {
            self.remote_edit(round)?;
        }
        if self.rng.chance(self.config.remote_create_percent) {
            self.created += 1;
            let title = format!("Remote prompt {}", self.created);
            let draft = self.store.draft(&title, Category::Business)?;
            let commit = self.store.create(draft)?;
            self.record(
                round,
                TraceKind::RemoteCreate {
                    id: commit.stored.id.to_string(),
                },
            );
            self.publish(commit.event, round);
        }
        Ok(())
    }

    fn local_toggle(&mut self, round: u64) {
        let ids: Vec<PromptId> = self.engine.prompts().iter().map(|p| p.id.clone()).collect();
        let Some(id) = self.rng.pick(&ids).cloned() else {
            return;
        };
        // The id was just read from the cache.
        let Ok(toggle) = self.engine.begin_favorite_toggle(&id) else {
            return;
        };
        self.record(
            round,
            TraceKind::LocalToggle {
                id: id.to_string(),
                value: toggle.value,
            },
        );
        let _ = self
            .requests
            .send(Request::Toggle(toggle), round, &mut self.fault_rng);
    }

    fn remote_edit(&mut self, round: u64) -> Result<()> {
        let ids = self.store.ids();
        let Some(id) = self.rng.pick(&ids).cloned() else {
            return Ok(());
        };
        let patch = if self.rng.chance(50) {
            let current = self.store.find(&id).is_some_and(|p| p.is_favorite);
            PromptPatch::favorite(!current)
        } else {
            PromptPatch {
                title: Some(format!("Edited in round {round}")),
                ..PromptPatch::default()
            }
        };
        if let Some(commit) = self.store.patch(&id, &patch)? {
            self.record(round, TraceKind::RemoteEdit { id: id.to_string() });
            self.publish(commit.event, round);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    fn step(&mut self, round: u64) -> Result<()> {
        let (requests, reordered) = self.requests.deliver_ready(round, &mut self.fault_rng);
        self.count_reorder(reordered);
        for request in requests {
            self.serve(request, round)?;
        }

        let (events, reordered) = self.feed.deliver_ready(round, &mut self.fault_rng);
        self.count_reorder(reordered);
        for raw in events {
            self.feed_log.push(raw.clone());
            let event = ChangeEvent::try_from(raw).context("simulated feed sent an unreadable event")?;
            let applied = self.engine.apply(&event);
            if matches!(applied, Applied::MergedAroundPending(_)) {
                self.faults.held_merges += 1;
            }
            self.record(
                round,
                TraceKind::FeedApplied {
                    id: event.document_id().map(ToString::to_string),
                    outcome: applied.as_str().to_string(),
                },
            );
        }

        let (responses, reordered) = self.responses.deliver_ready(round, &mut self.fault_rng);
        self.count_reorder(reordered);
        for response in responses {
            self.settle(response, round);
        }
        Ok(())
    }

    const fn count_reorder(&mut self, reordered: bool) {
        if reordered {
            self.faults.reordered_batches += 1;
        }
    }

    /// The store's side of a client request.
    fn serve(&mut self, request: Request, round: u64) -> Result<()> {
        let refused = self.fault_rng.chance(self.config.fault.reject_rate_percent);
        match request {
            Request::Toggle(toggle) => {
                let commit = if refused {
                    None
                } else {
                    self.store
                        .patch(&toggle.id, &PromptPatch::favorite(toggle.value))?
                };
                if let Some(commit) = commit {
                    self.publish(commit.event, round);
                    self.respond(Response::ToggleStored(toggle, commit.stored), round);
                } else {
                    self.faults.rejected_writes += 1;
                    self.record(
                        round,
                        TraceKind::WriteRejected {
                            id: Some(toggle.id.to_string()),
                        },
                    );
                    self.respond(Response::ToggleRefused(toggle), round);
                }
            }
            Request::Create(draft) => {
                if refused {
                    self.faults.rejected_writes += 1;
                    self.record(round, TraceKind::WriteRejected { id: None });
                    self.respond(Response::CreateRefused, round);
                } else {
                    let commit = self.store.create(draft)?;
                    self.publish(commit.event, round);
                    self.respond(Response::Created(commit.stored), round);
                }
            }
        }
        Ok(())
    }

    /// The client's side of a response.
    fn settle(&mut self, response: Response, round: u64) {
        let (id, applied) = match response {
            Response::Loaded(prompts) => {
                let count = self.engine.seed(prompts);
                debug!(round, prompts = count, "initial load applied");
                self.record(round, TraceKind::InitialLoad { prompts: count });
                return;
            }
            Response::ToggleStored(toggle, stored) => {
                let applied = self.engine.confirm_favorite(&toggle, &stored);
                (toggle.id, applied)
            }
            Response::ToggleRefused(toggle) => {
                let applied = self.engine.fail_favorite(&toggle);
                (toggle.id, applied)
            }
            Response::Created(prompt) => {
                let id = prompt.id.clone();
                (id, self.engine.insert_created(prompt))
            }
            Response::CreateRefused => return,
        };
        self.record(
            round,
            TraceKind::WriteSettled {
                id: id.to_string(),
                outcome: applied.as_str().to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            fault: FaultConfig {
                max_delay_rounds: 0,
                duplicate_rate_percent: 0,
                reorder_rate_percent: 0,
                reject_rate_percent: 0,
            },
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn calm_run_loads_every_prompt() {
        let result = Simulator::new(calm(1)).expect("build").run().expect("run");
        assert!(
            result
                .trace
                .iter()
                .any(|e| matches!(e.kind, TraceKind::InitialLoad { .. }))
        );
        assert_eq!(result.engine.prompts().len(), result.store.len());
        assert!(result.engine.pending().is_empty());
    }

    #[test]
    fn first_feed_message_is_welcome() {
        let result = Simulator::new(calm(2)).expect("build").run().expect("run");
        let first = result.feed_log.first().expect("at least one event");
        assert_eq!(first.kind, "welcome");
    }

    #[test]
    fn forced_rejections_roll_back() {
        let config = SimulationConfig {
            seed: 3,
            rounds: 24,
            local_toggle_percent: 100,
            remote_edit_percent: 0,
            fault: FaultConfig {
                reject_rate_percent: 100,
                ..calm(3).fault
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("build").run().expect("run");
        assert!(result.faults.rejected_writes > 0);
        assert!(result.stats().rollbacks > 0);
        for prompt in result.engine.prompts() {
            assert!(!prompt.is_favorite, "{} kept a refused favorite", prompt.id);
        }
    }

    #[test]
    fn duplicated_feed_is_deduplicated() {
        let config = SimulationConfig {
            seed: 4,
            fault: FaultConfig {
                duplicate_rate_percent: 100,
                ..calm(4).fault
            },
            ..calm(4)
        };
        let result = Simulator::new(config).expect("build").run().expect("run");
        assert!(result.faults.duplicated_events > 0);
        assert!(result.stats().duplicates > 0);
    }
}
