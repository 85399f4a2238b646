//! In-process prompt store with a live change feed and fault injection.
//!
//! Ids are `prompt-N` and timestamps come from a logical clock that advances
//! one second per write, so runs are reproducible. Every committed write
//! publishes its mutation event before the write call returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{PromptStore, RawEventStream};
use crate::error::{StoreError, TransportError};
use crate::event::{RawChangeEvent, Transition};
use crate::model::{Prompt, PromptDraft, PromptId, PromptPatch};

const FEED_CAPACITY: usize = 1024;
/// 2024-01-01T00:00:00Z
const CLOCK_START: i64 = 1_704_067_200;

type FeedItem = Result<RawChangeEvent, TransportError>;

#[derive(Debug)]
struct State {
    documents: Vec<Prompt>,
    next_id: u64,
    next_txn: u64,
    clock: i64,
    failing_patches: u32,
    failing_creates: u32,
    refuse_listen: bool,
}

impl State {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        DateTime::from_timestamp(self.clock, 0).unwrap_or_default()
    }

    fn transaction(&mut self) -> String {
        self.next_txn += 1;
        format!("txn-{}", self.next_txn)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    feed: broadcast::Sender<FeedItem>,
    writes_open: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_prompts(Vec::new())
    }

    /// Start with existing documents, given newest created first.
    #[must_use]
    pub fn with_prompts(documents: Vec<Prompt>) -> Self {
        let clock = documents
            .iter()
            .filter_map(|p| p.updated_at.map(|at| at.timestamp()))
            .fold(CLOCK_START, i64::max);
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        let (writes_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(State {
                documents,
                next_id: 0,
                next_txn: 0,
                clock,
                failing_patches: 0,
                failing_creates: 0,
                refuse_listen: false,
            }),
            feed,
            writes_open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, item: FeedItem) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.feed.send(item);
    }

    async fn writes_ready(&self) -> Result<(), StoreError> {
        let mut open = self.writes_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| StoreError::Transport("store shut down".into()))
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    fn commit_create(&self, draft: PromptDraft) -> Result<Prompt, StoreError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = PromptId::new(format!("prompt-{}", state.next_id));
        let stored_at = state.tick();
        let prompt = draft.into_prompt(id, stored_at);
        let txn = state.transaction();
        let event = RawChangeEvent::mutation(&prompt, txn, Transition::Appear)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        state.documents.insert(0, prompt.clone());
        self.publish(Ok(event));
        debug!(prompt = %prompt.id, "memory store created prompt");
        Ok(prompt)
    }

    fn commit_patch(&self, id: &PromptId, patch: &PromptPatch) -> Result<Prompt, StoreError> {
        let mut state = self.lock();
        let updated_at = state.tick();
        let txn = state.transaction();
        let Some(document) = state.documents.iter_mut().find(|p| &p.id == id) else {
            return Err(StoreError::Missing(id.clone()));
        };
        patch.apply_to(document);
        document.updated_at = Some(updated_at);
        let stored = document.clone();
        let event = RawChangeEvent::mutation(&stored, txn, Transition::Update)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.publish(Ok(event));
        debug!(prompt = %id, "memory store patched prompt");
        Ok(stored)
    }

    // -----------------------------------------------------------------------
    // Other clients and fault injection
    // -----------------------------------------------------------------------

    /// A patch made by another client; never paused or failed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] for an unknown id.
    pub fn remote_edit(&self, id: &PromptId, patch: &PromptPatch) -> Result<Prompt, StoreError> {
        self.commit_patch(id, patch)
    }

    /// A create made by another client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the event cannot be encoded.
    pub fn remote_create(&self, draft: PromptDraft) -> Result<Prompt, StoreError> {
        self.commit_create(draft)
    }

    /// Reject the next `count` patch calls.
    pub fn fail_next_patches(&self, count: u32) {
        self.lock().failing_patches = count;
    }

    /// Reject the next `count` create calls.
    pub fn fail_next_creates(&self, count: u32) {
        self.lock().failing_creates = count;
    }

    /// Make future `listen` calls fail to connect.
    pub fn refuse_listen(&self, refuse: bool) {
        self.lock().refuse_listen = refuse;
    }

    /// Hold client writes until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.writes_open.send_replace(true);
    }

    /// Push an arbitrary raw message to every listener.
    pub fn emit(&self, event: RawChangeEvent) {
        self.publish(Ok(event));
    }

    /// Push a transport failure to every listener.
    pub fn break_feed(&self, error: TransportError) {
        self.publish(Err(error));
    }

    pub fn disconnect(&self, reason: &str) {
        self.emit(RawChangeEvent::disconnect(reason));
    }

    #[must_use]
    pub fn documents(&self) -> Vec<Prompt> {
        self.lock().documents.clone()
    }

    #[must_use]
    pub fn document(&self, id: &PromptId) -> Option<Prompt> {
        self.lock().documents.iter().find(|p| &p.id == id).cloned()
    }

    /// Number of open feed subscriptions.
    #[must_use]
    pub fn listeners(&self) -> usize {
        self.feed.receiver_count()
    }
}

fn injected(counter: &mut u32, op: &str) -> Result<(), StoreError> {
    if *counter == 0 {
        return Ok(());
    }
    *counter -= 1;
    Err(StoreError::Rejected {
        status: 500,
        message: format!("injected {op} failure"),
    })
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<Prompt>, StoreError> {
        Ok(self.documents())
    }

    async fn create(&self, draft: &PromptDraft) -> Result<Prompt, StoreError> {
        self.writes_ready().await?;
        injected(&mut self.lock().failing_creates, "create")?;
        self.commit_create(draft.clone())
    }

    async fn patch(&self, id: &PromptId, patch: &PromptPatch) -> Result<Prompt, StoreError> {
        self.writes_ready().await?;
        injected(&mut self.lock().failing_patches, "patch")?;
        self.commit_patch(id, patch)
    }

    async fn listen(&self) -> Result<RawEventStream, TransportError> {
        if self.lock().refuse_listen {
            return Err(TransportError::Connect("memory store refused the feed".into()));
        }
        let receiver = self.feed.subscribe();
        let welcome = stream::once(async { Ok(RawChangeEvent::welcome()) });
        let tail = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(item) => Some((item, receiver)),
                Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                    Err(TransportError::Stream(format!("listener missed {missed} events"))),
                    receiver,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(welcome.chain(tail).boxed())
    }
}
