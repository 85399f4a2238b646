//! The authoritative remote collection, seen through one trait.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and local
//! runs. The HTTP client for the hosted store lives in the CLI crate.

pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{StoreError, TransportError};
use crate::event::RawChangeEvent;
use crate::model::{Prompt, PromptDraft, PromptId, PromptPatch};

pub use memory::MemoryStore;

/// Raw listen messages; dropping the stream closes the subscription.
pub type RawEventStream = BoxStream<'static, Result<RawChangeEvent, TransportError>>;

#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Every prompt, newest created first.
    async fn fetch_all(&self) -> Result<Vec<Prompt>, StoreError>;

    /// Store a new prompt and return it with its assigned id and timestamps.
    async fn create(&self, draft: &PromptDraft) -> Result<Prompt, StoreError>;

    /// Set the given fields and return the updated document.
    async fn patch(&self, id: &PromptId, patch: &PromptPatch) -> Result<Prompt, StoreError>;

    /// Open the change feed for all prompts.
    async fn listen(&self) -> Result<RawEventStream, TransportError>;
}
