//! promptlib-core library.
//!
//! Keeps one in-memory list of prompts consistent with a hosted document
//! store while the user makes optimistic edits to the same prompts.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at the library boundary
//!   ([`error::LibraryError`]); `anyhow::Result` for config file loading.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Concurrency**: every cache change goes through [`engine::Reconciler`],
//!   whose methods never suspend.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod model;
pub mod pending;
pub mod session;
pub mod store;

pub use engine::{Applied, Reconciler};
pub use error::{ErrorCode, LibraryError};
pub use model::{Category, Prompt, PromptDraft, PromptId, PromptPatch};
pub use session::{Freshness, Notice, NoticeLevel, PromptLibrary};
pub use store::{MemoryStore, PromptStore};
