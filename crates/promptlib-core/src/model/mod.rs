pub mod draft;
pub mod prompt;
pub mod stats;

pub use draft::{Category, DraftError, ParseCategoryError, PromptDraft};
pub use prompt::{IncompleteSnapshot, Prompt, PromptField, PromptId, PromptPatch};
pub use stats::PromptStats;
