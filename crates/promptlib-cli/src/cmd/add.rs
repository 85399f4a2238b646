//! `pl add` - store a new prompt.

use anyhow::Result;
use clap::Args;
use promptlib_core::{Category, LibraryError, PromptDraft};
use std::path::Path;

use super::show::{ShowPrompt, write_pretty, write_text};
use super::{Access, connect, fail_library, open_library};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Title, 5 to 100 characters.
    #[arg(long)]
    pub title: String,

    /// The prompt text.
    #[arg(long)]
    pub prompt: String,

    /// What the prompt is for.
    #[arg(long)]
    pub use_case: String,

    /// Marketing, Coding, Writing, Business or Design.
    #[arg(long)]
    pub category: Category,

    /// Tag to attach (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Mark the prompt as featured.
    #[arg(long)]
    pub featured: bool,
}

impl AddArgs {
    pub fn draft(&self) -> PromptDraft {
        PromptDraft::new(&self.title, &self.prompt, &self.use_case, self.category)
            .with_tags(&self.tags)
            .featured(self.featured)
    }
}

/// Execute `pl add`.
///
/// The draft is checked before any configuration or network access.
///
/// # Errors
///
/// Returns an error for an invalid draft, missing settings or token, or a
/// refused create.
pub async fn run_add(args: &AddArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let draft = args.draft();
    if let Err(err) = draft.validate() {
        return Err(fail_library(output, &LibraryError::Draft(err)));
    }

    let store = connect(project_root, output, Access::Write)?;
    let library = open_library(store, output).await?;
    let created = library.create(draft).await;
    library.close();

    let prompt = created.map_err(|err| fail_library(output, &err))?;
    render_mode(output, &ShowPrompt::from(prompt), write_text, |item, w| {
        writeln!(w, "Prompt added successfully!")?;
        writeln!(w)?;
        write_pretty(item, w)
    })
}
