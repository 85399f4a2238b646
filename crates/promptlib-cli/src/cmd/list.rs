//! `pl list` - every prompt, newest first.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use promptlib_core::{LibraryError, Prompt};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use super::{Access, connect, fail_library};
use crate::output::{OutputMode, Renderable, pretty_rule, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show favorites.
    #[arg(long)]
    pub favorites: bool,

    /// Only show prompts in this category (case-insensitive).
    #[arg(long)]
    pub category: Option<String>,

    /// Show at most this many prompts.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// One row of `pl list`.
#[derive(Debug, Serialize)]
pub struct ListedPrompt {
    pub id: String,
    pub title: String,
    pub category: String,
    pub use_case: String,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
}

impl From<Prompt> for ListedPrompt {
    fn from(prompt: Prompt) -> Self {
        Self {
            id: prompt.id.to_string(),
            title: prompt.title,
            category: prompt.category,
            use_case: prompt.use_case,
            tags: prompt.tags,
            is_favorite: prompt.is_favorite,
            featured: prompt.featured,
            date_added: prompt.date_added,
        }
    }
}

impl ListedPrompt {
    const fn marker(&self) -> &'static str {
        match (self.is_favorite, self.featured) {
            (true, true) => "★+",
            (true, false) => "★ ",
            (false, true) => " +",
            (false, false) => "  ",
        }
    }
}

impl Renderable for ListedPrompt {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{} {}  [{}]", self.marker(), self.title, self.category)?;
        writeln!(w, "   {}  {}", self.id, self.use_case)?;
        if !self.tags.is_empty() {
            writeln!(w, "   #{}", self.tags.join(" #"))?;
        }
        pretty_rule(w)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.id,
            if self.is_favorite { "fav" } else { "-" },
            self.category,
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "FAV", "CATEGORY", "TITLE"]
    }
}

/// Apply the list filters, keeping the store's order.
pub fn select(prompts: Vec<Prompt>, args: &ListArgs) -> Vec<ListedPrompt> {
    prompts
        .into_iter()
        .filter(|p| !args.favorites || p.is_favorite)
        .filter(|p| {
            args.category
                .as_deref()
                .is_none_or(|category| p.category.eq_ignore_ascii_case(category))
        })
        .take(args.limit.unwrap_or(usize::MAX))
        .map(ListedPrompt::from)
        .collect()
}

/// Execute `pl list`.
///
/// # Errors
///
/// Returns an error if the store is not configured or unreachable.
pub async fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = connect(project_root, output, Access::Read)?;
    let prompts = store
        .fetch_all()
        .await
        .map_err(|err| fail_library(output, &LibraryError::Load(err)))?;

    let rows = select(prompts, args);
    if rows.is_empty() && output == OutputMode::Pretty {
        println!("No prompts found.");
        return Ok(());
    }
    render_list(&rows, output)?;
    Ok(())
}
