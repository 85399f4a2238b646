//! `pl show` - one prompt in full, with body statistics.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use promptlib_core::model::PromptStats;
use promptlib_core::{LibraryError, Prompt, PromptId};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::{Access, connect, fail_library};
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Prompt id as printed by `pl list`.
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ShowPrompt {
    #[serde(flatten)]
    pub prompt: Prompt,
    pub stats: PromptStats,
}

impl From<Prompt> for ShowPrompt {
    fn from(prompt: Prompt) -> Self {
        let stats = prompt.stats();
        Self { prompt, stats }
    }
}

fn local_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "-".to_string(),
        |ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn write_text(item: &ShowPrompt, w: &mut dyn Write) -> std::io::Result<()> {
    let p = &item.prompt;
    writeln!(w, "id={}", p.id)?;
    writeln!(w, "title={}", p.title)?;
    writeln!(w, "category={}", p.category)?;
    writeln!(w, "use_case={}", p.use_case)?;
    writeln!(w, "tags={}", p.tags.join(","))?;
    writeln!(w, "favorite={}", p.is_favorite)?;
    writeln!(w, "featured={}", p.featured)?;
    writeln!(
        w,
        "words={} characters={} non_whitespace={}",
        item.stats.words, item.stats.characters, item.stats.non_whitespace
    )?;
    writeln!(w)?;
    writeln!(w, "{}", p.prompt)
}

pub fn write_pretty(item: &ShowPrompt, w: &mut dyn Write) -> std::io::Result<()> {
    let p = &item.prompt;
    pretty_section(w, &p.title)?;
    pretty_kv(w, "ID", p.id.as_str())?;
    pretty_kv(w, "Category", &p.category)?;
    pretty_kv(w, "Use case", &p.use_case)?;
    if !p.tags.is_empty() {
        pretty_kv(w, "Tags", p.tags.join(", "))?;
    }
    pretty_kv(w, "Favorite", yes_no(p.is_favorite))?;
    pretty_kv(w, "Featured", yes_no(p.featured))?;
    pretty_kv(w, "Added", local_time(p.date_added))?;
    pretty_kv(w, "Updated", local_time(p.updated_at))?;
    writeln!(w)?;
    pretty_section(w, "Prompt")?;
    writeln!(w, "{}", p.prompt)?;
    pretty_rule(w)?;
    writeln!(
        w,
        "{} words · {} characters · {} without spaces",
        item.stats.words, item.stats.characters, item.stats.non_whitespace
    )
}

/// Execute `pl show <id>`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the id is unknown.
pub async fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let id = PromptId::new(args.id.trim());
    let store = connect(project_root, output, Access::Read)?;
    let prompts = store
        .fetch_all()
        .await
        .map_err(|err| fail_library(output, &LibraryError::Load(err)))?;

    let Some(prompt) = prompts.into_iter().find(|p| p.id == id) else {
        return Err(fail_library(output, &LibraryError::NotFound(id)));
    };

    render_mode(output, &ShowPrompt::from(prompt), write_text, write_pretty)
}
