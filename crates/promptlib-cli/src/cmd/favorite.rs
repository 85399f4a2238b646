//! `pl favorite` - flip a prompt's favorite flag.

use anyhow::Result;
use clap::Args;
use promptlib_core::PromptId;
use serde::Serialize;
use std::path::Path;

use super::{Access, connect, fail_library, open_library};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct FavoriteArgs {
    /// Prompt id as printed by `pl list`.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct FavoriteResult {
    id: PromptId,
    is_favorite: bool,
}

/// Execute `pl favorite <id>`.
///
/// # Errors
///
/// Returns an error for an unknown id, missing settings or token, or a
/// refused patch (after the local flag has been rolled back).
pub async fn run_favorite(args: &FavoriteArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let id = PromptId::new(args.id.trim());
    let store = connect(project_root, output, Access::Write)?;
    let library = open_library(store, output).await?;
    let toggled = library.toggle_favorite(&id).await;
    library.close();

    let is_favorite = toggled.map_err(|err| fail_library(output, &err))?;
    render_mode(
        output,
        &FavoriteResult { id, is_favorite },
        |r, w| writeln!(w, "id={} favorite={}", r.id, r.is_favorite),
        |r, w| {
            if r.is_favorite {
                writeln!(w, "★ Added {} to favorites!", r.id)
            } else {
                writeln!(w, "Removed {} from favorites!", r.id)
            }
        },
    )
}
