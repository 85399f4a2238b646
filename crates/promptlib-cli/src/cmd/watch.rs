//! `pl watch` - follow the change feed and print how each event reconciles.
//!
//! Runs until interrupted, until `--exit-after` feed events have been seen,
//! or until the feed goes stale. There is no reconnect: a stale feed ends
//! the command with `E3001` so a supervisor can restart it.

use anyhow::Result;
use chrono::Local;
use clap::Args;
use promptlib_core::error::TransportError;
use promptlib_core::session::{Activity, Origin};
use promptlib_core::{Freshness, LibraryError, Notice, NoticeLevel};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{Access, connect, fail_library, open_library};
use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Exit after this many feed events.
    #[arg(long)]
    pub exit_after: Option<usize>,
}

/// One line of watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WatchLine {
    Loaded {
        prompts: usize,
    },
    Freshness {
        freshness: Freshness,
    },
    Activity {
        id: String,
        origin: Origin,
        outcome: &'static str,
    },
    Notice {
        notice: Notice,
    },
}

impl From<&Activity> for WatchLine {
    fn from(activity: &Activity) -> Self {
        Self::Activity {
            id: activity.id.to_string(),
            origin: activity.origin,
            outcome: activity.outcome.as_str(),
        }
    }
}

const fn freshness_label(freshness: &Freshness) -> &'static str {
    match freshness {
        Freshness::Connecting => "connecting",
        Freshness::Live => "live",
        Freshness::Reconnecting => "reconnecting",
        Freshness::Stale { .. } => "stale",
    }
}

const fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Feed => "feed",
        Origin::Local => "local",
    }
}

pub fn write_line(w: &mut dyn Write, output: OutputMode, line: &WatchLine) -> io::Result<()> {
    match output {
        OutputMode::Json => {
            serde_json::to_writer(&mut *w, line)?;
            writeln!(w)
        }
        OutputMode::Text => match line {
            WatchLine::Loaded { prompts } => writeln!(w, "loaded prompts={prompts}"),
            WatchLine::Freshness { freshness } => match freshness {
                Freshness::Stale { reason } => writeln!(w, "freshness=stale reason={reason}"),
                other => writeln!(w, "freshness={}", freshness_label(other)),
            },
            WatchLine::Activity {
                id,
                origin,
                outcome,
            } => writeln!(w, "{}  {outcome}  {id}", origin_label(*origin)),
            WatchLine::Notice { notice } => {
                let level = match notice.level {
                    NoticeLevel::Success => "success",
                    NoticeLevel::Error => "error",
                };
                writeln!(w, "notice={level} {}", notice.message)
            }
        },
        OutputMode::Pretty => {
            let now = Local::now().format("%H:%M:%S");
            match line {
                WatchLine::Loaded { prompts } => {
                    writeln!(w, "{now}  Loaded {prompts} prompts, waiting for changes")
                }
                WatchLine::Freshness { freshness } => match freshness {
                    Freshness::Stale { reason } => {
                        writeln!(w, "{now}  Live updates stopped: {reason}")
                    }
                    Freshness::Live => writeln!(w, "{now}  Live"),
                    other => writeln!(w, "{now}  {}...", freshness_label(other)),
                },
                WatchLine::Activity {
                    id,
                    origin,
                    outcome,
                } => writeln!(w, "{now}  {:<5} {outcome:<22} {id}", origin_label(*origin)),
                WatchLine::Notice { notice } => writeln!(w, "{now}  {}", notice.message),
            }
        }
    }
}

fn emit(output: OutputMode, line: &WatchLine) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_line(&mut out, output, line)?;
    out.flush()
}

/// Execute `pl watch`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the feed goes stale.
pub async fn run_watch(args: &WatchArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = connect(project_root, output, Access::Read)?;
    let library = open_library(store, output).await?;
    let mut activity = library.activity();
    let mut notices = library.notices();
    let mut freshness = library.freshness();

    emit(
        output,
        &WatchLine::Loaded {
            prompts: library.prompts().len(),
        },
    )?;

    let mut state = freshness.borrow_and_update().clone();
    emit(
        output,
        &WatchLine::Freshness {
            freshness: state.clone(),
        },
    )?;
    let mut seen = 0usize;
    let outcome: Result<(), LibraryError> = loop {
        if let Freshness::Stale { reason } = &state {
            break Err(TransportError::Stream(reason.clone()).into());
        }
        if args.exit_after.is_some_and(|limit| seen >= limit) {
            break Ok(());
        }

        tokio::select! {
            changed = freshness.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                state = freshness.borrow_and_update().clone();
                emit(output, &WatchLine::Freshness { freshness: state.clone() })?;
            }
            received = activity.recv() => match received {
                Ok(record) => {
                    if record.origin == Origin::Feed {
                        seen += 1;
                    }
                    emit(output, &WatchLine::from(&record))?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch output fell behind"),
                Err(RecvError::Closed) => break Ok(()),
            },
            received = notices.recv() => {
                if let Ok(notice) = received {
                    emit(output, &WatchLine::Notice { notice })?;
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    library.close();
    outcome.map_err(|err| fail_library(output, &err))
}
