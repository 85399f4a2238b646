#![forbid(unsafe_code)]

mod cmd;
mod output;
mod remote;
mod sse;

use clap::{CommandFactory, Parser, Subcommand};
use output::{OutputMode, resolve_output_mode};
use promptlib_core::config::load_user_config;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pl: a prompt library kept live against its hosted store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, `FORMAT` and the user config.
    fn output_mode(&self) -> OutputMode {
        let user_output = load_user_config().ok().and_then(|cfg| cfg.output);
        resolve_output_mode(self.format, self.json, user_output.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Browse",
        about = "List prompts, newest first",
        long_about = "List every prompt in the store, newest created first.",
        after_help = "EXAMPLES:\n    # All prompts\n    pl list\n\n    # Favorites only, as JSON\n    pl list --favorites --json\n\n    # First five coding prompts\n    pl list --category coding --limit 5"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Browse",
        about = "Show one prompt with word and character counts",
        after_help = "EXAMPLES:\n    pl show 0f6a1c2e-3b4d-4e5f-8a9b-0c1d2e3f4a5b"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Edit",
        about = "Add a prompt",
        long_about = "Validate and store a new prompt. Requires an API token.",
        after_help = "EXAMPLES:\n    pl add --title \"Code review checklist\" \\\n        --prompt \"Review this diff for...\" \\\n        --use-case \"Pull request review\" \\\n        --category coding --tag review --tag quality"
    )]
    Add(cmd::add::AddArgs),

    #[command(
        next_help_heading = "Edit",
        about = "Toggle a prompt's favorite flag",
        long_about = "Flip the favorite flag immediately and confirm it with the store. \
                      A refused write restores the previous value.",
        after_help = "EXAMPLES:\n    pl favorite 0f6a1c2e-3b4d-4e5f-8a9b-0c1d2e3f4a5b"
    )]
    Favorite(cmd::favorite::FavoriteArgs),

    #[command(
        next_help_heading = "Live",
        about = "Follow the change feed",
        long_about = "Load the library, subscribe to the change feed and print how each \
                      event reconciles with the local copy. Exits non-zero if the feed \
                      disconnects.",
        after_help = "EXAMPLES:\n    # Follow until interrupted\n    pl watch\n\n    # Stop after ten feed events, one JSON object per line\n    pl watch --exit-after 10 --json"
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show or edit configuration",
        after_help = "EXAMPLES:\n    pl config show\n    pl config set store.project_id abc123xy\n    pl config set --scope user store.token sk...\n    pl config set --scope user user.output json"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    pl completions bash > ~/.local/share/bash-completion/completions/pl"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PROMPTLIB_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "promptlib=debug,info"
        } else {
            "promptlib=info,warn"
        })
    });

    let format = env::var("PROMPTLIB_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    debug!(?output, "output mode resolved");

    match cli.command {
        Commands::List(ref args) => cmd::list::run_list(args, output, &project_root).await,
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root).await,
        Commands::Add(ref args) => cmd::add::run_add(args, output, &project_root).await,
        Commands::Favorite(ref args) => {
            cmd::favorite::run_favorite(args, output, &project_root).await
        }
        Commands::Watch(ref args) => cmd::watch::run_watch(args, output, &project_root).await,
        Commands::Config(ref args) => cmd::config::run_config(args, &project_root, output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
