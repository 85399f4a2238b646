//! `pl completions` - shell completion scripts.

use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};
use std::io::Write;

const BIN_NAME: &str = "pl";

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) {
    generate(shell, command, BIN_NAME, out);
}

/// Print the completion script for `shell` to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be flushed.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let mut out = std::io::stdout().lock();
    write_completions(shell, command, &mut out);
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_names_the_binary_and_subcommands() {
        let mut command = clap::Command::new(BIN_NAME)
            .subcommand(clap::Command::new("list"))
            .subcommand(clap::Command::new("watch"));
        let mut buf = Vec::new();
        write_completions(Shell::Bash, &mut command, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("_pl"));
        assert!(script.contains("watch"));
    }
}
