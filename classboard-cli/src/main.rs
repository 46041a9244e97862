//! Classboard — keep a Trello board in step with Canvas coursework.
//!
//! # Usage
//!
//! ```text
//! classboard init
//! classboard validate
//! classboard courses [--term <id>]
//! classboard sync [--once] [--dry-run] [--interval-minutes N] [--wipe managed|full --wipe-confirm <board-id>]
//! classboard dedupe [--apply] [--json]
//! classboard wipe --confirm <board-id> [--full]
//! classboard status [--json]
//! ```

mod canvas;
mod commands;
mod context;
mod http;
mod logging;
mod trello;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use classboard_sync::WipeMode;
use commands::{
    courses::CoursesArgs, dedupe::DedupeArgs, init::InitArgs, status::StatusArgs,
    sync::SyncArgs, validate::ValidateArgs, wipe::WipeArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "classboard",
    version,
    about = "Mirror Canvas assignments and events onto a Trello board",
    long_about = None,
)]
struct Cli {
    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    /// Also append log lines to this file (rotated at 1 MiB).
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Trace every Canvas and Trello request (credentials redacted).
    #[arg(long, global = true)]
    log_http: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter ~/.classboard/config.yaml.
    Init(InitArgs),

    /// Reconcile Canvas records onto the board, once or on an interval.
    Sync(SyncArgs),

    /// Find cards that claim the same record and archive the extras.
    Dedupe(DedupeArgs),

    /// Archive managed (or all) board content.
    Wipe(WipeArgs),

    /// Show what the last sync recorded.
    Status(StatusArgs),

    /// Check credentials and board access.
    Validate(ValidateArgs),

    /// List active Canvas courses and their terms.
    Courses(CoursesArgs),
}

// ---------------------------------------------------------------------------
// Shared WipeMode argument — parsed from CLI strings, converts to sync type
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `WipeMode` from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct WipeModeArg(pub WipeMode);

impl FromStr for WipeModeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "managed" => Ok(Self(WipeMode::Managed)),
            "full" => Ok(Self(WipeMode::Full)),
            other => Err(format!(
                "unknown wipe mode '{other}'; expected: managed, full"
            )),
        }
    }
}

impl fmt::Display for WipeModeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            WipeMode::Managed => f.write_str("managed"),
            WipeMode::Full => f.write_str("full"),
        }
    }
}

impl From<WipeModeArg> for WipeMode {
    fn from(m: WipeModeArg) -> Self {
        m.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_file.as_deref(), cli.log_http)?;
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Dedupe(args) => args.run(),
        Commands::Wipe(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Validate(args) => args.run(),
        Commands::Courses(args) => args.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn wipe_mode_parses_case_insensitively() {
        assert_eq!("Managed".parse::<WipeModeArg>().unwrap().0, WipeMode::Managed);
        assert_eq!("full".parse::<WipeModeArg>().unwrap().0, WipeMode::Full);
        assert!("everything".parse::<WipeModeArg>().is_err());
    }
}
