//! `classboard wipe` — archive what the tool put on the board.

use anyhow::{Context as _, Result};
use clap::Args;

use classboard_sync::{wipe, WipeMode};

use crate::context::Context;

/// Arguments for `classboard wipe`.
#[derive(Args, Debug)]
pub struct WipeArgs {
    /// The board id, repeated as a safety check.
    #[arg(long, value_name = "BOARD_ID")]
    pub confirm: String,

    /// Archive every open card and list, not only tracked ones.
    #[arg(long)]
    pub full: bool,
}

impl WipeArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load_validated()?;
        let mut board = ctx.board()?;
        let store = ctx.state_store();
        let mode = if self.full {
            WipeMode::Full
        } else {
            WipeMode::Managed
        };

        let report = wipe::wipe(&mut board, &store, mode, &self.confirm).context("wipe failed")?;

        println!(
            "✓ archived {} card(s), {} list(s), {} label(s)",
            report.archived_cards.len(),
            report.archived_lists.len(),
            report.archived_labels.len()
        );
        if !report.preserved_cards.is_empty() {
            println!(
                "  kept {} edited card(s) in {} list(s)",
                report.preserved_cards.len(),
                report.kept_lists.len()
            );
        }
        if !report.adopted_lists.is_empty() {
            println!(
                "  kept {} list(s) the tool did not create",
                report.adopted_lists.len()
            );
        }
        for error in &report.errors {
            println!("  ✗  {error}");
        }
        Ok(())
    }
}
