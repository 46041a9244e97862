//! `classboard validate` — check credentials against both services.

use anyhow::{Context as _, Result};
use clap::Args;

use classboard_sync::BoardApi;

use crate::context::Context;

#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load_validated()?;

        let board = ctx.board()?;
        let me = board.me().context("Trello token rejected")?;
        let snapshot = board.snapshot().context("cannot read Trello board")?;
        println!("✓ Trello: {} ({})", me.full_name, me.username);
        println!(
            "  board '{}': {} list(s), {} card(s), {} label(s)",
            board.board_name(),
            snapshot.lists.len(),
            snapshot.cards.len(),
            snapshot.labels.len()
        );

        let courses = ctx
            .canvas()
            .active_courses(ctx.config.canvas.term_id.as_deref())
            .context("Canvas token rejected")?;
        println!("✓ Canvas: {} active course(s)", courses.len());

        if let Some(expires) = ctx.config.token_expires_on() {
            println!("  Canvas token expires {expires}");
        }
        Ok(())
    }
}
