//! `classboard sync` — reconcile Canvas records onto the Trello board.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::Args;

use classboard_sync::pipeline::{self, RunOptions, RunSummary, WipeRequest};
use classboard_sync::reconcile::Plan;
use classboard_sync::{wipe, BoardApi};

use crate::context::Context;
use crate::WipeModeArg;

/// Shortest polling interval accepted.
const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Arguments for `classboard sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Run a single pass and exit instead of polling.
    #[arg(long)]
    pub once: bool,

    /// Show what would change without touching the board or the state file.
    #[arg(long)]
    pub dry_run: bool,

    /// Polling interval (default: sync.poll_interval_minutes).
    #[arg(long, value_name = "MINUTES")]
    pub interval_minutes: Option<u32>,

    /// Archive board content before the first pass: managed | full.
    #[arg(long, value_name = "MODE", requires = "wipe_confirm")]
    pub wipe: Option<WipeModeArg>,

    /// Board id, repeated as a safety check for --wipe.
    #[arg(long, value_name = "BOARD_ID", requires = "wipe")]
    pub wipe_confirm: Option<String>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load_validated()?;
        let source = ctx.canvas();
        let mut board = ctx.board()?;
        let store = ctx.state_store();

        let mut wipe = match (self.wipe, self.wipe_confirm) {
            (Some(mode), Some(confirm)) => Some(WipeRequest {
                mode: mode.into(),
                confirm,
            }),
            (None, None) => None,
            _ => bail!("--wipe and --wipe-confirm go together"),
        };
        let options = |wipe: Option<WipeRequest>| RunOptions {
            dry_run: self.dry_run,
            wipe,
            filter: ctx.config.record_filter(),
            layout: ctx.config.layout.clone(),
            token_expires_on: ctx.config.token_expires_on(),
            now: Utc::now(),
        };

        if self.once || self.dry_run {
            let summary = pipeline::run(&source, &mut board, &store, &options(wipe))
                .context("sync failed")?;
            print_summary(&summary);
            return Ok(());
        }

        confirm_wipe(&board, wipe.as_ref())?;
        let minutes = self
            .interval_minutes
            .unwrap_or(ctx.config.sync.poll_interval_minutes);
        let interval = Duration::from_secs(u64::from(minutes) * 60).max(MIN_INTERVAL);
        log::info!(
            "polling every {}s; state at {}",
            interval.as_secs(),
            ctx.state_path().display()
        );
        loop {
            let started = Instant::now();
            match pipeline::run(&source, &mut board, &store, &options(wipe.take())) {
                Ok(summary) => print_summary(&summary),
                Err(err) => log::error!("sync failed; retrying in {}s: {err:#}", interval.as_secs()),
            }
            let wait = interval
                .saturating_sub(started.elapsed())
                .max(Duration::from_secs(1));
            sleep(wait);
        }
    }
}

/// Fail unless a requested wipe names the board.
fn confirm_wipe(board: &dyn BoardApi, request: Option<&WipeRequest>) -> Result<()> {
    if let Some(request) = request {
        wipe::check_confirmation(board, &request.confirm)?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };

    if let Some(wipe) = &summary.wipe {
        println!(
            "✓ wiped ({:?}): {} card(s), {} list(s), {} label(s) archived; {} manual card(s) kept",
            wipe.mode,
            wipe.archived_cards.len(),
            wipe.archived_lists.len(),
            wipe.archived_labels.len(),
            wipe.preserved_cards.len()
        );
        if !wipe.adopted_lists.is_empty() {
            println!(
                "  kept {} list(s) the tool did not create",
                wipe.adopted_lists.len()
            );
        }
    }

    if let Some(plan) = &summary.plan {
        print_plan(prefix, plan);
        if summary.layout.pending() > 0 {
            println!("{prefix}  +  {} layout object(s)", summary.layout.pending());
        }
        return;
    }

    println!(
        "{prefix}✓ {} record(s) in {} course(s): {} created, {} updated, {} repaired, {} skipped",
        summary.records,
        summary.groups,
        summary.created,
        summary.updated,
        summary.repaired,
        summary.skipped
    );
    let layout = summary.layout.created() + summary.layout.adopted();
    if layout > 0 {
        println!("  ✎  {layout} layout object(s) created or adopted");
    }
    if summary.ambiguous > 0 {
        println!(
            "  !  {} record(s) match several cards; run `classboard dedupe`",
            summary.ambiguous
        );
    }
    for error in &summary.errors {
        println!("  ✗  {error}");
    }
}

fn print_plan(prefix: &str, plan: &Plan) {
    if plan.is_empty() {
        println!("{prefix}✓ nothing to do");
        return;
    }
    println!(
        "{prefix}✓ would create {}, update {}, repair {}",
        plan.creates.len(),
        plan.updates.len(),
        plan.repairs.len()
    );
    for create in &plan.creates {
        println!("  +  {} ({})", create.name, create.record);
    }
    for update in &plan.updates {
        let what = if update.manual { "label only" } else { "fields" };
        println!("  ~  {} [{what}]", update.record);
    }
    for skipped in &plan.skipped {
        println!("  ·  {} skipped: {:?}", skipped.record, skipped.reason);
    }
}
