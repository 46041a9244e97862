//! `classboard dedupe` — collapse cards that claim the same record.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use classboard_sync::dedupe::{self, DedupeReport, GroupOutcome, Resolution, SurvivorRule};

use crate::context::Context;

/// Arguments for `classboard dedupe`.
#[derive(Args, Debug)]
pub struct DedupeArgs {
    /// Archive the losing cards. Without this flag only a report is printed.
    #[arg(long)]
    pub apply: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DedupeArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load_validated()?;
        let mut board = ctx.board()?;
        let store = ctx.state_store();

        let report = dedupe::run(&mut board, &store, self.apply).context("dedupe failed")?;
        if self.json {
            let payload: Vec<DuplicateJson> = report.groups.iter().map(DuplicateJson::from).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize dedupe JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Serialize)]
struct DuplicateJson {
    identity: String,
    cards: Vec<String>,
    survivor: Option<String>,
    rule: Option<&'static str>,
    archived: Vec<String>,
    errors: Vec<String>,
}

impl From<&GroupOutcome> for DuplicateJson {
    fn from(outcome: &GroupOutcome) -> Self {
        let (survivor, rule) = match &outcome.resolution {
            Resolution::Resolved { survivor, rule, .. } => {
                (Some(survivor.to_string()), Some(rule_name(*rule)))
            }
            Resolution::Unresolved { .. } => (None, None),
        };
        Self {
            identity: outcome.group.identity.to_string(),
            cards: outcome.group.cards.iter().map(ToString::to_string).collect(),
            survivor,
            rule,
            archived: outcome.archived.iter().map(ToString::to_string).collect(),
            errors: outcome.errors.clone(),
        }
    }
}

#[derive(Tabled)]
struct DuplicateRow {
    #[tabled(rename = "record")]
    identity: String,
    #[tabled(rename = "cards")]
    cards: usize,
    #[tabled(rename = "keep")]
    survivor: String,
    #[tabled(rename = "because")]
    rule: String,
}

fn print_table(report: &DedupeReport) {
    if report.groups.is_empty() {
        println!("✓ no duplicate cards");
        return;
    }

    let rows: Vec<DuplicateRow> = report
        .groups
        .iter()
        .map(|outcome| {
            let (survivor, rule) = match &outcome.resolution {
                Resolution::Resolved { survivor, rule, .. } => {
                    (survivor.to_string(), rule_name(*rule).to_string())
                }
                Resolution::Unresolved { manual } => (
                    "-".to_string(),
                    format!("{} edited cards", manual.len()).yellow().to_string(),
                ),
            };
            DuplicateRow {
                identity: outcome.group.identity.to_string(),
                cards: outcome.group.cards.len(),
                survivor,
                rule,
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.applied {
        println!(
            "✓ archived {} card(s); {} group(s) left for manual review",
            report.archived(),
            report.unresolved()
        );
        for error in report.groups.iter().flat_map(|g| g.errors.iter()) {
            println!("  ✗  {error}");
        }
    } else {
        println!(
            "{} group(s) resolvable. Run `classboard dedupe --apply` to archive duplicates.",
            report.resolved()
        );
    }
}

fn rule_name(rule: SurvivorRule) -> &'static str {
    match rule {
        SurvivorRule::ManuallyTouched => "edited",
        SurvivorRule::TrackedInState => "tracked",
        SurvivorRule::InExpectedList => "course list",
        SurvivorRule::LatestActivity => "latest activity",
    }
}
