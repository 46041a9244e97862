//! `classboard status` — what the last sync left behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use classboard_sync::{state, SyncState};

use crate::context::Context;

/// Arguments for `classboard status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load()?;
        let path = ctx.state_path();
        let state = state::load_from(&path)
            .with_context(|| format!("failed to read state at {}", path.display()))?;

        let report = build_report(path, &state, Utc::now());
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    state_file: PathBuf,
    last_run_at: Option<DateTime<Utc>>,
    last_run_age: String,
    last_success_at: Option<DateTime<Utc>>,
    last_success_age: String,
    records: usize,
    locked: usize,
    legacy: usize,
    groups: Vec<GroupStatus>,
}

#[derive(Debug, Serialize, Tabled)]
struct GroupStatus {
    #[tabled(rename = "course")]
    group: String,
    #[tabled(rename = "cards")]
    cards: usize,
    #[tabled(rename = "locked")]
    locked: usize,
    #[tabled(rename = "list")]
    list: String,
    #[tabled(rename = "label")]
    label: String,
}

fn build_report(state_file: PathBuf, state: &SyncState, now: DateTime<Utc>) -> StatusReport {
    let mut per_group = BTreeMap::<String, (usize, usize)>::new();
    for entry in state.records.values() {
        let counts = per_group.entry(entry.group.to_string()).or_default();
        counts.0 += 1;
        if entry.locked {
            counts.1 += 1;
        }
    }
    let groups = state
        .groups
        .iter()
        .map(|(key, entry)| {
            let (cards, locked) = per_group.get(key.as_str()).copied().unwrap_or_default();
            GroupStatus {
                group: key.to_string(),
                cards,
                locked,
                list: entry.list.as_ref().map_or("-".to_string(), ToString::to_string),
                label: entry
                    .color
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    StatusReport {
        state_file,
        last_run_at: state.meta.last_run_at,
        last_run_age: format_age(state.meta.last_run_at, now),
        last_success_at: state.meta.last_success_at,
        last_success_age: format_age(state.meta.last_success_at, now),
        records: state.records.len(),
        locked: state.records.values().filter(|e| e.locked).count(),
        legacy: state.records.values().filter(|e| e.legacy).count(),
        groups,
    }
}

fn print_table(report: &StatusReport) {
    println!(
        "Classboard v{} | {} records | {} courses | {} locked | {} legacy",
        env!("CARGO_PKG_VERSION"),
        report.records,
        report.groups.len(),
        report.locked,
        report.legacy,
    );
    println!("State: {}", report.state_file.display());

    if report.last_run_at.is_none() {
        println!("{}", "Never synced. Run `classboard sync --once`.".bright_black());
        return;
    }

    let success = if report.last_success_at == report.last_run_at {
        report.last_success_age.green()
    } else {
        report.last_success_age.yellow()
    };
    println!("Last run: {}  |  last clean run: {}", report.last_run_age, success);

    if report.groups.is_empty() {
        return;
    }
    let mut table = Table::new(&report.groups);
    table.with(Style::rounded());
    println!("{table}");
}

/// `"3h ago"` style age; `"never"` when unset.
fn format_age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use classboard_core::{CardId, GroupingKey, ListId, RecordId};
    use classboard_sync::state::{CardEntry, GroupEntry};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn ages_are_coarse() {
        assert_eq!(format_age(None, now()), "never");
        assert_eq!(format_age(Some(now()), now()), "just now");
        assert_eq!(
            format_age(Some(now() - chrono::Duration::minutes(5)), now()),
            "5m ago"
        );
        assert_eq!(
            format_age(Some(now() - chrono::Duration::hours(30)), now()),
            "1d ago"
        );
    }

    #[test]
    fn report_counts_entries_per_course() {
        let group = GroupingKey::from("101");
        let mut state = SyncState::default();
        state.groups.insert(
            group.clone(),
            GroupEntry {
                list: Some(ListId::from("list-1")),
                color: Some("green".to_string()),
                ..GroupEntry::default()
            },
        );
        for (i, locked) in [false, true].into_iter().enumerate() {
            state.records.insert(
                RecordId::from(format!("assignment:101:{i}").as_str()),
                CardEntry {
                    card: CardId::from(format!("card-{i}").as_str()),
                    group: group.clone(),
                    fingerprint: String::new(),
                    locked,
                    legacy: false,
                },
            );
        }
        state.meta.last_run_at = Some(now());

        let report = build_report(PathBuf::from("state.json"), &state, now());

        assert_eq!((report.records, report.locked, report.legacy), (2, 1, 0));
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].cards, 2);
        assert_eq!(report.groups[0].label, "green");
    }
}
