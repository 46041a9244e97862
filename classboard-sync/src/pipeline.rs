//! Shared sync pipeline entrypoint used by the CLI's one-shot and polling
//! modes.
//!
//! A run is strictly sequential:
//! load state → fetch → (wipe) → snapshot → purge → layout → plan → apply →
//! save. A fetch failure aborts before anything on the board is touched.

use chrono::{DateTime, NaiveDate, Utc};

use classboard_core::config::LayoutSettings;
use classboard_core::{GroupingKey, RecordFilter, SourceGroup, SourceRecord};

use crate::error::{ItemError, SyncError};
use crate::layout::{self, LayoutContext, LayoutReport};
use crate::ports::{BoardApi, SourceApi};
use crate::reconcile::{self, Plan};
use crate::state::{PurgeReport, StateStore};
use crate::wipe::{self, WipeMode, WipeReport};

/// A wipe to run before reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeRequest {
    pub mode: WipeMode,
    pub confirm: String,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub wipe: Option<WipeRequest>,
    pub filter: RecordFilter,
    pub layout: LayoutSettings,
    pub token_expires_on: Option<NaiveDate>,
    pub now: DateTime<Utc>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wipe: None,
            filter: RecordFilter::default(),
            layout: LayoutSettings::default(),
            token_expires_on: None,
            now: Utc::now(),
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub dry_run: bool,
    pub records: usize,
    pub groups: usize,
    pub created: usize,
    pub updated: usize,
    /// Cards archived by a wipe. Reconciliation itself never archives.
    pub archived: usize,
    pub skipped: usize,
    pub ambiguous: usize,
    pub repaired: usize,
    pub purged: PurgeReport,
    pub layout: LayoutReport,
    pub wipe: Option<WipeReport>,
    pub errors: Vec<String>,
    /// The computed plan, kept for dry runs.
    pub plan: Option<Plan>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run one reconciliation pass.
pub fn run(
    source: &dyn SourceApi,
    board: &mut dyn BoardApi,
    store: &dyn StateStore,
    options: &RunOptions,
) -> Result<RunSummary, SyncError> {
    if let Some(request) = &options.wipe {
        wipe::check_confirmation(board, &request.confirm)?;
    }

    let mut state = store.load()?;

    let mut groups = source
        .fetch_groups(&options.filter)
        .map_err(SyncError::Fetch)?;
    let records = source
        .fetch_records(&options.filter, &groups)
        .map_err(SyncError::Fetch)?;
    add_missing_groups(&mut groups, &records);
    tracing::info!(
        "fetched {} record(s) across {} group(s)",
        records.len(),
        groups.len()
    );

    let mut wipe_report = None;
    if let Some(request) = &options.wipe {
        if options.dry_run {
            tracing::info!("[dry-run] would wipe ({:?})", request.mode);
        } else {
            wipe_report = Some(wipe::wipe(board, store, request.mode, &request.confirm)?);
            state = store.load()?;
        }
    }

    let mut snapshot = board.snapshot().map_err(SyncError::Snapshot)?;
    let purged = state.purge_missing(&snapshot);
    if !purged.is_empty() {
        tracing::info!(
            "purged stale state: {} card(s), {} list(s), {} label(s)",
            purged.cards,
            purged.lists,
            purged.labels
        );
    }

    let ctx = LayoutContext {
        settings: &options.layout,
        groups: &groups,
        token_expires_on: options.token_expires_on,
        today: options.now.date_naive(),
    };
    let layout = layout::ensure(board, &mut snapshot, &mut state, &ctx, options.dry_run);

    let plan = reconcile::plan(&records, &snapshot, &state);
    let mut summary = RunSummary {
        dry_run: options.dry_run,
        records: records.len(),
        groups: groups.len(),
        created: 0,
        updated: 0,
        archived: wipe_report.as_ref().map_or(0, |w| w.archived_cards.len()),
        skipped: plan.skipped.len(),
        ambiguous: plan.ambiguous(),
        repaired: 0,
        purged,
        errors: layout.failures(),
        layout,
        wipe: wipe_report,
        plan: None,
    };
    if let Some(w) = &summary.wipe {
        summary.errors.extend(w.errors.iter().cloned());
    }

    if options.dry_run {
        tracing::info!(
            "[dry-run] would create {}, update {}, repair {}",
            plan.creates.len(),
            plan.updates.len(),
            plan.repairs.len()
        );
        summary.plan = Some(plan);
        return Ok(summary);
    }

    let result = reconcile::apply(&plan, board, &mut snapshot, &mut state);
    summary.created = result.created;
    summary.updated = result.updated;
    summary.repaired = result.repaired;
    summary
        .errors
        .extend(result.errors.iter().map(ItemError::to_string));

    state.meta.last_run_at = Some(options.now);
    if summary.is_clean() {
        state.meta.last_success_at = Some(options.now);
    }
    store.save(&state)?;

    tracing::info!(
        "sync done: {} created, {} updated, {} repaired, {} skipped, {} error(s)",
        summary.created,
        summary.updated,
        summary.repaired,
        summary.skipped,
        summary.errors.len()
    );
    Ok(summary)
}

/// Records can name a group the group fetch did not return; give it a
/// placeholder named after its key.
fn add_missing_groups(groups: &mut Vec<SourceGroup>, records: &[SourceRecord]) {
    for record in records {
        if !groups.iter().any(|g| g.key == record.group) {
            tracing::debug!("group {} has no metadata; using its key as name", record.group);
            groups.push(placeholder(&record.group));
        }
    }
}

fn placeholder(key: &GroupingKey) -> SourceGroup {
    SourceGroup {
        key: key.clone(),
        name: key.to_string(),
        info: String::new(),
    }
}
