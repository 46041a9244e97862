//! Board wipes.
//!
//! Both modes require the confirmation token to equal the board id; a
//! mismatch fails before anything is read or written.
//!
//! - managed: archive what state tracks, except manually touched cards,
//!   then the lists and labels the tool created itself (lists only when
//!   left empty). Lists and labels adopted by name stay.
//! - full: archive every open card and list, then reset state

use classboard_core::{CardId, LabelId, ListId};

use crate::error::SyncError;
use crate::ports::BoardApi;
use crate::state::{StateStore, SyncState};
use crate::touch::TouchClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeMode {
    Managed,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeReport {
    pub mode: WipeMode,
    pub archived_cards: Vec<CardId>,
    pub archived_lists: Vec<ListId>,
    pub archived_labels: Vec<LabelId>,
    /// Tracked cards left in place because they were manually touched.
    pub preserved_cards: Vec<CardId>,
    /// Tracked lists left in place because they still hold cards.
    pub kept_lists: Vec<ListId>,
    /// Tracked lists the tool adopted by name; never archived by a managed
    /// wipe.
    pub adopted_lists: Vec<ListId>,
    pub errors: Vec<String>,
}

impl WipeReport {
    fn new(mode: WipeMode) -> Self {
        Self {
            mode,
            archived_cards: Vec::new(),
            archived_lists: Vec::new(),
            archived_labels: Vec::new(),
            preserved_cards: Vec::new(),
            kept_lists: Vec::new(),
            adopted_lists: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, what: String) {
        tracing::warn!("wipe: {what}");
        self.errors.push(what);
    }
}

/// Fail unless `confirm` names the board.
pub fn check_confirmation(board: &dyn BoardApi, confirm: &str) -> Result<(), SyncError> {
    if confirm.trim() != board.board_id() {
        return Err(SyncError::WipeConfirmation {
            expected: board.board_id().to_string(),
            got: confirm.to_string(),
        });
    }
    Ok(())
}

/// Wipe the board. State is loaded from and saved to `store`.
pub fn wipe(
    board: &mut dyn BoardApi,
    store: &dyn StateStore,
    mode: WipeMode,
    confirm: &str,
) -> Result<WipeReport, SyncError> {
    check_confirmation(board, confirm)?;
    let mut state = store.load()?;
    let report = match mode {
        WipeMode::Managed => wipe_managed(board, store, &mut state)?,
        WipeMode::Full => wipe_full(board, store, &mut state)?,
    };
    tracing::info!(
        "wipe ({:?}): archived {} card(s), {} list(s), {} label(s); preserved {} card(s)",
        report.mode,
        report.archived_cards.len(),
        report.archived_lists.len(),
        report.archived_labels.len(),
        report.preserved_cards.len()
    );
    Ok(report)
}

fn wipe_managed(
    board: &mut dyn BoardApi,
    store: &dyn StateStore,
    state: &mut SyncState,
) -> Result<WipeReport, SyncError> {
    let mut report = WipeReport::new(WipeMode::Managed);
    let mut snapshot = board.snapshot().map_err(SyncError::Snapshot)?;
    state.purge_missing(&snapshot);
    let classifier = TouchClassifier::new(&snapshot, state);

    for (_, card_id) in state.tracked_cards() {
        let Some(card) = snapshot.card(&card_id) else {
            continue;
        };
        if classifier.is_touched(card) {
            report.preserved_cards.push(card_id);
            continue;
        }
        match board.archive_card(&card_id) {
            Ok(()) => {
                snapshot.remove_card(&card_id);
                state.forget_card(&card_id);
                report.archived_cards.push(card_id);
            }
            Err(e) => report.error(format!("archive card {card_id}: {e}")),
        }
    }
    store.save(state)?;

    for list in state.tracked_lists() {
        if !state.owns_list(&list) {
            report.adopted_lists.push(list);
            continue;
        }
        if snapshot.cards.iter().any(|c| c.list == list) {
            report.kept_lists.push(list);
            continue;
        }
        match board.archive_list(&list) {
            Ok(()) => {
                snapshot.remove_list(&list);
                state.forget_list(&list);
                report.archived_lists.push(list);
            }
            Err(e) => report.error(format!("archive list {list}: {e}")),
        }
    }
    store.save(state)?;

    for label in state.owned_labels() {
        match board.archive_label(&label) {
            Ok(()) => {
                snapshot.remove_label(&label);
                state.forget_label(&label);
                report.archived_labels.push(label);
            }
            Err(e) => report.error(format!("archive label {label}: {e}")),
        }
    }
    store.save(state)?;
    Ok(report)
}

fn wipe_full(
    board: &mut dyn BoardApi,
    store: &dyn StateStore,
    state: &mut SyncState,
) -> Result<WipeReport, SyncError> {
    let mut report = WipeReport::new(WipeMode::Full);
    let snapshot = board.snapshot().map_err(SyncError::Snapshot)?;

    for card in &snapshot.cards {
        match board.archive_card(&card.id) {
            Ok(()) => report.archived_cards.push(card.id.clone()),
            Err(e) => report.error(format!("archive card {}: {e}", card.id)),
        }
    }
    for list in snapshot.lists_ordered() {
        match board.archive_list(&list.id) {
            Ok(()) => report.archived_lists.push(list.id.clone()),
            Err(e) => report.error(format!("archive list {}: {e}", list.id)),
        }
    }

    *state = SyncState::default();
    store.save(state)?;
    Ok(report)
}
