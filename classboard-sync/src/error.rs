//! Error types for classboard-sync.

use std::path::PathBuf;

use thiserror::Error;

use classboard_core::{CardId, GroupingKey};

use crate::ports::{BoardError, SourceError};

/// Errors that abort a whole operation (a run, a dedupe pass, a wipe).
///
/// Per-item board failures during apply do not surface here; they are
/// collected as [`ItemError`]s so the rest of the pass can proceed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source fetch failed; nothing on the board was touched.
    #[error("source fetch failed: {0}")]
    Fetch(#[source] SourceError),

    /// The board snapshot could not be read.
    #[error("could not read board: {0}")]
    Snapshot(#[source] BoardError),

    /// Loading or saving sync state failed.
    #[error("state store error: {0}")]
    State(#[from] StateError),

    /// A wipe was requested with a confirmation token that is not the board id.
    #[error("refusing to wipe: confirmation '{got}' does not match board id '{expected}'")]
    WipeConfirmation { expected: String, got: String },
}

/// Errors from the persistent state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error on save.
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single planned board mutation did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The plan asked to change a card that was classified as manually touched.
    #[error("refusing to modify manually edited card {card}")]
    ManualEditRefused { card: CardId },

    /// The group has no list on the board (layout failed or never ran).
    #[error("no list on the board for group {group}")]
    MissingList { group: GroupingKey },
}

/// A failed item, reported in the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// What was being done, e.g. `create assignment:1:2`.
    pub action: String,
    pub error: ApplyError,
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.action, self.error)
    }
}

/// Convenience constructor for [`StateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}
