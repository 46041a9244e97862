//! Collaborator seams: the source API and the board API.
//!
//! The sync core talks to both systems only through these traits. HTTP
//! clients live in the CLI crate; tests use [`crate::memory::MemoryBoard`]
//! and hand-built sources.

use chrono::{DateTime, Utc};
use thiserror::Error;

use classboard_core::{
    BoardCard, BoardList, BoardSnapshot, CardId, Label, LabelId, ListId, RecordFilter,
    SourceGroup, SourceRecord,
};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Failure talking to the origin system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Payload(String),
}

/// Read-only access to the origin system.
pub trait SourceApi {
    /// Groups (courses) visible under `filter`.
    fn fetch_groups(&self, filter: &RecordFilter) -> Result<Vec<SourceGroup>, SourceError>;

    /// Records of `groups` inside the fetch window.
    fn fetch_records(
        &self,
        filter: &RecordFilter,
        groups: &[SourceGroup],
    ) -> Result<Vec<SourceRecord>, SourceError>;
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Failure of a single board call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("rate limited by the board API")]
    RateLimited,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// A card to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct CardDraft {
    pub list: ListId,
    pub name: String,
    pub desc: String,
    pub due: Option<DateTime<Utc>>,
    pub labels: Vec<LabelId>,
    pub pos: f64,
}

/// Field-level changes to an existing card. `None` leaves a field alone;
/// `due: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub pos: Option<f64>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.desc.is_none() && self.due.is_none() && self.pos.is_none()
    }

    /// Apply the patch to a local copy of the card.
    pub fn apply_to(&self, card: &mut BoardCard) {
        if let Some(name) = &self.name {
            card.name = name.clone();
        }
        if let Some(desc) = &self.desc {
            card.desc = desc.clone();
        }
        if let Some(due) = self.due {
            card.due = due;
        }
        if let Some(pos) = self.pos {
            card.pos = pos;
        }
    }
}

/// Read/write access to the destination board.
///
/// Snapshots contain open objects only. Archiving is the only removal the
/// core ever asks for.
pub trait BoardApi {
    /// Identity of the board; also the confirmation token for wipes.
    fn board_id(&self) -> &str;

    fn snapshot(&self) -> Result<BoardSnapshot, BoardError>;

    fn create_list(&mut self, name: &str, pos: f64) -> Result<BoardList, BoardError>;

    fn create_label(&mut self, name: &str, color: &str) -> Result<Label, BoardError>;

    fn create_card(&mut self, draft: &CardDraft) -> Result<BoardCard, BoardError>;

    /// Returns the card as stored by the board after the update.
    fn update_card(&mut self, card: &CardId, patch: &CardPatch) -> Result<BoardCard, BoardError>;

    fn add_label(&mut self, card: &CardId, label: &LabelId) -> Result<(), BoardError>;

    fn archive_card(&mut self, card: &CardId) -> Result<(), BoardError>;

    fn archive_list(&mut self, list: &ListId) -> Result<(), BoardError>;

    fn archive_label(&mut self, label: &LabelId) -> Result<(), BoardError>;
}
