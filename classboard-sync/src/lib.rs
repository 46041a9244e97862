//! # classboard-sync
//!
//! Reconciliation of source records onto a kanban board.
//!
//! Call [`pipeline::run`] for a full pass, [`dedupe::run`] to collapse
//! duplicate cards, or [`wipe::wipe`] to clear what the tool manages. The
//! board and the source are reached only through the [`ports`] traits.

pub mod dedupe;
pub mod error;
pub mod layout;
pub mod matcher;
pub mod memory;
pub mod pipeline;
pub mod ports;
pub mod reconcile;
pub mod render;
pub mod state;
pub mod touch;
pub mod wipe;

pub use error::{ApplyError, ItemError, StateError, SyncError};
pub use memory::MemoryBoard;
pub use pipeline::{run, RunOptions, RunSummary, WipeRequest};
pub use ports::{BoardApi, BoardError, CardDraft, CardPatch, SourceApi, SourceError};
pub use state::{FileStateStore, MemoryStateStore, StateStore, SyncState};
pub use wipe::{WipeMode, WipeReport};
