//! classboard core library — domain types, sync-key markers, configuration.
//!
//! - [`types`] — newtypes, source records and board objects
//! - [`sync_key`] — the identity marker embedded in card descriptions
//! - [`config`] — `~/.classboard/config.yaml` load / save / init
//! - [`error`] — [`ConfigError`], [`SyncKeyError`]

pub mod config;
pub mod error;
pub mod sync_key;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, SyncKeyError};
pub use sync_key::SyncKey;
pub use types::{
    BoardCard, BoardList, BoardSnapshot, CardId, GroupingKey, Label, LabelId, ListId,
    RecordFilter, RecordId, RecordKind, SourceGroup, SourceRecord, CLASS_INFO_PREFIX,
};
