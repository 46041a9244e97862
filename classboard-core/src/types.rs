//! Domain types shared by the sync engine and the API clients.
//!
//! Identities are newtypes over `String`; timestamps are `DateTime<Utc>`.
//! Board objects describe *open* objects only: the board clients never put
//! archived lists or cards into a [`BoardSnapshot`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync_key::SyncKey;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Stable identity of a source record, e.g. `assignment:1234:98765`.
    RecordId
);
string_id!(
    /// Identity of the owning collection (a course id).
    GroupingKey
);
string_id!(
    /// Board list identity.
    ListId
);
string_id!(
    /// Board card identity.
    CardId
);
string_id!(
    /// Board label identity.
    LabelId
);

/// Prefix of the record identity carried by a group's "Class Info" card.
pub const CLASS_INFO_PREFIX: &str = "class-info";

/// Record identity carried by the token/countdown card.
pub const TOKEN_CARD_RECORD: &str = "token-countdown";

/// Grouping key used for layout objects that belong to no course.
pub const LAYOUT_GROUP: &str = "layout";

impl RecordId {
    /// `<kind>:<group>:<item>` — the kind is part of the key so identities are
    /// never shared between assignments and events.
    pub fn for_item(kind: RecordKind, group: &GroupingKey, item: &str) -> Self {
        Self(format!("{kind}:{group}:{item}"))
    }

    /// Identity of the pinned info card of `group`.
    pub fn class_info(group: &GroupingKey) -> Self {
        Self(format!("{CLASS_INFO_PREFIX}:{group}"))
    }

    pub fn token_card() -> Self {
        Self::from(TOKEN_CARD_RECORD)
    }

    /// True for identities owned by the board layout rather than a source record.
    pub fn is_layout(&self) -> bool {
        self.0 == TOKEN_CARD_RECORD || self.0.starts_with(&format!("{CLASS_INFO_PREFIX}:"))
    }
}

impl GroupingKey {
    pub fn layout() -> Self {
        Self::from(LAYOUT_GROUP)
    }
}

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// The kind of source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Assignment,
    Event,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Assignment => write!(f, "assignment"),
            RecordKind::Event => write!(f, "event"),
        }
    }
}

/// A unit of work or event fetched from the origin system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub group: GroupingKey,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Canonical link back to the record in the origin system.
    #[serde(default)]
    pub url: String,
}

/// An owning collection (course) as reported by the source API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub key: GroupingKey,
    /// Display name; used for the list and label names.
    pub name: String,
    /// Free-form text rendered into the "Class Info" card.
    #[serde(default)]
    pub info: String,
}

/// Fetch window handed to the source client. The sync core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub due_within_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            due_within_days: 30,
            term_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Board side
// ---------------------------------------------------------------------------

/// An open list on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardList {
    pub id: ListId,
    pub name: String,
    pub pos: f64,
}

/// An open card on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardCard {
    pub id: CardId,
    pub list: ListId,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeSet<LabelId>,
    pub pos: f64,
    pub last_activity: DateTime<Utc>,
}

impl BoardCard {
    /// The embedded sync key, if the description still carries one.
    pub fn sync_key(&self) -> Option<SyncKey> {
        SyncKey::extract(&self.desc)
    }
}

/// A board label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub color: String,
}

/// Everything open on the board at the start of a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board_id: String,
    #[serde(default)]
    pub lists: Vec<BoardList>,
    #[serde(default)]
    pub cards: Vec<BoardCard>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl BoardSnapshot {
    pub fn list(&self, id: &ListId) -> Option<&BoardList> {
        self.lists.iter().find(|l| &l.id == id)
    }

    pub fn card(&self, id: &CardId) -> Option<&BoardCard> {
        self.cards.iter().find(|c| &c.id == id)
    }

    pub fn card_mut(&mut self, id: &CardId) -> Option<&mut BoardCard> {
        self.cards.iter_mut().find(|c| &c.id == id)
    }

    pub fn label(&self, id: &LabelId) -> Option<&Label> {
        self.labels.iter().find(|l| &l.id == id)
    }

    pub fn list_named(&self, name: &str) -> Option<&BoardList> {
        self.lists.iter().find(|l| l.name == name)
    }

    pub fn label_named(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.name == name)
    }

    /// Cards of `list`, ordered by position (ties by id).
    pub fn cards_in(&self, list: &ListId) -> Vec<&BoardCard> {
        let mut cards: Vec<&BoardCard> = self.cards.iter().filter(|c| &c.list == list).collect();
        cards.sort_by(|a, b| a.pos.total_cmp(&b.pos).then_with(|| a.id.cmp(&b.id)));
        cards
    }

    /// Lists ordered left to right.
    pub fn lists_ordered(&self) -> Vec<&BoardList> {
        let mut lists: Vec<&BoardList> = self.lists.iter().collect();
        lists.sort_by(|a, b| a.pos.total_cmp(&b.pos).then_with(|| a.id.cmp(&b.id)));
        lists
    }

    pub fn remove_card(&mut self, id: &CardId) -> Option<BoardCard> {
        let idx = self.cards.iter().position(|c| &c.id == id)?;
        Some(self.cards.remove(idx))
    }

    pub fn remove_list(&mut self, id: &ListId) -> Option<BoardList> {
        let idx = self.lists.iter().position(|l| &l.id == id)?;
        Some(self.lists.remove(idx))
    }

    pub fn remove_label(&mut self, id: &LabelId) -> Option<Label> {
        let idx = self.labels.iter().position(|l| &l.id == id)?;
        for card in &mut self.cards {
            card.labels.remove(id);
        }
        Some(self.labels.remove(idx))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
