//! Sync state: a repairable cache of which board objects the tool owns.
//!
//! Persisted as a JSON document (default `~/.classboard/state.json`).
//! Writes use the atomic `.tmp` + rename pattern. The state is never a source
//! of truth: entries that point at objects no longer open on the board are
//! purged at the start of every run, and the sync key scan rebuilds lost
//! entries.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classboard_core::{
    BoardCard, BoardSnapshot, CardId, GroupingKey, LabelId, ListId, RecordId, SyncKey,
    CLASS_INFO_PREFIX,
};

use crate::error::{io_err, StateError};
use crate::render;

pub const STATE_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// On-disk state payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Required on disk; files without it are read as the legacy schema.
    pub version: u32,
    #[serde(default)]
    pub records: BTreeMap<RecordId, CardEntry>,
    #[serde(default)]
    pub groups: BTreeMap<GroupingKey, GroupEntry>,
    #[serde(default)]
    pub layout: LayoutEntry,
    #[serde(default)]
    pub meta: RunMeta,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            records: BTreeMap::new(),
            groups: BTreeMap::new(),
            layout: LayoutEntry::default(),
            meta: RunMeta::default(),
        }
    }
}

/// The card created for a source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    pub card: CardId,
    pub group: GroupingKey,
    /// Fingerprint of what the tool last wrote; empty when unknown.
    #[serde(default)]
    pub fingerprint: String,
    /// The card is treated as manually touched regardless of its content.
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    /// Migrated entry whose card does not carry a sync key yet.
    #[serde(default, skip_serializing_if = "is_false")]
    pub legacy: bool,
}

impl CardEntry {
    pub fn new(card: CardId, group: GroupingKey, fingerprint: String) -> Self {
        Self {
            card,
            group,
            fingerprint,
            locked: false,
            legacy: false,
        }
    }
}

/// Board objects owned by one grouping key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelId>,
    /// The label was created by the tool rather than adopted by name.
    #[serde(default, skip_serializing_if = "is_false")]
    pub owns_label: bool,
    /// Allocated once; kept even when the label itself is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_card: Option<CardId>,
}

/// Board objects that belong to no group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_list: Option<ListId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_card: Option<CardId>,
    /// Utility lists by name.
    #[serde(default)]
    pub utility_lists: BTreeMap<String, ListId>,
    /// Tracked lists the tool created. Lists adopted by name are tracked
    /// but never archived by a managed wipe.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub owned_lists: BTreeSet<ListId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

/// What [`SyncState::purge_missing`] dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub cards: usize,
    pub lists: usize,
    pub labels: usize,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.cards == 0 && self.lists == 0 && self.labels == 0
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn class_info_group(record: &RecordId) -> Option<GroupingKey> {
    record
        .as_str()
        .strip_prefix(CLASS_INFO_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(GroupingKey::from)
}

impl SyncState {
    pub fn group_list(&self, group: &GroupingKey) -> Option<&ListId> {
        self.groups.get(group).and_then(|g| g.list.as_ref())
    }

    pub fn group_label(&self, group: &GroupingKey) -> Option<&LabelId> {
        self.groups.get(group).and_then(|g| g.label.as_ref())
    }

    pub fn owns_list(&self, list: &ListId) -> bool {
        self.layout.owned_lists.contains(list)
    }

    /// Tracked labels the tool created.
    pub fn owned_labels(&self) -> Vec<LabelId> {
        self.groups
            .values()
            .filter(|g| g.owns_label)
            .filter_map(|g| g.label.clone())
            .collect()
    }

    /// Forget `label`, keeping the group's color.
    pub fn forget_label(&mut self, label: &LabelId) {
        for group in self.groups.values_mut() {
            if group.label.as_ref() == Some(label) {
                group.label = None;
                group.owns_label = false;
            }
        }
    }

    /// The card state associates with `key`, whatever kind of card it is.
    pub fn tracked_card(&self, key: &SyncKey) -> Option<&CardId> {
        if key.record == RecordId::token_card() {
            return self.layout.token_card.as_ref();
        }
        if let Some(group) = class_info_group(&key.record) {
            return self.groups.get(&group).and_then(|g| g.info_card.as_ref());
        }
        self.records.get(&key.record).map(|e| &e.card)
    }

    /// Point the entry for `key` at `card`. A record entry that changes card
    /// loses its fingerprint.
    pub fn track_card(&mut self, key: &SyncKey, card: &CardId) {
        if key.record == RecordId::token_card() {
            self.layout.token_card = Some(card.clone());
            return;
        }
        if let Some(group) = class_info_group(&key.record) {
            self.groups.entry(group).or_default().info_card = Some(card.clone());
            return;
        }
        match self.records.get_mut(&key.record) {
            Some(entry) if &entry.card == card => {}
            Some(entry) => {
                entry.card = card.clone();
                entry.fingerprint.clear();
            }
            None => {
                self.records.insert(
                    key.record.clone(),
                    CardEntry::new(card.clone(), key.group.clone(), String::new()),
                );
            }
        }
    }

    /// Drop every reference to `card`. Returns true if anything referenced it.
    pub fn forget_card(&mut self, card: &CardId) -> bool {
        let before = self.records.len();
        self.records.retain(|_, e| &e.card != card);
        let mut found = self.records.len() != before;
        for group in self.groups.values_mut() {
            if group.info_card.as_ref() == Some(card) {
                group.info_card = None;
                found = true;
            }
        }
        if self.layout.token_card.as_ref() == Some(card) {
            self.layout.token_card = None;
            found = true;
        }
        found
    }

    /// Drop every reference to `list`.
    pub fn forget_list(&mut self, list: &ListId) {
        for group in self.groups.values_mut() {
            if group.list.as_ref() == Some(list) {
                group.list = None;
            }
        }
        if self.layout.token_list.as_ref() == Some(list) {
            self.layout.token_list = None;
        }
        self.layout.utility_lists.retain(|_, id| id != list);
        self.layout.owned_lists.remove(list);
    }

    /// Every card the tool tracks, with the key it is tracked under.
    pub fn tracked_cards(&self) -> Vec<(SyncKey, CardId)> {
        let mut out = Vec::new();
        if let Some(card) = &self.layout.token_card {
            out.push((
                SyncKey {
                    record: RecordId::token_card(),
                    group: GroupingKey::layout(),
                },
                card.clone(),
            ));
        }
        for (group, entry) in &self.groups {
            if let Some(card) = &entry.info_card {
                out.push((
                    SyncKey {
                        record: RecordId::class_info(group),
                        group: group.clone(),
                    },
                    card.clone(),
                ));
            }
        }
        for (record, entry) in &self.records {
            out.push((
                SyncKey {
                    record: record.clone(),
                    group: entry.group.clone(),
                },
                entry.card.clone(),
            ));
        }
        out
    }

    /// Every list the tool tracks.
    pub fn tracked_lists(&self) -> Vec<ListId> {
        let mut out: Vec<ListId> = self.layout.token_list.iter().cloned().collect();
        out.extend(self.groups.values().filter_map(|g| g.list.clone()));
        out.extend(self.layout.utility_lists.values().cloned());
        out.sort();
        out.dedup();
        out
    }

    /// Colors persisted for groups other than `except`.
    pub fn colors_in_use(&self, except: &GroupingKey) -> BTreeSet<&str> {
        self.groups
            .iter()
            .filter(|(key, _)| *key != except)
            .filter_map(|(_, g)| g.color.as_deref())
            .collect()
    }

    /// Remove entries that reference objects not open in `snapshot`.
    pub fn purge_missing(&mut self, snapshot: &BoardSnapshot) -> PurgeReport {
        let mut report = PurgeReport::default();
        let open_card = |id: &CardId| snapshot.card(id).is_some();
        let open_list = |id: &ListId| snapshot.list(id).is_some();

        let before = self.records.len();
        self.records.retain(|_, e| open_card(&e.card));
        report.cards += before - self.records.len();

        for group in self.groups.values_mut() {
            if group.list.as_ref().is_some_and(|l| !open_list(l)) {
                group.list = None;
                report.lists += 1;
            }
            if group.label.as_ref().is_some_and(|l| snapshot.label(l).is_none()) {
                group.label = None;
                group.owns_label = false;
                report.labels += 1;
            }
            if group.info_card.as_ref().is_some_and(|c| !open_card(c)) {
                group.info_card = None;
                report.cards += 1;
            }
        }

        if self.layout.token_list.as_ref().is_some_and(|l| !open_list(l)) {
            self.layout.token_list = None;
            report.lists += 1;
        }
        if self.layout.token_card.as_ref().is_some_and(|c| !open_card(c)) {
            self.layout.token_card = None;
            report.cards += 1;
        }
        let before = self.layout.utility_lists.len();
        self.layout.utility_lists.retain(|_, id| open_list(id));
        report.lists += before - self.layout.utility_lists.len();
        self.layout.owned_lists.retain(|id| open_list(id));

        report
    }

    /// Record a card the tool just wrote.
    pub(crate) fn record_written(&mut self, record: &RecordId, group: &GroupingKey, card: &BoardCard) {
        self.records.insert(
            record.clone(),
            CardEntry::new(card.id.clone(), group.clone(), render::card_fingerprint(card)),
        );
    }
}

// ---------------------------------------------------------------------------
// Legacy schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateCompat {
    Current(SyncState),
    Legacy(LegacyState),
}

#[derive(Debug, Default, Deserialize)]
struct LegacyState {
    #[serde(default)]
    course_to_list: BTreeMap<String, String>,
    #[serde(default)]
    item_to_card: BTreeMap<String, LegacyItem>,
    #[serde(default)]
    assignment_to_card: BTreeMap<String, LegacyItem>,
    #[serde(default)]
    course_info_card: BTreeMap<String, String>,
    #[serde(default)]
    managed_list_ids: BTreeMap<String, bool>,
    #[serde(default)]
    meta: LegacyMeta,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyItem {
    #[serde(default)]
    card_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    rendered_name: String,
    #[serde(default)]
    rendered_desc: String,
    #[serde(default)]
    rendered_due: String,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyMeta {
    #[serde(default)]
    token_list_id: Option<String>,
    #[serde(default)]
    token_card_id: Option<String>,
    #[serde(default)]
    protected_list_ids: Vec<String>,
}

impl LegacyItem {
    fn into_entry(self, group: GroupingKey) -> Option<CardEntry> {
        if self.card_id.is_empty() {
            return None;
        }
        let fingerprint = if self.rendered_name.is_empty() {
            String::new()
        } else {
            let due = DateTime::parse_from_rfc3339(&self.rendered_due)
                .ok()
                .map(|d| d.with_timezone(&Utc));
            render::fingerprint(&self.rendered_name, &self.rendered_desc, due)
        };
        Some(CardEntry {
            card: CardId::from(self.card_id),
            group,
            fingerprint,
            locked: self.locked || matches!(self.status.as_str(), "manual" | "done"),
            legacy: true,
        })
    }
}

impl LegacyState {
    fn migrate(self) -> SyncState {
        let mut state = SyncState::default();

        for (key, item) in self.item_to_card {
            // `<kind>:<course>:<item>`
            let mut parts = key.splitn(3, ':');
            let (Some(_), Some(course), Some(_)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if let Some(entry) = item.into_entry(GroupingKey::from(course)) {
                state.records.insert(RecordId::from(key), entry);
            }
        }
        for (key, item) in self.assignment_to_card {
            // `<course>:<assignment>`
            let Some((course, assignment)) = key.split_once(':') else {
                continue;
            };
            let record = RecordId::from(format!("assignment:{course}:{assignment}"));
            if state.records.contains_key(&record) {
                continue;
            }
            if let Some(entry) = item.into_entry(GroupingKey::from(course)) {
                state.records.insert(record, entry);
            }
        }

        for (course, list) in self.course_to_list {
            if !list.is_empty() {
                state.groups.entry(GroupingKey::from(course)).or_default().list =
                    Some(ListId::from(list));
            }
        }
        for (course, card) in self.course_info_card {
            if !card.is_empty() {
                state.groups.entry(GroupingKey::from(course)).or_default().info_card =
                    Some(CardId::from(card));
            }
        }
        state.layout.token_list = self
            .meta
            .token_list_id
            .filter(|s| !s.is_empty())
            .map(ListId::from);
        state.layout.token_card = self
            .meta
            .token_card_id
            .filter(|s| !s.is_empty())
            .map(CardId::from);
        let protected: BTreeSet<&str> =
            self.meta.protected_list_ids.iter().map(String::as_str).collect();
        state.layout.owned_lists = self
            .managed_list_ids
            .iter()
            .filter(|(id, managed)| **managed && !id.is_empty() && !protected.contains(id.as_str()))
            .map(|(id, _)| ListId::from(id.as_str()))
            .collect();
        state
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Persistent storage for [`SyncState`].
pub trait StateStore {
    /// Load the state. Missing or unreadable state yields an empty state;
    /// only I/O failures are errors.
    fn load(&self) -> Result<SyncState, StateError>;

    fn save(&self, state: &SyncState) -> Result<(), StateError>;
}

/// Parse a state document, migrating the legacy schema.
pub fn parse_state(contents: &str) -> Result<SyncState, serde_json::Error> {
    match serde_json::from_str::<StateCompat>(contents)? {
        StateCompat::Current(state) => Ok(state),
        StateCompat::Legacy(legacy) => {
            tracing::info!("migrating legacy state schema");
            Ok(legacy.migrate())
        }
    }
}

/// Load state from `path`.
///
/// Returns an empty state if the file does not exist or does not parse.
pub fn load_from(path: &Path) -> Result<SyncState, StateError> {
    if !path.exists() {
        return Ok(SyncState::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    match parse_state(&contents) {
        Ok(state) => Ok(state),
        Err(e) => {
            tracing::warn!(
                "state at {} is unreadable ({e}); starting from empty state",
                path.display()
            );
            Ok(SyncState::default())
        }
    }
}

/// Save state to `path` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_to(path: &Path, state: &SyncState) -> Result<(), StateError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(state)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| io_err(&tmp, e))?;
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<SyncState, StateError> {
        load_from(&self.path)
    }

    fn save(&self, state: &SyncState) -> Result<(), StateError> {
        save_to(&self.path, state)
    }
}

/// In-process store; counts saves.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RefCell<SyncState>,
    saves: Cell<usize>,
}

impl MemoryStateStore {
    pub fn new(state: SyncState) -> Self {
        Self {
            state: RefCell::new(state),
            saves: Cell::new(0),
        }
    }

    /// A copy of the last saved state.
    pub fn current(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<SyncState, StateError> {
        Ok(self.state.borrow().clone())
    }

    fn save(&self, state: &SyncState) -> Result<(), StateError> {
        *self.state.borrow_mut() = state.clone();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::{BoardList, Label};
    use tempfile::TempDir;

    fn sample_state() -> SyncState {
        let mut state = SyncState::default();
        state.records.insert(
            RecordId::from("assignment:1:2"),
            CardEntry::new(CardId::from("c1"), GroupingKey::from("1"), "abc".into()),
        );
        state.groups.insert(
            GroupingKey::from("1"),
            GroupEntry {
                list: Some(ListId::from("l1")),
                label: Some(LabelId::from("lb1")),
                owns_label: true,
                color: Some("green".into()),
                info_card: Some(CardId::from("info1")),
            },
        );
        state.layout.token_list = Some(ListId::from("tok"));
        state
    }

    #[test]
    fn empty_state_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let state = load_from(&tmp.path().join("state.json")).unwrap();
        assert_eq!(state, SyncState::default());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("state.json");
        let state = sample_state();
        save_to(&path, &state).unwrap();
        assert_eq!(load_from(&path).unwrap(), state);
        assert!(!tmp_path(&path).exists(), "tmp file should be renamed away");
    }

    #[test]
    fn corrupt_state_loads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_from(&path).unwrap(), SyncState::default());
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert_eq!(load_from(&path).unwrap(), SyncState::default());
    }

    #[test]
    fn legacy_item_schema_is_migrated() {
        let legacy = r#"{
            "course_to_list": {"101": "L101"},
            "item_to_card": {
                "assignment:101:7": {"card_id": "C7", "status": "active", "locked": false,
                    "origin_list_id": "L101", "rendered_name": "HW7",
                    "rendered_desc": "body", "rendered_due": "2026-09-01T12:00:00+00:00"},
                "event:101:9": {"card_id": "C9", "status": "done"},
                "broken": {"card_id": "X"}
            },
            "managed_list_ids": {"L101": true},
            "course_info_card": {"101": "INFO"},
            "meta": {"token_list_id": "TOK", "token_card_id": "TC", "protected_list_ids": []}
        }"#;
        let state = parse_state(legacy).unwrap();
        assert_eq!(state.version, STATE_VERSION);

        let hw = &state.records[&RecordId::from("assignment:101:7")];
        assert_eq!(hw.card, CardId::from("C7"));
        assert_eq!(hw.group, GroupingKey::from("101"));
        assert!(hw.legacy);
        assert!(!hw.locked);
        let due = DateTime::parse_from_rfc3339("2026-09-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(hw.fingerprint, render::fingerprint("HW7", "body", Some(due)));

        let ev = &state.records[&RecordId::from("event:101:9")];
        assert!(ev.locked, "done items stay hands-off");
        assert!(ev.fingerprint.is_empty());

        assert!(!state.records.contains_key(&RecordId::from("broken")));
        let group = &state.groups[&GroupingKey::from("101")];
        assert_eq!(group.list, Some(ListId::from("L101")));
        assert_eq!(group.info_card, Some(CardId::from("INFO")));
        assert_eq!(state.layout.token_list, Some(ListId::from("TOK")));
        assert_eq!(state.layout.token_card, Some(CardId::from("TC")));
    }

    #[test]
    fn legacy_managed_lists_become_owned_unless_protected() {
        let legacy = r#"{
            "course_to_list": {"101": "L101", "102": "L102"},
            "managed_list_ids": {"L101": true, "L102": false, "TOK": true, "DONE": true},
            "meta": {"token_list_id": "TOK", "protected_list_ids": ["DONE"]}
        }"#;
        let state = parse_state(legacy).unwrap();
        let owned: Vec<&str> = state.layout.owned_lists.iter().map(ListId::as_str).collect();
        assert_eq!(owned, vec!["L101", "TOK"]);
        assert!(state.owns_list(&ListId::from("L101")));
        assert!(!state.owns_list(&ListId::from("L102")));
        assert!(state.owned_labels().is_empty());
    }

    #[test]
    fn oldest_assignment_schema_is_migrated() {
        let legacy = r#"{"assignment_to_card": {"101:7": {"card_id": "C7", "checksum": "x"}}}"#;
        let state = parse_state(legacy).unwrap();
        let entry = &state.records[&RecordId::from("assignment:101:7")];
        assert_eq!(entry.card, CardId::from("C7"));
        assert_eq!(entry.group, GroupingKey::from("101"));
    }

    #[test]
    fn purge_drops_objects_not_on_board() {
        let mut state = sample_state();
        let snapshot = BoardSnapshot {
            board_id: "b".into(),
            lists: vec![BoardList {
                id: ListId::from("l1"),
                name: "CS101".into(),
                pos: 1.0,
            }],
            cards: vec![],
            labels: vec![Label {
                id: LabelId::from("lb1"),
                name: "CS101".into(),
                color: "green".into(),
            }],
        };
        let report = state.purge_missing(&snapshot);
        assert_eq!(
            report,
            PurgeReport {
                cards: 2,
                lists: 1,
                labels: 0
            }
        );
        assert!(state.records.is_empty());
        let group = &state.groups[&GroupingKey::from("1")];
        assert_eq!(group.list, Some(ListId::from("l1")));
        assert_eq!(group.info_card, None);
        assert_eq!(group.color.as_deref(), Some("green"));
        assert_eq!(state.layout.token_list, None);
    }

    #[test]
    fn track_card_repoints_each_kind() {
        let mut state = sample_state();
        let group = GroupingKey::from("1");

        let rec = SyncKey::new(RecordId::from("assignment:1:2"), group.clone()).unwrap();
        state.track_card(&rec, &CardId::from("c9"));
        let entry = &state.records[&rec.record];
        assert_eq!(entry.card, CardId::from("c9"));
        assert!(entry.fingerprint.is_empty());

        let info = SyncKey::new(RecordId::class_info(&group), group.clone()).unwrap();
        state.track_card(&info, &CardId::from("info2"));
        assert_eq!(state.tracked_card(&info), Some(&CardId::from("info2")));

        let token = SyncKey::new(RecordId::token_card(), GroupingKey::layout()).unwrap();
        state.track_card(&token, &CardId::from("tc"));
        assert_eq!(state.layout.token_card, Some(CardId::from("tc")));

        assert!(state.forget_card(&CardId::from("c9")));
        assert!(!state.records.contains_key(&rec.record));
        assert!(!state.forget_card(&CardId::from("nope")));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStateStore::default();
        assert_eq!(store.load().unwrap(), SyncState::default());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current(), sample_state());
    }
}
