//! Board layout: the lists, labels and pinned cards every run relies on.
//!
//! Each object is resolved by state first, then by name (lists, labels) or
//! by sync key marker (cards), and created only when absent. In dry-run
//! mode nothing on the board changes and missing objects are reported as
//! `WouldCreate`.
//!
//! Left to right the board reads: token list, one list per group, then the
//! utility lists.

use std::collections::HashSet;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use classboard_core::config::LayoutSettings;
use classboard_core::{
    BoardCard, BoardSnapshot, CardId, GroupingKey, LabelId, ListId, RecordId, SourceGroup, SyncKey,
};

use crate::ports::{BoardApi, BoardError, CardDraft, CardPatch};
use crate::render;
use crate::state::SyncState;

/// Distance between consecutive card positions.
pub const POS_STEP: f64 = 16384.0;

pub const LABEL_PALETTE: [&str; 10] = [
    "green", "yellow", "orange", "red", "purple", "blue", "sky", "lime", "pink", "black",
];

/// Inputs for one layout pass.
#[derive(Debug, Clone)]
pub struct LayoutContext<'a> {
    pub settings: &'a LayoutSettings,
    pub groups: &'a [SourceGroup],
    pub token_expires_on: Option<NaiveDate>,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutObject {
    TokenList,
    TokenCard,
    GroupList(GroupingKey),
    GroupLabel(GroupingKey),
    InfoCard(GroupingKey),
    UtilityList(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// Tracked in state and open on the board.
    Present,
    /// Found on the board by name or marker; state repaired.
    Adopted,
    Created,
    Updated,
    WouldCreate,
    WouldUpdate,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutChange {
    pub object: LayoutObject,
    pub outcome: LayoutOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutReport {
    pub changes: Vec<LayoutChange>,
}

impl LayoutReport {
    fn count(&self, pred: impl Fn(&LayoutOutcome) -> bool) -> usize {
        self.changes.iter().filter(|c| pred(&c.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, LayoutOutcome::Created))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, LayoutOutcome::Updated))
    }

    pub fn adopted(&self) -> usize {
        self.count(|o| matches!(o, LayoutOutcome::Adopted))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, LayoutOutcome::WouldCreate | LayoutOutcome::WouldUpdate))
    }

    pub fn failures(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter_map(|c| match &c.outcome {
                LayoutOutcome::Failed(reason) => Some(format!("{:?}: {reason}", c.object)),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, object: &LayoutObject) -> Option<&LayoutOutcome> {
        self.changes
            .iter()
            .find(|c| &c.object == object)
            .map(|c| &c.outcome)
    }
}

/// Deterministic color for `group`: start at `sha256(group)[0] % palette`
/// and take the first color no other group holds. A persisted color always
/// wins over a fresh allocation.
pub fn allocate_color(group: &GroupingKey, state: &SyncState) -> String {
    if let Some(color) = state.groups.get(group).and_then(|g| g.color.clone()) {
        return color;
    }
    let used = state.colors_in_use(group);
    let len = LABEL_PALETTE.len();
    let start = Sha256::digest(group.as_str().as_bytes())[0] as usize % len;
    (0..len)
        .map(|i| LABEL_PALETTE[(start + i) % len])
        .find(|c| !used.contains(c))
        .unwrap_or(LABEL_PALETTE[start])
        .to_string()
}

/// Ensure the board layout. Never fails as a whole: board errors are
/// reported per object.
pub fn ensure(
    board: &mut dyn BoardApi,
    snapshot: &mut BoardSnapshot,
    state: &mut SyncState,
    ctx: &LayoutContext<'_>,
    dry_run: bool,
) -> LayoutReport {
    let mut groups: Vec<&SourceGroup> = ctx.groups.iter().collect();
    groups.sort_by(|a, b| a.key.cmp(&b.key));
    groups.dedup_by(|a, b| a.key == b.key);

    let mut pass = Pass {
        board,
        snapshot,
        state,
        ctx,
        dry_run,
        report: LayoutReport::default(),
    };
    pass.token_list();
    for group in &groups {
        pass.group_list(group);
    }
    for name in &ctx.settings.utility_lists {
        pass.utility_list(name);
    }
    for group in &groups {
        pass.group_label(group);
    }
    for group in &groups {
        pass.info_card(group);
    }
    pass.token_card();
    pass.report
}

struct Pass<'a, 'c> {
    board: &'a mut dyn BoardApi,
    snapshot: &'a mut BoardSnapshot,
    state: &'a mut SyncState,
    ctx: &'a LayoutContext<'c>,
    dry_run: bool,
    report: LayoutReport,
}

impl Pass<'_, '_> {
    fn record(&mut self, object: LayoutObject, outcome: LayoutOutcome) {
        match &outcome {
            LayoutOutcome::Present => tracing::debug!("layout {object:?}: present"),
            LayoutOutcome::Failed(reason) => tracing::warn!("layout {object:?} failed: {reason}"),
            LayoutOutcome::WouldCreate | LayoutOutcome::WouldUpdate => {
                tracing::info!("[dry-run] layout {object:?}: {outcome:?}")
            }
            other => tracing::info!("layout {object:?}: {other:?}"),
        }
        self.report.changes.push(LayoutChange { object, outcome });
    }

    fn list_open(&self, id: Option<&ListId>) -> Option<ListId> {
        id.filter(|l| self.snapshot.list(l).is_some()).cloned()
    }

    fn card_open(&self, id: Option<&CardId>) -> Option<CardId> {
        id.filter(|c| self.snapshot.card(c).is_some()).cloned()
    }

    /// An open list named `name` that state does not already use for
    /// another role.
    fn untracked_list_named(&self, name: &str) -> Option<ListId> {
        let tracked: HashSet<ListId> = self.state.tracked_lists().into_iter().collect();
        self.snapshot
            .lists_ordered()
            .into_iter()
            .find(|l| l.name == name && !tracked.contains(&l.id))
            .map(|l| l.id.clone())
    }

    fn create_list(&mut self, name: &str, pos: f64) -> Result<Option<ListId>, BoardError> {
        if self.dry_run {
            return Ok(None);
        }
        let list = self.board.create_list(name, pos)?;
        let id = list.id.clone();
        self.snapshot.lists.push(list);
        Ok(Some(id))
    }

    /// Resolve a list: present, adopted by name, or created at `pos`.
    /// Returns the outcome and the resolved id.
    fn resolve_list(
        &mut self,
        tracked: Option<ListId>,
        name: &str,
        pos: impl FnOnce(&BoardSnapshot, &SyncState) -> f64,
    ) -> (LayoutOutcome, Option<ListId>) {
        if let Some(id) = self.list_open(tracked.as_ref()) {
            return (LayoutOutcome::Present, Some(id));
        }
        if let Some(id) = self.untracked_list_named(name) {
            return (LayoutOutcome::Adopted, Some(id));
        }
        let pos = pos(self.snapshot, self.state);
        match self.create_list(name, pos) {
            Ok(Some(id)) => {
                self.state.layout.owned_lists.insert(id.clone());
                (LayoutOutcome::Created, Some(id))
            }
            Ok(None) => (LayoutOutcome::WouldCreate, None),
            Err(e) => (LayoutOutcome::Failed(e.to_string()), None),
        }
    }

    fn token_list(&mut self) {
        let tracked = self.state.layout.token_list.clone();
        let name = self.ctx.settings.token_list.clone();
        let (outcome, id) = self.resolve_list(tracked, &name, |snap, _| leftmost_pos(snap));
        if id.is_some() {
            self.state.layout.token_list = id;
        }
        self.record(LayoutObject::TokenList, outcome);
    }

    fn group_list(&mut self, group: &SourceGroup) {
        let tracked = self.state.group_list(&group.key).cloned();
        let (outcome, id) =
            self.resolve_list(tracked, &group.name, |snap, state| before_utility_pos(snap, state));
        if id.is_some() {
            self.state.groups.entry(group.key.clone()).or_default().list = id;
        }
        self.record(LayoutObject::GroupList(group.key.clone()), outcome);
    }

    fn utility_list(&mut self, name: &str) {
        let tracked = self.state.layout.utility_lists.get(name).cloned();
        let (outcome, id) = self.resolve_list(tracked, name, |snap, _| end_pos(snap));
        if let Some(id) = id {
            self.state.layout.utility_lists.insert(name.to_string(), id);
        }
        self.record(LayoutObject::UtilityList(name.to_string()), outcome);
    }

    fn group_label(&mut self, group: &SourceGroup) {
        let object = LayoutObject::GroupLabel(group.key.clone());
        let tracked = self
            .state
            .group_label(&group.key)
            .and_then(|id| self.snapshot.label(id))
            .cloned();
        if let Some(label) = tracked {
            let entry = self.state.groups.entry(group.key.clone()).or_default();
            if entry.color.is_none() {
                entry.color = Some(label.color);
            }
            self.record(object, LayoutOutcome::Present);
            return;
        }

        let owned: HashSet<LabelId> = self
            .state
            .groups
            .values()
            .filter_map(|g| g.label.clone())
            .collect();
        let by_name = self
            .snapshot
            .labels
            .iter()
            .find(|l| l.name == group.name && !owned.contains(&l.id))
            .cloned();
        if let Some(label) = by_name {
            let entry = self.state.groups.entry(group.key.clone()).or_default();
            entry.label = Some(label.id);
            entry.owns_label = false;
            if entry.color.is_none() {
                entry.color = Some(label.color);
            }
            self.record(object, LayoutOutcome::Adopted);
            return;
        }

        let color = allocate_color(&group.key, self.state);
        self.state.groups.entry(group.key.clone()).or_default().color = Some(color.clone());
        if self.dry_run {
            self.record(object, LayoutOutcome::WouldCreate);
            return;
        }
        match self.board.create_label(&group.name, &color) {
            Ok(label) => {
                let entry = self.state.groups.entry(group.key.clone()).or_default();
                entry.label = Some(label.id.clone());
                entry.owns_label = true;
                self.snapshot.labels.push(label);
                self.record(object, LayoutOutcome::Created);
            }
            Err(e) => self.record(object, LayoutOutcome::Failed(e.to_string())),
        }
    }

    /// A card carrying `record`'s marker, preferring one already in `list`.
    fn card_with_marker(&self, record: &RecordId, list: &ListId) -> Option<CardId> {
        let mut found: Vec<&BoardCard> = self
            .snapshot
            .cards
            .iter()
            .filter(|c| c.sync_key().is_some_and(|k| &k.record == record))
            .collect();
        found.sort_by(|a, b| {
            (&a.list != list)
                .cmp(&(&b.list != list))
                .then_with(|| a.pos.total_cmp(&b.pos))
                .then_with(|| a.id.cmp(&b.id))
        });
        found.first().map(|c| c.id.clone())
    }

    fn info_card(&mut self, group: &SourceGroup) {
        let object = LayoutObject::InfoCard(group.key.clone());
        let Some(list) = self.state.group_list(&group.key).cloned() else {
            if self.dry_run {
                self.record(object, LayoutOutcome::WouldCreate);
            }
            return;
        };
        let key = match SyncKey::new(RecordId::class_info(&group.key), group.key.clone()) {
            Ok(key) => key,
            Err(e) => {
                self.record(object, LayoutOutcome::Failed(e.to_string()));
                return;
            }
        };
        let label = self.state.group_label(&group.key).cloned();

        let tracked = self.card_open(self.state.tracked_card(&key));
        let (found, mut outcome) = match tracked {
            Some(id) => (Some(id), LayoutOutcome::Present),
            None => match self.card_with_marker(&key.record, &list) {
                Some(id) => {
                    self.state.track_card(&key, &id);
                    (Some(id), LayoutOutcome::Adopted)
                }
                None => (None, LayoutOutcome::WouldCreate),
            },
        };

        let Some(card_id) = found else {
            let draft = CardDraft {
                list: list.clone(),
                name: self.ctx.settings.info_card_title.clone(),
                desc: render::info_description(group, &key),
                due: None,
                labels: label.into_iter().collect(),
                pos: first_pos(self.snapshot, &list, None),
            };
            let outcome = self.create_card(&key, &draft);
            self.record(object, outcome);
            return;
        };

        // Pin first, refresh the course info, add the label. A card dragged
        // to another list is left where the user put it, and a card that
        // lost its marker keeps its text.
        if let Some(card) = self.snapshot.card(&card_id).cloned() {
            if card.list == list {
                let mut patch = CardPatch::default();
                if !is_first(self.snapshot, &card) {
                    patch.pos = Some(first_pos(self.snapshot, &list, Some(&card.id)));
                }
                let desc = render::info_description(group, &key);
                if card.sync_key().as_ref() == Some(&key) && card.desc != desc {
                    patch.desc = Some(desc);
                }
                if !patch.is_empty() {
                    outcome = self.update_card(&card.id, &patch, outcome);
                }
                if let Some(label) = &label {
                    if !card.labels.contains(label) {
                        outcome = self.add_label(&card.id, label, outcome);
                    }
                }
            }
        }
        self.record(object, outcome);
    }

    fn token_card(&mut self) {
        let object = LayoutObject::TokenCard;
        let Some(list) = self.state.layout.token_list.clone() else {
            if self.dry_run {
                self.record(object, LayoutOutcome::WouldCreate);
            }
            return;
        };
        let key = SyncKey {
            record: RecordId::token_card(),
            group: GroupingKey::layout(),
        };
        let title = render::token_title(self.ctx.token_expires_on, self.ctx.today);

        let tracked = self.card_open(self.state.layout.token_card.as_ref());
        let (found, mut outcome) = match tracked {
            Some(id) => (Some(id), LayoutOutcome::Present),
            None => match self.card_with_marker(&key.record, &list) {
                Some(id) => {
                    self.state.track_card(&key, &id);
                    (Some(id), LayoutOutcome::Adopted)
                }
                None => (None, LayoutOutcome::WouldCreate),
            },
        };

        let Some(card_id) = found else {
            let draft = CardDraft {
                list,
                name: title,
                desc: render::token_description(&key),
                due: None,
                labels: Vec::new(),
                pos: POS_STEP,
            };
            let outcome = self.create_card(&key, &draft);
            self.record(object, outcome);
            return;
        };

        if let Some(card) = self.snapshot.card(&card_id).cloned() {
            if card.list == list {
                let mut patch = CardPatch::default();
                if card.name != title {
                    patch.name = Some(title);
                }
                if card.sync_key().is_none() {
                    patch.desc = Some(render::token_description(&key));
                }
                if !patch.is_empty() {
                    outcome = self.update_card(&card.id, &patch, outcome);
                }
            }
        }
        self.record(object, outcome);
    }

    fn create_card(&mut self, key: &SyncKey, draft: &CardDraft) -> LayoutOutcome {
        if self.dry_run {
            return LayoutOutcome::WouldCreate;
        }
        match self.board.create_card(draft) {
            Ok(card) => {
                self.state.track_card(key, &card.id);
                self.snapshot.cards.push(card);
                LayoutOutcome::Created
            }
            Err(e) => LayoutOutcome::Failed(e.to_string()),
        }
    }

    /// Apply `patch`; `prior` is kept when it already says more than
    /// `Updated` (an adoption stays an adoption).
    fn update_card(&mut self, card: &CardId, patch: &CardPatch, prior: LayoutOutcome) -> LayoutOutcome {
        if self.dry_run {
            return LayoutOutcome::WouldUpdate;
        }
        match self.board.update_card(card, patch) {
            Ok(updated) => {
                if let Some(local) = self.snapshot.card_mut(card) {
                    *local = updated;
                }
                escalate(prior, LayoutOutcome::Updated)
            }
            Err(e) => LayoutOutcome::Failed(e.to_string()),
        }
    }

    fn add_label(&mut self, card: &CardId, label: &LabelId, prior: LayoutOutcome) -> LayoutOutcome {
        if self.dry_run {
            return LayoutOutcome::WouldUpdate;
        }
        match self.board.add_label(card, label) {
            Ok(()) => {
                if let Some(local) = self.snapshot.card_mut(card) {
                    local.labels.insert(label.clone());
                }
                escalate(prior, LayoutOutcome::Updated)
            }
            Err(e) => LayoutOutcome::Failed(e.to_string()),
        }
    }
}

fn escalate(prior: LayoutOutcome, next: LayoutOutcome) -> LayoutOutcome {
    match prior {
        LayoutOutcome::Present => next,
        other => other,
    }
}

/// Left of every open list.
fn leftmost_pos(snapshot: &BoardSnapshot) -> f64 {
    snapshot
        .lists
        .iter()
        .map(|l| l.pos)
        .min_by(f64::total_cmp)
        .map_or(POS_STEP, |min| min / 2.0)
}

/// Right of every open list.
fn end_pos(snapshot: &BoardSnapshot) -> f64 {
    snapshot
        .lists
        .iter()
        .map(|l| l.pos)
        .max_by(f64::total_cmp)
        .map_or(POS_STEP, |max| max + POS_STEP)
}

/// Just left of the first utility list, or at the end when there is none.
fn before_utility_pos(snapshot: &BoardSnapshot, state: &SyncState) -> f64 {
    let first_utility = state
        .layout
        .utility_lists
        .values()
        .filter_map(|id| snapshot.list(id))
        .map(|l| l.pos)
        .min_by(f64::total_cmp);
    let Some(utility) = first_utility else {
        return end_pos(snapshot);
    };
    let previous = snapshot
        .lists
        .iter()
        .map(|l| l.pos)
        .filter(|p| *p < utility)
        .max_by(f64::total_cmp)
        .unwrap_or(0.0);
    (previous + utility) / 2.0
}

/// A position ahead of every other card in `list`.
fn first_pos(snapshot: &BoardSnapshot, list: &ListId, except: Option<&CardId>) -> f64 {
    let min = snapshot
        .cards
        .iter()
        .filter(|c| &c.list == list && Some(&c.id) != except)
        .map(|c| c.pos)
        .min_by(f64::total_cmp);
    match min {
        Some(min) if min <= POS_STEP => min / 2.0,
        _ => POS_STEP,
    }
}

fn is_first(snapshot: &BoardSnapshot, card: &BoardCard) -> bool {
    snapshot
        .cards
        .iter()
        .filter(|c| c.list == card.list && c.id != card.id)
        .all(|c| c.pos > card.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBoard;

    fn settings() -> LayoutSettings {
        LayoutSettings::default()
    }

    fn group(key: &str, name: &str) -> SourceGroup {
        SourceGroup {
            key: GroupingKey::from(key),
            name: name.to_string(),
            info: "Prof. Ada".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
    }

    fn run(board: &mut MemoryBoard, state: &mut SyncState, groups: &[SourceGroup], dry_run: bool) -> LayoutReport {
        let settings = settings();
        let ctx = LayoutContext {
            settings: &settings,
            groups,
            token_expires_on: NaiveDate::from_ymd_opt(2026, 10, 11),
            today: today(),
        };
        let mut snapshot = board.snapshot().unwrap();
        ensure(board, &mut snapshot, state, &ctx, dry_run)
    }

    #[test]
    fn first_run_builds_full_layout_in_order() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        let groups = [group("101", "CS101"), group("202", "MATH202")];
        let report = run(&mut board, &mut state, &groups, false);

        // token list, 2 group lists, 2 utility lists, 2 labels, 2 info cards, token card
        assert_eq!(report.created(), 10);
        assert!(report.failures().is_empty());

        let snap = board.snapshot().unwrap();
        let names: Vec<&str> = snap.lists_ordered().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Canvas Token", "CS101", "MATH202", "Done", "Parking Lot"]);

        let token = snap.card(state.layout.token_card.as_ref().unwrap()).unwrap();
        assert!(token.name.contains("10 days left"));

        let list = state.group_list(&GroupingKey::from("101")).unwrap();
        let cards = snap.cards_in(list);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Class Info");
        assert!(cards[0].labels.contains(state.group_label(&GroupingKey::from("101")).unwrap()));
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        let groups = [group("101", "CS101")];
        run(&mut board, &mut state, &groups, false);
        let mutations = board.mutation_count();

        let report = run(&mut board, &mut state, &groups, false);
        assert_eq!(report.created(), 0);
        assert_eq!(report.updated(), 0);
        assert_eq!(board.mutation_count(), mutations);
    }

    #[test]
    fn new_group_lands_before_utility_lists() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        run(&mut board, &mut state, &[group("101", "CS101")], false);
        run(
            &mut board,
            &mut state,
            &[group("101", "CS101"), group("303", "BIO303")],
            false,
        );
        let snap = board.snapshot().unwrap();
        let names: Vec<&str> = snap.lists_ordered().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Canvas Token", "CS101", "BIO303", "Done", "Parking Lot"]);
    }

    #[test]
    fn lost_state_adopts_existing_objects() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        let groups = [group("101", "CS101")];
        run(&mut board, &mut state, &groups, false);
        let color = state.groups[&GroupingKey::from("101")].color.clone();

        let mut fresh = SyncState::default();
        let report = run(&mut board, &mut fresh, &groups, false);
        assert_eq!(report.created(), 0);
        assert_eq!(report.adopted(), 7);
        assert_eq!(fresh.layout.token_card, state.layout.token_card);
        assert_eq!(fresh.groups[&GroupingKey::from("101")].info_card, state.groups[&GroupingKey::from("101")].info_card);
        assert_eq!(fresh.groups[&GroupingKey::from("101")].color, color);
    }

    #[test]
    fn only_created_lists_and_labels_are_owned() {
        let mut board = MemoryBoard::new("board1");
        let done = board.user_add_list("Done", 1_000.0);
        let label = board.create_label("CS101", "red").unwrap();
        let mut state = SyncState::default();

        run(&mut board, &mut state, &[group("101", "CS101")], false);

        assert_eq!(state.layout.utility_lists.get("Done"), Some(&done));
        assert!(!state.owns_list(&done));
        let entry = &state.groups[&GroupingKey::from("101")];
        assert_eq!(entry.label.as_ref(), Some(&label.id));
        assert!(!entry.owns_label);
        assert!(state.owns_list(entry.list.as_ref().unwrap()));
        assert!(state.owns_list(state.layout.token_list.as_ref().unwrap()));
        assert!(state.owns_list(&state.layout.utility_lists["Parking Lot"]));
    }

    #[test]
    fn info_card_text_follows_course_info() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        run(&mut board, &mut state, &[group("101", "CS101")], false);

        let mut changed = group("101", "CS101");
        changed.info = "Prof. Ada, Prof. Grace".to_string();
        let report = run(&mut board, &mut state, &[changed], false);

        assert_eq!(report.updated(), 1);
        let info = state.groups[&GroupingKey::from("101")].info_card.clone().unwrap();
        let snap = board.snapshot().unwrap();
        assert!(snap.card(&info).unwrap().desc.contains("Prof. Grace"));
    }

    #[test]
    fn info_card_without_its_marker_keeps_the_user_text() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        run(&mut board, &mut state, &[group("101", "CS101")], false);
        let info = state.groups[&GroupingKey::from("101")].info_card.clone().unwrap();
        board.user_edit(&info, |c| c.desc = "my own notes".to_string());

        let mut changed = group("101", "CS101");
        changed.info = "Prof. Grace".to_string();
        run(&mut board, &mut state, &[changed], false);

        let snap = board.snapshot().unwrap();
        assert_eq!(snap.card(&info).unwrap().desc, "my own notes");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        let report = run(&mut board, &mut state, &[group("101", "CS101")], true);
        assert_eq!(board.mutation_count(), 0);
        assert_eq!(report.created(), 0);
        assert!(report.pending() >= 6);
    }

    #[test]
    fn info_card_is_pinned_above_a_card_dragged_to_the_top() {
        let mut board = MemoryBoard::new("board1");
        let mut state = SyncState::default();
        let groups = [group("101", "CS101")];
        run(&mut board, &mut state, &groups, false);
        let list = state.group_list(&GroupingKey::from("101")).unwrap().clone();
        board.user_add_card(&list, "my note", "", POS_STEP / 4.0);

        let report = run(&mut board, &mut state, &groups, false);
        assert_eq!(
            report.outcome(&LayoutObject::InfoCard(GroupingKey::from("101"))),
            Some(&LayoutOutcome::Updated)
        );
        let snap = board.snapshot().unwrap();
        assert_eq!(snap.cards_in(&list)[0].name, "Class Info");
    }

    #[test]
    fn colors_are_stable_and_distinct() {
        let mut state = SyncState::default();
        let a = GroupingKey::from("101");
        let b = GroupingKey::from("202");
        let first = allocate_color(&a, &state);
        assert_eq!(allocate_color(&a, &state), first);
        state.groups.entry(a.clone()).or_default().color = Some(first.clone());
        let second = allocate_color(&b, &state);
        assert_ne!(first, second);
        assert!(LABEL_PALETTE.contains(&second.as_str()));
    }

    #[test]
    fn exhausted_palette_reuses_start_color() {
        let mut state = SyncState::default();
        for (i, color) in LABEL_PALETTE.iter().enumerate() {
            state.groups.entry(GroupingKey::from(format!("g{i}"))).or_default().color =
                Some(color.to_string());
        }
        let group = GroupingKey::from("new");
        let start = Sha256::digest(b"new")[0] as usize % LABEL_PALETTE.len();
        assert_eq!(allocate_color(&group, &state), LABEL_PALETTE[start]);
    }
}
