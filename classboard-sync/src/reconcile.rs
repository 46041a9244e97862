//! Record reconciliation: plan the card mutations that make the board
//! mirror the fetched records, then apply them.
//!
//! ## Per record
//!
//! 1. Resolve the card ([`IdentityMatcher`]).
//! 2. Unmatched → create in the group list. The only path that creates.
//! 3. Matched, not manually touched → patch title, description, due,
//!    label and position.
//! 4. Matched, manually touched → add the group label if missing; nothing
//!    else.
//! 5. Ambiguous → skipped, left for dedupe.
//!
//! Records that are tracked but absent from the fetch are left alone. Plans
//! never archive.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use classboard_core::{
    BoardCard, BoardSnapshot, CardId, GroupingKey, LabelId, ListId, RecordId, SourceRecord,
    SyncKey,
};

use crate::error::{ApplyError, ItemError};
use crate::layout::POS_STEP;
use crate::matcher::{IdentityMatcher, MatchOutcome, MatchSource};
use crate::ports::{BoardApi, CardDraft, CardPatch};
use crate::render;
use crate::state::SyncState;
use crate::touch::{due_order, TouchClassifier};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCard {
    pub record: RecordId,
    pub group: GroupingKey,
    pub name: String,
    pub desc: String,
    pub due: Option<DateTime<Utc>>,
    pub pos: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCard {
    pub record: RecordId,
    pub group: GroupingKey,
    pub card: CardId,
    /// The card was classified as manually touched; only labels may change.
    pub manual: bool,
    pub patch: CardPatch,
    pub add_label: Option<LabelId>,
}

/// A state entry to (re)point at a card found on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRepair {
    pub record: RecordId,
    pub group: GroupingKey,
    pub card: CardId,
    /// `None` when the card was already tracked and only its fingerprint is
    /// refreshed.
    pub via: Option<MatchSource>,
    /// Record the card's current content as what the tool wrote.
    pub refresh_fingerprint: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Several open cards qualify; run dedupe.
    Ambiguous(Vec<CardId>),
    /// The record or group identity cannot be embedded in a marker.
    InvalidKey(String),
    /// The fetch returned the same record identity twice.
    DuplicateRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub record: RecordId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub creates: Vec<CreateCard>,
    pub updates: Vec<UpdateCard>,
    pub repairs: Vec<StateRepair>,
    pub skipped: Vec<Skipped>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.repairs.is_empty()
    }

    pub fn ambiguous(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Ambiguous(_)))
            .count()
    }
}

/// One record that takes part in its group's ordering.
struct Slot {
    due: Option<DateTime<Utc>>,
    record: RecordId,
    target: SlotTarget,
}

enum SlotTarget {
    Create(usize),
    Update { index: usize, current_pos: f64 },
}

/// Plan the mutations for `records`. Pure: reads the snapshot and state,
/// touches nothing.
pub fn plan(records: &[SourceRecord], snapshot: &BoardSnapshot, state: &SyncState) -> Plan {
    let mut ordered: Vec<&SourceRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.group
            .cmp(&b.group)
            .then_with(|| due_order(a.due, b.due))
            .then_with(|| a.id.cmp(&b.id))
    });

    let matcher = IdentityMatcher::new(snapshot);
    let classifier = TouchClassifier::new(snapshot, state);
    let fetched: HashSet<&RecordId> = records.iter().map(|r| &r.id).collect();

    let mut plan = Plan::default();
    let mut claimed: HashSet<CardId> = HashSet::new();
    let mut seen: HashSet<&RecordId> = HashSet::new();
    let mut slots: BTreeMap<GroupingKey, Vec<Slot>> = BTreeMap::new();

    for record in ordered {
        if !seen.insert(&record.id) {
            plan.skipped.push(Skipped {
                record: record.id.clone(),
                reason: SkipReason::DuplicateRecord,
            });
            continue;
        }
        let key = match SyncKey::new(record.id.clone(), record.group.clone()) {
            Ok(key) => key,
            Err(e) => {
                plan.skipped.push(Skipped {
                    record: record.id.clone(),
                    reason: SkipReason::InvalidKey(e.to_string()),
                });
                continue;
            }
        };

        let (card_id, via) = match matcher.resolve(record, state, &claimed) {
            MatchOutcome::Unmatched => {
                slots.entry(record.group.clone()).or_default().push(Slot {
                    due: record.due,
                    record: record.id.clone(),
                    target: SlotTarget::Create(plan.creates.len()),
                });
                plan.creates.push(CreateCard {
                    record: record.id.clone(),
                    group: record.group.clone(),
                    name: record.title.trim().to_string(),
                    desc: render::record_description(record, &key),
                    due: record.due,
                    pos: 0.0,
                });
                continue;
            }
            MatchOutcome::Ambiguous(cards) => {
                tracing::warn!("{}: {} candidate cards, run dedupe", record.id, cards.len());
                plan.skipped.push(Skipped {
                    record: record.id.clone(),
                    reason: SkipReason::Ambiguous(cards),
                });
                continue;
            }
            MatchOutcome::Tracked(card) => (card, None),
            MatchOutcome::Adopted { card, via } => (card, Some(via)),
        };
        let Some(card) = snapshot.card(&card_id) else {
            continue;
        };
        claimed.insert(card_id.clone());

        let manual = classifier.is_touched(card);
        if manual {
            tracing::debug!("{}: card {} manually touched", record.id, card.id);
        }
        let add_label = state
            .group_label(&record.group)
            .filter(|l| !card.labels.contains(*l))
            .cloned();

        let patch = if manual {
            CardPatch::default()
        } else {
            content_patch(record, &key, card)
        };

        let needs_fingerprint = !manual && fingerprint_stale(state, &record.id, card);
        if via.is_some() || needs_fingerprint {
            plan.repairs.push(StateRepair {
                record: record.id.clone(),
                group: record.group.clone(),
                card: card.id.clone(),
                via,
                refresh_fingerprint: !manual,
            });
        }

        let index = plan.updates.len();
        plan.updates.push(UpdateCard {
            record: record.id.clone(),
            group: record.group.clone(),
            card: card.id.clone(),
            manual,
            patch,
            add_label,
        });
        let in_group_list = state.group_list(&record.group) == Some(&card.list);
        if !manual && in_group_list {
            slots.entry(record.group.clone()).or_default().push(Slot {
                due: record.due,
                record: record.id.clone(),
                target: SlotTarget::Update {
                    index,
                    current_pos: card.pos,
                },
            });
        }
    }

    for (group, mut group_slots) in slots {
        group_slots.sort_by(|a, b| due_order(a.due, b.due).then_with(|| a.record.cmp(&b.record)));
        let base = match state.group_list(&group) {
            Some(list) => first_free_pos(snapshot, list, &group, &classifier, &fetched),
            None => POS_STEP,
        };
        for (i, slot) in group_slots.iter().enumerate() {
            let pos = base + (i as f64 + 1.0) * POS_STEP;
            match slot.target {
                SlotTarget::Create(idx) => plan.creates[idx].pos = pos,
                SlotTarget::Update { index, current_pos } => {
                    if (current_pos - pos).abs() > 1e-6 {
                        plan.updates[index].patch.pos = Some(pos);
                    }
                }
            }
        }
    }

    plan.updates
        .retain(|u| !u.patch.is_empty() || u.add_label.is_some());
    tracing::debug!(
        "plan: {} create(s), {} update(s), {} repair(s), {} skipped",
        plan.creates.len(),
        plan.updates.len(),
        plan.repairs.len(),
        plan.skipped.len()
    );
    plan
}

/// Field changes that bring `card` in line with `record`.
fn content_patch(record: &SourceRecord, key: &SyncKey, card: &BoardCard) -> CardPatch {
    let mut patch = CardPatch::default();
    let name = record.title.trim();
    if render::normalize_text(&card.name) != name {
        patch.name = Some(name.to_string());
    }
    let desc = render::record_description(record, key);
    if render::normalize_text(&card.desc) != render::normalize_text(&desc) {
        patch.desc = Some(desc);
    }
    if !render::same_due(card.due, record.due) {
        patch.due = Some(record.due);
    }
    patch
}

fn fingerprint_stale(state: &SyncState, record: &RecordId, card: &BoardCard) -> bool {
    match state.records.get(record) {
        Some(entry) => entry.card != card.id || entry.fingerprint.is_empty() || entry.legacy,
        None => true,
    }
}

/// Record cards of `group` that sit in `list` but are not part of this
/// fetch keep their place; the ordered cards go after the last of them.
fn first_free_pos(
    snapshot: &BoardSnapshot,
    list: &ListId,
    group: &GroupingKey,
    classifier: &TouchClassifier,
    fetched: &HashSet<&RecordId>,
) -> f64 {
    snapshot
        .cards_in(list)
        .into_iter()
        .filter(|card| {
            classifier.identity(card).is_some_and(|key| {
                &key.group == group && !key.record.is_layout() && !fetched.contains(&key.record)
            })
        })
        .filter(|card| !classifier.is_touched(card))
        .map(|card| card.pos)
        .fold(POS_STEP, f64::max)
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub created: usize,
    pub updated: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// Apply `plan`. Each failed mutation is recorded and the rest of the plan
/// continues. `snapshot` and `state` are kept in step with what the board
/// accepted.
pub fn apply(
    plan: &Plan,
    board: &mut dyn BoardApi,
    snapshot: &mut BoardSnapshot,
    state: &mut SyncState,
) -> ApplyResult {
    let mut result = ApplyResult {
        skipped: plan.skipped.len(),
        ..ApplyResult::default()
    };

    for repair in &plan.repairs {
        let key = SyncKey {
            record: repair.record.clone(),
            group: repair.group.clone(),
        };
        state.track_card(&key, &repair.card);
        if repair.refresh_fingerprint {
            if let (Some(card), Some(entry)) =
                (snapshot.card(&repair.card), state.records.get_mut(&repair.record))
            {
                entry.fingerprint = render::card_fingerprint(card);
            }
        }
        if let Some(via) = repair.via {
            tracing::info!("adopted card {} for {} via {via:?}", repair.card, repair.record);
        }
        result.repaired += 1;
    }

    for create in &plan.creates {
        let action = format!("create {}", create.record);
        let Some(list) = state.group_list(&create.group).cloned() else {
            fail(&mut result, action, ApplyError::MissingList {
                group: create.group.clone(),
            });
            continue;
        };
        let draft = CardDraft {
            list,
            name: create.name.clone(),
            desc: create.desc.clone(),
            due: create.due,
            labels: state.group_label(&create.group).cloned().into_iter().collect(),
            pos: create.pos,
        };
        match board.create_card(&draft) {
            Ok(card) => {
                tracing::info!("created card {} for {}", card.id, create.record);
                state.record_written(&create.record, &create.group, &card);
                snapshot.cards.push(card);
                result.created += 1;
            }
            Err(e) => fail(&mut result, action, e.into()),
        }
    }

    for update in &plan.updates {
        let action = format!("update {} ({})", update.record, update.card);
        if update.manual && !update.patch.is_empty() {
            fail(&mut result, action, ApplyError::ManualEditRefused {
                card: update.card.clone(),
            });
            continue;
        }

        let mut changed = false;
        if !update.patch.is_empty() {
            match board.update_card(&update.card, &update.patch) {
                Ok(card) => {
                    state.record_written(&update.record, &update.group, &card);
                    if let Some(local) = snapshot.card_mut(&update.card) {
                        *local = card;
                    }
                    changed = true;
                }
                Err(e) => {
                    fail(&mut result, action, e.into());
                    continue;
                }
            }
        }
        if let Some(label) = &update.add_label {
            match board.add_label(&update.card, label) {
                Ok(()) => {
                    if let Some(local) = snapshot.card_mut(&update.card) {
                        local.labels.insert(label.clone());
                    }
                    changed = true;
                }
                Err(e) => fail(&mut result, format!("label {}", update.card), e.into()),
            }
        }
        if changed {
            tracing::info!("updated card {} for {}", update.card, update.record);
            result.updated += 1;
        }
    }

    result
}

fn fail(result: &mut ApplyResult, action: String, error: ApplyError) {
    tracing::warn!("{action} failed: {error}");
    result.errors.push(ItemError { action, error });
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use classboard_core::RecordKind;

    use super::*;
    use crate::memory::MemoryBoard;
    use crate::state::GroupEntry;

    const GROUP: &str = "CS101";

    fn day(d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2026, 9, d, 23, 59, 0).unwrap())
    }

    fn record(id: &str, due: Option<DateTime<Utc>>) -> SourceRecord {
        SourceRecord {
            id: RecordId::from(id),
            kind: RecordKind::Assignment,
            group: GroupingKey::from(GROUP),
            title: format!("Title {id}"),
            due,
            description: None,
            url: format!("https://lms/{id}"),
        }
    }

    /// A board with the group list in place and state pointing at it.
    fn setup() -> (MemoryBoard, SyncState) {
        let mut board = MemoryBoard::new("b1");
        let list = board.create_list(GROUP, POS_STEP).unwrap();
        let label = board.create_label(GROUP, "green").unwrap();
        let mut state = SyncState::default();
        state.groups.insert(
            GroupingKey::from(GROUP),
            GroupEntry {
                list: Some(list.id),
                label: Some(label.id),
                owns_label: true,
                color: Some("green".into()),
                info_card: None,
            },
        );
        (board, state)
    }

    fn sync(board: &mut MemoryBoard, state: &mut SyncState, records: &[SourceRecord]) -> ApplyResult {
        let mut snapshot = board.snapshot().unwrap();
        let plan = plan(records, &snapshot, state);
        apply(&plan, board, &mut snapshot, state)
    }

    fn titles_in_order(board: &MemoryBoard, state: &SyncState) -> Vec<String> {
        let snap = board.snapshot().unwrap();
        let list = state.group_list(&GroupingKey::from(GROUP)).unwrap();
        snap.cards_in(list).iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn creates_in_due_order_with_undated_last() {
        let (mut board, mut state) = setup();
        let records = [record("A", day(3)), record("B", day(1)), record("C", None)];
        let result = sync(&mut board, &mut state, &records);
        assert_eq!(result.created, 3);
        assert!(result.errors.is_empty());
        assert_eq!(titles_in_order(&board, &state), vec!["Title B", "Title A", "Title C"]);
        assert_eq!(state.records.len(), 3);
    }

    #[test]
    fn second_plan_is_empty() {
        let (mut board, mut state) = setup();
        let records = [record("A", day(3)), record("B", day(1))];
        sync(&mut board, &mut state, &records);
        let snapshot = board.snapshot().unwrap();
        let again = plan(&records, &snapshot, &state);
        assert!(again.is_empty(), "{again:?}");
    }

    #[test]
    fn due_change_reorders_and_patches() {
        let (mut board, mut state) = setup();
        sync(&mut board, &mut state, &[record("A", day(1)), record("B", day(2))]);
        let result = sync(&mut board, &mut state, &[record("A", day(5)), record("B", day(2))]);
        assert_eq!(result.updated, 2);
        assert_eq!(titles_in_order(&board, &state), vec!["Title B", "Title A"]);
    }

    #[test]
    fn manual_card_only_gets_its_label() {
        let (mut board, mut state) = setup();
        sync(&mut board, &mut state, &[record("A", day(1))]);
        let card = state.records[&RecordId::from("A")].card.clone();
        let label = state.group_label(&GroupingKey::from(GROUP)).unwrap().clone();
        board.user_edit(&card, |c| {
            c.name = "A - started".into();
            c.labels.clear();
        });

        let result = sync(&mut board, &mut state, &[record("A", day(4))]);
        assert_eq!(result.updated, 1);
        let snap = board.snapshot().unwrap();
        let stored = snap.card(&card).unwrap();
        assert_eq!(stored.name, "A - started");
        assert_eq!(stored.due, day(1));
        assert!(stored.labels.contains(&label));
    }

    #[test]
    fn guard_refuses_content_patch_on_manual_card() {
        let (mut board, mut state) = setup();
        sync(&mut board, &mut state, &[record("A", day(1))]);
        let card = state.records[&RecordId::from("A")].card.clone();
        let bad = Plan {
            updates: vec![UpdateCard {
                record: RecordId::from("A"),
                group: GroupingKey::from(GROUP),
                card: card.clone(),
                manual: true,
                patch: CardPatch {
                    name: Some("overwritten".into()),
                    ..CardPatch::default()
                },
                add_label: None,
            }],
            ..Plan::default()
        };
        let mut snapshot = board.snapshot().unwrap();
        let result = apply(&bad, &mut board, &mut snapshot, &mut state);
        assert_eq!(result.updated, 0);
        assert_eq!(
            result.errors[0].error,
            ApplyError::ManualEditRefused { card: card.clone() }
        );
        assert_eq!(board.snapshot().unwrap().card(&card).unwrap().name, "Title A");
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let (mut board, mut state) = setup();
        board.fail_card_titled("Title B");
        let result = sync(
            &mut board,
            &mut state,
            &[record("A", day(1)), record("B", day(2)), record("C", day(3))],
        );
        assert_eq!(result.created, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].action.contains('B'));

        board.clear_failures();
        let result = sync(
            &mut board,
            &mut state,
            &[record("A", day(1)), record("B", day(2)), record("C", day(3))],
        );
        assert_eq!(result.created, 1);
        assert_eq!(titles_in_order(&board, &state), vec!["Title A", "Title B", "Title C"]);
    }

    #[test]
    fn lost_state_is_repaired_from_markers() {
        let (mut board, mut state) = setup();
        sync(&mut board, &mut state, &[record("A", day(1))]);
        let card = state.records[&RecordId::from("A")].card.clone();
        state.records.clear();

        let snapshot = board.snapshot().unwrap();
        let p = plan(&[record("A", day(1))], &snapshot, &state);
        assert!(p.creates.is_empty());
        assert_eq!(p.repairs[0].via, Some(MatchSource::SyncKey));

        let result = sync(&mut board, &mut state, &[record("A", day(1))]);
        assert_eq!(result.created, 0);
        assert_eq!(result.repaired, 1);
        assert_eq!(state.records[&RecordId::from("A")].card, card);
        assert!(!state.records[&RecordId::from("A")].fingerprint.is_empty());
    }

    #[test]
    fn ambiguous_records_are_skipped() {
        let (mut board, state) = setup();
        let list = state.group_list(&GroupingKey::from(GROUP)).unwrap().clone();
        let key = SyncKey::new(RecordId::from("A"), GroupingKey::from(GROUP)).unwrap();
        board.user_add_card(&list, "copy 1", &key.marker(), 1.0);
        board.user_add_card(&list, "copy 2", &key.marker(), 2.0);
        let snapshot = board.snapshot().unwrap();
        let p = plan(&[record("A", day(1))], &snapshot, &state);
        assert!(p.creates.is_empty());
        assert_eq!(p.ambiguous(), 1);
    }

    #[test]
    fn missing_list_is_reported_per_item() {
        let mut board = MemoryBoard::new("b1");
        let mut state = SyncState::default();
        let result = sync(&mut board, &mut state, &[record("A", day(1))]);
        assert_eq!(result.created, 0);
        assert_eq!(
            result.errors[0].error,
            ApplyError::MissingList {
                group: GroupingKey::from(GROUP)
            }
        );
    }

    #[test]
    fn stale_cards_keep_their_place() {
        let (mut board, mut state) = setup();
        sync(&mut board, &mut state, &[record("OLD", day(1)), record("A", day(3))]);
        let old = state.records[&RecordId::from("OLD")].card.clone();
        let old_pos = board.snapshot().unwrap().card(&old).unwrap().pos;

        sync(&mut board, &mut state, &[record("A", day(3)), record("B", day(2))]);
        let snap = board.snapshot().unwrap();
        assert_eq!(snap.card(&old).unwrap().pos, old_pos);
        assert_eq!(
            titles_in_order(&board, &state),
            vec!["Title OLD", "Title B", "Title A"]
        );
    }
}
