//! Duplicate collapse.
//!
//! Cards are grouped by the record in their sync key, or by the origin link
//! for cards without one. Survivor selection narrows the candidates
//! predicate by predicate; the first predicate that leaves exactly one card
//! wins:
//!
//! 1. manually touched
//! 2. tracked in state for that record
//! 3. in the list the grouping key implies
//! 4. latest activity (exact ties: lowest card id)
//!
//! Manually touched cards are never archived, so a group with more than one
//! of them is left alone and reported as unresolved.

use std::collections::{BTreeMap, HashSet};

use classboard_core::{BoardCard, BoardSnapshot, CardId, GroupingKey, RecordId, SyncKey};

use crate::error::SyncError;
use crate::ports::BoardApi;
use crate::render;
use crate::state::{StateStore, SyncState};
use crate::touch::TouchClassifier;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DuplicateIdentity {
    Record(RecordId),
    Link(String),
}

impl std::fmt::Display for DuplicateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateIdentity::Record(id) => write!(f, "{id}"),
            DuplicateIdentity::Link(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub identity: DuplicateIdentity,
    /// Grouping key from the sync key, when any candidate carries one.
    pub group: Option<GroupingKey>,
    /// Candidate cards, sorted by id.
    pub cards: Vec<CardId>,
}

impl DuplicateGroup {
    fn sync_key(&self) -> Option<SyncKey> {
        match (&self.identity, &self.group) {
            (DuplicateIdentity::Record(record), Some(group)) => Some(SyncKey {
                record: record.clone(),
                group: group.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurvivorRule {
    ManuallyTouched,
    TrackedInState,
    InExpectedList,
    LatestActivity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        survivor: CardId,
        archive: Vec<CardId>,
        rule: SurvivorRule,
    },
    /// More than one candidate is manually touched; nothing is archived.
    Unresolved { manual: Vec<CardId> },
}

/// Finds and resolves duplicate groups in one snapshot.
pub struct DedupeEngine<'a> {
    snapshot: &'a BoardSnapshot,
    state: &'a SyncState,
    classifier: TouchClassifier,
}

impl<'a> DedupeEngine<'a> {
    pub fn new(snapshot: &'a BoardSnapshot, state: &'a SyncState) -> Self {
        Self {
            snapshot,
            state,
            classifier: TouchClassifier::new(snapshot, state),
        }
    }

    /// Every identity held by more than one open card.
    pub fn find_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups: BTreeMap<DuplicateIdentity, (Option<GroupingKey>, Vec<CardId>)> =
            BTreeMap::new();
        let mut record_by_link: BTreeMap<String, RecordId> = BTreeMap::new();

        let mut cards: Vec<&BoardCard> = self.snapshot.cards.iter().collect();
        cards.sort_by(|a, b| a.id.cmp(&b.id));

        let mut unkeyed = Vec::new();
        for card in &cards {
            match self.classifier.identity(card) {
                Some(key) => {
                    if let Some(url) = render::source_link(&card.desc) {
                        record_by_link
                            .entry(url.to_string())
                            .or_insert_with(|| key.record.clone());
                    }
                    let entry = groups
                        .entry(DuplicateIdentity::Record(key.record))
                        .or_insert((Some(key.group), Vec::new()));
                    entry.1.push(card.id.clone());
                }
                None => unkeyed.push(*card),
            }
        }
        for card in unkeyed {
            let Some(url) = render::source_link(&card.desc) else {
                continue;
            };
            let identity = match record_by_link.get(url) {
                Some(record) => DuplicateIdentity::Record(record.clone()),
                None => DuplicateIdentity::Link(url.to_string()),
            };
            groups
                .entry(identity)
                .or_insert((None, Vec::new()))
                .1
                .push(card.id.clone());
        }

        groups
            .into_iter()
            .filter(|(_, (_, cards))| cards.len() > 1)
            .map(|(identity, (group, mut cards))| {
                cards.sort();
                DuplicateGroup {
                    identity,
                    group,
                    cards,
                }
            })
            .collect()
    }

    pub fn resolve(&self, group: &DuplicateGroup) -> Resolution {
        let cards: Vec<&BoardCard> = group
            .cards
            .iter()
            .filter_map(|id| self.snapshot.card(id))
            .collect();

        let manual: Vec<&BoardCard> = cards
            .iter()
            .copied()
            .filter(|c| self.classifier.is_touched(c))
            .collect();
        if manual.len() > 1 {
            return Resolution::Unresolved {
                manual: manual.iter().map(|c| c.id.clone()).collect(),
            };
        }
        if let [only] = manual.as_slice() {
            return resolved(&cards, &only.id, SurvivorRule::ManuallyTouched);
        }

        let key = group.sync_key();
        let mut candidates = cards.clone();

        let tracked = key.as_ref().and_then(|k| self.state.tracked_card(k));
        if let Some(id) = narrow(&mut candidates, |c| Some(&c.id) == tracked) {
            return resolved(&cards, &id, SurvivorRule::TrackedInState);
        }

        let expected = key.as_ref().and_then(|k| self.classifier.expected_list(k));
        if let Some(id) = narrow(&mut candidates, |c| Some(&c.list) == expected) {
            return resolved(&cards, &id, SurvivorRule::InExpectedList);
        }

        let latest = candidates
            .iter()
            .copied()
            .max_by(|a, b| {
                a.last_activity
                    .cmp(&b.last_activity)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|c| c.id.clone());
        match latest {
            Some(id) => resolved(&cards, &id, SurvivorRule::LatestActivity),
            None => Resolution::Unresolved { manual: Vec::new() },
        }
    }
}

/// Keep the candidates matching `pred`; a single match is the survivor.
fn narrow(candidates: &mut Vec<&BoardCard>, pred: impl Fn(&BoardCard) -> bool) -> Option<CardId> {
    let subset: Vec<&BoardCard> = candidates.iter().copied().filter(|c| pred(c)).collect();
    match subset.len() {
        0 => None,
        1 => Some(subset[0].id.clone()),
        _ => {
            *candidates = subset;
            None
        }
    }
}

fn resolved(cards: &[&BoardCard], survivor: &CardId, rule: SurvivorRule) -> Resolution {
    Resolution::Resolved {
        survivor: survivor.clone(),
        archive: cards
            .iter()
            .filter(|c| &c.id != survivor)
            .map(|c| c.id.clone())
            .collect(),
        rule,
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group: DuplicateGroup,
    pub resolution: Resolution,
    pub archived: Vec<CardId>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    /// False for a report-only pass.
    pub applied: bool,
    pub groups: Vec<GroupOutcome>,
}

impl DedupeReport {
    pub fn resolved(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.resolution, Resolution::Resolved { .. }))
            .count()
    }

    pub fn unresolved(&self) -> usize {
        self.groups.len() - self.resolved()
    }

    pub fn archived(&self) -> usize {
        self.groups.iter().map(|g| g.archived.len()).sum()
    }
}

/// Find and (with `apply`) collapse duplicates. Losers are archived, state
/// is repointed at the survivor and saved after each group.
pub fn run(
    board: &mut dyn BoardApi,
    store: &dyn StateStore,
    apply: bool,
) -> Result<DedupeReport, SyncError> {
    let mut state = store.load()?;
    let mut snapshot = board.snapshot().map_err(SyncError::Snapshot)?;
    state.purge_missing(&snapshot);

    let planned: Vec<(DuplicateGroup, Resolution)> = {
        let engine = DedupeEngine::new(&snapshot, &state);
        engine
            .find_groups()
            .into_iter()
            .map(|g| {
                let resolution = engine.resolve(&g);
                (g, resolution)
            })
            .collect()
    };

    let mut report = DedupeReport {
        applied: apply,
        groups: Vec::with_capacity(planned.len()),
    };
    for (group, resolution) in planned {
        let mut outcome = GroupOutcome {
            group,
            resolution,
            archived: Vec::new(),
            errors: Vec::new(),
        };
        match &outcome.resolution {
            Resolution::Unresolved { manual } => {
                tracing::warn!(
                    "duplicates of {} left alone: {} manually edited cards",
                    outcome.group.identity,
                    manual.len()
                );
            }
            Resolution::Resolved {
                survivor, archive, ..
            } if apply => {
                let archived: HashSet<CardId> =
                    archive_all(board, &mut snapshot, archive, &mut outcome.errors);
                for card in &archived {
                    state.forget_card(card);
                }
                if let Some(key) = outcome.group.sync_key() {
                    state.track_card(&key, survivor);
                }
                let mut archived: Vec<CardId> = archived.into_iter().collect();
                archived.sort();
                outcome.archived = archived;
                store.save(&state)?;
                tracing::info!(
                    "duplicates of {}: kept {survivor}, archived {}",
                    outcome.group.identity,
                    outcome.archived.len()
                );
            }
            Resolution::Resolved { .. } => {}
        }
        report.groups.push(outcome);
    }
    Ok(report)
}

fn archive_all(
    board: &mut dyn BoardApi,
    snapshot: &mut BoardSnapshot,
    cards: &[CardId],
    errors: &mut Vec<String>,
) -> HashSet<CardId> {
    let mut archived = HashSet::new();
    for card in cards {
        match board.archive_card(card) {
            Ok(()) => {
                snapshot.remove_card(card);
                archived.insert(card.clone());
            }
            Err(e) => {
                tracing::warn!("archive {card} failed: {e}");
                errors.push(format!("archive {card}: {e}"));
            }
        }
    }
    archived
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, TimeZone, Utc};
    use classboard_core::{BoardList, ListId};

    use super::*;
    use crate::state::{CardEntry, GroupEntry};

    const GROUP: &str = "CS101";

    fn key(record: &str) -> SyncKey {
        SyncKey::new(RecordId::from(record), GroupingKey::from(GROUP)).unwrap()
    }

    fn card(id: &str, list: &str, desc: &str, minutes: i64) -> BoardCard {
        BoardCard {
            id: CardId::from(id),
            list: ListId::from(list),
            name: "HW".into(),
            desc: desc.to_string(),
            due: None,
            labels: BTreeSet::new(),
            pos: 1.0,
            last_activity: Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn snapshot(cards: Vec<BoardCard>) -> BoardSnapshot {
        BoardSnapshot {
            board_id: "b".into(),
            lists: ["L", "Done"]
                .iter()
                .enumerate()
                .map(|(i, id)| BoardList {
                    id: ListId::from(*id),
                    name: id.to_string(),
                    pos: i as f64,
                })
                .collect(),
            cards,
            labels: vec![],
        }
    }

    fn state() -> SyncState {
        let mut state = SyncState::default();
        state.groups.insert(
            GroupingKey::from(GROUP),
            GroupEntry {
                list: Some(ListId::from("L")),
                ..GroupEntry::default()
            },
        );
        state
    }

    fn only_group(engine: &DedupeEngine<'_>) -> DuplicateGroup {
        let groups = engine.find_groups();
        assert_eq!(groups.len(), 1, "{groups:?}");
        groups.into_iter().next().unwrap()
    }

    #[test]
    fn single_cards_are_not_duplicates() {
        let snap = snapshot(vec![
            card("c1", "L", &key("A").marker(), 0),
            card("c2", "L", &key("B").marker(), 0),
        ]);
        let st = state();
        assert!(DedupeEngine::new(&snap, &st).find_groups().is_empty());
    }

    #[test]
    fn tracked_card_beats_untracked() {
        let snap = snapshot(vec![
            card("c1", "L", &key("A").marker(), 0),
            card("c2", "L", &key("A").marker(), 10),
        ]);
        let mut st = state();
        st.records.insert(
            RecordId::from("A"),
            CardEntry::new(CardId::from("c1"), GroupingKey::from(GROUP), String::new()),
        );
        let engine = DedupeEngine::new(&snap, &st);
        let group = only_group(&engine);
        assert_eq!(
            engine.resolve(&group),
            Resolution::Resolved {
                survivor: CardId::from("c1"),
                archive: vec![CardId::from("c2")],
                rule: SurvivorRule::TrackedInState
            }
        );
    }

    #[test]
    fn manually_touched_card_survives() {
        let snap = snapshot(vec![
            card("c1", "L", &key("ASSN-77").marker(), 0),
            card("c2", "Done", &key("ASSN-77").marker(), 0),
        ]);
        let mut st = state();
        st.records.insert(
            RecordId::from("ASSN-77"),
            CardEntry::new(CardId::from("c1"), GroupingKey::from(GROUP), String::new()),
        );
        let engine = DedupeEngine::new(&snap, &st);
        let group = only_group(&engine);
        assert_eq!(
            engine.resolve(&group),
            Resolution::Resolved {
                survivor: CardId::from("c2"),
                archive: vec![CardId::from("c1")],
                rule: SurvivorRule::ManuallyTouched
            }
        );
    }

    #[test]
    fn two_manual_cards_are_unresolved() {
        let snap = snapshot(vec![
            card("c1", "Done", &key("A").marker(), 0),
            card("c2", "Done", &key("A").marker(), 0),
            card("c3", "L", &key("A").marker(), 0),
        ]);
        let st = state();
        let engine = DedupeEngine::new(&snap, &st);
        let group = only_group(&engine);
        assert_eq!(
            engine.resolve(&group),
            Resolution::Unresolved {
                manual: vec![CardId::from("c1"), CardId::from("c2")]
            }
        );
    }

    #[test]
    fn latest_activity_then_lowest_id() {
        let snap = snapshot(vec![
            card("c1", "L", &key("A").marker(), 5),
            card("c2", "L", &key("A").marker(), 9),
            card("c3", "L", &key("A").marker(), 9),
        ]);
        let st = state();
        let engine = DedupeEngine::new(&snap, &st);
        let group = only_group(&engine);
        match engine.resolve(&group) {
            Resolution::Resolved { survivor, rule, .. } => {
                assert_eq!(survivor, CardId::from("c2"));
                assert_eq!(rule, SurvivorRule::LatestActivity);
            }
            other => panic!("expected resolved, got {other:?}"),
        }
    }

    #[test]
    fn unkeyed_copy_joins_the_record_group_by_link() {
        let url = "https://lms/a/1";
        let desc = format!("Source: {url}\n\n{}", key("A").marker());
        let snap = snapshot(vec![
            card("c1", "L", &desc, 0),
            card("c2", "L", &format!("Source: {url}"), 0),
        ]);
        let st = state();
        let engine = DedupeEngine::new(&snap, &st);
        let group = only_group(&engine);
        assert_eq!(group.identity, DuplicateIdentity::Record(RecordId::from("A")));
        // The copy without a marker counts as manual and survives.
        match engine.resolve(&group) {
            Resolution::Resolved { survivor, .. } => assert_eq!(survivor, CardId::from("c2")),
            other => panic!("expected resolved, got {other:?}"),
        }
    }
}
