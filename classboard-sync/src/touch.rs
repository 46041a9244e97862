//! Manual-touch classification.
//!
//! A card counts as manually touched when any signal holds. Signals are
//! reported in this order:
//! 1. `Locked` (state entry carries the lock flag)
//! 2. `MissingSyncKey` (no marker, and no legacy state entry vouching for it)
//! 3. `MovedList` (not in the list its grouping key implies)
//! 4. `OutOfOrder` (dragged out of due order within its list)
//! 5. `ContentEdited` (title, description or due differ from what was written)
//!
//! The classification is derived from the snapshot and state on every pass
//! and never persisted.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use classboard_core::{BoardCard, BoardSnapshot, CardId, GroupingKey, ListId, RecordId, SyncKey};

use crate::render;
use crate::state::SyncState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchSignal {
    Locked,
    MissingSyncKey,
    MovedList { expected: ListId, actual: ListId },
    OutOfOrder { displacement: usize },
    ContentEdited,
}

#[derive(Debug, Clone)]
struct TrackedEntry {
    record: RecordId,
    group: GroupingKey,
    fingerprint: String,
    locked: bool,
    legacy: bool,
}

/// Classifier for one snapshot. Owns what it needs from state so callers
/// can mutate state while holding it.
#[derive(Debug, Clone)]
pub struct TouchClassifier {
    group_lists: HashMap<GroupingKey, ListId>,
    token_list: Option<ListId>,
    by_card: HashMap<CardId, TrackedEntry>,
    displaced: HashMap<CardId, usize>,
}

impl TouchClassifier {
    pub fn new(snapshot: &BoardSnapshot, state: &SyncState) -> Self {
        let group_lists = state
            .groups
            .iter()
            .filter_map(|(g, e)| e.list.clone().map(|l| (g.clone(), l)))
            .collect();
        let by_card = state
            .records
            .iter()
            .map(|(record, e)| {
                (
                    e.card.clone(),
                    TrackedEntry {
                        record: record.clone(),
                        group: e.group.clone(),
                        fingerprint: e.fingerprint.clone(),
                        locked: e.locked,
                        legacy: e.legacy,
                    },
                )
            })
            .collect();
        let mut classifier = Self {
            group_lists,
            token_list: state.layout.token_list.clone(),
            by_card,
            displaced: HashMap::new(),
        };
        classifier.displaced = classifier.rank_lists(snapshot);
        classifier
    }

    /// The card's identity: its marker, or the legacy state entry tracking it.
    pub fn identity(&self, card: &BoardCard) -> Option<SyncKey> {
        card.sync_key().or_else(|| {
            self.by_card
                .get(&card.id)
                .filter(|e| e.legacy)
                .map(|e| SyncKey {
                    record: e.record.clone(),
                    group: e.group.clone(),
                })
        })
    }

    /// The list `key` belongs in, if state knows it.
    pub fn expected_list(&self, key: &SyncKey) -> Option<&ListId> {
        if key.record == RecordId::token_card() {
            self.token_list.as_ref()
        } else {
            self.group_lists.get(&key.group)
        }
    }

    pub fn signals(&self, card: &BoardCard) -> Vec<TouchSignal> {
        let mut signals = Vec::new();
        let entry = self.by_card.get(&card.id);

        if entry.is_some_and(|e| e.locked) {
            signals.push(TouchSignal::Locked);
        }

        let Some(key) = self.identity(card) else {
            signals.push(TouchSignal::MissingSyncKey);
            return signals;
        };

        if let Some(expected) = self.expected_list(&key) {
            if expected != &card.list {
                signals.push(TouchSignal::MovedList {
                    expected: expected.clone(),
                    actual: card.list.clone(),
                });
            }
        }

        if let Some(&displacement) = self.displaced.get(&card.id) {
            signals.push(TouchSignal::OutOfOrder { displacement });
        }

        if let Some(entry) = entry.filter(|e| e.record == key.record) {
            if !entry.fingerprint.is_empty()
                && entry.fingerprint != render::card_fingerprint(card)
            {
                signals.push(TouchSignal::ContentEdited);
            }
        }

        signals
    }

    pub fn is_touched(&self, card: &BoardCard) -> bool {
        !self.signals(card).is_empty()
    }

    /// Cards dragged out of due order, with how far they moved.
    ///
    /// Within each list, the cards that belong there (record cards whose
    /// group maps to that list) are compared by position rank and by
    /// expected rank (due ascending, undated last, record id). The longest
    /// run already in expected order stays put; a card outside it that is
    /// more than one place off is displaced. A single adjacent swap is
    /// tolerated.
    fn rank_lists(&self, snapshot: &BoardSnapshot) -> HashMap<CardId, usize> {
        let mut displaced = HashMap::new();
        for list in &snapshot.lists {
            let members: Vec<(&BoardCard, SyncKey)> = snapshot
                .cards_in(&list.id)
                .into_iter()
                .filter_map(|card| self.identity(card).map(|key| (card, key)))
                .filter(|(_, key)| !key.record.is_layout())
                .filter(|(_, key)| self.group_lists.get(&key.group) == Some(&list.id))
                .collect();
            if members.len() < 2 {
                continue;
            }

            let mut expected: Vec<usize> = (0..members.len()).collect();
            expected.sort_by(|&a, &b| {
                due_order(members[a].0.due, members[b].0.due)
                    .then_with(|| members[a].1.record.cmp(&members[b].1.record))
                    .then_with(|| members[a].0.id.cmp(&members[b].0.id))
            });
            let mut rank = vec![0usize; members.len()];
            for (r, &idx) in expected.iter().enumerate() {
                rank[idx] = r;
            }

            let keep = longest_increasing(&rank);
            for (pos, (card, _)) in members.iter().enumerate() {
                let displacement = pos.abs_diff(rank[pos]);
                if !keep.contains(&pos) && displacement > 1 {
                    displaced.insert(card.id.clone(), displacement);
                }
            }
        }
        displaced
    }
}

/// Due ascending, undated last.
pub(crate) fn due_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// Indices of one longest strictly increasing subsequence of `seq`.
fn longest_increasing(seq: &[usize]) -> HashSet<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &x) in seq.iter().enumerate() {
        let at = tails.partition_point(|&t| seq[t] < x);
        prev[i] = at.checked_sub(1).map(|p| tails[p]);
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }
    let mut out = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.insert(i);
        cursor = prev[i];
    }
    out
}
