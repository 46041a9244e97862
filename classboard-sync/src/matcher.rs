//! Identity matching: which open card (if any) belongs to a source record.
//!
//! Resolution order, first hit wins:
//! 1. state entry whose card is still open
//! 2. exactly one open card carrying the record's sync key
//! 3. exactly one open card without a sync key that links to the record URL
//!
//! More than one candidate at step 2 or 3 is ambiguous and never guessed.

use std::collections::{HashMap, HashSet};

use classboard_core::{BoardCard, BoardSnapshot, CardId, RecordId, SourceRecord};

use crate::render;
use crate::state::SyncState;

/// How an untracked card was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    SyncKey,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// State already points at an open card.
    Tracked(CardId),
    /// Found by scanning the board; state needs repair.
    Adopted { card: CardId, via: MatchSource },
    /// Several cards qualify; left for dedupe.
    Ambiguous(Vec<CardId>),
    Unmatched,
}

/// Board index built once per pass.
pub struct IdentityMatcher<'a> {
    snapshot: &'a BoardSnapshot,
    by_record: HashMap<RecordId, Vec<CardId>>,
    unkeyed: Vec<&'a BoardCard>,
}

impl<'a> IdentityMatcher<'a> {
    pub fn new(snapshot: &'a BoardSnapshot) -> Self {
        let mut by_record: HashMap<RecordId, Vec<CardId>> = HashMap::new();
        let mut unkeyed = Vec::new();
        for card in &snapshot.cards {
            match card.sync_key() {
                Some(key) => by_record.entry(key.record).or_default().push(card.id.clone()),
                None => unkeyed.push(card),
            }
        }
        for ids in by_record.values_mut() {
            ids.sort();
        }
        unkeyed.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            snapshot,
            by_record,
            unkeyed,
        }
    }

    /// Open cards carrying the sync key of `record`.
    pub fn keyed(&self, record: &RecordId) -> &[CardId] {
        self.by_record.get(record).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve `record`. Cards in `claimed` belong to other records of the
    /// same pass and are never candidates.
    pub fn resolve(
        &self,
        record: &SourceRecord,
        state: &SyncState,
        claimed: &HashSet<CardId>,
    ) -> MatchOutcome {
        if let Some(entry) = state.records.get(&record.id) {
            if self.snapshot.card(&entry.card).is_some() && !claimed.contains(&entry.card) {
                return MatchOutcome::Tracked(entry.card.clone());
            }
        }

        let keyed: Vec<CardId> = self
            .keyed(&record.id)
            .iter()
            .filter(|id| !claimed.contains(*id))
            .cloned()
            .collect();
        if let Some(outcome) = pick(keyed, MatchSource::SyncKey) {
            return outcome;
        }

        let linked: Vec<CardId> = self
            .unkeyed
            .iter()
            .filter(|c| !claimed.contains(&c.id) && render::links_to(&c.desc, &record.url))
            .filter(|c| !tracked_elsewhere(state, &c.id, &record.id))
            .map(|c| c.id.clone())
            .collect();
        pick(linked, MatchSource::Link).unwrap_or(MatchOutcome::Unmatched)
    }
}

fn pick(mut candidates: Vec<CardId>, via: MatchSource) -> Option<MatchOutcome> {
    match candidates.len() {
        0 => None,
        1 => candidates.pop().map(|card| MatchOutcome::Adopted { card, via }),
        _ => Some(MatchOutcome::Ambiguous(candidates)),
    }
}

/// A legacy entry may track an unkeyed card for another record.
fn tracked_elsewhere(state: &SyncState, card: &CardId, record: &RecordId) -> bool {
    state
        .records
        .iter()
        .any(|(id, e)| &e.card == card && id != record)
}
