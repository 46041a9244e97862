//! In-memory board used by tests and dry experiments.
//!
//! Ids are sequential (`list-1`, `card-1`, `label-1`). Every mutation
//! advances a fake clock by one minute and stamps the touched card's
//! activity time. The `user_*` helpers simulate edits made by a person in
//! the board UI; they are not counted as tool mutations.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};

use classboard_core::{BoardCard, BoardList, BoardSnapshot, CardId, Label, LabelId, ListId};

use crate::ports::{BoardApi, BoardError, CardDraft, CardPatch};

#[derive(Debug, Clone)]
pub struct MemoryBoard {
    board: BoardSnapshot,
    archived_cards: Vec<BoardCard>,
    archived_lists: Vec<BoardList>,
    next_id: u64,
    clock: DateTime<Utc>,
    mutations: usize,
    failing_titles: HashSet<String>,
}

impl MemoryBoard {
    pub fn new(board_id: &str) -> Self {
        Self {
            board: BoardSnapshot {
                board_id: board_id.to_string(),
                ..BoardSnapshot::default()
            },
            archived_cards: Vec::new(),
            archived_lists: Vec::new(),
            next_id: 0,
            clock: Utc
                .with_ymd_and_hms(2026, 9, 1, 8, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            mutations: 0,
            failing_titles: HashSet::new(),
        }
    }

    /// Number of successful tool mutations so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub fn archived_cards(&self) -> &[BoardCard] {
        &self.archived_cards
    }

    pub fn archived_lists(&self) -> &[BoardList] {
        &self.archived_lists
    }

    /// Make create/update calls for cards titled `title` fail.
    pub fn fail_card_titled(&mut self, title: &str) {
        self.failing_titles.insert(title.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing_titles.clear();
    }

    /// A card written by hand in the board UI.
    pub fn user_add_card(&mut self, list: &ListId, name: &str, desc: &str, pos: f64) -> CardId {
        let id = CardId::from(self.fresh_id("card"));
        let now = self.tick();
        self.board.cards.push(BoardCard {
            id: id.clone(),
            list: list.clone(),
            name: name.to_string(),
            desc: desc.to_string(),
            due: None,
            labels: BTreeSet::new(),
            pos,
            last_activity: now,
        });
        id
    }

    /// Edit a card by hand. Returns false when the card is not open.
    pub fn user_edit(&mut self, card: &CardId, edit: impl FnOnce(&mut BoardCard)) -> bool {
        let now = self.tick();
        match self.board.card_mut(card) {
            Some(c) => {
                edit(c);
                c.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// A user-created list.
    pub fn user_add_list(&mut self, name: &str, pos: f64) -> ListId {
        let id = ListId::from(self.fresh_id("list"));
        self.board.lists.push(BoardList {
            id: id.clone(),
            name: name.to_string(),
            pos,
        });
        id
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::minutes(1);
        self.clock
    }

    fn mutated(&mut self) -> DateTime<Utc> {
        self.mutations += 1;
        self.tick()
    }

    fn check_title(&self, title: &str) -> Result<(), BoardError> {
        if self.failing_titles.contains(title) {
            return Err(BoardError::Transport(format!("injected failure for '{title}'")));
        }
        Ok(())
    }

    fn not_found(kind: &'static str, id: &str) -> BoardError {
        BoardError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl BoardApi for MemoryBoard {
    fn board_id(&self) -> &str {
        &self.board.board_id
    }

    fn snapshot(&self) -> Result<BoardSnapshot, BoardError> {
        Ok(self.board.clone())
    }

    fn create_list(&mut self, name: &str, pos: f64) -> Result<BoardList, BoardError> {
        let list = BoardList {
            id: ListId::from(self.fresh_id("list")),
            name: name.to_string(),
            pos,
        };
        self.mutated();
        self.board.lists.push(list.clone());
        Ok(list)
    }

    fn create_label(&mut self, name: &str, color: &str) -> Result<Label, BoardError> {
        let label = Label {
            id: LabelId::from(self.fresh_id("label")),
            name: name.to_string(),
            color: color.to_string(),
        };
        self.mutated();
        self.board.labels.push(label.clone());
        Ok(label)
    }

    fn create_card(&mut self, draft: &CardDraft) -> Result<BoardCard, BoardError> {
        self.check_title(&draft.name)?;
        if self.board.list(&draft.list).is_none() {
            return Err(Self::not_found("list", draft.list.as_str()));
        }
        let id = CardId::from(self.fresh_id("card"));
        let now = self.mutated();
        let card = BoardCard {
            id,
            list: draft.list.clone(),
            name: draft.name.clone(),
            desc: draft.desc.clone(),
            due: draft.due,
            labels: draft.labels.iter().cloned().collect(),
            pos: draft.pos,
            last_activity: now,
        };
        self.board.cards.push(card.clone());
        Ok(card)
    }

    fn update_card(&mut self, card: &CardId, patch: &CardPatch) -> Result<BoardCard, BoardError> {
        let current = self
            .board
            .card(card)
            .ok_or_else(|| Self::not_found("card", card.as_str()))?;
        self.check_title(&current.name)?;
        if let Some(name) = &patch.name {
            self.check_title(name)?;
        }
        let now = self.mutated();
        let stored = self
            .board
            .card_mut(card)
            .ok_or_else(|| Self::not_found("card", card.as_str()))?;
        patch.apply_to(stored);
        stored.last_activity = now;
        Ok(stored.clone())
    }

    fn add_label(&mut self, card: &CardId, label: &LabelId) -> Result<(), BoardError> {
        if self.board.label(label).is_none() {
            return Err(Self::not_found("label", label.as_str()));
        }
        if self.board.card(card).is_none() {
            return Err(Self::not_found("card", card.as_str()));
        }
        let now = self.mutated();
        if let Some(stored) = self.board.card_mut(card) {
            stored.labels.insert(label.clone());
            stored.last_activity = now;
        }
        Ok(())
    }

    fn archive_card(&mut self, card: &CardId) -> Result<(), BoardError> {
        let removed = self
            .board
            .remove_card(card)
            .ok_or_else(|| Self::not_found("card", card.as_str()))?;
        self.mutated();
        self.archived_cards.push(removed);
        Ok(())
    }

    fn archive_list(&mut self, list: &ListId) -> Result<(), BoardError> {
        let removed = self
            .board
            .remove_list(list)
            .ok_or_else(|| Self::not_found("list", list.as_str()))?;
        self.mutated();
        let (inside, rest): (Vec<BoardCard>, Vec<BoardCard>) = std::mem::take(&mut self.board.cards)
            .into_iter()
            .partition(|c| &c.list == list);
        self.board.cards = rest;
        self.archived_cards.extend(inside);
        self.archived_lists.push(removed);
        Ok(())
    }

    fn archive_label(&mut self, label: &LabelId) -> Result<(), BoardError> {
        self.board
            .remove_label(label)
            .ok_or_else(|| Self::not_found("label", label.as_str()))?;
        self.mutated();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_follow_their_list_into_the_archive() {
        let mut board = MemoryBoard::new("b1");
        let list = board.create_list("CS101", 1.0).unwrap();
        let draft = CardDraft {
            list: list.id.clone(),
            name: "HW1".into(),
            desc: String::new(),
            due: None,
            labels: vec![],
            pos: 1.0,
        };
        board.create_card(&draft).unwrap();
        board.archive_list(&list.id).unwrap();

        let snap = board.snapshot().unwrap();
        assert!(snap.lists.is_empty());
        assert!(snap.cards.is_empty());
        assert_eq!(board.archived_cards().len(), 1);
        assert_eq!(board.mutation_count(), 3);
    }

    #[test]
    fn injected_failures_hit_matching_titles_only() {
        let mut board = MemoryBoard::new("b1");
        let list = board.create_list("CS101", 1.0).unwrap();
        board.fail_card_titled("HW2");
        let mut draft = CardDraft {
            list: list.id,
            name: "HW2".into(),
            desc: String::new(),
            due: None,
            labels: vec![],
            pos: 1.0,
        };
        assert!(matches!(board.create_card(&draft), Err(BoardError::Transport(_))));
        draft.name = "HW3".into();
        assert!(board.create_card(&draft).is_ok());
    }

    #[test]
    fn user_edits_bump_activity_without_counting() {
        let mut board = MemoryBoard::new("b1");
        let list = board.user_add_list("Mine", 1.0);
        let card = board.user_add_card(&list, "note", "", 1.0);
        let before = board.snapshot().unwrap().card(&card).unwrap().last_activity;
        assert!(board.user_edit(&card, |c| c.name = "note!".into()));
        let after = board.snapshot().unwrap().card(&card).unwrap().last_activity;
        assert!(after > before);
        assert_eq!(board.mutation_count(), 0);
    }
}
