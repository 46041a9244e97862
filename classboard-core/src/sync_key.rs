//! Sync key markers embedded in card descriptions.
//!
//! A card created by the tool ends its description with a marker line:
//!
//! ```text
//! [sync:assignment:1234:98765|1234]
//! ```
//!
//! The first part is the record identity, the second its grouping key. Both
//! parts must be non-empty and free of whitespace, `|` and `]`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SyncKeyError;
use crate::types::{GroupingKey, RecordId};

static SYNC_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[sync:([^\]\s|]+)\|([^\]\s|]+)\]").expect("sync key pattern")
});

/// Identity token round-tripped through a card description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub record: RecordId,
    pub group: GroupingKey,
}

impl SyncKey {
    pub fn new(record: RecordId, group: GroupingKey) -> Result<Self, SyncKeyError> {
        check_part(record.as_str())?;
        check_part(group.as_str())?;
        Ok(Self { record, group })
    }

    /// The marker text written into the description.
    pub fn marker(&self) -> String {
        format!("[sync:{}|{}]", self.record, self.group)
    }

    /// Extract the first marker found in `text`.
    pub fn extract(text: &str) -> Option<Self> {
        SYNC_KEY_RE.captures(text).map(|caps| Self {
            record: RecordId::from(&caps[1]),
            group: GroupingKey::from(&caps[2]),
        })
    }

    /// Remove every marker (and the blank lines left around it) from `text`.
    pub fn strip(text: &str) -> String {
        let stripped = SYNC_KEY_RE.replace_all(text, "");
        let lines: Vec<&str> = stripped.lines().map(str::trim_end).collect();
        lines.join("\n").trim_end().to_string()
    }

    /// Replace any marker in `text` with this key's marker on its own last line.
    pub fn inject(&self, text: &str) -> String {
        let cleaned = Self::strip(text);
        if cleaned.is_empty() {
            self.marker()
        } else {
            format!("{cleaned}\n\n{}", self.marker())
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.record, self.group)
    }
}

fn check_part(part: &str) -> Result<(), SyncKeyError> {
    if part.is_empty() {
        return Err(SyncKeyError::Empty);
    }
    if part.chars().any(|c| c.is_whitespace() || c == '|' || c == ']') {
        return Err(SyncKeyError::Reserved(part.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(record: &str, group: &str) -> SyncKey {
        SyncKey::new(RecordId::from(record), GroupingKey::from(group)).expect("valid key")
    }

    #[test]
    fn extract_finds_marker_anywhere() {
        let desc = "Read chapter 4\n\nSource: https://lms/a/1\n\n[sync:assignment:1:2|1]";
        assert_eq!(SyncKey::extract(desc), Some(key("assignment:1:2", "1")));
        assert_eq!(SyncKey::extract("no marker here"), None);
        assert_eq!(SyncKey::extract(""), None);
    }

    #[test]
    fn strip_removes_marker_and_trailing_blank_lines() {
        assert_eq!(SyncKey::strip("body\n\n[sync:ASSN-77|CS101]"), "body");
        assert_eq!(SyncKey::strip("[sync:ASSN-77|CS101]"), "");
        assert_eq!(SyncKey::strip("untouched"), "untouched");
    }

    #[test]
    fn inject_replaces_existing_marker() {
        let desc = "body\n\n[sync:old|CS101]";
        assert_eq!(
            key("ASSN-77", "CS101").inject(desc),
            "body\n\n[sync:ASSN-77|CS101]"
        );
        assert_eq!(key("ASSN-77", "CS101").inject(""), "[sync:ASSN-77|CS101]");
    }

    #[test]
    fn injected_marker_extracts_to_the_same_key() {
        let k = key("event:9:31", "9");
        assert_eq!(SyncKey::extract(&k.inject("Lecture hall B")), Some(k));
    }

    #[test]
    fn reserved_characters_are_rejected() {
        assert_eq!(
            SyncKey::new(RecordId::from("a b"), GroupingKey::from("g")),
            Err(SyncKeyError::Reserved("a b".into()))
        );
        assert_eq!(
            SyncKey::new(RecordId::from("a"), GroupingKey::from("")),
            Err(SyncKeyError::Empty)
        );
        assert!(SyncKey::new(RecordId::from("x|y"), GroupingKey::from("g")).is_err());
    }
}
