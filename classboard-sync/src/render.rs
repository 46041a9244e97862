//! Card text rendering and content fingerprints.
//!
//! Every description the tool writes ends with the sync key marker; record
//! cards also carry a `Source: <url>` line pointing back at the origin
//! system. Fingerprints are SHA-256 over the normalised title, description
//! and due timestamp, hex encoded.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use classboard_core::{BoardCard, SourceGroup, SourceRecord, SyncKey};

pub const SOURCE_LINK_PREFIX: &str = "Source: ";

/// Description of a record card: source text, origin link, marker.
pub fn record_description(record: &SourceRecord, key: &SyncKey) -> String {
    let mut body = record
        .description
        .as_deref()
        .map(|d| SyncKey::strip(&normalize_text(d)))
        .unwrap_or_default();
    if !record.url.is_empty() {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(SOURCE_LINK_PREFIX);
        body.push_str(&record.url);
    }
    key.inject(&body)
}

/// Description of a group's info card.
pub fn info_description(group: &SourceGroup, key: &SyncKey) -> String {
    let mut body = format!("{} ({})", group.name, group.key);
    let info = normalize_text(&group.info);
    if !info.is_empty() {
        body.push_str("\n\n");
        body.push_str(&info);
    }
    key.inject(&body)
}

/// Title of the token countdown card.
pub fn token_title(expires_on: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(expires_on) = expires_on else {
        return "Canvas token: expiry unknown".to_string();
    };
    let days = (expires_on - today).num_days();
    match days {
        d if d < 0 => format!("Canvas token expired {} day(s) ago ({expires_on})", -d),
        0 => format!("Canvas token expires today ({expires_on})"),
        1 => format!("Canvas token: 1 day left ({expires_on})"),
        d => format!("Canvas token: {d} days left ({expires_on})"),
    }
}

/// Description of the token countdown card.
pub fn token_description(key: &SyncKey) -> String {
    key.inject("Days left on the Canvas API token. Renew it before it expires.")
}

/// The origin link written by [`record_description`], if still present.
pub fn source_link(desc: &str) -> Option<&str> {
    desc.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(SOURCE_LINK_PREFIX))
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

/// True when `desc` contains `url` as a whole link (not as a prefix of a
/// longer one).
pub fn links_to(desc: &str, url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    desc.match_indices(url).any(|(idx, _)| {
        match desc[idx + url.len()..].chars().next() {
            None => true,
            Some(c) => c.is_whitespace() || matches!(c, ')' | '>' | ']' | '"' | '\'' | ','),
        }
    })
}

/// Line endings to LF, outer whitespace trimmed.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Due timestamps compare at whole-second precision; the board API returns
/// milliseconds.
pub fn same_due(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    a.map(|d| d.timestamp()) == b.map(|d| d.timestamp())
}

pub fn fingerprint(name: &str, desc: &str, due: Option<DateTime<Utc>>) -> String {
    let mut h = Sha256::new();
    h.update(normalize_text(name).as_bytes());
    h.update(b"\n\0");
    h.update(normalize_text(desc).as_bytes());
    h.update(b"\n\0");
    if let Some(due) = due {
        h.update(due.timestamp().to_string().as_bytes());
    }
    hex::encode(h.finalize())
}

pub fn card_fingerprint(card: &BoardCard) -> String {
    fingerprint(&card.name, &card.desc, card.due)
}
