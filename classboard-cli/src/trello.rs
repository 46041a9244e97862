//! Trello REST client implementing [`BoardApi`].
//!
//! Auth is the key/token query pair. Mutation fields travel as a form body,
//! never in the URL. Rate limiting (429) is retried here with exponential
//! backoff; every other failure is mapped onto [`BoardError`] and left to
//! the caller.

use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use classboard_core::config::TrelloConfig;
use classboard_core::{BoardCard, BoardList, BoardSnapshot, CardId, Label, LabelId, ListId};
use classboard_sync::{BoardApi, BoardError, CardDraft, CardPatch};

use crate::http;

const API_BASE: &str = "https://api.trello.com/1";

/// Attempts per call when the API answers 429.
const MAX_ATTEMPTS: u32 = 4;

/// Query parameters that carry credentials.
const SECRET_PARAMS: [&str; 2] = ["key", "token"];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListWire {
    id: String,
    name: String,
    #[serde(default)]
    pos: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardWire {
    id: String,
    id_list: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    due: Option<DateTime<Utc>>,
    #[serde(default)]
    id_labels: Vec<String>,
    #[serde(default)]
    pos: f64,
    date_last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LabelWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoardWire {
    id: String,
    #[serde(default)]
    name: String,
}

/// The member owning the token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

impl From<ListWire> for BoardList {
    fn from(w: ListWire) -> Self {
        BoardList {
            id: ListId::from(w.id),
            name: w.name,
            pos: w.pos,
        }
    }
}

impl From<CardWire> for BoardCard {
    fn from(w: CardWire) -> Self {
        BoardCard {
            id: CardId::from(w.id),
            list: ListId::from(w.id_list),
            name: w.name,
            desc: w.desc,
            due: w.due,
            labels: w.id_labels.into_iter().map(LabelId::from).collect(),
            pos: w.pos,
            last_activity: w.date_last_activity.unwrap_or_default(),
        }
    }
}

impl From<LabelWire> for Label {
    fn from(w: LabelWire) -> Self {
        Label {
            id: LabelId::from(w.id),
            name: w.name.unwrap_or_default(),
            color: w.color.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TrelloClient {
    agent: ureq::Agent,
    base_url: String,
    key: String,
    token: String,
    board_id: String,
    board_name: String,
    backoff: Duration,
}

impl TrelloClient {
    /// Connect to the configured board, resolving a board URL to its id.
    pub fn connect(config: &TrelloConfig) -> Result<Self, BoardError> {
        let mut client = Self {
            agent: http::agent(),
            base_url: API_BASE.to_string(),
            key: config.key.clone(),
            token: config.token.clone(),
            board_id: String::new(),
            board_name: String::new(),
            backoff: Duration::from_secs(2),
        };
        let lookup = match config.board_id.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(id) => id.trim().to_string(),
            None => config
                .board_url
                .as_deref()
                .and_then(shortlink_from_url)
                .map(str::to_string)
                .ok_or_else(|| BoardError::Rejected {
                    status: 0,
                    message: "could not read a board shortlink from trello.board_url".to_string(),
                })?,
        };
        let board: BoardWire = client.send(
            "GET",
            &format!("/boards/{lookup}"),
            &[("fields", "id,name".to_string())],
            ("board", &lookup),
        )?;
        client.board_id = board.id;
        client.board_name = board.name;
        Ok(client)
    }

    pub fn board_name(&self) -> &str {
        &self.board_name
    }

    /// Who the token belongs to.
    pub fn me(&self) -> Result<Member, BoardError> {
        self.send(
            "GET",
            "/members/me",
            &[("fields", "id,username,fullName".to_string())],
            ("member", "me"),
        )
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        params: &[(&str, String)],
        target: (&'static str, &str),
    ) -> Result<T, BoardError> {
        let url = format!("{}{path}", self.base_url);
        let form = sends_form(method);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self
                .agent
                .request(method, &url)
                .query("key", &self.key)
                .query("token", &self.token);
            if !form {
                for (name, value) in params {
                    request = request.query(name, value);
                }
            }
            let trace = http::Trace::start("trello", method, request.url(), &SECRET_PARAMS, form);
            let result = if form {
                let fields: Vec<(&str, &str)> =
                    params.iter().map(|(name, value)| (*name, value.as_str())).collect();
                request.send_form(&fields)
            } else {
                request.call()
            };

            match result {
                Ok(response) => {
                    trace.status(response.status());
                    return response
                        .into_json::<T>()
                        .map_err(|e| BoardError::Transport(format!("{method} {path}: {e}")));
                }
                Err(ureq::Error::Status(429, response)) if attempt < MAX_ATTEMPTS => {
                    trace.status(429);
                    let wait = retry_after(response.header("Retry-After"))
                        .unwrap_or(self.backoff * 2u32.pow(attempt - 1));
                    log::warn!("{method} {path}: rate limited, retrying in {}s", wait.as_secs());
                    sleep(wait);
                }
                Err(ureq::Error::Status(status, response)) => {
                    trace.status(status);
                    let body = response.into_string().unwrap_or_default();
                    trace.error_body(&body);
                    return Err(map_status(status, body.trim(), target));
                }
                Err(ureq::Error::Transport(transport)) => {
                    let reason = self.redact(&transport.to_string());
                    trace.failed(&reason);
                    return Err(BoardError::Transport(reason));
                }
            }
        }
    }

    /// Keep credentials out of error messages that echo the URL.
    fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in [&self.key, &self.token] {
            if !secret.is_empty() {
                out = out.replace(secret.as_str(), "<redacted>");
            }
        }
        out
    }
}

/// POST and PUT carry their fields as a form body; other methods use the
/// query string.
fn sends_form(method: &str) -> bool {
    matches!(method, "POST" | "PUT")
}

/// Map a non-success HTTP status.
pub fn map_status(status: u16, body: &str, target: (&'static str, &str)) -> BoardError {
    match status {
        404 => BoardError::NotFound {
            kind: target.0,
            id: target.1.to_string(),
        },
        409 => BoardError::Conflict(body.to_string()),
        429 => BoardError::RateLimited,
        400..=499 => BoardError::Rejected {
            status,
            message: body.to_string(),
        },
        _ => BoardError::Transport(format!("HTTP {status}: {body}")),
    }
}

/// Seconds from a `Retry-After` header.
fn retry_after(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// `https://trello.com/b/<shortlink>/<slug>` → `<shortlink>`.
pub fn shortlink_from_url(url: &str) -> Option<&str> {
    let mut parts = url.split('/');
    parts.find(|p| *p == "b")?;
    parts.next().map(str::trim).filter(|s| !s.is_empty())
}

fn format_pos(pos: f64) -> String {
    format!("{pos}")
}

fn format_due(due: DateTime<Utc>) -> String {
    due.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl BoardApi for TrelloClient {
    fn board_id(&self) -> &str {
        &self.board_id
    }

    fn snapshot(&self) -> Result<BoardSnapshot, BoardError> {
        let board = self.board_id.as_str();
        let lists: Vec<ListWire> = self.send(
            "GET",
            &format!("/boards/{board}/lists"),
            &[
                ("filter", "open".to_string()),
                ("fields", "id,name,pos".to_string()),
            ],
            ("board", board),
        )?;
        let cards: Vec<CardWire> = self.send(
            "GET",
            &format!("/boards/{board}/cards"),
            &[
                ("filter", "open".to_string()),
                (
                    "fields",
                    "id,idList,name,desc,due,idLabels,pos,dateLastActivity".to_string(),
                ),
            ],
            ("board", board),
        )?;
        let labels: Vec<LabelWire> = self.send(
            "GET",
            &format!("/boards/{board}/labels"),
            &[
                ("fields", "id,name,color".to_string()),
                ("limit", "1000".to_string()),
            ],
            ("board", board),
        )?;
        Ok(BoardSnapshot {
            board_id: self.board_id.clone(),
            lists: lists.into_iter().map(BoardList::from).collect(),
            cards: cards.into_iter().map(BoardCard::from).collect(),
            labels: labels.into_iter().map(Label::from).collect(),
        })
    }

    fn create_list(&mut self, name: &str, pos: f64) -> Result<BoardList, BoardError> {
        let list: ListWire = self.send(
            "POST",
            "/lists",
            &[
                ("idBoard", self.board_id.clone()),
                ("name", name.to_string()),
                ("pos", format_pos(pos)),
            ],
            ("board", &self.board_id),
        )?;
        Ok(list.into())
    }

    fn create_label(&mut self, name: &str, color: &str) -> Result<Label, BoardError> {
        let label: LabelWire = self.send(
            "POST",
            "/labels",
            &[
                ("idBoard", self.board_id.clone()),
                ("name", name.to_string()),
                ("color", color.to_string()),
            ],
            ("board", &self.board_id),
        )?;
        Ok(label.into())
    }

    fn create_card(&mut self, draft: &CardDraft) -> Result<BoardCard, BoardError> {
        let mut params = vec![
            ("idList", draft.list.to_string()),
            ("name", draft.name.clone()),
            ("desc", draft.desc.clone()),
            ("pos", format_pos(draft.pos)),
        ];
        if let Some(due) = draft.due {
            params.push(("due", format_due(due)));
        }
        if !draft.labels.is_empty() {
            let ids: Vec<&str> = draft.labels.iter().map(LabelId::as_str).collect();
            params.push(("idLabels", ids.join(",")));
        }
        let card: CardWire = self.send("POST", "/cards", &params, ("list", draft.list.as_str()))?;
        Ok(card.into())
    }

    fn update_card(&mut self, card: &CardId, patch: &CardPatch) -> Result<BoardCard, BoardError> {
        let mut params = Vec::new();
        if let Some(name) = &patch.name {
            params.push(("name", name.clone()));
        }
        if let Some(desc) = &patch.desc {
            params.push(("desc", desc.clone()));
        }
        if let Some(due) = patch.due {
            params.push(("due", due.map(format_due).unwrap_or_default()));
        }
        if let Some(pos) = patch.pos {
            params.push(("pos", format_pos(pos)));
        }
        let updated: CardWire = self.send(
            "PUT",
            &format!("/cards/{card}"),
            &params,
            ("card", card.as_str()),
        )?;
        Ok(updated.into())
    }

    fn add_label(&mut self, card: &CardId, label: &LabelId) -> Result<(), BoardError> {
        let result: Result<serde_json::Value, BoardError> = self.send(
            "POST",
            &format!("/cards/{card}/idLabels"),
            &[("value", label.to_string())],
            ("card", card.as_str()),
        );
        match result {
            Ok(_) => Ok(()),
            // Trello answers 400 when the label is already on the card.
            Err(BoardError::Rejected { status: 400, message })
                if message.to_lowercase().contains("already") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn archive_card(&mut self, card: &CardId) -> Result<(), BoardError> {
        let _: serde_json::Value = self.send(
            "PUT",
            &format!("/cards/{card}"),
            &[("closed", "true".to_string())],
            ("card", card.as_str()),
        )?;
        Ok(())
    }

    fn archive_list(&mut self, list: &ListId) -> Result<(), BoardError> {
        let _: serde_json::Value = self.send(
            "PUT",
            &format!("/lists/{list}/closed"),
            &[("value", "true".to_string())],
            ("list", list.as_str()),
        )?;
        Ok(())
    }

    /// Labels cannot be archived on Trello; they are deleted.
    fn archive_label(&mut self, label: &LabelId) -> Result<(), BoardError> {
        let _: serde_json::Value = self.send(
            "DELETE",
            &format!("/labels/{label}"),
            &[],
            ("label", label.as_str()),
        )?;
        Ok(())
    }
}
