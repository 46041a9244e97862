//! Canvas LMS REST client implementing [`SourceApi`].
//!
//! Collections follow `Link: <…>; rel="next"` pagination. Records are
//! assignments and calendar events of active courses whose due (or start)
//! time falls inside the configured window.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use classboard_core::config::CanvasConfig;
use classboard_core::{
    GroupingKey, RecordFilter, RecordId, RecordKind, SourceGroup, SourceRecord,
};
use classboard_sync::{SourceApi, SourceError};

use crate::http;

const PAGE_SIZE: &str = "100";

/// Query parameters that carry credentials.
const SECRET_PARAMS: [&str; 1] = ["access_token"];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub enrollment_term_id: Option<u64>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub term: Option<Term>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Term {
    #[serde(default)]
    pub name: Option<String>,
}

impl Course {
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.course_code.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Course {}", self.id))
    }
}

#[derive(Debug, Deserialize)]
struct Instructor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AssignmentWire {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventWire {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CanvasClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl CanvasClient {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            agent: http::agent(),
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Active enrollments, optionally limited to one term.
    pub fn active_courses(&self, term_id: Option<&str>) -> Result<Vec<Course>, SourceError> {
        let mut params = vec![
            ("enrollment_state", "active".to_string()),
            ("include[]", "term".to_string()),
        ];
        if let Some(term) = term_id {
            params.push(("enrollment_term_id", term.to_string()));
        }
        self.get_paginated("/api/v1/courses", &params)
    }

    fn instructors(&self, course: u64) -> Result<Vec<String>, SourceError> {
        let instructors: Vec<Instructor> = self.get_paginated(
            &format!("/api/v1/courses/{course}/users"),
            &[("enrollment_type[]", "teacher".to_string())],
        )?;
        Ok(instructors
            .into_iter()
            .map(|t| t.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }

    fn assignments(&self, course: u64) -> Result<Vec<AssignmentWire>, SourceError> {
        self.get_paginated(
            &format!("/api/v1/courses/{course}/assignments"),
            &[("include[]", "submission".to_string())],
        )
    }

    fn events(&self, course: u64, window: &Window) -> Result<Vec<EventWire>, SourceError> {
        self.get_paginated(
            "/api/v1/calendar_events",
            &[
                ("context_codes[]", format!("course_{course}")),
                ("type", "event".to_string()),
                ("start_date", window.start.date_naive().to_string()),
                ("end_date", window.end.date_naive().to_string()),
            ],
        )
    }

    fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, SourceError> {
        let mut out = Vec::new();
        let mut request = self
            .agent
            .get(&format!("{}{path}", self.base_url))
            .query("per_page", PAGE_SIZE);
        for (name, value) in params {
            request = request.query(name, value);
        }
        loop {
            let trace = http::Trace::start("canvas", "GET", request.url(), &SECRET_PARAMS, false);
            let response = match request
                .set("Authorization", &format!("Bearer {}", self.token))
                .set("Accept", "application/json")
                .call()
            {
                Ok(response) => {
                    trace.status(response.status());
                    response
                }
                Err(err) => return Err(request_error(path, err, &trace)),
            };
            let next = response.header("Link").and_then(next_link);
            let page: Vec<T> = response
                .into_json()
                .map_err(|e| SourceError::Payload(format!("{path}: {e}")))?;
            out.extend(page);
            match next {
                Some(url) => request = self.agent.get(&url),
                None => return Ok(out),
            }
        }
    }
}

fn request_error(path: &str, err: ureq::Error, trace: &http::Trace) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => {
            trace.status(status);
            let body = response.into_string().unwrap_or_default();
            trace.error_body(&body);
            SourceError::Request(format!("GET {path}: HTTP {status} {}", body.trim()))
        }
        ureq::Error::Transport(t) => {
            trace.failed(&t.to_string());
            SourceError::Request(format!("GET {path}: {t}"))
        }
    }
}

/// The `rel="next"` target of a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            return None;
        }
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        (end > start).then(|| part[start..end].to_string())
    })
}

impl SourceApi for CanvasClient {
    fn fetch_groups(&self, filter: &RecordFilter) -> Result<Vec<SourceGroup>, SourceError> {
        let courses = self.active_courses(filter.term_id.as_deref())?;
        let mut groups = Vec::with_capacity(courses.len());
        for course in courses {
            let instructors = match self.instructors(course.id) {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("course {}: instructors unavailable: {e}", course.id);
                    Vec::new()
                }
            };
            groups.push(SourceGroup {
                key: GroupingKey::from(course.id.to_string()),
                name: course.display_name(),
                info: course_info(&course, &instructors),
            });
        }
        Ok(groups)
    }

    fn fetch_records(
        &self,
        filter: &RecordFilter,
        groups: &[SourceGroup],
    ) -> Result<Vec<SourceRecord>, SourceError> {
        let window = Window::from_now(Utc::now(), filter.due_within_days);
        let mut records = Vec::new();
        for group in groups {
            let course: u64 = group.key.as_str().parse().map_err(|_| {
                SourceError::Payload(format!("course key '{}' is not numeric", group.key))
            })?;
            records.extend(
                self.assignments(course)?
                    .into_iter()
                    .filter_map(|a| assignment_record(&group.key, a, &window)),
            );
            records.extend(
                self.events(course, &window)?
                    .into_iter()
                    .filter_map(|e| event_record(&group.key, e, &window)),
            );
        }
        log::info!("canvas: {} record(s) due in the next {} day(s)", records.len(), filter.due_within_days);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    fn from_now(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now,
            end: now + chrono::Duration::days(i64::from(days)),
        }
    }

    fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        at.is_some_and(|t| self.start <= t && t <= self.end)
    }
}

fn assignment_record(group: &GroupingKey, a: AssignmentWire, window: &Window) -> Option<SourceRecord> {
    if !window.contains(a.due_at) {
        return None;
    }
    Some(SourceRecord {
        id: RecordId::for_item(RecordKind::Assignment, group, &a.id.to_string()),
        kind: RecordKind::Assignment,
        group: group.clone(),
        title: non_empty(a.name).unwrap_or_else(|| "Untitled assignment".to_string()),
        due: a.due_at,
        description: a.description.as_deref().map(html_to_text).filter(|t| !t.is_empty()),
        url: a.html_url.unwrap_or_default(),
    })
}

fn event_record(group: &GroupingKey, e: EventWire, window: &Window) -> Option<SourceRecord> {
    if !window.contains(e.start_at) {
        return None;
    }
    let mut description = e.description.as_deref().map(html_to_text).unwrap_or_default();
    if let Some(location) = non_empty(e.location_name) {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(&format!("Location: {location}"));
    }
    Some(SourceRecord {
        id: RecordId::for_item(RecordKind::Event, group, &e.id.to_string()),
        kind: RecordKind::Event,
        group: group.clone(),
        title: non_empty(e.title).unwrap_or_else(|| "Untitled event".to_string()),
        due: e.start_at,
        description: (!description.is_empty()).then_some(description),
        url: e.html_url.unwrap_or_default(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Body of the "Class Info" card.
fn course_info(course: &Course, instructors: &[String]) -> String {
    let mut lines = Vec::new();
    if let Some(code) = course.course_code.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(format!("Course code: {}", code.trim()));
    }
    if let Some(term) = course.term.as_ref().and_then(|t| t.name.as_deref()) {
        lines.push(format!("Term: {term}"));
    }
    if !instructors.is_empty() {
        let label = if instructors.len() == 1 { "Instructor" } else { "Instructors" };
        lines.push(format!("{label}: {}", instructors.join(", ")));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// HTML → text
// ---------------------------------------------------------------------------

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").expect("valid regex"));
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr)\s*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C\r]+").expect("valid regex"));
static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Good-enough plain text for card descriptions.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, " ");
    let text = unescape(&text).replace('\u{a0}', " ").replace('\u{200b}', "");
    let text = SPACE_RE.replace_all(&text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_RE.replace_all(&lines.join("\n"), "\n\n").trim().to_string()
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let c = match &rest[1..end] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some(' '),
                entity => entity
                    .strip_prefix("#x")
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> Window {
        Window::from_now(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(), 30)
    }

    #[test]
    fn next_link_picks_the_next_relation() {
        let header = r#"<https://lms/api/v1/courses?page=1>; rel="current", <https://lms/api/v1/courses?page=2&per_page=100>; rel="next", <https://lms/api/v1/courses?page=9>; rel="last""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://lms/api/v1/courses?page=2&per_page=100")
        );
        assert_eq!(next_link(r#"<https://lms/x?page=9>; rel="last""#), None);
    }

    #[test]
    fn html_becomes_readable_text() {
        let html = "<p>Read <b>chapter&nbsp;3</b> &amp; answer:</p><ul><li>Q1</li><li>Q2</li></ul>\
                    <script>track()</script><p></p><p>Due &lt;Friday&gt; &#8212; ok</p>";
        assert_eq!(
            html_to_text(html),
            "Read chapter 3 & answer:\nQ1\nQ2\n\nDue <Friday> \u{2014} ok"
        );
        assert_eq!(html_to_text("AT&T"), "AT&T");
    }

    #[test]
    fn assignments_outside_the_window_are_dropped() {
        let group = GroupingKey::from("101");
        let wire = |id: u64, due: Option<DateTime<Utc>>| AssignmentWire {
            id,
            name: Some(format!("HW{id}")),
            due_at: due,
            html_url: Some(format!("https://lms/courses/101/assignments/{id}")),
            description: None,
        };
        let inside = Utc.with_ymd_and_hms(2026, 10, 5, 23, 59, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 12, 5, 23, 59, 0).unwrap();

        let record = assignment_record(&group, wire(7, Some(inside)), &window()).unwrap();
        assert_eq!(record.id, RecordId::from("assignment:101:7"));
        assert_eq!(record.title, "HW7");
        assert!(assignment_record(&group, wire(8, Some(outside)), &window()).is_none());
        assert!(assignment_record(&group, wire(9, None), &window()).is_none());
    }

    #[test]
    fn events_carry_their_location() {
        let group = GroupingKey::from("101");
        let event = EventWire {
            id: 3,
            title: Some("Midterm review".into()),
            start_at: Some(Utc.with_ymd_and_hms(2026, 10, 9, 17, 0, 0).unwrap()),
            html_url: None,
            description: Some("<p>Bring questions</p>".into()),
            location_name: Some("Room 204".into()),
        };
        let record = event_record(&group, event, &window()).unwrap();
        assert_eq!(record.kind, RecordKind::Event);
        assert_eq!(
            record.description.as_deref(),
            Some("Bring questions\n\nLocation: Room 204")
        );
    }

    #[test]
    fn course_info_lists_code_term_and_instructors() {
        let course: Course = serde_json::from_str(
            r#"{"id": 101, "name": "Intro to CS", "course_code": "CS101", "term": {"name": "Fall 2026"}}"#,
        )
        .unwrap();
        assert_eq!(course.display_name(), "Intro to CS");
        assert_eq!(
            course_info(&course, &["Ada Lovelace".into(), "Alan Turing".into()]),
            "Course code: CS101\nTerm: Fall 2026\nInstructors: Ada Lovelace, Alan Turing"
        );
    }
}
