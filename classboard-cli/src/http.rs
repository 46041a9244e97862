//! HTTP plumbing shared by the API clients.
//!
//! Request tracing goes to the `classboard::http` log target at debug level;
//! `--log-http` enables that target regardless of `--log-level`. Query values
//! that carry credentials are redacted before anything is logged.

use std::time::{Duration, Instant};

/// Log target of request traces.
pub const TARGET: &str = "classboard::http";

/// Longest error body written to the trace.
const MAX_BODY_CHARS: usize = 800;

const USER_AGENT: &str = concat!("classboard/", env!("CARGO_PKG_VERSION"));

pub fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(30))
        .timeout_write(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()
}

/// `url` with the values of the `keys` query parameters replaced.
pub fn redact_query(url: &str, keys: &[&str]) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if keys.contains(&name) => format!("{name}=<redacted>"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}?{}", pairs.join("&"))
}

/// One traced request.
pub struct Trace {
    service: &'static str,
    started: Instant,
}

impl Trace {
    pub fn start(service: &'static str, method: &str, url: &str, secrets: &[&str], form: bool) -> Self {
        log::debug!(
            target: TARGET,
            "[{service}] {method} {} form={}",
            redact_query(url, secrets),
            if form { "yes" } else { "no" }
        );
        Self {
            service,
            started: Instant::now(),
        }
    }

    pub fn status(&self, status: u16) {
        log::debug!(
            target: TARGET,
            "[{}] -> {status} {}ms",
            self.service,
            self.started.elapsed().as_millis()
        );
    }

    pub fn error_body(&self, body: &str) {
        let body: String = body.chars().take(MAX_BODY_CHARS).collect();
        log::debug!(target: TARGET, "[{}] error_body={body:?}", self.service);
    }

    pub fn failed(&self, reason: &str) {
        log::debug!(
            target: TARGET,
            "[{}] -> failed after {}ms: {reason}",
            self.service,
            self.started.elapsed().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_redacted_from_query() {
        assert_eq!(
            redact_query(
                "https://api.trello.com/1/boards/b1?key=k123&token=t456&fields=id",
                &["key", "token"]
            ),
            "https://api.trello.com/1/boards/b1?key=<redacted>&token=<redacted>&fields=id"
        );
    }

    #[test]
    fn urls_without_secrets_pass_through() {
        let url = "https://canvas.example.edu/api/v1/courses?per_page=100";
        assert_eq!(redact_query(url, &["access_token"]), url);
        assert_eq!(redact_query("https://x.test/a", &["key"]), "https://x.test/a");
    }
}
