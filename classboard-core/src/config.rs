//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.classboard/
//!   config.yaml   (mode 0600 — holds API tokens)
//!   state.json    (default sync state location)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Secrets may also come from the environment; see [`Config::apply_env`].

use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::RecordFilter;

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub trello: TrelloConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
}

/// Source API (Canvas) access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
    /// Day the API token was issued; drives the countdown card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_created_at: Option<NaiveDate>,
    #[serde(default = "default_token_lifetime_days")]
    pub token_lifetime_days: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            term_id: None,
            token_created_at: None,
            token_lifetime_days: default_token_lifetime_days(),
        }
    }
}

/// Board API (Trello) access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrelloConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    /// `https://trello.com/b/<shortlink>/...`; used when `board_id` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_url: Option<String>,
}

/// Run cadence and state location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_due_within_days")]
    pub due_within_days: u32,
    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u32,
    /// Defaults to `~/.classboard/state.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            due_within_days: default_due_within_days(),
            poll_interval_minutes: default_poll_interval_minutes(),
            state_file: None,
        }
    }
}

/// Names of the fixed board layout objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSettings {
    #[serde(default = "default_token_list")]
    pub token_list: String,
    #[serde(default = "default_info_card_title")]
    pub info_card_title: String,
    #[serde(default = "default_utility_lists")]
    pub utility_lists: Vec<String>,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            token_list: default_token_list(),
            info_card_title: default_info_card_title(),
            utility_lists: default_utility_lists(),
        }
    }
}

fn default_token_lifetime_days() -> u32 {
    120
}

fn default_due_within_days() -> u32 {
    30
}

fn default_poll_interval_minutes() -> u32 {
    30
}

fn default_token_list() -> String {
    "Canvas Token".to_string()
}

fn default_info_card_title() -> String {
    "Class Info".to_string()
}

fn default_utility_lists() -> Vec<String> {
    vec!["Done".to_string(), "Parking Lot".to_string()]
}

// ---------------------------------------------------------------------------
// 2. Derived values
// ---------------------------------------------------------------------------

impl Config {
    /// Overlay environment values onto the file values.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("CANVAS_BASE_URL") {
            self.canvas.base_url = v;
        }
        if let Some(v) = get("CANVAS_TOKEN") {
            self.canvas.token = v;
        }
        if let Some(v) = get("CANVAS_TERM_ID") {
            self.canvas.term_id = Some(v);
        }
        if let Some(v) = get("TRELLO_KEY") {
            self.trello.key = v;
        }
        if let Some(v) = get("TRELLO_TOKEN") {
            self.trello.token = v;
        }
        if let Some(v) = get("TRELLO_BOARD_ID") {
            self.trello.board_id = Some(v);
        }
        if let Some(v) = get("TRELLO_BOARD_URL") {
            self.trello.board_url = Some(v);
        }
    }

    /// Check that every value a sync run needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.canvas.base_url, "canvas.base_url")?;
        require(&self.canvas.token, "canvas.token")?;
        require(&self.trello.key, "trello.key")?;
        require(&self.trello.token, "trello.token")?;
        let has_board = self.trello.board_id.as_deref().is_some_and(|s| !s.is_empty())
            || self.trello.board_url.as_deref().is_some_and(|s| !s.is_empty());
        if !has_board {
            return Err(ConfigError::Missing("trello.board_id or trello.board_url"));
        }
        if self.layout.utility_lists.len() != 2 {
            return Err(ConfigError::Invalid {
                field: "layout.utility_lists",
                reason: format!("expected 2 names, got {}", self.layout.utility_lists.len()),
            });
        }
        Ok(())
    }

    /// Where the sync state lives for this config.
    pub fn state_path_at(&self, home: &Path) -> PathBuf {
        self.sync
            .state_file
            .clone()
            .unwrap_or_else(|| classboard_dir_at(home).join("state.json"))
    }

    /// The fetch window handed to the source client.
    pub fn record_filter(&self) -> RecordFilter {
        RecordFilter {
            due_within_days: self.sync.due_within_days,
            term_id: self.canvas.term_id.clone(),
        }
    }

    /// Day the source API token stops working, when its issue date is known.
    pub fn token_expires_on(&self) -> Option<NaiveDate> {
        self.canvas
            .token_created_at
            .and_then(|d| d.checked_add_days(Days::new(u64::from(self.canvas.token_lifetime_days))))
    }
}

fn require(value: &str, name: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.classboard/` — pure, no I/O.
pub fn classboard_dir_at(home: &Path) -> PathBuf {
    home.join(".classboard")
}

/// `<home>/.classboard/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    classboard_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 4. Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.classboard/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = classboard_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Write a default config if none exists yet.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path) -> Result<Config, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = Config::default();
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<Config, ConfigError> {
    init_at(&home()?)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn complete() -> Config {
        let mut cfg = Config::default();
        cfg.canvas.base_url = "https://canvas.example.edu".into();
        cfg.canvas.token = "ct".into();
        cfg.trello.key = "tk".into();
        cfg.trello.token = "tt".into();
        cfg.trello.board_id = Some("board1".into());
        cfg
    }

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(config_path_at(home.path()).ends_with(".classboard/config.yaml"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.due_within_days, 30);
        assert_eq!(cfg.sync.poll_interval_minutes, 30);
        assert_eq!(cfg.canvas.token_lifetime_days, 120);
        assert_eq!(cfg.layout.utility_lists, vec!["Done", "Parking Lot"]);
        assert_eq!(cfg.layout.info_card_title, "Class Info");
    }

    #[test]
    fn env_overrides_file_values_and_ignores_blanks() {
        let mut cfg = complete();
        let env: HashMap<&str, &str> =
            HashMap::from([("TRELLO_TOKEN", "from-env"), ("CANVAS_TOKEN", "   ")]);
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.trello.token, "from-env");
        assert_eq!(cfg.canvas.token, "ct");
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let mut cfg = complete();
        cfg.trello.key.clear();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("trello.key")), "got: {err}");

        let mut cfg = complete();
        cfg.trello.board_id = None;
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing(_))));

        cfg.trello.board_url = Some("https://trello.com/b/abc/board".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn token_expiry_adds_lifetime() {
        let mut cfg = complete();
        assert_eq!(cfg.token_expires_on(), None);
        cfg.canvas.token_created_at = NaiveDate::from_ymd_opt(2026, 1, 1);
        cfg.canvas.token_lifetime_days = 31;
        assert_eq!(cfg.token_expires_on(), NaiveDate::from_ymd_opt(2026, 2, 1));
    }

    #[test]
    fn state_path_defaults_under_classboard_dir() {
        let home = TempDir::new().expect("tempdir");
        let cfg = complete();
        assert!(cfg.state_path_at(home.path()).ends_with(".classboard/state.json"));
    }

    #[test]
    fn init_is_idempotent() {
        let home = TempDir::new().expect("tempdir");
        let first = init_at(home.path()).expect("init");
        let mut edited = first.clone();
        edited.canvas.base_url = "https://lms.example".into();
        save_at(home.path(), &edited).expect("save");
        let second = init_at(home.path()).expect("init again");
        assert_eq!(second, edited);
    }
}
