//! Error types for classboard-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.classboard/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `classboard init` first")]
    ConfigNotFound { path: PathBuf },

    /// A required value is empty after applying environment overrides.
    #[error("missing required config: {0}")]
    Missing(&'static str),

    /// A value is present but unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A record or grouping identity that cannot be embedded in a card marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncKeyError {
    #[error("sync key part is empty")]
    Empty,

    #[error("sync key part '{0}' contains whitespace or a reserved character")]
    Reserved(String),
}
