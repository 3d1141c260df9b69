// config.rs — Engine configuration.
//
// Loaded from TOML, every field optional:
//
//   deny_exit_code = -1
//   record_traces = true
//   max_substitution_depth = 32
//   strategy = "or"
//
// A missing file means defaults. A present but unparseable file is an error
// from `load`, and defaults (with a warning) from `load_or_default`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use poco_sre::{Strategy, DEFAULT_MAX_SUBSTITUTION_DEPTH};

use crate::error::EngineError;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Status the process exits with when an action is denied.
    #[serde(default = "default_deny_exit_code")]
    pub deny_exit_code: i32,

    /// Keep a trace of the most recent round.
    #[serde(default = "default_record_traces")]
    pub record_traces: bool,

    /// Bound on recursive `$name` expansion.
    #[serde(default = "default_max_substitution_depth")]
    pub max_substitution_depth: usize,

    /// Root combination strategy when the policy document names none.
    #[serde(default)]
    pub strategy: Option<Strategy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deny_exit_code: default_deny_exit_code(),
            record_traces: default_record_traces(),
            max_substitution_depth: default_max_substitution_depth(),
            strategy: None,
        }
    }
}

fn default_deny_exit_code() -> i32 {
    -1
}

fn default_record_traces() -> bool {
    true
}

fn default_max_substitution_depth() -> usize {
    DEFAULT_MAX_SUBSTITUTION_DEPTH
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load config from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Try to load config, falling back to defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default engine config");
            Self::default()
        })
    }
}
