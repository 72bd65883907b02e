//! Run configuration (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{BatonError, Result};

/// Settings that bound and shape a run.
///
/// Passed explicitly to [`crate::run::Runner`]; there is no process-wide
/// default instance.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of model turns per run.
    #[builder(default = 10)]
    pub max_turns: usize,
    /// Upper bound on tool calls executing at the same time.
    #[builder(default = 8)]
    pub max_tool_concurrency: usize,
    /// Abort the run when a tool handler fails instead of reporting the
    /// failure to the model.
    #[builder(default)]
    pub tool_errors_fatal: bool,
    /// Maximum gap between streamed model events. `0` disables the check.
    #[builder(default = 120_000)]
    pub stream_idle_timeout_ms: u64,
    /// Only load the newest N session items at run start.
    pub session_history_limit: Option<usize>,
    #[builder(default)]
    pub compaction: CompactionConfig,
}

/// Settings for [`crate::session::CompactingSession`].
#[derive(Debug, Clone, Copy, Builder, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompactionConfig {
    /// Minimum number of compactable items before a summary is produced.
    #[builder(default = 40)]
    pub threshold: usize,
    /// Number of newest items that are never summarized.
    #[builder(default = 10)]
    pub keep_recent: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunConfig {
    /// Defaults overlaid with `BATON_*` environment variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| BatonError::Configuration(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(err.into()),
        };
        let _ = dotenvy::dotenv();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from [`default_config_path`].
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Overlay values from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "BATON_MAX_TURNS")? {
            self.max_turns = v;
        }
        if let Some(v) = parse_var(&lookup, "BATON_MAX_TOOL_CONCURRENCY")? {
            self.max_tool_concurrency = v;
        }
        if let Some(v) = parse_bool_var(&lookup, "BATON_TOOL_ERRORS_FATAL")? {
            self.tool_errors_fatal = v;
        }
        if let Some(v) = parse_var(&lookup, "BATON_STREAM_IDLE_TIMEOUT_MS")? {
            self.stream_idle_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "BATON_SESSION_HISTORY_LIMIT")? {
            self.session_history_limit = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "BATON_COMPACTION_THRESHOLD")? {
            self.compaction.threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "BATON_COMPACTION_KEEP_RECENT")? {
            self.compaction.keep_recent = v;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(BatonError::Configuration(
                "max_turns must be at least 1".into(),
            ));
        }
        if self.max_tool_concurrency == 0 {
            return Err(BatonError::Configuration(
                "max_tool_concurrency must be at least 1".into(),
            ));
        }
        if self.compaction.threshold == 0 {
            return Err(BatonError::Configuration(
                "compaction.threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Idle timeout for streamed model calls, if enabled.
    pub fn stream_idle_timeout(&self) -> Option<std::time::Duration> {
        (self.stream_idle_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.stream_idle_timeout_ms))
    }
}

/// Base directory for baton state (`~/.baton`).
pub fn default_baton_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".baton"))
        .unwrap_or_else(|| PathBuf::from(".baton"))
}

/// `~/.baton/config.toml`
pub fn default_config_path() -> PathBuf {
    default_baton_dir().join("config.toml")
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| BatonError::Configuration(format!("{key}={raw}: {e}"))),
    }
}

fn parse_bool_var<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(BatonError::Configuration(format!(
            "{key}={other}: expected a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RunConfig::default();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.max_tool_concurrency, 8);
        assert!(!config.tool_errors_fatal);
        assert_eq!(config.stream_idle_timeout_ms, 120_000);
        assert_eq!(config.session_history_limit, None);
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = RunConfig::from_toml_str(
            r#"
            max_turns = 3
            [compaction]
            keep_recent = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.max_turns, 3);
        assert_eq!(config.max_tool_concurrency, 8);
        assert_eq!(config.compaction.keep_recent, 4);
        assert_eq!(config.compaction.threshold, 40);
    }

    #[test]
    fn env_overrides_toml_values() {
        let mut config = RunConfig::from_toml_str("max_turns = 3").unwrap();
        config
            .apply_env(lookup(&[
                ("BATON_MAX_TURNS", "7"),
                ("BATON_TOOL_ERRORS_FATAL", "true"),
                ("BATON_SESSION_HISTORY_LIMIT", "50"),
            ]))
            .unwrap();

        assert_eq!(config.max_turns, 7);
        assert!(config.tool_errors_fatal);
        assert_eq!(config.session_history_limit, Some(50));
    }

    #[test]
    fn invalid_env_value_is_configuration_error() {
        let mut config = RunConfig::default();
        let err = config
            .apply_env(lookup(&[("BATON_MAX_TOOL_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(matches!(err, BatonError::Configuration(_)));
    }

    #[test]
    fn zero_turns_is_rejected() {
        let err = RunConfig::from_toml_str("max_turns = 0").unwrap_err();
        assert!(err.to_string().contains("max_turns"));
    }

    #[test]
    fn zero_idle_timeout_disables_check() {
        let config = RunConfig::builder().stream_idle_timeout_ms(0).build();
        assert!(config.stream_idle_timeout().is_none());
    }
}
