//! Tests for configuration loading.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use baton::config::{CompactionConfig, RunConfig};
use baton::BatonError;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = RunConfig::default();
    assert_eq!(config.max_turns, 10);
    assert_eq!(config.max_tool_concurrency, 8);
    assert!(!config.tool_errors_fatal);
    assert_eq!(config.compaction, CompactionConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn toml_overrides_only_named_keys() {
    let config = RunConfig::from_toml_str(
        r#"
        max_turns = 4
        stream_idle_timeout_ms = 0

        [compaction]
        keep_recent = 3
        "#,
    )
    .unwrap();

    assert_eq!(config.max_turns, 4);
    assert_eq!(config.max_tool_concurrency, 8);
    assert_eq!(config.stream_idle_timeout(), None);
    assert_eq!(config.compaction.keep_recent, 3);
    assert_eq!(config.compaction.threshold, 40);
}

#[test]
fn environment_overrides_file_values() {
    let mut config = RunConfig::from_toml_str("max_turns = 4").unwrap();
    config
        .apply_env(lookup(&[
            ("BATON_MAX_TURNS", "12"),
            ("BATON_TOOL_ERRORS_FATAL", "yes"),
            ("BATON_SESSION_HISTORY_LIMIT", "50"),
            ("BATON_COMPACTION_THRESHOLD", " "),
        ]))
        .unwrap();

    assert_eq!(config.max_turns, 12);
    assert!(config.tool_errors_fatal);
    assert_eq!(config.session_history_limit, Some(50));
    assert_eq!(config.compaction.threshold, 40);
}

#[test]
fn bad_values_are_configuration_errors() {
    let mut config = RunConfig::default();
    let err = config
        .apply_env(lookup(&[("BATON_MAX_TURNS", "many")]))
        .unwrap_err();
    assert!(matches!(err, BatonError::Configuration(ref m) if m.contains("BATON_MAX_TURNS")));

    let err = RunConfig::default()
        .apply_env(lookup(&[("BATON_TOOL_ERRORS_FATAL", "maybe")]))
        .unwrap_err();
    assert!(matches!(err, BatonError::Configuration(_)));

    assert!(RunConfig::from_toml_str("max_turns = 0").is_err());
    assert!(RunConfig::from_toml_str("max_turns = \"ten\"").is_err());
}

#[test]
fn load_reads_file_and_tolerates_missing_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "max_tool_concurrency = 2\n").unwrap();

    let loaded = RunConfig::load(&path).unwrap();
    assert_eq!(loaded.max_tool_concurrency, 2);

    let missing = RunConfig::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(missing.max_tool_concurrency, 8);
}

#[test]
fn builder_matches_defaults() {
    let built = RunConfig::builder().max_turns(3).build();
    assert_eq!(
        built,
        RunConfig {
            max_turns: 3,
            ..RunConfig::default()
        }
    );
}
