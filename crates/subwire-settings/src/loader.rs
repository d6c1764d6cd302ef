//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use subwire_broadcast::BufferPolicy;
use subwire_protocol::Dialect;
use subwire_telemetry::LogFormat;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::SubwireSettings;

/// Resolve the path to the settings file (`~/.subwire/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".subwire").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SubwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`SubwireSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SubwireSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, resolving overrides through `lookup`.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SubwireSettings> {
    let defaults = serde_json::to_value(SubwireSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SubwireSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SUBWIRE_*` environment overrides.
pub fn apply_env_overrides(settings: &mut SubwireSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides resolved through `lookup`.
///
/// Values are parsed strictly; invalid values are ignored with a warning.
pub fn apply_overrides(settings: &mut SubwireSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SUBWIRE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_PORT", |s| parse_range(s, 0u16, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("SUBWIRE_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_MAX_CONNECTIONS", |s| {
        parse_range(s, 1usize, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_MAX_MESSAGE_SIZE", |s| {
        parse_range(s, 1024usize, 64 * 1024 * 1024)
    }) {
        settings.server.max_message_size = v;
    }

    // ── Protocol ────────────────────────────────────────────────────
    if let Some(v) = env.parsed("SUBWIRE_KEEP_ALIVE_MS", |s| parse_range(s, 0u64, 600_000)) {
        settings.keep_alive.interval_ms = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_DIALECTS", parse_dialects) {
        settings.protocol.dialects = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_HUB_BUFFER", parse_buffer_policy) {
        settings.hub.buffer = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_ALLOW_INTROSPECTION", parse_bool) {
        settings.security.allow_introspection = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SUBWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("SUBWIRE_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number within an inclusive range.
pub fn parse_range<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a comma-separated dialect list, e.g. `graphql-ws,graphql-transport-ws`.
pub fn parse_dialects(val: &str) -> Option<Vec<Dialect>> {
    let dialects = val
        .split(',')
        .map(Dialect::from_protocol)
        .collect::<Option<Vec<_>>>()?;
    (!dialects.is_empty()).then_some(dialects)
}

/// Parse `unbounded` or a positive capacity.
pub fn parse_buffer_policy(val: &str) -> Option<BufferPolicy> {
    if val.trim().eq_ignore_ascii_case("unbounded") {
        return Some(BufferPolicy::Unbounded);
    }
    parse_range(val, 1usize, 1_000_000).map(BufferPolicy::Bounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 4000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"dialects": ["a", "b"]});
        let source = serde_json::json!({"dialects": ["c"]});
        assert_eq!(deep_merge(target, source)["dialects"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"hub": {"buffer": "unbounded"}});
        let source = serde_json::json!({"hub": 5});
        assert_eq!(deep_merge(target, source)["hub"], 5);
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_with(&dir.path().join("nope.json"), no_env).unwrap();
        assert_eq!(settings, SubwireSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7000}, "keepAlive": {"intervalMs": 0}, "protocol": {"dialects": ["graphql-ws"]}}"#,
        )
        .unwrap();
        let settings = load_settings_with(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.path, "/graphql");
        assert_eq!(settings.keep_alive.interval_ms, 0);
        assert_eq!(settings.protocol.dialects, vec![Dialect::GraphqlWs]);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings_with(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Malformed { .. }));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"protocol": {"dialects": []}}"#).unwrap();
        let err = load_settings_with(&path, no_env).unwrap_err();
        assert_eq!(err.field(), Some("protocol.dialects"));
    }

    #[test]
    fn load_reports_mistyped_field_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "high"}}"#).unwrap();
        match load_settings_with(&path, no_env).unwrap_err() {
            SettingsError::Malformed { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000}}"#).unwrap();
        let settings = load_settings_with(&path, env_of(&[("SUBWIRE_PORT", "7100")])).unwrap();
        assert_eq!(settings.server.port, 7100);
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_each_key() {
        let mut settings = SubwireSettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("SUBWIRE_HOST", "0.0.0.0"),
                ("SUBWIRE_PATH", "/ws"),
                ("SUBWIRE_MAX_CONNECTIONS", "10"),
                ("SUBWIRE_MAX_MESSAGE_SIZE", "4096"),
                ("SUBWIRE_KEEP_ALIVE_MS", "0"),
                ("SUBWIRE_DIALECTS", "graphql-ws"),
                ("SUBWIRE_HUB_BUFFER", "32"),
                ("SUBWIRE_ALLOW_INTROSPECTION", "off"),
                ("SUBWIRE_LOG_LEVEL", "debug"),
                ("SUBWIRE_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.path, "/ws");
        assert_eq!(settings.server.max_connections, 10);
        assert_eq!(settings.server.max_message_size, 4096);
        assert_eq!(settings.keep_alive.interval_ms, 0);
        assert_eq!(settings.protocol.dialects, vec![Dialect::GraphqlWs]);
        assert_eq!(settings.hub.buffer, BufferPolicy::Bounded(32));
        assert!(!settings.security.allow_introspection);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = SubwireSettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("SUBWIRE_PORT", "99999"),
                ("SUBWIRE_MAX_CONNECTIONS", "0"),
                ("SUBWIRE_DIALECTS", "graphql-ws,mqtt"),
                ("SUBWIRE_HUB_BUFFER", "lots"),
                ("SUBWIRE_ALLOW_INTROSPECTION", "maybe"),
                ("SUBWIRE_HOST", ""),
            ]),
        );
        assert_eq!(settings, SubwireSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_range("10", 1u16, 10), Some(10));
        assert_eq!(parse_range("11", 1u16, 10), None);
        assert_eq!(parse_range("-1", 0u64, 10), None);
        assert_eq!(parse_range("abc", 0usize, 10), None);
    }

    #[test]
    fn parse_dialect_lists() {
        assert_eq!(
            parse_dialects("graphql-ws, graphql-transport-ws"),
            Some(vec![Dialect::GraphqlWs, Dialect::GraphqlTransportWs])
        );
        assert_eq!(parse_dialects("graphql-ws,"), None);
    }

    #[test]
    fn parse_buffer_policies() {
        assert_eq!(parse_buffer_policy("Unbounded"), Some(BufferPolicy::Unbounded));
        assert_eq!(parse_buffer_policy("64"), Some(BufferPolicy::Bounded(64)));
        assert_eq!(parse_buffer_policy("0"), None);
    }
}
