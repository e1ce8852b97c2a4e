//! Configuration loading and management
//!
//! Handles parsing of `tmmigrate.toml`. Every field has a default, so the
//! file is optional.

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "tmmigrate.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Username resolution
    #[serde(default)]
    pub users: UsersConfig,

    /// Timeline reconstruction
    #[serde(default)]
    pub timeline: TimelineConfig,

    /// Target database
    #[serde(default)]
    pub target: TargetConfig,
}

/// Username resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// Cache of previous lookups (`name;id;` lines)
    #[serde(default = "default_users_cache")]
    pub cache: String,

    /// Lookup service URL; `{name}` is replaced by the username
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// Never call the lookup service; uncached names stay unresolved
    #[serde(default)]
    pub offline: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_users_cache() -> String {
    "users.list".to_string()
}

fn default_lookup_url() -> String {
    "http://whosthat.osmz.ru/whosthat.php?action=names&q={name}".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            cache: default_users_cache(),
            lookup_url: default_lookup_url(),
            offline: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UsersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timeline reconstruction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Date of the synthesized initial state and lock of every task
    #[serde(default = "default_sentinel")]
    pub sentinel: NaiveDateTime,
}

fn default_sentinel() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2010, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
        }
    }
}

/// Target database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Empty the v2 tables before importing
    #[serde(default = "default_true")]
    pub reset: bool,

    /// Sequence generating project ids
    #[serde(default = "default_project_sequence")]
    pub project_sequence: String,

    /// Locale of the project translation rows
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_true() -> bool {
    true
}

fn default_project_sequence() -> String {
    "project_id_seq".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            reset: true,
            project_sequence: default_project_sequence(),
            locale: default_locale(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `tmmigrate.toml` in `dir` when present,
    /// else defaults. An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let implicit = dir.join(CONFIG_FILE);
        if implicit.exists() {
            Self::load(&implicit)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.users.validate()?;
        self.target.validate()?;
        Ok(())
    }
}

impl UsersConfig {
    fn validate(&self) -> Result<()> {
        if self.cache.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "users.cache cannot be empty".to_string(),
            ));
        }
        if !self.lookup_url.contains("{name}") {
            return Err(Error::InvalidConfig(
                "users.lookup_url must contain {name}".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "users.timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl TargetConfig {
    fn validate(&self) -> Result<()> {
        if !is_identifier(&self.project_sequence) {
            return Err(Error::InvalidConfig(format!(
                "target.project_sequence '{}' is not a valid identifier",
                self.project_sequence
            )));
        }
        if self.locale.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "target.locale cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Plain or schema-qualified SQL identifier, safe to splice into DDL.
fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.users.cache, "users.list");
        assert!(cfg.users.lookup_url.contains("whosthat"));
        assert!(!cfg.users.offline);
        assert_eq!(cfg.users.timeout_secs, 30);
        assert_eq!(
            cfg.timeline.sentinel.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2010-01-01 00:00:00"
        );
        assert!(cfg.target.reset);
        assert_eq!(cfg.target.project_sequence, "project_id_seq");
        assert_eq!(cfg.target.locale, "en");
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[users]
cache = "cache/users.list"
lookup_url = "https://names.example/lookup?q={name}"
offline = true
timeout_secs = 5

[timeline]
sentinel = "2009-12-31T23:00:00"

[target]
reset = false
project_sequence = "public.project_id_seq"
locale = "fr"
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.users.cache, "cache/users.list");
        assert_eq!(cfg.users.lookup_url, "https://names.example/lookup?q={name}");
        assert!(cfg.users.offline);
        assert_eq!(cfg.users.timeout(), Duration::from_secs(5));
        assert_eq!(
            cfg.timeline.sentinel.format("%Y-%m-%d %H:%M").to_string(),
            "2009-12-31 23:00"
        );
        assert!(!cfg.target.reset);
        assert_eq!(cfg.target.project_sequence, "public.project_id_seq");
        assert_eq!(cfg.target.locale, "fr");
    }

    #[test]
    fn invalid_sequence_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[target]\nproject_sequence = \"seq; DROP TABLE task\"")
            .expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lookup_url_needs_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[users]\nlookup_url = \"http://example/lookup\"").expect("write");

        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_or_default_falls_back_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_or_default(None, dir.path()).expect("defaults");
        assert_eq!(cfg.users.cache, "users.list");
    }

    #[test]
    fn load_or_default_requires_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let err = Config::load_or_default(Some(&missing), dir.path()).expect_err("missing");
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("project_sequence = \"project_id_seq\""));
        let reloaded = Config::load(&path).expect("reload");
        assert_eq!(reloaded.users.cache, "users.list");
    }
}
