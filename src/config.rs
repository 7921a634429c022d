//! Configuration loader and validator for the backup daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::ContentType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub backup: Backup,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub writer: Writer,
    #[serde(default)]
    pub http: Http,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Relative archive directories are resolved against this; defaults to
    /// `{data_dir}/archive`.
    #[serde(default)]
    pub archive_root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backup {
    pub page_size: usize,
}

impl Default for Backup {
    fn default() -> Self {
        Self { page_size: 25 }
    }
}

/// Timer periods, one per content type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub drafts_minutes: u64,
    pub published_minutes: u64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            drafts_minutes: 60,
            published_minutes: 360,
        }
    }
}

/// Settle delays around a write session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Writer {
    pub settle_before_ms: u64,
    pub settle_after_ms: u64,
}

impl Default for Writer {
    fn default() -> Self {
        Self {
            settle_before_ms: 100,
            settle_after_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    pub user_agent: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            user_agent: concat!("substack-backup/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl App {
    pub fn archive_root(&self) -> PathBuf {
        match self.archive_root.as_deref().map(str::trim) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => Path::new(&self.data_dir).join("archive"),
        }
    }
}

impl Schedule {
    pub fn period(&self, content_type: ContentType) -> Duration {
        let minutes = match content_type {
            ContentType::Drafts => self.drafts_minutes,
            ContentType::Published => self.published_minutes,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl Writer {
    pub fn settle_before(&self) -> Duration {
        Duration::from_millis(self.settle_before_ms)
    }

    pub fn settle_after(&self) -> Duration {
        Duration::from_millis(self.settle_after_ms)
    }
}

impl Config {
    /// Ensure required directories exist (`app.data_dir` and the archive root).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)?;
        fs::create_dir_all(self.app.archive_root())
    }

    /// `DATABASE_URL` if set, otherwise a database file inside `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/backup.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.backup.page_size == 0 {
        return Err(ConfigError::Invalid("backup.page_size must be > 0"));
    }
    if cfg.schedule.drafts_minutes == 0 {
        return Err(ConfigError::Invalid("schedule.drafts_minutes must be > 0"));
    }
    if cfg.schedule.published_minutes == 0 {
        return Err(ConfigError::Invalid("schedule.published_minutes must be > 0"));
    }
    if cfg.http.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("http.user_agent must be non-empty"));
    }
    Ok(())
}

/// Example configuration with every section spelled out.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  archive_root: "./archive"

backup:
  page_size: 25

schedule:
  drafts_minutes: 60
  published_minutes: 360

writer:
  settle_before_ms: 100
  settle_after_ms: 1000

http:
  user_agent: "substack-backup/0.1"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.backup.page_size, 25);
        assert_eq!(cfg.schedule.period(ContentType::Drafts), Duration::from_secs(3600));
        assert_eq!(cfg.writer.settle_after(), Duration::from_millis(1000));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("app:\n  data_dir: \"/tmp/sb\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.backup, Backup::default());
        assert_eq!(cfg.app.archive_root(), PathBuf::from("/tmp/sb/archive"));
        assert!(cfg.http.user_agent.starts_with("substack-backup/"));
    }

    #[test]
    fn invalid_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("app.data_dir")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_numbers() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.backup.page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.schedule.drafts_minutes = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.schedule.published_minutes = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.http.user_agent = String::new();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_and_archive_dirs() {
        let td = tempdir().unwrap();
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = td.path().join("data").to_string_lossy().to_string();
        cfg.app.archive_root = Some(td.path().join("out").to_string_lossy().to_string());
        cfg.ensure_dirs().unwrap();
        assert!(td.path().join("data").exists());
        assert!(td.path().join("out").exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.archive_root(), PathBuf::from("./archive"));
    }
}
