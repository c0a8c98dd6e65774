use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RecollectConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub learning: LearningConfig,
    pub patterns: PatternConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub similar_sessions_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LearningConfig {
    /// Per pattern type; the oldest observations are evicted beyond this.
    pub max_observations_per_type: usize,
    pub topic_importance: f64,
    pub preference_importance: f64,
    /// TTL for entries folded in at session end. `None` keeps them forever.
    pub archive_ttl_days: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PatternConfig {
    /// A pattern qualifies only when its success rate is strictly above this.
    pub min_success_rate: f64,
    /// A pattern qualifies only when its usage count is strictly above this.
    pub min_usage_count: u64,
    pub volume_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub reap_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_recollect_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            pool_size: 8,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            similar_sessions_limit: 3,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_observations_per_type: 100,
            topic_importance: 0.7,
            preference_importance: 0.8,
            archive_ttl_days: None,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.6,
            min_usage_count: 3,
            volume_weight: 0.1,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reap_interval_secs: 300,
        }
    }
}

/// Returns `~/.recollect/`, or `./.recollect/` when there is no home directory.
pub fn default_recollect_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".recollect")
}

/// Returns the default config file path: `~/.recollect/config.toml`
pub fn default_config_path() -> PathBuf {
    default_recollect_dir().join("config.toml")
}

impl RecollectConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RecollectConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (RECOLLECT_DB, RECOLLECT_LOG_LEVEL, RECOLLECT_REAP_INTERVAL_SECS).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RECOLLECT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RECOLLECT_LOG_LEVEL") {
            self.service.log_level = val;
        }
        if let Ok(val) = std::env::var("RECOLLECT_REAP_INTERVAL_SECS") {
            match val.parse() {
                Ok(secs) => self.maintenance.reap_interval_secs = secs,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid RECOLLECT_REAP_INTERVAL_SECS"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RecollectConfig::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.retrieval.default_limit, 5);
        assert_eq!(config.learning.topic_importance, 0.7);
        assert_eq!(config.learning.preference_importance, 0.8);
        assert_eq!(config.patterns.min_usage_count, 3);
        assert!(config.learning.archive_ttl_days.is_none());
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[service]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[patterns]
min_success_rate = 0.75

[learning]
archive_ttl_days = 30
"#;
        let config: RecollectConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.patterns.min_success_rate, 0.75);
        assert_eq!(config.learning.archive_ttl_days, Some(30));
        // defaults still apply for unset fields
        assert_eq!(config.storage.pool_size, 8);
        assert_eq!(config.patterns.volume_weight, 0.1);
        assert_eq!(config.maintenance.reap_interval_secs, 300);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RecollectConfig::default();
        std::env::set_var("RECOLLECT_DB", "/tmp/override.db");
        std::env::set_var("RECOLLECT_LOG_LEVEL", "trace");
        std::env::set_var("RECOLLECT_REAP_INTERVAL_SECS", "42");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.service.log_level, "trace");
        assert_eq!(config.maintenance.reap_interval_secs, 42);

        // Clean up
        std::env::remove_var("RECOLLECT_DB");
        std::env::remove_var("RECOLLECT_LOG_LEVEL");
        std::env::remove_var("RECOLLECT_REAP_INTERVAL_SECS");
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecollectConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.similar_sessions_limit, 3);
    }
}
