//! Configuration file handling.
//!
//! Configuration is stored in ~/.facegate/config.yaml. Every field is
//! optional; relative paths are resolved against the directory holding the
//! config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use facegate_embed::EmbedConfig;
use facegate_matcher::{DEFAULT_THRESHOLD, MatcherConfig, Metric};
use serde::{Deserialize, Serialize};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".facegate";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// facegate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enrollment gallery root, one directory per identity.
    pub gallery_dir: PathBuf,

    /// Embedding cache database (redb).
    pub cache_db: PathBuf,

    /// CSV audit log.
    pub audit_log: PathBuf,

    /// Distance metric: cosine, euclidean or euclidean_l2.
    pub metric: Metric,

    /// Accept a match iff distance < threshold.
    pub threshold: f32,

    /// Check-in deadline in seconds. 0 disables it.
    pub timeout_secs: u64,

    /// Concurrent embedder calls during a rebuild.
    pub concurrency: usize,

    pub embedder: EmbedderConfig,

    /// Path the file was loaded from (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// Face embedding service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Service base URL (optional, uses default if empty).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    /// Model identifier (optional, uses default if empty).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// Output dimension (optional, uses the model default if 0).
    pub dimension: usize,

    /// Bearer token (optional).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_dir: PathBuf::from("gallery"),
            cache_db: PathBuf::from("cache.redb"),
            audit_log: PathBuf::from("attendance_log.csv"),
            metric: Metric::default(),
            threshold: DEFAULT_THRESHOLD,
            timeout_secs: 60,
            concurrency: 4,
            embedder: EmbedderConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Gets the default config directory.
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR))
    }

    /// Gets the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn matcher(&self) -> MatcherConfig {
        MatcherConfig {
            metric: self.metric,
            threshold: self.threshold,
        }
    }

    pub fn embed(&self) -> EmbedConfig {
        EmbedConfig::default()
            .with_base_url(&self.embedder.base_url)
            .with_model(&self.embedder.model)
            .with_dimension(self.embedder.dimension)
            .with_api_key(&self.embedder.api_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for p in [&mut self.gallery_dir, &mut self.cache_db, &mut self.audit_log] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

/// Loads configuration. A missing file yields the defaults.
pub fn load_config(custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path()
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    let mut cfg: Config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("{}: {}", config_path.display(), e))?
        }
    } else {
        tracing::debug!("config {} not found, using defaults", config_path.display());
        Config::default()
    };

    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    cfg.resolve_paths(&base);
    cfg.config_path = config_path;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let cfg = load_config(path.to_str()).unwrap();
        assert_eq!(cfg.metric, Metric::EuclideanL2);
        assert_eq!(cfg.threshold, 0.40);
        assert_eq!(cfg.gallery_dir, dir.path().join("gallery"));
        assert_eq!(cfg.cache_db, dir.path().join("cache.redb"));
        assert_eq!(cfg.path(), path);
        assert!(!path.exists());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "metric: cosine\nthreshold: 0.3\naudit_log: /var/log/facegate.csv\nembedder:\n  model: arcface\n  dimension: 512\n",
        )
        .unwrap();

        let cfg = load_config(path.to_str()).unwrap();
        assert_eq!(cfg.metric, Metric::Cosine);
        assert_eq!(cfg.threshold, 0.3);
        assert_eq!(cfg.audit_log, PathBuf::from("/var/log/facegate.csv"));
        assert_eq!(cfg.gallery_dir, dir.path().join("gallery"));
        assert_eq!(cfg.timeout_secs, 60);

        let embed = cfg.embed();
        assert_eq!(embed.model, "arcface");
        assert_eq!(embed.dimension, 512);
    }

    #[test]
    fn bad_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "metric: manhattan\n").unwrap();

        assert!(load_config(path.to_str()).is_err());
    }
}
