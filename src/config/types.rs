//! Configuration types.

use crate::format::OutputFormat;
use crate::schema::{ModelRegistry, ModelSchema};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Destination site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root of file storage; image payloads go under `original_images/`.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Default output format for reports (json or markdown).
    #[serde(default)]
    pub default_format: OutputFormat,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            media_dir: default_media_dir(),
            default_format: OutputFormat::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("treeport/site.db")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("treeport/media")
}

/// Settings for fetching a document from a source installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Export endpoint appended to the source base URL; `{page_id}` is
    /// replaced with the requested page.
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts including the first one (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds, doubled on every further
    /// retry (default: 500).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            export_path: default_export_path(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

fn default_export_path() -> String {
    "/admin/import-export/export/{page_id}/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    /// Page models of the destination, keyed by `app_label.model`.
    #[serde(default)]
    pub models: BTreeMap<String, ModelSchema>,

    /// Snippet model keys the destination accepts.
    #[serde(default)]
    pub snippets: Vec<String>,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Model registry built from the `models` and `snippets` sections.
    pub fn registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::from_models(self.models.clone());
        for key in &self.snippets {
            registry.register_snippet(key);
        }
        registry
    }
}
