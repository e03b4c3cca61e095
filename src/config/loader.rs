//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/treeport/)
    Project = 1,
    /// User-level config (~/.treeport/)
    User = 2,
    /// File named by TREEPORT_CONFIG_PATH
    Explicit = 3,
    /// Environment variables (highest priority)
    Environment = 4,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Explicit => write!(f, "explicit"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
    /// Explicit config file, merged above the directory tiers.
    pub explicit_file: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: TREEPORT_USER_DIR or ~/.treeport
        let user_dir = std::env::var("TREEPORT_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".treeport")));

        // Project dir: TREEPORT_PROJECT_DIR or $CWD/treeport
        let project_dir = std::env::var("TREEPORT_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("treeport")));

        let explicit_file = std::env::var("TREEPORT_CONFIG_PATH").ok().map(PathBuf::from);

        Self {
            project_dir,
            user_dir,
            explicit_file,
        }
    }

    /// Create paths with explicit directories and no explicit file.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
            explicit_file: None,
        }
    }

    pub fn with_explicit_file(mut self, file: Option<PathBuf>) -> Self {
        if file.is_some() {
            self.explicit_file = file;
        }
        self
    }
}

/// Read one YAML tier. Missing files are skipped; unreadable ones are logged
/// and skipped.
fn read_tier(path: &Path, tier: ConfigTier) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), %tier, error = %err, "Could not read config file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => {
            debug!(path = %path.display(), %tier, "Loaded config tier");
            Some(value)
        }
        Err(err) => {
            warn!(path = %path.display(), %tier, error = %err, "Ignoring invalid config file");
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that was used (if any)
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut configs: Vec<Value> = Vec::new();
        let mut config_path = None;

        // Tier 1: Defaults
        configs.push(serde_json::to_value(Config::default())?);

        // Tiers 2 and 3: project, then user
        let tiers = [
            (paths.project_dir.as_ref(), ConfigTier::Project),
            (paths.user_dir.as_ref(), ConfigTier::User),
        ];
        for (dir, tier) in tiers {
            let Some(dir) = dir else { continue };
            let file = dir.join("config.yaml");
            if let Some(value) = read_tier(&file, tier) {
                configs.push(value);
                config_path = Some(file);
            }
        }

        // Tier 4: explicit file must exist and parse
        if let Some(ref file) = paths.explicit_file {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read config {}", file.display()))?;
            let value: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid config {}", file.display()))?;
            configs.push(value);
            config_path = Some(file.clone());
        }

        let merged = deep_merge_all(configs);
        let mut config: Config =
            serde_json::from_value(merged).context("Merged configuration is invalid")?;

        // Tier 5: Environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("TREEPORT_DB_PATH") {
            config.site.db_path = PathBuf::from(db_path);
        }

        if let Ok(media_dir) = std::env::var("TREEPORT_MEDIA_DIR") {
            config.site.media_dir = PathBuf::from(media_dir);
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Get the config file path that was used.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
