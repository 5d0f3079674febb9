//! Configuration management
//!
//! Handles loading and saving configuration from ~/.beatsync/config.toml.
//! Every section falls back to defaults, so a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BeatSyncError, BeatSyncResult};
use crate::estimator::EstimatorConfig;
use crate::filters::OutputFormat;
use crate::plan::PlanConfig;
use crate::resolver::ResolverConfig;
use crate::style::StyleTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BeatSyncConfig {
    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub plan: PlanConfig,

    #[serde(default)]
    pub render: OutputFormat,

    #[serde(default)]
    pub styles: StyleTable,
}

impl BeatSyncConfig {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".beatsync")
            .join("config.toml")
    }

    /// Load `.env`, then the config file at the default path, or defaults if there is none
    pub fn load() -> BeatSyncResult<Self> {
        dotenv::dotenv().ok();

        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> BeatSyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BeatSyncConfig = toml::from_str(&content)
            .map_err(|e| BeatSyncError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> BeatSyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| BeatSyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Estimator API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.estimator.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Get a configuration value by key path (e.g., "estimator.model")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["estimator", "endpoint"] => Some(self.estimator.endpoint.clone()),
            ["estimator", "model"] => Some(self.estimator.model.clone()),
            ["estimator", "api_key_env"] => Some(self.estimator.api_key_env.clone()),
            ["estimator", "temperature"] => Some(self.estimator.temperature.to_string()),
            ["estimator", "request_timeout_secs"] => {
                Some(self.estimator.request_timeout_secs.to_string())
            }
            ["resolver", "max_attempts"] => Some(self.resolver.max_attempts.to_string()),
            ["resolver", "backoff_step_ms"] => Some(self.resolver.backoff_step_ms.to_string()),
            ["resolver", "timeout_secs"] => self.resolver.timeout_secs.map(|v| v.to_string()),
            ["resolver", "fallback_seed"] => self.resolver.fallback_seed.map(|v| v.to_string()),
            ["plan", "target_duration_seconds"] => {
                Some(self.plan.target_duration_seconds.to_string())
            }
            ["plan", "hard_beat_interval"] => Some(self.plan.hard_beat_interval.to_string()),
            ["render", "width"] => Some(self.render.width.to_string()),
            ["render", "height"] => Some(self.render.height.to_string()),
            ["render", "fps"] => Some(self.render.fps.to_string()),
            ["styles", "default_bpm"] => Some(self.styles.default_bpm.to_string()),
            ["styles", style] => self.styles.bpm.get(*style).map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    pub fn set(&mut self, key: &str, value: &str) -> BeatSyncResult<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["estimator", "endpoint"] => self.estimator.endpoint = value.to_string(),
            ["estimator", "model"] => self.estimator.model = value.to_string(),
            ["estimator", "api_key_env"] => self.estimator.api_key_env = value.to_string(),
            ["estimator", "temperature"] => self.estimator.temperature = parse_value(key, value)?,
            ["estimator", "request_timeout_secs"] => {
                self.estimator.request_timeout_secs = parse_value(key, value)?
            }
            ["resolver", "max_attempts"] => self.resolver.max_attempts = parse_value(key, value)?,
            ["resolver", "backoff_step_ms"] => {
                self.resolver.backoff_step_ms = parse_value(key, value)?
            }
            ["resolver", "timeout_secs"] => {
                self.resolver.timeout_secs = Some(parse_value(key, value)?)
            }
            ["resolver", "fallback_seed"] => {
                self.resolver.fallback_seed = Some(parse_value(key, value)?)
            }
            ["plan", "target_duration_seconds"] => {
                self.plan.target_duration_seconds = parse_value(key, value)?
            }
            ["plan", "hard_beat_interval"] => {
                self.plan.hard_beat_interval = parse_value(key, value)?
            }
            ["render", "width"] => self.render.width = parse_value(key, value)?,
            ["render", "height"] => self.render.height = parse_value(key, value)?,
            ["render", "fps"] => self.render.fps = parse_value(key, value)?,
            ["styles", "default_bpm"] => self.styles.default_bpm = parse_value(key, value)?,
            ["styles", style] => {
                let bpm = parse_value(key, value)?;
                self.styles.bpm.insert(style.to_lowercase(), bpm);
            }
            _ => {
                return Err(BeatSyncError::Config(format!(
                    "Unknown configuration key: {}",
                    key
                )))
            }
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> BeatSyncResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BeatSyncError::Config(format!("Invalid value for {}: {}", key, value)))
}
