use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{DependencyRules, KeywordCue, RelevanceTable};
use crate::orchestration::pool::DEFAULT_MAX_CONCURRENT;
use crate::orchestration::{ExecuteOptions, RouterConfig};
use crate::{alog_debug, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Output field compared across departments after aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_field: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub quality: QualityThresholds,
    /// Replaces the built-in dependency rules when non-empty.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dependencies: HashMap<String, Vec<String>>,
    /// Replaces the built-in keyword cues when non-empty.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relevance: HashMap<String, Vec<KeywordCue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_concurrent: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub max_retries: u32,
    pub continue_on_error: bool,
    pub retry_backoff_ms: u64,
}

impl ExecutorConfig {
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            timeout: self.timeout_ms.map(Duration::from_millis),
            continue_on_error: self.continue_on_error,
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Caller-side quality gate. The core reports scores; callers decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_overall: f64,
    pub character_consistency: f64,
    pub location_consistency: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_overall: 0.70,
            character_consistency: 0.85,
            location_consistency: 0.80,
        }
    }
}

impl QualityThresholds {
    pub fn passes(&self, overall_quality_score: f64) -> bool {
        overall_quality_score >= self.min_overall
    }
}

impl Config {
    pub fn atelier_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".atelier"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::atelier_dir()?.join("atelier.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        alog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            alog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        alog_debug!(
            "Config loaded: max_concurrent={}, timeout_ms={:?}, max_retries={}, continue_on_error={}",
            config.pool.max_concurrent,
            config.executor.timeout_ms,
            config.executor.max_retries,
            config.executor.continue_on_error
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                alog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        alog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Reject values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("quality.min_overall", self.quality.min_overall),
            ("quality.character_consistency", self.quality.character_consistency),
            ("quality.location_consistency", self.quality.location_consistency),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Validation(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.identity_field.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(Error::Validation("identity_field must not be empty".to_string()));
        }
        self.dependency_rules()?;
        self.relevance_table()?;
        Ok(())
    }

    pub fn dependency_rules(&self) -> Result<DependencyRules> {
        if self.dependencies.is_empty() {
            Ok(DependencyRules::default())
        } else {
            DependencyRules::from_names(&self.dependencies)
        }
    }

    pub fn relevance_table(&self) -> Result<RelevanceTable> {
        if self.relevance.is_empty() {
            Ok(RelevanceTable::default())
        } else {
            RelevanceTable::from_names(&self.relevance)
        }
    }

    pub fn execute_options(&self) -> ExecuteOptions {
        self.executor.execute_options()
    }
}
