//! Configuration types for the orchestration core.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{OrchestrationError, Result};

/// Environment variable holding a comma-separated credential pool.
const ENV_API_KEYS: &str = "ADLENS_API_KEYS";

/// Complete orchestrator configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upstream credential configuration.
    pub keys: KeyConfig,
    /// Per-cost-class daily budget limits.
    pub budgets: BudgetLimits,
    /// Execution configuration.
    pub execution: ExecutionConfig,
    /// Classifier configuration.
    pub classifier: ClassifierConfig,
}

/// Upstream credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyConfig {
    /// Pool of interchangeable upstream API keys.
    pub api_keys: Vec<String>,
}

/// Per-cost-class daily call budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Daily call limit for the low cost class.
    pub low_daily_limit: u64,
    /// Daily call limit for the medium cost class.
    pub medium_daily_limit: u64,
    /// Daily call limit for the high cost class.
    pub high_daily_limit: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            low_daily_limit: 2_000,
            medium_daily_limit: 500,
            high_daily_limit: 100,
        }
    }
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Global two-pass feature flag; when off, every request is single-pass.
    pub two_pass_enabled: bool,
    /// Per-call upstream timeout in seconds.
    pub timeout_seconds: u64,
    /// Seconds a rate-limited key cools down before reuse.
    pub key_cooldown_seconds: u64,
    /// Default completion token limit.
    pub max_output_tokens: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            two_pass_enabled: true,
            timeout_seconds: 45,
            key_cooldown_seconds: 60,
            max_output_tokens: 2_048,
        }
    }
}

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Inputs at or under this length bypass the model call entirely.
    pub fast_path_max_chars: usize,
    /// Character budget the input is truncated to before classification.
    pub truncate_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fast_path_max_chars: 100,
            truncate_chars: 4_000,
        }
    }
}

impl OrchestratorConfig {
    /// Get the default config directory path (`~/.adlens`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir().ok_or_else(|| {
            OrchestrationError::Config("Could not determine home directory".to_owned())
        })?;
        Ok(home.join(".adlens"))
    }

    /// Get the default config file path (`~/.adlens/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with default
    /// values on first run.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        use toml::from_str;
        let contents = fs::read_to_string(path).map_err(|error| {
            OrchestrationError::Config(format!("Failed to read config: {error}"))
        })?;
        from_str(&contents).map_err(|error| {
            OrchestrationError::Config(format!("Failed to parse config: {error}"))
        })
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        use toml::to_string_pretty;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                OrchestrationError::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = to_string_pretty(self).map_err(|error| {
            OrchestrationError::Config(format!("Failed to serialize config: {error}"))
        })?;

        let header = "# adlens Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}")).map_err(|error| {
            OrchestrationError::Config(format!("Failed to write config: {error}"))
        })?;

        Ok(())
    }

    /// Resolves the credential pool, falling back to the `ADLENS_API_KEYS`
    /// environment variable (comma-separated) when the config carries none.
    #[must_use]
    pub fn resolve_api_keys(&self) -> Vec<String> {
        if !self.keys.api_keys.is_empty() {
            return self.keys.api_keys.clone();
        }

        env::var(ENV_API_KEYS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}
