//! Configuration System
//!
//! Layered configuration: built-in defaults, the user's global file, the workspace
//! file, then `PAGESMITH__`-prefixed environment variables. Every section
//! deserializes with per-field defaults, so a partial file is always valid.

use crate::error::ConfigError;
use crate::generation::pool::ExecutionMode;
use crate::logging::LoggingConfig;
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod sources;

pub use sources::{global_config_path, workspace_config_path, WORKSPACE_CONFIG_FILE};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PagesmithConfig {
    /// Root for written artifacts; relative paths resolve against the workspace.
    pub output_dir: PathBuf,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Per-run generation policy. Fixed for the lifetime of a generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Floor for the wait after a rate-limit-class error.
    pub rate_limit_delay_ms: u64,
    /// 0 disables the per-attempt timeout.
    pub attempt_timeout_secs: u64,
    pub continue_on_error: bool,
    pub overwrite: bool,
    pub dry_run: bool,
    pub mode: ExecutionMode,
    pub rate: RateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
            backoff_multiplier: 2.0,
            rate_limit_delay_ms: 30_000,
            attempt_timeout_secs: 120,
            continue_on_error: true,
            overwrite: false,
            dry_run: false,
            mode: ExecutionMode::Auto,
            rate: RateConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_secs > 0).then(|| Duration::from_secs(self.attempt_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("pipeline.max_attempts must be at least 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(format!(
                "pipeline.backoff_multiplier must be a non-negative number, got {}",
                self.backoff_multiplier
            ));
        }
        self.rate.validate()
    }
}

/// Shared request budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateConfig {
    /// 0 falls back to the conservative default.
    pub requests_per_minute: u32,
    /// Upper bound on parallel workers; also the rate budget's burst.
    pub max_concurrency: usize,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            max_concurrency: 5,
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("pipeline.rate.max_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

impl PagesmithConfig {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors: Vec<String> = [self.pipeline.validate(), self.provider.validate()]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Output directory resolved against the workspace root.
    pub fn output_root(&self, workspace_root: &Path) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            workspace_root.join(&self.output_dir)
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to render configuration: {}", e)))
    }

    /// Fill the API key from `OPENAI_API_KEY` when no layer supplied one.
    fn apply_key_fallback(&mut self) {
        if self.provider.api_key.as_deref().map_or(true, str::is_empty) {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                if !key.is_empty() {
                    self.provider.api_key = Some(key);
                }
            }
        }
    }
}

/// Builds a `PagesmithConfig` from the configured sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then `<workspace>/pagesmith.toml`, then environment.
    pub fn load(workspace_root: &Path) -> Result<PagesmithConfig, ConfigError> {
        let builder = sources::builder_with_defaults()?;
        let builder = sources::add_global_file(builder)?;
        let builder = sources::add_workspace_file(builder, workspace_root)?;
        let builder = sources::add_environment(builder);
        Self::finish(builder)
    }

    /// A single explicit file (required) plus environment overrides.
    pub fn load_from_file(path: &Path) -> Result<PagesmithConfig, ConfigError> {
        let builder = sources::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true));
        Self::finish(sources::add_environment(builder))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<PagesmithConfig, ConfigError> {
        let mut loaded: PagesmithConfig = builder.build()?.try_deserialize()?;
        loaded.apply_key_fallback();
        Ok(loaded)
    }
}
