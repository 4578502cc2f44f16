//! Error types for the content generation pipeline.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider rate limit exceeded (429): {0}")]
    RateLimit(String),

    #[error("Provider model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// Item-level generation errors.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    /// Content was produced but could not be persisted.
    #[error("failed to write {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<GenerationError>,
    },
}

impl GenerationError {
    /// True when the item stopped because the run was cancelled, not because it failed.
    pub fn is_cancelled(&self) -> bool {
        match self {
            GenerationError::Cancelled => true,
            GenerationError::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_write_failure(&self) -> bool {
        matches!(self, GenerationError::WriteFailed { .. })
    }
}

/// Pipeline phase an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Generating,
    Completed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Generating => "generating",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// A run-level stop. `partial` is set when artifacts were produced before the stop.
#[derive(Debug, Clone, Error)]
#[error("{phase}: {message}: {source}")]
pub struct PipelineError {
    pub phase: Phase,
    pub message: String,
    pub partial: bool,
    #[source]
    pub source: GenerationError,
}

impl PipelineError {
    pub fn new(
        phase: Phase,
        message: impl Into<String>,
        partial: bool,
        source: GenerationError,
    ) -> Self {
        Self {
            phase,
            message: message.into(),
            partial,
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Configuration and plan file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Plan file {path}: {source}")]
    PlanIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Plan file {path} is not valid JSON: {source}")]
    PlanFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The run stopped early; `summary` describes what was done before it did.
    #[error("{source}")]
    Pipeline {
        summary: String,
        #[source]
        source: PipelineError,
    },
}

impl CommandError {
    /// Exit code for the process: 130 for cancellation, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Pipeline { source, .. } if source.is_cancelled() => 130,
            _ => 1,
        }
    }
}
