//! Error types for the hero agent and its configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or retuning a hero agent.
///
/// Everything that goes wrong inside a tick is recovered locally; only
/// construction-time problems surface here.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A required capability was not supplied. The agent is left disabled.
    #[error("Hero agent is missing a required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Tuning values that would break the state machine.
    #[error("Invalid tuning for {tier}: {message}")]
    InvalidTuning {
        /// Tier the tuning was meant for.
        tier: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize match output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Tuning(#[from] AgentError),
}
