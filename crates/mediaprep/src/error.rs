use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaprepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),

    #[error("Inspection error: {0}")]
    Inspect(#[from] InspectError),

    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors from driving the external inspection tools.
///
/// Most of these never cross the worker/broker boundary: the inspector
/// folds them into a failed `InspectionOutcome` so the job ends errored
/// while the worker stays alive.
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Failed to spawn {tool}: {source}")]
    ToolSpawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: &'static str, secs: u64 },

    #[error("Failed to parse probe output: {0}")]
    ProbeParse(#[from] serde_json::Error),

    #[error("Thumbnail not written to '{0}'")]
    ThumbnailMissing(PathBuf),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Tag merge rejected: {0}")]
    MergeFailed(String),

    #[error("Search index unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, MediaprepError>;
