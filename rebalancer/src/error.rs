//! Error types for the rebalancer CLI.

use std::path::PathBuf;

/// All errors that can occur during a rebalancer run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("failed to read snapshot file {path}: {source}")]
    SnapshotRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse snapshot JSON: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    #[error("failed to render JSON output: {0}")]
    Output(serde_json::Error),

    #[error(transparent)]
    Engine(#[from] balancebot::Error),

    #[error("request {0} was superseded by a newer one")]
    Superseded(u64),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
