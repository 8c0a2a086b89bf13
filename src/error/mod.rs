//! Error types for hcdump

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hcdump
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Cannot find {0} command")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact directory {path} is not usable: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive dump: {0}")]
    Archive(String),

    #[error("Guest cluster dump failed: {0}")]
    GuestCluster(String),

    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Port forward failed: {0}")]
    Tunnel(String),

    #[error("Command {program} could not be started: {message}")]
    Spawn { program: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for DumpError {
    fn from(e: serde_json::Error) -> Self {
        DumpError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DumpError {
    fn from(e: serde_yaml::Error) -> Self {
        DumpError::Serialization(e.to_string())
    }
}

/// Result type alias for hcdump
pub type Result<T> = std::result::Result<T, DumpError>;
