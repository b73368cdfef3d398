//! Error types for snapmigrate operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Archive metadata error: {message}")]
    Metadata { message: String },

    #[error("Snapshot not found: {dataset}@{name}")]
    SnapshotNotFound { dataset: String, name: String },

    #[error("Command `{command}` failed ({status}): {stderr}")]
    External {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },

    #[error("Please run as root.")]
    Privilege,
}

impl MigrateError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata {
            message: msg.into(),
        }
    }

    pub fn snapshot_not_found(dataset: impl Into<String>, name: impl Into<String>) -> Self {
        Self::SnapshotNotFound {
            dataset: dataset.into(),
            name: name.into(),
        }
    }

    pub fn unexpected_output(command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            command: command.into(),
            message: msg.into(),
        }
    }

    /// Whether re-running the same invocation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::External { .. } | Self::Io(_))
    }
}
