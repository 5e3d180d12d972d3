//! Error types for the backup service.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid backup artifact: {0}")]
    InvalidArtifact(String),

    #[error("{tool} exceeded its time budget of {}s and was terminated", budget.as_secs())]
    Timeout { tool: &'static str, budget: Duration },

    #[error("Backup failed: {tool} exited with code {exit_code}: {diagnostics}")]
    BackupFailed {
        tool: &'static str,
        exit_code: i32,
        diagnostics: String,
    },

    #[error("{tool} exited with code {exit_code}: {diagnostics}")]
    RestoreFailed {
        tool: &'static str,
        exit_code: i32,
        diagnostics: String,
    },

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// True for failures caused by the caller's input rather than the tools
    pub fn is_client_error(&self) -> bool {
        matches!(self, BackupError::InvalidArtifact(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
