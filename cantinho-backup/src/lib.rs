//! Cantinho Backup Library
//!
//! Backup and restore of the journaling application's PostgreSQL database,
//! supervising pg_dump, psql and pg_restore as external processes.

pub mod api;
pub mod backup;
pub mod config;
pub mod daemon;
pub mod db;
pub mod process;
pub mod utils;

// Re-export commonly used types
pub use backup::{ArtifactFormat, BackupArtifact, BackupOrchestrator, UploadedArtifact};
pub use config::Config;
pub use db::ConnectionDescriptor;
pub use process::{ProcessOutcome, ProcessSupervisor, Tool};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
