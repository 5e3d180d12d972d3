//! Backup orchestrator - produces and applies database backups.
//!
//! Ties together:
//! - connection descriptor resolution
//! - artifact format detection
//! - supervised runs of pg_dump / psql / pg_restore
//! - temporary file lifecycle

pub mod artifact;
pub mod format;

pub use artifact::{BackupArtifact, ScratchFile, UploadedArtifact};
pub use format::ArtifactFormat;

use crate::config::{BackupConfig, Config, DatabaseConfig, ToolsConfig};
use crate::db::ConnectionDescriptor;
use crate::process::{Invocation, ProcessOutcome, ProcessSupervisor, Tool};
use crate::utils::errors::{BackupError, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Environment variable through which the tools receive the password
const PASSWORD_ENV: &str = "PGPASSWORD";

/// Drop objects before recreating them, and leave out ownership and grants
/// so the artifact applies to differently privileged databases.
const DESTRUCTIVE_SAFE_FLAGS: [&str; 4] = ["--clean", "--if-exists", "--no-owner", "--no-acl"];

const ARTIFACT_PREFIX: &str = "backup_cantinho_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Backup and restore façade.
///
/// Holds only configuration; every call is a self-contained unit of work.
/// Overlapping calls against the same database are not serialized.
#[derive(Debug, Clone)]
pub struct BackupOrchestrator {
    database: DatabaseConfig,
    backup: BackupConfig,
    tools: ToolsConfig,
    supervisor: ProcessSupervisor,
}

impl BackupOrchestrator {
    pub fn new(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            backup: config.backup.clone(),
            tools: config.tools.clone(),
            supervisor: ProcessSupervisor::new(),
        }
    }

    /// Dump the whole database into a temporary plain-text SQL artifact.
    pub async fn produce_backup(&self) -> Result<BackupArtifact> {
        let descriptor = self.descriptor();
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let name = format!("{ARTIFACT_PREFIX}{timestamp}.sql");

        let scratch = ScratchFile::create(
            &self.backup.scratch_dir(),
            &format!("{ARTIFACT_PREFIX}{timestamp}_"),
            ".sql",
        )?;

        info!(
            database = %descriptor.database_name,
            host = %descriptor.host,
            artifact = %name,
            "Starting database backup"
        );

        let invocation = self.dump_invocation(&descriptor, scratch.path());
        let outcome = self.supervise(&invocation, self.backup.dump_timeout()).await?;

        if !Tool::Dump.succeeded(&outcome) {
            error!(
                tool = Tool::Dump.name(),
                exit_code = outcome.exit_code,
                diagnostics = %outcome.diagnostics(),
                "Database backup failed"
            );
            return Err(BackupError::BackupFailed {
                tool: Tool::Dump.name(),
                exit_code: outcome.exit_code,
                diagnostics: outcome.diagnostics(),
            });
        }

        let len = tokio::fs::metadata(scratch.path()).await?.len();
        if len == 0 {
            return Err(BackupError::BackupFailed {
                tool: Tool::Dump.name(),
                exit_code: outcome.exit_code,
                diagnostics: "dump produced an empty artifact".to_string(),
            });
        }

        info!(artifact = %name, bytes = len, "Database backup created");
        Ok(BackupArtifact::new(scratch, name, len))
    }

    /// Replay an uploaded artifact against the database.
    ///
    /// `.sql` uploads go through psql, anything else through pg_restore.
    pub async fn apply_backup(&self, upload: UploadedArtifact) -> Result<()> {
        if upload.content.is_empty() {
            return Err(BackupError::InvalidArtifact(
                "Backup file not provided or empty".to_string(),
            ));
        }

        let format = ArtifactFormat::detect(upload.file_name.as_deref());
        let tool = format.restore_tool();
        let descriptor = self.descriptor();

        let scratch = ScratchFile::create(&self.backup.scratch_dir(), "restore_", format.extension())?;
        tokio::fs::write(scratch.path(), &upload.content).await?;

        warn!(
            file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
            format = ?format,
            bytes = upload.content.len(),
            database = %descriptor.database_name,
            host = %descriptor.host,
            "Restoring database backup, existing objects will be replaced"
        );

        let invocation = self.restore_invocation(format, &descriptor, scratch.path());
        let outcome = self.supervise(&invocation, self.backup.restore_timeout()).await?;

        if !tool.succeeded(&outcome) {
            error!(
                tool = tool.name(),
                exit_code = outcome.exit_code,
                diagnostics = %outcome.diagnostics(),
                "Database restore failed"
            );
            return Err(BackupError::RestoreFailed {
                tool: tool.name(),
                exit_code: outcome.exit_code,
                diagnostics: outcome.diagnostics(),
            });
        }

        if outcome.exit_code != 0 {
            warn!(
                tool = tool.name(),
                exit_code = outcome.exit_code,
                "Restore completed with warnings"
            );
        }
        info!(tool = tool.name(), "Database restore completed");
        Ok(())
    }

    /// Run an invocation, turning an expired budget into [`BackupError::Timeout`]
    async fn supervise(&self, invocation: &Invocation, budget: Duration) -> Result<ProcessOutcome> {
        let outcome = self.supervisor.run(invocation, budget).await?;
        if outcome.timed_out {
            error!(
                tool = invocation.tool().name(),
                budget_secs = budget.as_secs(),
                "Operation exceeded its time budget"
            );
            return Err(BackupError::Timeout {
                tool: invocation.tool().name(),
                budget,
            });
        }
        Ok(outcome)
    }

    /// Resolved per call, never cached
    fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::resolve(&self.database.url)
    }

    fn connection_args(&self, descriptor: &ConnectionDescriptor) -> Vec<String> {
        vec![
            "-h".to_string(),
            descriptor.host.clone(),
            "-p".to_string(),
            descriptor.port.clone(),
            "-U".to_string(),
            self.database.username.clone(),
            "-d".to_string(),
            descriptor.database_name.clone(),
        ]
    }

    pub(crate) fn dump_invocation(&self, descriptor: &ConnectionDescriptor, output: &Path) -> Invocation {
        Invocation::new(Tool::Dump, &self.tools.dump)
            .args(self.connection_args(descriptor))
            .args(DESTRUCTIVE_SAFE_FLAGS)
            .arg("-f")
            .arg(output.to_string_lossy())
            .env(PASSWORD_ENV, self.database.password.expose())
    }

    pub(crate) fn restore_invocation(
        &self,
        format: ArtifactFormat,
        descriptor: &ConnectionDescriptor,
        input: &Path,
    ) -> Invocation {
        let invocation = match format {
            ArtifactFormat::PlainTextSql => Invocation::new(Tool::ScriptApply, &self.tools.script_apply)
                .args(self.connection_args(descriptor))
                .arg("-f")
                .arg(input.to_string_lossy()),
            ArtifactFormat::BinaryArchive => Invocation::new(Tool::ArchiveRestore, &self.tools.archive_restore)
                .args(self.connection_args(descriptor))
                .args(DESTRUCTIVE_SAFE_FLAGS)
                .arg("--verbose")
                .arg(input.to_string_lossy()),
        };
        invocation.env(PASSWORD_ENV, self.database.password.expose())
    }
}
