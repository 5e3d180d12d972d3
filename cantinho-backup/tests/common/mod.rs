//! Shared fixtures: shell-script stand-ins for the PostgreSQL tools.

#![allow(dead_code)]

use cantinho_backup::config::{Config, Secret, ToolCommand};
use cantinho_backup::BackupOrchestrator;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PASSWORD: &str = "s3cr3t-pw";

#[derive(Debug, Clone, Copy)]
pub enum Stub {
    Dump,
    ScriptApply,
    ArchiveRestore,
}

impl Stub {
    fn file_name(self) -> &'static str {
        match self {
            Stub::Dump => "pg_dump.sh",
            Stub::ScriptApply => "psql.sh",
            Stub::ArchiveRestore => "pg_restore.sh",
        }
    }
}

/// Scratch directory for artifacts plus a directory of stub tools.
pub struct Harness {
    pub tools_dir: TempDir,
    pub scratch_dir: TempDir,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        let tools_dir = TempDir::new().unwrap();
        let scratch_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.database.url = "jdbc:postgresql://pg.test:5433/cantinho_db?sslmode=disable".into();
        config.database.username = "cantinho".into();
        config.database.password = Secret::new(PASSWORD);
        config.backup.temp_dir = Some(scratch_dir.path().to_path_buf());
        config.backup.dump_timeout_secs = 10;
        config.backup.restore_timeout_secs = 10;

        let mut harness = Self {
            tools_dir,
            scratch_dir,
            config,
        };
        // Any tool a test forgets to stub fails loudly
        for stub in [Stub::Dump, Stub::ScriptApply, Stub::ArchiveRestore] {
            harness.stub(stub, "echo \"unexpected call to $0\" >&2\nexit 99\n");
        }
        harness
    }

    /// Install a `sh` script body as the given tool
    pub fn stub(&mut self, stub: Stub, body: &str) {
        let path = self.tools_dir.path().join(stub.file_name());
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();

        let command = ToolCommand::new("sh").arg(path.to_string_lossy());
        match stub {
            Stub::Dump => self.config.tools.dump = command,
            Stub::ScriptApply => self.config.tools.script_apply = command,
            Stub::ArchiveRestore => self.config.tools.archive_restore = command,
        }
    }

    /// Script fragment that records the arguments, password and input file
    /// of a call under `<tools_dir>/<tag>.*`
    pub fn recorder(&self, tag: &str) -> String {
        let dir = self.tools_dir.path().display();
        format!(
            "printf '%s\\n' \"$@\" > {dir}/{tag}.args\n\
             printf '%s' \"$PGPASSWORD\" > {dir}/{tag}.password\n\
             for a in \"$@\"; do last=\"$a\"; done\n\
             [ -f \"$last\" ] && cp \"$last\" {dir}/{tag}.input\n"
        )
    }

    pub fn recorded(&self, tag: &str, kind: &str) -> String {
        std::fs::read_to_string(self.tools_dir.path().join(format!("{tag}.{kind}"))).unwrap_or_default()
    }

    pub fn recorded_args(&self, tag: &str) -> Vec<String> {
        self.recorded(tag, "args").lines().map(str::to_string).collect()
    }

    pub fn orchestrator(&self) -> BackupOrchestrator {
        BackupOrchestrator::new(&self.config)
    }

    /// Files left behind in the scratch directory
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        list(self.scratch_dir.path())
    }
}

fn list(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect()
}

/// pg_dump stand-in that writes `content` to the `-f` target
pub fn dump_writing(content: &str) -> String {
    format!(
        "while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"-f\" ]; then out=\"$2\"; fi\n\
         \x20 shift\n\
         done\n\
         printf '%s' '{content}' > \"$out\"\n\
         echo 'pg_dump: dumping contents of table \"public.usuarios\"' >&2\n"
    )
}

/// Poll until `pid` no longer runs. Zombies count as gone.
#[cfg(target_os = "linux")]
pub async fn wait_process_gone(pid: &str) -> bool {
    for _ in 0..40 {
        let gone = match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        };
        if gone {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}
