//! The external PostgreSQL tools and their exit-code policies.

use super::ProcessOutcome;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// `pg_dump`
    Dump,
    /// `psql`, replaying a plain-text script
    ScriptApply,
    /// `pg_restore`, replaying a binary archive
    ArchiveRestore,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Dump => "pg_dump",
            Tool::ScriptApply => "psql",
            Tool::ArchiveRestore => "pg_restore",
        }
    }

    /// Whether `exit_code` counts as a completed run for this tool.
    ///
    /// pg_restore reports non-fatal ordering warnings with exit code 1 through
    /// the same channel as fatal errors, so 1 is accepted for it alone.
    pub fn accepts_exit_code(self, exit_code: i32) -> bool {
        match self {
            Tool::ArchiveRestore => exit_code == 0 || exit_code == 1,
            Tool::Dump | Tool::ScriptApply => exit_code == 0,
        }
    }

    /// Classify a supervised run. Timeouts never succeed.
    pub fn succeeded(self, outcome: &ProcessOutcome) -> bool {
        !outcome.timed_out && self.accepts_exit_code(outcome.exit_code)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
