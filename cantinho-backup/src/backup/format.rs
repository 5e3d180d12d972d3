//! Artifact format detection.

use crate::process::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Plain-text SQL script, replayed with psql
    PlainTextSql,
    /// pg_dump custom-format archive, replayed with pg_restore
    BinaryArchive,
}

impl ArtifactFormat {
    /// Decide the format from the uploaded file's declared name.
    ///
    /// Only a `.sql` suffix (any case) means plain text. Everything else,
    /// including a missing name, is treated as a binary archive.
    pub fn detect(file_name: Option<&str>) -> Self {
        match file_name {
            Some(name) if name.to_ascii_lowercase().ends_with(".sql") => ArtifactFormat::PlainTextSql,
            _ => ArtifactFormat::BinaryArchive,
        }
    }

    /// Suffix given to the temporary copy of an artifact in this format
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::PlainTextSql => ".sql",
            ArtifactFormat::BinaryArchive => ".dump",
        }
    }

    /// The tool that replays this format
    pub fn restore_tool(self) -> Tool {
        match self {
            ArtifactFormat::PlainTextSql => Tool::ScriptApply,
            ArtifactFormat::BinaryArchive => Tool::ArchiveRestore,
        }
    }
}
