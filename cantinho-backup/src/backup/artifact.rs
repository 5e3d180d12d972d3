//! Backup artifacts and the temporary files that hold them.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// A uniquely named temporary file, removed when the guard is dropped.
///
/// Every exit path of an operation drops its guard, so the file cannot
/// outlive the request. A failed removal is logged and otherwise ignored.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Create an empty file named `<prefix><random><suffix>` inside `dir`
    pub fn create(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()?;
        debug!(path = %path.display(), "Created temporary file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temporary file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temporary file"
            ),
        }
    }
}

/// A finished dump, ready for download.
#[derive(Debug)]
pub struct BackupArtifact {
    file: ScratchFile,
    name: String,
    len: u64,
}

impl BackupArtifact {
    pub(crate) fn new(file: ScratchFile, name: String, len: u64) -> Self {
        Self { file, name, len }
    }

    /// Display name, e.g. `backup_cantinho_20240131_174502.sql`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Stream the artifact's bytes. The file is removed once the stream is dropped.
    pub async fn into_stream(
        self,
    ) -> std::io::Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        let reader = tokio::fs::File::open(self.file.path()).await?;
        let guard = self.file;
        Ok(ReaderStream::new(reader).map(move |chunk| {
            let _keep = &guard;
            chunk
        }))
    }

    /// Copy the artifact to `destination`; the temporary file is removed afterwards.
    pub async fn save_to(self, destination: &Path) -> std::io::Result<u64> {
        tokio::fs::copy(self.file.path(), destination).await
    }
}

/// A backup received for restoration.
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    /// Name declared by the uploader, if any
    pub file_name: Option<String>,
    pub content: Bytes,
}

impl UploadedArtifact {
    pub fn new(file_name: Option<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name,
            content: content.into(),
        }
    }
}
