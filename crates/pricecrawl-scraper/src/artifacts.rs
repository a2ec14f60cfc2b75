//! Scoped temp storage for vision screenshots.

use std::path::{Path, PathBuf};

use crate::error::ScraperError;

const ARTIFACT_PREFIX: &str = "shot-";

fn io_err(path: &Path, source: std::io::Error) -> ScraperError {
    ScraperError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Owns one directory of screenshot files. Every file it writes carries the
/// `shot-` prefix, and `sweep` only ever removes those.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` to a new uniquely named file, creating the directory on demand.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] if the directory or file cannot be written.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<PathBuf, ScraperError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        let path = self
            .dir
            .join(format!("{ARTIFACT_PREFIX}{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(path)
    }

    /// Deletes one artifact. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] for any other removal failure.
    pub async fn delete(&self, path: &Path) -> Result<(), ScraperError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Deletes every artifact in the directory. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] if the directory cannot be listed.
    pub async fn sweep(&self) -> Result<usize, ScraperError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&self.dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.dir, e))?
        {
            let owned = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(ARTIFACT_PREFIX));
            if !owned {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "failed to sweep artifact"),
            }
        }
        Ok(removed)
    }
}
