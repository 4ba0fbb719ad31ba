//! Per-request staging of uploaded bytes on disk.
//!
//! Every request gets its own `<root>/<uuid>` directory so that identical filenames submitted by
//! concurrent callers never share a path. Both [`StagedFile`] and [`RequestStaging`] remove what
//! they created when dropped, which covers cancelled requests as well as early returns.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

const FALLBACK_FILE_NAME: &str = "upload.bin";

/// Errors raised while materializing or removing staged uploads.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The staging root or request directory could not be created.
    #[error("failed to prepare staging directory {}: {source}", path.display())]
    Directory {
        /// Directory we attempted to create.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Writing the uploaded bytes failed (disk full, permission denied, ...).
    #[error("failed to write staged file {}: {source}", path.display())]
    Write {
        /// Target path of the staged file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Removing a staged file or directory failed for a reason other than absence.
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        /// Path we attempted to remove.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Root directory that hosts the per-request staging namespaces.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Use `root` as the staging root. Nothing is created until a request begins.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh namespace for one request.
    pub async fn begin_request(&self) -> Result<RequestStaging, StagingError> {
        let dir = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StagingError::Directory {
                path: dir.clone(),
                source,
            })?;
        tracing::debug!(dir = %dir.display(), "Opened request staging directory");
        Ok(RequestStaging {
            dir,
            finished: false,
        })
    }

    /// Remove request directories whose modification time is at least `max_age` old.
    ///
    /// Returns the number of directories removed. A missing root is not an error.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize, StagingError> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
        {
            let age = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            remove_dir_if_present(entry.path())?;
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(
                root = %self.root.display(),
                removed,
                "Swept stale staging directories"
            );
        }
        Ok(removed)
    }
}

/// Staging namespace owned by a single request.
#[derive(Debug)]
pub struct RequestStaging {
    dir: PathBuf,
    finished: bool,
}

impl RequestStaging {
    /// Directory holding this request's staged files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write `content` fully to a path derived from `file_name`.
    pub async fn stage(&self, file_name: &str, content: &[u8]) -> Result<StagedFile, StagingError> {
        let path = self.dir.join(sanitize_file_name(file_name));
        if let Err(source) = tokio::fs::write(&path, content).await {
            // A partially written file must not outlive the failed attempt.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StagingError::Write { path, source });
        }
        tracing::debug!(path = %path.display(), bytes = content.len(), "Staged upload");
        Ok(StagedFile {
            path,
            released: false,
        })
    }

    /// Remove the request directory and anything left inside it.
    pub async fn finish(mut self) {
        self.finished = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %error,
                    "Failed to remove request staging directory"
                );
            }
        }
    }
}

impl Drop for RequestStaging {
    fn drop(&mut self) {
        if !self.finished {
            let _ = remove_dir_if_present(&self.dir);
        }
    }
}

/// An uploaded file materialized on disk for the duration of its processing.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    /// Location of the staged bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase extension of the staged name, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
    }

    /// Delete the staged file. Calling this again, or on a file already gone, is a no-op.
    pub async fn release(&mut self) -> Result<(), StagingError> {
        if self.released {
            return Ok(());
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StagingError::Remove {
                    path: self.path.clone(),
                    source,
                });
            }
        }
        self.released = true;
        tracing::debug!(path = %self.path.display(), "Released staged file");
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "Failed to remove staged file on drop"
                );
            }
        }
    }
}

/// Convert a minute count from configuration into a sweep age, saturating on huge values.
pub fn age_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Reduce a client supplied filename to a single safe path component.
pub(crate) fn sanitize_file_name(file_name: &str) -> String {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

fn remove_dir_if_present(path: &Path) -> Result<(), StagingError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StagingError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
