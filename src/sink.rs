//! Transient persistence of batch results and their privacy erasure.
//!
//! A successful batch is written to the configured output file so that it exists while the
//! response is in flight. Each response carries an [`ErasureTicket`]; once the ticket is dropped
//! (after the body is handed to the transport, or when the client goes away) the background
//! [`EraseQueue`] overwrites the file with an empty JSON array.

use crate::metrics::PipelineMetrics;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;
use walkdir::WalkDir;

const EMPTY_RESULT: &[u8] = b"[]";
const TEMP_SUFFIX: &str = ".tmp";

/// Errors raised while persisting a batch result.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The batch could not be encoded as JSON.
    #[error("failed to encode batch result: {0}")]
    Encode(#[from] serde_json::Error),
    /// The output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Output file location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Error raised when the output file could not be cleared. Logged, never returned to callers.
#[derive(Debug, Error)]
#[error("failed to erase {}: {source}", path.display())]
pub struct EraseError {
    /// Output file location.
    pub path: PathBuf,
    /// Underlying I/O failure.
    #[source]
    pub source: io::Error,
}

/// Handle to the single output file shared by all requests.
///
/// Writes are serialized and atomic (write to a sibling file, then rename), so readers only ever
/// observe a complete document. Concurrent batches follow last-writer-wins.
///
/// Each write runs to completion on the blocking pool while holding the write lock, even when the
/// calling future is dropped. An erasure queued after a cancelled write therefore always lands
/// after it.
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ResultSink {
    /// Persist results to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Output file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the output file with the indented JSON encoding of `records`.
    pub async fn persist<T: Serialize>(&self, records: &[T]) -> Result<(), SinkError> {
        let encoded = serde_json::to_vec_pretty(records)?;
        self.run_exclusive(move |path| replace_file(path, &encoded))
            .await
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Persisted batch result"
        );
        Ok(())
    }

    /// Overwrite the output file with `[]` and delete temporary siblings left by interrupted
    /// writes. Running it repeatedly is harmless.
    pub async fn erase(&self) -> Result<(), EraseError> {
        self.run_exclusive(|path| {
            replace_file(path, EMPTY_RESULT)?;
            let removed = remove_stray_temp_files(path)?;
            if removed > 0 {
                tracing::debug!(
                    path = %path.display(),
                    removed,
                    "Removed temporary output files left by interrupted writes"
                );
            }
            Ok(())
        })
        .await
        .map_err(|source| EraseError {
            path: self.path.clone(),
            source,
        })
    }

    async fn run_exclusive<F>(&self, op: F) -> io::Result<()>
    where
        F: FnOnce(&Path) -> io::Result<()> + Send + 'static,
    {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&path)
        })
        .await
        .map_err(io::Error::other)?
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    temp_name.push(format!(".{}{TEMP_SUFFIX}", Uuid::new_v4()));
    let temp_path = path.with_file_name(temp_name);

    let result =
        std::fs::write(&temp_path, contents).and_then(|()| std::fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Delete `<name>.*.tmp` files next to `path`. Returns how many were removed.
fn remove_stray_temp_files(path: &Path) -> io::Result<usize> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Ok(0);
    };
    let prefix = format!("{name}.");
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut removed = 0;
    for entry in WalkDir::new(parent)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let Some(candidate) = entry.file_name().to_str() else {
            continue;
        };
        if !(candidate.starts_with(&prefix) && candidate.ends_with(TEMP_SUFFIX)) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }
    }
    Ok(removed)
}

/// Background queue that performs privacy erasures off the request path.
#[derive(Clone)]
pub struct EraseQueue {
    sender: mpsc::UnboundedSender<()>,
}

impl EraseQueue {
    /// Start the erasure worker on the current tokio runtime.
    ///
    /// The worker exits once every queue handle and outstanding ticket has been dropped.
    pub fn spawn(sink: Arc<ResultSink>, metrics: Arc<PipelineMetrics>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            while receiver.recv().await.is_some() {
                match sink.erase().await {
                    Ok(()) => {
                        metrics.record_erasure(true);
                        tracing::info!(path = %sink.path().display(), "Privacy cleanup: cleared output");
                    }
                    Err(error) => {
                        metrics.record_erasure(false);
                        tracing::warn!(error = %error, "Privacy cleanup failed");
                    }
                }
            }
            tracing::debug!("Erase queue closed");
        });
        Self { sender }
    }

    /// Issue a ticket that schedules one erasure when fired or dropped.
    pub fn ticket(&self) -> ErasureTicket {
        ErasureTicket {
            queue: Some(self.clone()),
        }
    }

    fn schedule(&self) {
        if self.sender.send(()).is_err() {
            tracing::warn!("Erase queue is closed; output was not cleared");
        }
    }
}

/// Schedules exactly one erasure, either explicitly via [`ErasureTicket::fire`] or on drop.
#[must_use = "dropping the ticket schedules the erasure immediately"]
pub struct ErasureTicket {
    queue: Option<EraseQueue>,
}

impl ErasureTicket {
    /// A ticket bound to no queue; firing it does nothing.
    pub fn detached() -> Self {
        Self { queue: None }
    }

    /// Whether firing this ticket will schedule an erasure.
    pub fn is_armed(&self) -> bool {
        self.queue.is_some()
    }

    /// Schedule the erasure now.
    pub fn fire(mut self) {
        if let Some(queue) = self.queue.take() {
            queue.schedule();
        }
    }
}

impl Drop for ErasureTicket {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.schedule();
        }
    }
}

impl std::fmt::Debug for ErasureTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureTicket")
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn wait_for_contents(path: &Path, expected: &str) {
        for _ in 0..200 {
            if tokio::fs::read_to_string(path).await.ok().as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never contained {expected}", path.display());
    }

    #[tokio::test]
    async fn persist_writes_indented_json_with_raw_unicode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ResultSink::new(dir.path().join("nested").join("output.json"));

        sink.persist(&[json!({"summary": "café", "fileName": "a.txt"})])
            .await
            .expect("persist");

        let contents = std::fs::read_to_string(sink.path()).expect("read");
        assert!(contents.contains("café"));
        assert!(contents.contains("\n  {\n    \""));
        let parsed: serde_json::Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(parsed[0]["fileName"], "a.txt");
    }

    #[tokio::test]
    async fn erase_twice_leaves_empty_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ResultSink::new(dir.path().join("output.json"));
        sink.persist(&[json!({"summary": "x"})])
            .await
            .expect("persist");

        sink.erase().await.expect("first erase");
        assert_eq!(std::fs::read_to_string(sink.path()).expect("read"), "[]");
        sink.erase().await.expect("second erase");
        assert_eq!(std::fs::read_to_string(sink.path()).expect("read"), "[]");
    }

    #[tokio::test]
    async fn atomic_writes_leave_no_temporary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ResultSink::new(dir.path().join("output.json"));
        sink.persist::<serde_json::Value>(&[]).await.expect("persist");
        sink.erase().await.expect("erase");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("output.json")]);
    }

    #[tokio::test]
    async fn erase_removes_leftovers_of_interrupted_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = ResultSink::new(dir.path().join("output.json"));
        let leftover = dir.path().join("output.json.3f2a.tmp");
        let unrelated = dir.path().join("other.json.3f2a.tmp");
        std::fs::write(&leftover, r#"[{"summary": "secret"}]"#).expect("seed leftover");
        std::fs::write(&unrelated, "keep").expect("seed unrelated");

        sink.erase().await.expect("erase");

        assert!(!leftover.exists());
        assert!(unrelated.exists());
        assert_eq!(std::fs::read_to_string(sink.path()).expect("read"), "[]");
    }

    #[tokio::test]
    async fn dropped_ticket_erases_in_background() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = Arc::new(ResultSink::new(dir.path().join("output.json")));
        let metrics = Arc::new(PipelineMetrics::new());
        let queue = EraseQueue::spawn(sink.clone(), metrics.clone());

        sink.persist(&[json!({"summary": "secret"})])
            .await
            .expect("persist");
        let ticket = queue.ticket();
        assert!(ticket.is_armed());
        drop(ticket);

        wait_for_contents(sink.path(), "[]").await;
        assert_eq!(metrics.snapshot().erasures_failed, 0);
    }

    #[tokio::test]
    async fn failed_erasure_is_counted_not_raised() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Renaming a file over a directory fails.
        let sink = Arc::new(ResultSink::new(dir.path().to_path_buf()));
        let metrics = Arc::new(PipelineMetrics::new());
        let queue = EraseQueue::spawn(sink, metrics.clone());

        queue.ticket().fire();

        for _ in 0..200 {
            if metrics.snapshot().erasures_failed == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("erasure failure was not recorded");
    }

    #[test]
    fn detached_ticket_is_inert() {
        let ticket = ErasureTicket::detached();
        assert!(!ticket.is_armed());
        ticket.fire();
    }
}
