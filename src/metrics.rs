use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Thread-safe counters describing batch and erasure activity.
#[derive(Default)]
pub struct PipelineMetrics {
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
    files_processed: AtomicU64,
    erasures_completed: AtomicU64,
    erasures_failed: AtomicU64,
    last_batch_at: Mutex<Option<String>>,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch that produced a result for every submitted file.
    pub fn record_success(&self, file_count: u64) {
        self.batches_succeeded.fetch_add(1, Ordering::Relaxed);
        self.files_processed.fetch_add(file_count, Ordering::Relaxed);
        self.touch();
    }

    /// Record a batch aborted by a file failure or a persistence error.
    pub fn record_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record the outcome of one privacy erasure.
    pub fn record_erasure(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.erasures_completed
        } else {
            &self.erasures_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_succeeded: self.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            erasures_completed: self.erasures_completed.load(Ordering::Relaxed),
            erasures_failed: self.erasures_failed.load(Ordering::Relaxed),
            last_batch_at: self
                .last_batch_at
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default(),
        }
    }

    fn touch(&self) {
        let now = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        if let Ok(mut guard) = self.last_batch_at.lock() {
            *guard = now;
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Batches that completed and were returned to the caller.
    pub batches_succeeded: u64,
    /// Batches aborted by the first failing file.
    pub batches_failed: u64,
    /// Files processed across all successful batches.
    pub files_processed: u64,
    /// Privacy erasures that overwrote the output file.
    pub erasures_completed: u64,
    /// Privacy erasures that failed and were only logged.
    pub erasures_failed: u64,
    /// RFC3339 timestamp of the most recent batch, successful or not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_batch_at: Option<String>,
}
