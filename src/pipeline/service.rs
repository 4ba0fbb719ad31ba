//! Batch orchestration: staging, extraction, structuring, tagging and persistence.

use crate::{
    config::Config,
    extraction::{FormatExtractor, TextExtractor},
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::types::{CompletedBatch, FileError, PipelineError, StructuredRecord, UploadedFile},
    sink::{EraseQueue, ResultSink},
    staging::{RequestStaging, StagedFile, StagingArea},
    structuring::{
        ExtractiveStructurer, StructuredFields, Structurer, StructuringError, build_structurer,
    },
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Runs uploaded batches through staging, extraction and structuring.
///
/// Files are processed one after another in submission order and the first failure aborts the
/// batch, so the reported file is always the earliest failing one. Staged bytes are released
/// after every file regardless of outcome. Only a fully successful batch reaches the
/// [`ResultSink`], and every persisted batch comes back with an erasure ticket.
/// Construct the service once near process start and share it through an `Arc`.
pub struct PipelineService {
    staging: StagingArea,
    extractor: Arc<dyn TextExtractor>,
    structurer: Arc<dyn Structurer>,
    sink: Arc<ResultSink>,
    erase_queue: EraseQueue,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Process every file of a batch atomically.
    async fn process_batch(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<CompletedBatch, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl PipelineService {
    /// Build a service with the default extractor and the extractive structurer.
    ///
    /// Must be called from within a tokio runtime; the erase worker is spawned here.
    pub fn new(staging: StagingArea, sink: ResultSink) -> Self {
        let sink = Arc::new(sink);
        let metrics = Arc::new(PipelineMetrics::new());
        let erase_queue = EraseQueue::spawn(sink.clone(), metrics.clone());
        Self {
            staging,
            extractor: Arc::new(FormatExtractor::new()),
            structurer: Arc::new(ExtractiveStructurer::default()),
            sink,
            erase_queue,
            metrics,
        }
    }

    /// Build a service from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, StructuringError> {
        let structurer = build_structurer(config)?;
        Ok(Self::new(
            StagingArea::new(config.staging_dir.clone()),
            ResultSink::new(config.output_path.clone()),
        )
        .with_structurer(structurer))
    }

    /// Replace the text extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the structurer.
    pub fn with_structurer(mut self, structurer: Arc<dyn Structurer>) -> Self {
        self.structurer = structurer;
        self
    }

    /// Staging area used for uploads.
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Sink holding the transient output.
    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Process a batch, persist its result and hand back an erasure ticket.
    pub async fn process_batch(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<CompletedBatch, PipelineError> {
        let file_count = files.len();
        tracing::info!(files = file_count, "Processing batch");

        let request = match self.staging.begin_request().await {
            Ok(request) => request,
            Err(error) => {
                self.metrics.record_failure();
                tracing::error!(error = %error, "Could not open staging namespace");
                return Err(PipelineError::Staging(error));
            }
        };

        let mut records = Vec::with_capacity(file_count);
        for (index, file) in files.iter().enumerate() {
            match self.process_file(&request, file).await {
                Ok(record) => records.push(record),
                Err(source) => {
                    request.finish().await;
                    self.metrics.record_failure();
                    tracing::error!(
                        file = %file.file_name,
                        position = index + 1,
                        stage = source.stage(),
                        error = %source,
                        "Pipeline failed; discarding batch"
                    );
                    return Err(PipelineError::File {
                        file_name: file.file_name.clone(),
                        source,
                    });
                }
            }
        }
        request.finish().await;

        // Issued before the write so that a cancelled or failed persist still gets cleared.
        let erasure = self.erase_queue.ticket();
        if let Err(error) = self.sink.persist(&records).await {
            erasure.fire();
            self.metrics.record_failure();
            tracing::error!(error = %error, "Failed to persist batch result");
            return Err(error.into());
        }

        self.metrics.record_success(file_count as u64);
        tracing::info!(files = file_count, "Batch completed");

        Ok(CompletedBatch { records, erasure })
    }

    async fn process_file(
        &self,
        request: &RequestStaging,
        file: &UploadedFile,
    ) -> Result<StructuredRecord, FileError> {
        tracing::debug!(
            file = %file.file_name,
            bytes = file.content.len(),
            sha256 = %hex::encode(Sha256::digest(&file.content)),
            "Staging upload"
        );
        let mut staged = request.stage(&file.file_name, &file.content).await?;

        let outcome = self.extract_and_structure(&staged).await;

        if let Err(error) = staged.release().await {
            tracing::warn!(file = %file.file_name, error = %error, "Failed to release staged file");
        }

        Ok(StructuredRecord::tagged(outcome?, &file.file_name))
    }

    async fn extract_and_structure(
        &self,
        staged: &StagedFile,
    ) -> Result<StructuredFields, FileError> {
        let text = self.extractor.extract_text(staged).await?;
        tracing::debug!(characters = text.chars().count(), "Extracted text");
        Ok(self.structurer.structure(text).await?)
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn process_batch(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<CompletedBatch, PipelineError> {
        PipelineService::process_batch(self, files).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}
