//! Core data types and error definitions for the batch pipeline.

use crate::extraction::ExtractionError;
use crate::sink::{ErasureTicket, SinkError};
use crate::staging::StagingError;
use crate::structuring::{StructuredFields, StructuringError};
use axum::body::Bytes;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Key added to every record naming the upload it came from.
pub const FILE_NAME_KEY: &str = "fileName";

/// One file of an inbound batch, exactly as the client named it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client supplied filename; neither unique nor sanitized.
    pub file_name: String,
    /// Raw uploaded bytes.
    pub content: Bytes,
}

impl UploadedFile {
    /// Bundle a filename with its content.
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Adapter fields plus the originating filename, serialized as a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructuredRecord(StructuredFields);

impl StructuredRecord {
    /// Attach `file_name` under [`FILE_NAME_KEY`], replacing any adapter value of that key.
    pub fn tagged(mut fields: StructuredFields, file_name: &str) -> Self {
        fields.insert(FILE_NAME_KEY.to_string(), Value::from(file_name));
        Self(fields)
    }

    /// Originating filename.
    pub fn file_name(&self) -> Option<&str> {
        self.0.get(FILE_NAME_KEY).and_then(Value::as_str)
    }

    /// All fields, including the filename tag.
    pub fn fields(&self) -> &StructuredFields {
        &self.0
    }
}

/// Records of a fully successful batch, in submission order.
pub type BatchResult = Vec<StructuredRecord>;

/// A batch that succeeded and has been persisted.
#[derive(Debug)]
pub struct CompletedBatch {
    /// One record per submitted file, in submission order.
    pub records: BatchResult,
    /// Clears the persisted output once dropped or fired.
    pub erasure: ErasureTicket,
}

/// Why a single file could not be processed.
#[derive(Debug, Error)]
pub enum FileError {
    /// Writing the upload to the staging area failed.
    #[error(transparent)]
    Staging(#[from] StagingError),
    /// The staged file could not be turned into text.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The extracted text could not be structured.
    #[error(transparent)]
    Structuring(#[from] StructuringError),
}

impl FileError {
    /// Pipeline stage that failed, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Staging(_) => "staging",
            Self::Extraction(_) => "extraction",
            Self::Structuring(_) => "structuring",
        }
    }
}

/// Errors that abort a whole batch. No partial result accompanies them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The first file that failed, in submission order.
    #[error("An error occurred while processing {file_name}: {source}")]
    File {
        /// Name of the failing upload as submitted.
        file_name: String,
        /// Underlying failure.
        #[source]
        source: FileError,
    },
    /// The per-request staging namespace could not be created.
    #[error("failed to prepare staging area: {0}")]
    Staging(#[source] StagingError),
    /// Every file succeeded but the result could not be persisted.
    #[error("failed to persist batch result: {0}")]
    Persist(#[from] SinkError),
}

impl PipelineError {
    /// Name of the upload that aborted the batch, when a file was at fault.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::File { file_name, .. } => Some(file_name),
            Self::Staging(_) | Self::Persist(_) => None,
        }
    }
}
