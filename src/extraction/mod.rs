//! Text extraction from staged uploads.
//!
//! The pipeline only sees the [`TextExtractor`] trait. [`FormatExtractor`] is the default
//! implementation and picks a decoder from the staged file's extension.

mod pdf;
mod plain;

use crate::staging::StagedFile;
use async_trait::async_trait;
use thiserror::Error;

/// Extensions decoded as UTF-8 text.
const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "log", "xml", "html", "htm", "yaml", "yml",
];

/// Errors raised when a staged file cannot be turned into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No decoder exists for the file, or the document uses a feature we cannot read.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// The bytes do not form a valid document of the detected format.
    #[error("corrupt document: {0}")]
    CorruptInput(String),
    /// The staged file could not be read.
    #[error("failed to read staged file: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Short machine-friendly label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported-format",
            Self::CorruptInput(_) => "corrupt-input",
            Self::Io(_) => "io-failure",
        }
    }
}

/// Interface implemented by text extraction backends.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Produce the plain text content of a staged file.
    async fn extract_text(&self, file: &StagedFile) -> Result<String, ExtractionError>;
}

/// Extension-dispatching extractor covering the plain text family and PDF.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatExtractor;

impl FormatExtractor {
    /// Construct the default extractor.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for FormatExtractor {
    async fn extract_text(&self, file: &StagedFile) -> Result<String, ExtractionError> {
        let extension = file.extension().unwrap_or_default();
        tracing::debug!(path = %file.path().display(), extension = %extension, "Extracting text");
        match extension.as_str() {
            "pdf" => pdf::extract(file.path()).await,
            ext if PLAIN_TEXT_EXTENSIONS.contains(&ext) => plain::extract(file.path()).await,
            "" => Err(ExtractionError::UnsupportedFormat(
                "file has no extension".to_string(),
            )),
            other => Err(ExtractionError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingArea;

    #[tokio::test]
    async fn dispatches_plain_text_by_extension() {
        let root = tempfile::tempdir().expect("tempdir");
        let request = StagingArea::new(root.path())
            .begin_request()
            .await
            .expect("request");
        let staged = request.stage("notes.MD", b"# Title").await.expect("stage");

        let text = FormatExtractor::new()
            .extract_text(&staged)
            .await
            .expect("text");
        assert_eq!(text, "# Title");
    }

    #[tokio::test]
    async fn rejects_unknown_extensions() {
        let root = tempfile::tempdir().expect("tempdir");
        let request = StagingArea::new(root.path())
            .begin_request()
            .await
            .expect("request");
        let staged = request.stage("photo.heic", b"\x00\x01").await.expect("stage");
        let bare = request.stage("README", b"text").await.expect("stage");

        let error = FormatExtractor::new()
            .extract_text(&staged)
            .await
            .expect_err("unsupported");
        assert_eq!(error.kind(), "unsupported-format");
        assert!(error.to_string().contains(".heic"));

        let error = FormatExtractor::new()
            .extract_text(&bare)
            .await
            .expect_err("no extension");
        assert!(matches!(error, ExtractionError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn missing_staged_file_is_an_io_failure() {
        let root = tempfile::tempdir().expect("tempdir");
        let request = StagingArea::new(root.path())
            .begin_request()
            .await
            .expect("request");
        let staged = request.stage("gone.txt", b"text").await.expect("stage");
        std::fs::remove_file(staged.path()).expect("delete");

        let error = FormatExtractor::new()
            .extract_text(&staged)
            .await
            .expect_err("io");
        assert_eq!(error.kind(), "io-failure");
    }
}
