use super::ExtractionError;
use lopdf::Document;
use std::path::Path;

/// Extract the text layer of every page, in page order.
///
/// Parsing is CPU bound, so it runs on the blocking pool.
pub(super) async fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || extract_from_bytes(&bytes))
        .await
        .map_err(|error| ExtractionError::Io(std::io::Error::other(error)))?
}

fn extract_from_bytes(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = Document::load_mem(bytes).map_err(|error| {
        let message = error.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("password") || lowered.contains("encrypt") {
            ExtractionError::UnsupportedFormat(format!("encrypted PDF: {message}"))
        } else {
            ExtractionError::CorruptInput(format!("unreadable PDF: {message}"))
        }
    })?;

    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractionError::UnsupportedFormat(
            "encrypted PDF".to_string(),
        ));
    }

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Ok(String::new());
    }

    document
        .extract_text(&pages)
        .map_err(|error| ExtractionError::CorruptInput(format!("PDF text layer: {error}")))
}
