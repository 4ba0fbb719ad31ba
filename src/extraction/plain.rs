use super::ExtractionError;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Read a staged file as UTF-8 text, dropping a leading byte order mark.
pub(super) async fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;
    decode(bytes)
}

fn decode(mut bytes: Vec<u8>) -> Result<String, ExtractionError> {
    if bytes.starts_with(UTF8_BOM) {
        bytes.drain(..UTF8_BOM.len());
    }
    String::from_utf8(bytes).map_err(|error| {
        ExtractionError::CorruptInput(format!(
            "not valid UTF-8 after byte {}",
            error.utf8_error().valid_up_to()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_byte_order_mark() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("café".as_bytes());
        assert_eq!(decode(bytes).expect("text"), "café");
    }

    #[test]
    fn invalid_utf8_is_corrupt() {
        let error = decode(vec![b'o', b'k', 0xFF, 0xFE]).expect_err("corrupt");
        assert!(matches!(error, ExtractionError::CorruptInput(message) if message.contains("byte 2")));
    }
}
