use super::{StructuredFields, Structurer, StructuringError};
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_SUMMARY_WORDS: usize = 60;

/// Deterministic structurer that needs no model runtime.
///
/// Produces `summary` (leading words of the text), `wordCount`, `characterCount` and `lineCount`.
#[derive(Debug, Clone)]
pub struct ExtractiveStructurer {
    summary_words: usize,
}

impl ExtractiveStructurer {
    /// Build a structurer whose summary keeps at most `summary_words` words.
    pub fn new(summary_words: usize) -> Self {
        Self {
            summary_words: summary_words.max(1),
        }
    }

    fn summarize(&self, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= self.summary_words {
            return words.join(" ");
        }
        let mut summary = words[..self.summary_words].join(" ");
        summary.push('…');
        summary
    }
}

impl Default for ExtractiveStructurer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_WORDS)
    }
}

#[async_trait]
impl Structurer for ExtractiveStructurer {
    async fn structure(&self, text: String) -> Result<StructuredFields, StructuringError> {
        if text.trim().is_empty() {
            return Err(StructuringError::EmptyInput);
        }

        let mut fields = StructuredFields::new();
        fields.insert("summary".into(), Value::from(self.summarize(&text)));
        fields.insert(
            "wordCount".into(),
            Value::from(text.split_whitespace().count()),
        );
        fields.insert("characterCount".into(), Value::from(text.chars().count()));
        fields.insert("lineCount".into(), Value::from(text.lines().count()));
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_text_is_kept_whole() {
        let fields = ExtractiveStructurer::default()
            .structure("hello".into())
            .await
            .expect("fields");
        assert_eq!(fields["summary"], "hello");
        assert_eq!(fields["wordCount"], 1);
        assert_eq!(fields["lineCount"], 1);
    }

    #[tokio::test]
    async fn long_text_is_truncated_with_ellipsis() {
        let fields = ExtractiveStructurer::new(3)
            .structure("one two  three\nfour five".into())
            .await
            .expect("fields");
        assert_eq!(fields["summary"], "one two three…");
        assert_eq!(fields["wordCount"], 5);
        assert_eq!(fields["lineCount"], 2);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let error = ExtractiveStructurer::default()
            .structure(" \n\t".into())
            .await
            .expect_err("empty");
        assert!(matches!(error, StructuringError::EmptyInput));
    }

    #[tokio::test]
    async fn non_ascii_counts_characters_not_bytes() {
        let fields = ExtractiveStructurer::default()
            .structure("naïve café".into())
            .await
            .expect("fields");
        assert_eq!(fields["characterCount"], 10);
    }
}
