//! VLM row extraction: send a prepared page image, get structured rows back.
//!
//! This module is intentionally thin: prompt wording lives in
//! [`crate::prompts`], and everything downstream of the raw rows (coercion,
//! plausibility checks, reconciliation) lives in [`crate::validate`]. What
//! remains here is the network call and the defensive parsing of what the
//! model actually returns.
//!
//! ## Parsing the response
//!
//! The prompt demands a bare JSON array, but models routinely wrap output
//! in a Markdown code fence anyway, so the parser strips one fence before
//! deserialising. Within the array, elements that are not objects are
//! skipped with a warning rather than failing the page — a model that
//! emits 39 good rows and one stray string should not cost us the 39.

use crate::record::RawRecord;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Page-level extraction failures. All of these are recoverable: the driver
/// records them against the page and moves on.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The provider call itself failed (network, auth, rate limit).
    #[error("VLM request failed: {0}")]
    Transport(String),

    /// The response was not parseable as JSON even after fence stripping.
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    /// The response parsed as JSON but was not an array of rows.
    #[error("expected a JSON array of row objects, got {0}")]
    NotAnArray(String),
}

/// Anything that can turn a page image into table rows.
///
/// The production implementation is [`VlmRowExtractor`]; tests substitute
/// canned extractors so the full page loop runs without network access.
pub trait RowExtractor: Send + Sync {
    /// Extract the table rows from one page image. Returns the rows plus
    /// the count of array elements skipped as malformed.
    fn extract(
        &self,
        page_num: usize,
        image: &ImageData,
    ) -> impl std::future::Future<Output = Result<(Vec<RawRecord>, usize), ExtractError>> + Send;
}

/// Row extraction via a multimodal chat provider.
pub struct VlmRowExtractor {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl VlmRowExtractor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        prompt: String,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            prompt,
            temperature,
            max_tokens,
        }
    }
}

impl RowExtractor for VlmRowExtractor {
    async fn extract(
        &self,
        page_num: usize,
        image: &ImageData,
    ) -> Result<(Vec<RawRecord>, usize), ExtractError> {
        // A single user turn carrying both the instructions and the page
        // image. The whole task description goes in the user message (not a
        // system prompt) because several vision endpoints ignore system
        // messages when an image is attached.
        let messages = vec![ChatMessage::user_with_images(
            self.prompt.clone(),
            vec![image.clone()],
        )];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        debug!(
            "Page {}: received {} chars from model",
            page_num,
            response.content.len()
        );

        parse_rows(&response.content, page_num)
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    // A single fenced block, optionally tagged `json`, possibly surrounded
    // by whitespace or a short preamble the model added despite the prompt.
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap_or_else(|e| panic!("fence regex: {e}"))
});

/// Parse a model response into raw rows.
///
/// Strips at most one Markdown code fence, requires a JSON array at the top
/// level, and skips (with a warning) any array element that is not an
/// object shaped like a row.
pub fn parse_rows(content: &str, page_num: usize) -> Result<(Vec<RawRecord>, usize), ExtractError> {
    let body = match CODE_FENCE.captures(content) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(content),
        None => content.trim(),
    };

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ExtractError::NotJson(e.to_string()))?;

    let elements = match value {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(ExtractError::NotAnArray(describe_json(&other)));
        }
    };

    let mut rows = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;

    for (i, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<RawRecord>(element) {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!("Page {}: skipping malformed row {}: {}", page_num, i, e);
                skipped += 1;
            }
        }
    }

    Ok((rows, skipped))
}

fn describe_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(_) => "a boolean".to_string(),
        serde_json::Value::Number(_) => "a number".to_string(),
        serde_json::Value::String(_) => "a string".to_string(),
        serde_json::Value::Object(_) => "a single object".to_string(),
        serde_json::Value::Array(_) => "an array".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN_ARRAY: &str = r#"[
        {"sifra": "1234", "novi_status": 0.0, "staro_stanje": 3290, "novo_stanje": 3306},
        {"sifra": "1235", "novi_status": "0,0", "staro_stanje": "100", "novo_stanje": 120}
    ]"#;

    #[test]
    fn bare_array_parses() {
        let (rows, skipped) = parse_rows(PLAIN_ARRAY, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn fenced_array_parses() {
        let fenced = format!("```json\n{}\n```", PLAIN_ARRAY);
        let (rows, _) = parse_rows(&fenced, 1).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn untagged_fence_parses() {
        let fenced = format!("```\n{}\n```", PLAIN_ARRAY);
        let (rows, _) = parse_rows(&fenced, 1).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn fence_with_preamble_parses() {
        let chatty = format!(
            "Here is the extracted table:\n\n```json\n{}\n```\nLet me know if you need more.",
            PLAIN_ARRAY
        );
        let (rows, _) = parse_rows(&chatty, 1).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn non_object_elements_are_skipped_not_fatal() {
        let mixed = r#"[
            {"sifra": "1", "staro_stanje": 10, "novo_stanje": 11},
            "stray string",
            42,
            {"sifra": "2", "staro_stanje": 20, "novo_stanje": 21}
        ]"#;
        let (rows, skipped) = parse_rows(mixed, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn empty_array_is_valid() {
        let (rows, skipped) = parse_rows("[]", 1).unwrap();
        assert!(rows.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn prose_response_is_not_json() {
        let err = parse_rows("I could not read the table.", 1).unwrap_err();
        assert!(matches!(err, ExtractError::NotJson(_)));
    }

    #[test]
    fn top_level_object_is_rejected() {
        let err = parse_rows(r#"{"rows": []}"#, 1).unwrap_err();
        assert!(matches!(err, ExtractError::NotAnArray(_)));
    }

    #[test]
    fn invalid_json_inside_fence_is_not_json() {
        let err = parse_rows("```json\n[{broken\n```", 1).unwrap_err();
        assert!(matches!(err, ExtractError::NotJson(_)));
    }
}
