//! Cleanup of structured model output before it is handed to serde.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Removes a leading ```` ``` ```` / ```` ```json ```` fence line and a trailing
/// ```` ``` ```` fence, plus surrounding whitespace.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            // Single-line fence such as ```{"a":1}```
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

/// Parses model output as JSON after stripping fences. Logs and returns `None`
/// on failure.
pub fn parse_json_response(text: &str) -> Option<Value> {
    parse_json_as(text)
}

pub fn parse_json_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    let body = strip_code_fences(text);
    match serde_json::from_str::<T>(body) {
        Ok(value) => Some(value),
        Err(e) => {
            let preview: String = body.chars().take(200).collect();
            warn!(error = %e, preview = %preview, "Failed to parse structured AI response");
            None
        }
    }
}
