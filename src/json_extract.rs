//! Tolerant extraction of JSON from free-form model output.
//!
//! Models often wrap their answer in code fences or add a sentence before or
//! after it. Instead of trimming fence markers by hand we scan for the first
//! balanced JSON object or array, honoring string literals and escapes, and
//! hand that slice to `serde_json`.

use crate::error::{Result, ServiceError};
use serde::de::DeserializeOwned;

/// Returns the first balanced `{...}` or `[...]` span in `text`.
///
/// Spans that are balanced but fail to parse are skipped, so a stray brace in
/// leading prose does not hide the real payload.
pub fn find_json_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = bytes[search_from..]
        .iter()
        .position(|&b| b == b'{' || b == b'[')
    {
        let start = search_from + rel;
        if let Some(end) = balanced_end(bytes, start) {
            let candidate = &text[start..=end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Index of the bracket closing the one opened at `start`, if any.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Locates the JSON payload in `text` and deserializes it.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let span = find_json_span(text).ok_or(ServiceError::NoJson)?;
    Ok(serde_json::from_str(span)?)
}
