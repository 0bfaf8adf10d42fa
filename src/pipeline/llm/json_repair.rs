//! Lenient JSON recovery for model output.
//!
//! Models wrap JSON in prose or code fences, leave trailing commas, emit
//! typographic quotes, or get cut off mid-object. These helpers recover
//! the common cases before giving up.

use serde::de::DeserializeOwned;

use super::LlmError;

/// Locate the JSON payload inside a model response.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Fix the usual model mistakes: typographic quotes, raw newlines inside
/// strings, trailing commas, and unterminated strings or containers.
pub fn repair_json(raw: &str) -> String {
    let text = raw
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if in_string {
            if escape_next {
                escape_next = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escape_next = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                closers.push('}');
                out.push(ch);
            }
            '[' => {
                closers.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                strip_trailing_comma(&mut out);
                if closers.last() == Some(&ch) {
                    closers.pop();
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escape_next {
            out.pop();
        }
        out.push('"');
    }
    if !closers.is_empty() {
        strip_trailing_comma(&mut out);
        while let Some(c) = closers.pop() {
            out.push(c);
        }
    }
    out
}

fn strip_trailing_comma(out: &mut String) {
    let keep = out.trim_end().len();
    out.truncate(keep);
    if out.ends_with(',') {
        out.pop();
    }
}

/// Parse a model response into `T`, repairing it if strict parsing fails.
pub fn parse_model_json<T: DeserializeOwned>(response: &str) -> Result<T, LlmError> {
    let block = extract_json_block(response).unwrap_or_else(|| response.trim());

    let strict_err = match serde_json::from_str::<T>(block) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Ok(value) = serde_json::from_str::<T>(&repair_json(block)) {
        tracing::debug!("Recovered model JSON after repair");
        return Ok(value);
    }

    // Truncated output has no closing brace, so retry from the first opener.
    if let Some(start) = response.find(['{', '[']) {
        let tail = response[start..].trim_end().trim_end_matches('`');
        if tail != block {
            if let Ok(value) = serde_json::from_str::<T>(&repair_json(tail)) {
                tracing::debug!("Recovered truncated model JSON");
                return Ok(value);
            }
        }
    }

    Err(LlmError::MalformedResponse(strict_err.to_string()))
}
