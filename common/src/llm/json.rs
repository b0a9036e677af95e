use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Parse JSON from free-form model output.
///
/// Extraction prompts ask for bare JSON, but models routinely wrap it in
/// prose or fenced code blocks. Tries, in order: the raw text, the body of
/// the first fenced block, and the widest bracket-delimited slice.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    let value = extract_json_value(raw)?;
    serde_json::from_value(value)
        .map_err(|e| AppError::LLMParsing(format!("model output did not match schema: {e}")))
}

pub fn extract_json_value(raw: &str) -> Result<Value, AppError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced.trim()) {
            return Ok(value);
        }
    }

    if let Some(slice) = widest_bracket_slice(trimmed) {
        if let Ok(value) = serde_json::from_str(slice) {
            return Ok(value);
        }
    }

    Err(AppError::LLMParsing(format!(
        "no JSON found in model output: {}",
        preview(trimmed)
    )))
}

/// The body of the first ``` fence, tolerating a language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Widest slice from the first opening bracket to the matching last closer.
fn widest_bracket_slice(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close_char = match text.as_bytes()[open] {
        b'[' => ']',
        _ => '}',
    };
    let close = text.rfind(close_char)?;
    if close <= open {
        return None;
    }
    Some(&text[open..=close])
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}…")
    }
}
