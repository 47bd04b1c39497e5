use serde_json::Value;
use thiserror::Error;

use super::types::ModelResponse;

/// Failure to read a model response as the expected JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("model returned an empty response")]
    Empty,

    #[error("no JSON object found in model response")]
    NoJson,

    #[error("invalid JSON in model response: {0}")]
    Json(String),

    #[error("model response does not match the expected schema: {0}")]
    Schema(String),
}

/// Parse a model completion into a [`ModelResponse`].
///
/// Markdown fences and surrounding prose are ignored. A bare JSON array is
/// read as the `items` list.
pub fn parse_model_response(text: &str) -> Result<ModelResponse, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let body = strip_fences(text);
    let json = extract_json(body)
        .or_else(|| extract_json(text))
        .ok_or(ParseError::NoJson)?;

    let value: Value = serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;
    let value = match value {
        Value::Array(items) => serde_json::json!({ "items": items }),
        other => other,
    };

    serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))
}

/// Content of the first fenced block, or the input when there is none.
fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the info string (`json`, `JSON`, ...).
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

/// The first balanced JSON object or array in `text`.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let response = parse_model_response(r#"{"items": [{"raw_index": 0}]}"#).unwrap();
        assert_eq!(response.items.len(), 1);
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let text = "Here is the result:\n```json\n{\"items\": [{}, {}], \"confidence\": 0.9}\n```\n\
                    Let me know if you need more.";
        let response = parse_model_response(text).unwrap();
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.confidence(), Some(0.9));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let text = r#"Sure. {"items": [{"description": "Bracket } type {A}"}]} trailing"#;
        let response = parse_model_response(text).unwrap();
        assert_eq!(response.items.len(), 1);
    }

    #[test]
    fn test_bare_array_is_items() {
        let response = parse_model_response(r#"[{"raw_index": 0}, {"raw_index": 1}]"#).unwrap();
        assert_eq!(response.items.len(), 2);
    }

    #[test]
    fn test_failures() {
        assert_eq!(parse_model_response("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_model_response("I could not find any items."),
            Err(ParseError::NoJson)
        );
        assert!(matches!(
            parse_model_response(r#"{"items": [1, 2"#),
            Err(ParseError::NoJson)
        ));
        assert!(matches!(
            parse_model_response(r#"{"confidence": 0.5}"#),
            Err(ParseError::Schema(_))
        ));
    }
}
