//! Best-effort recovery of a JSON array from model output.
//!
//! Repair steps, applied in order until one parses:
//! 1. strip markdown code fences and surrounding prose
//! 2. cut out the outermost `[...]`
//! 3. drop trailing commas, convert single-quoted strings, insert missing
//!    commas between adjacent objects
//! 4. salvage every balanced `{...}` object that parses on its own

use pulse_common::{Error, Result};
use serde_json::Value;

/// Parse model output into a list of JSON objects.
pub fn parse_items(content: &str) -> Result<Vec<Value>> {
    let body = strip_fences(content);

    if let Some(items) = as_items(body) {
        return Ok(items);
    }

    let array = extract_array(body).unwrap_or(body);
    if let Some(items) = as_items(array) {
        return Ok(items);
    }

    let fixed = insert_missing_commas(&remove_trailing_commas(&fix_single_quotes(array)));
    if let Some(items) = as_items(&fixed) {
        return Ok(items);
    }

    let salvaged = salvage_objects(array);
    if salvaged.is_empty() {
        Err(Error::MalformedResponse(format!(
            "no analyzable objects in response: {}",
            pulse_common::util::truncate_with_ellipsis(content.trim(), 120)
        )))
    } else {
        Ok(salvaged)
    }
}

/// Interpret a JSON document as a list of objects.
///
/// Accepts a bare array, an object wrapping an array under a common key, or
/// a single object.
fn as_items(s: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(s.trim()).ok()?;
    match value {
        Value::Array(items) => Some(items.into_iter().filter(Value::is_object).collect()),
        Value::Object(_) => {
            let wrapped = ["results", "items", "analyses", "data"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_array));
            match wrapped {
                Some(items) => Some(items.iter().filter(|v| v.is_object()).cloned().collect()),
                None => Some(vec![value]),
            }
        }
        _ => None,
    }
}

/// Contents of the first markdown code fence, or the input when unfenced.
pub fn strip_fences(content: &str) -> &str {
    let Some(open) = content.find("```") else {
        return content.trim();
    };
    let after = &content[open + 3..];
    // Skip the language tag on the fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Slice from the first `[` to the last `]`, or to the end when unterminated.
pub fn extract_array(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    match s.rfind(']') {
        Some(end) if end > start => Some(&s[start..=end]),
        _ => Some(&s[start..]),
    }
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars.get(from..)?.iter().copied().find(|c| !c.is_whitespace())
}

/// Remove commas directly before a closing `]` or `}`.
pub fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if matches!(next_significant(&chars, i + 1), Some(']') | Some('}')) => {}
            _ => out.push(c),
        }
    }
    out
}

/// Insert a comma between `}` and a following `{`.
pub fn insert_missing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        out.push(c);
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '}' if next_significant(&chars, i + 1) == Some('{') => out.push(','),
            _ => {}
        }
    }
    out
}

/// Rewrite single-quoted strings as double-quoted ones.
pub fn fix_single_quotes(s: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Outside,
        Double,
        Single,
    }

    let mut out = String::with_capacity(s.len());
    let mut state = State::Outside;
    let mut escaped = false;

    for c in s.chars() {
        match state {
            State::Outside => match c {
                '"' => {
                    state = State::Double;
                    out.push(c);
                }
                '\'' => {
                    state = State::Single;
                    out.push('"');
                }
                _ => out.push(c),
            },
            State::Double => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    state = State::Outside;
                }
            }
            State::Single => {
                if escaped {
                    escaped = false;
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else if c == '\'' {
                    state = State::Outside;
                    out.push('"');
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Every top-level balanced `{...}` span in `s`.
fn object_spans(s: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start.take() {
                        spans.push(&s[begin..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// Parse each balanced object on its own, keeping the ones that succeed.
pub fn salvage_objects(s: &str) -> Vec<Value> {
    object_spans(s)
        .into_iter()
        .filter_map(|span| {
            serde_json::from_str::<Value>(span).ok().or_else(|| {
                let fixed = remove_trailing_commas(&fix_single_quotes(span));
                serde_json::from_str(&fixed).ok()
            })
        })
        .filter(Value::is_object)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_array() {
        let items = parse_items(r#"[{"index":0},{"index":1}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_fenced_with_prose() {
        let content = "Here are the results:\n```json\n[{\"index\": 0, \"polarity\": \"positive\"}]\n```\nLet me know!";
        let items = parse_items(content).unwrap();
        assert_eq!(items[0]["polarity"], "positive");
    }

    #[test]
    fn test_prose_around_bare_array() {
        let items = parse_items("Sure! [{\"index\": 0}] Hope this helps.").unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_wrapped_object() {
        let items = parse_items(r#"{"results": [{"index": 0}, {"index": 1}, 3]}"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_trailing_commas_and_missing_commas() {
        let content = r#"[{"index": 0, "nodeId": "A",} {"index": 1, "nodeId": "B"},]"#;
        let items = parse_items(content).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["nodeId"], "B");
    }

    #[test]
    fn test_single_quotes() {
        let items = parse_items("[{'index': 0, 'polarity': 'negative'}]").unwrap();
        assert_eq!(items[0]["polarity"], "negative");
    }

    #[test]
    fn test_salvage_from_truncated_output() {
        let content = r#"[{"index": 0, "kpiScores": {"trust": 0.4}}, {"index": 1, "kpiSc"#;
        let items = parse_items(content).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["kpiScores"]["trust"], 0.4);
    }

    #[test]
    fn test_commas_inside_strings_untouched() {
        assert_eq!(remove_trailing_commas(r#"{"a": "x,}"}"#), r#"{"a": "x,}"}"#);
        assert_eq!(insert_missing_commas(r#"["} {"]"#), r#"["} {"]"#);
    }

    #[test]
    fn test_unrecoverable() {
        let err = parse_items("I cannot help with that.").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
