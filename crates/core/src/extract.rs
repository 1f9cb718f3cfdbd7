//! Resilient JSON extraction from raw model output.
//!
//! Model output is often wrapped in Markdown fences, surrounded by
//! commentary, wrapped in a one-element array, or cut off mid-object by a
//! token limit. [`extract`] recovers a single JSON value from all of these
//! and returns `None` for anything it cannot make sense of. It never panics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Markdown code-fence markers, optionally labelled `json` in any case.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("valid regex"));

const FENCE: &str = "```";

// ---------------------------------------------------------------------------
// Single-object extraction
// ---------------------------------------------------------------------------

/// Extract a single JSON value from arbitrary text.
///
/// Returns `None` for empty input, for plain prose (text that does not open
/// with `{`, `[` or a code fence) and for JSON that cannot be repaired.
/// A non-empty top-level array yields its first element.
pub fn extract(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !looks_like_json(trimmed) {
        return None;
    }

    let cleaned = strip_fences(trimmed);
    let cleaned = cleaned.trim();

    let parsed = parse_candidate(cleaned).or_else(|| recover_truncated(cleaned))?;
    Some(unwrap_array(parsed))
}

/// Remove every Markdown fence marker from `text`.
pub fn strip_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").into_owned()
}

/// Whether trimmed text is a JSON candidate rather than prose.
fn looks_like_json(trimmed: &str) -> bool {
    trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with(FENCE)
}

/// Strict parse of the candidate text.
///
/// An array-shaped candidate is tried whole first; otherwise the span from
/// the first `{` to the last `}` is parsed, which drops commentary the
/// model emitted around the object.
fn parse_candidate(cleaned: &str) -> Option<Value> {
    if cleaned.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
            return Some(value);
        }
    }

    let span = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };
    serde_json::from_str(span).ok()
}

/// Brace-balancing recovery for output truncated mid-object.
///
/// Cuts the text after its last `}` (or keeps it whole when there is none),
/// drops a trailing comma, appends one `}` per unclosed `{` and retries the
/// parse once. Braces inside string literals are counted too; this is a
/// heuristic and truncated arrays are not repaired.
fn recover_truncated(cleaned: &str) -> Option<Value> {
    let start = cleaned.find('{')?;
    let body = &cleaned[start..];
    let body = match body.rfind('}') {
        Some(end) => &body[..=end],
        None => body,
    };
    let body = body.trim_end().trim_end_matches(',').trim_end();

    let opens = body.matches('{').count();
    let closes = body.matches('}').count();

    let mut repaired = body.to_string();
    if opens > closes {
        repaired.push_str(&"}".repeat(opens - closes));
    }
    serde_json::from_str(&repaired).ok()
}

fn unwrap_array(value: Value) -> Value {
    match value {
        Value::Array(items) if !items.is_empty() => {
            items.into_iter().next().unwrap_or(Value::Null)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Batch splitting
// ---------------------------------------------------------------------------

/// Split the output of one batch call into per-item raw texts.
///
/// Accepts a top-level JSON array (possibly fenced or preceded by
/// commentary), a single-key wrapper object such as `{"prompts": [...]}`,
/// or a single object. String elements are taken verbatim; other elements
/// are re-serialised. Unusable output yields no items.
pub fn split_items(text: &str) -> Vec<String> {
    let cleaned = strip_fences(text);
    let cleaned = cleaned.trim();

    let array_start = cleaned.find('[');
    let object_start = cleaned.find('{');

    let array_first = match (array_start, object_start) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };

    if array_first {
        if let Some(items) = array_start.and_then(|start| parse_array_from(cleaned, start)) {
            return items.into_iter().filter_map(item_text).collect();
        }
    }

    let Some(start) = object_start else {
        return Vec::new();
    };
    match extract(&cleaned[start..]) {
        Some(Value::Object(map)) => match wrapped_items(&map) {
            Some(items) => items.iter().cloned().filter_map(item_text).collect(),
            None => vec![Value::Object(map).to_string()],
        },
        _ => Vec::new(),
    }
}

fn parse_array_from(cleaned: &str, start: usize) -> Option<Vec<Value>> {
    let end = cleaned.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// A one-key object whose only value is an array of objects.
fn wrapped_items(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    if map.len() != 1 {
        return None;
    }
    match map.values().next() {
        Some(Value::Array(items)) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Some(items)
        }
        _ => None,
    }
}

fn item_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // -- extract --

    #[test]
    fn empty_and_blank_input_is_none() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("   \n\t"), None);
    }

    #[test]
    fn prose_is_none() {
        assert_eq!(extract("A photo of a sunset."), None);
    }

    #[test]
    fn prose_prefix_is_never_parsed() {
        let samples = [
            "Sure! {\"a\":1}",
            "json {\"a\":1}",
            "null",
            "42",
            "\"{}\"",
            "}{",
            "Here you go:\n```json\n{\"a\":1}\n```",
        ];
        for s in samples {
            assert_eq!(extract(s), None, "{s:?}");
        }
    }

    #[test]
    fn plain_object_parses() {
        assert_eq!(extract(r#"{"a":1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn fenced_object_parses() {
        let text = "```json\n{\"subject_core\":{\"identity\":\"a woman\"}}\n```";
        assert_eq!(
            extract(text),
            Some(json!({"subject_core": {"identity": "a woman"}}))
        );
    }

    #[test]
    fn fence_label_is_case_insensitive() {
        assert_eq!(extract("```JSON\n{\"a\":2}\n```"), Some(json!({"a": 2})));
    }

    #[test]
    fn trailing_commentary_is_dropped() {
        assert_eq!(
            extract("{\"a\":1}\n\nLet me know if you need more."),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn truncated_object_is_recovered() {
        assert_eq!(extract(r#"{"a":1,"#), Some(json!({"a": 1})));
    }

    #[test]
    fn truncated_after_nested_object_is_recovered() {
        assert_eq!(
            extract(r#"{"a":{"b":1},"c":"trunc"#),
            Some(json!({"a": {"b": 1}}))
        );
    }

    #[test]
    fn unrecoverable_garbage_is_none() {
        assert_eq!(extract("{not json"), None);
        assert_eq!(extract(r#"{"a":"unterminated"#), None);
    }

    #[test]
    fn array_wrapped_object_is_unwrapped() {
        assert_eq!(extract(r#"[{"a":1}]"#), Some(json!({"a": 1})));
        assert_eq!(extract(r#"[{"a":1},{"b":2}]"#), Some(json!({"a": 1})));
    }

    #[test]
    fn scalar_arrays_yield_first_element() {
        assert_eq!(extract("[1,2,3]"), Some(json!(1)));
    }

    #[test]
    fn empty_array_is_returned_as_is() {
        assert_eq!(extract("[]"), Some(json!([])));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        assert_eq!(extract("{\"a\":\"café ☕\"}"), Some(json!({"a": "café ☕"})));
        assert_eq!(extract("{\"ключ\": \"значение\", "), Some(json!({"ключ": "значение"})));
        let _ = extract("[\u{1F600}");
        let _ = extract("{\u{1F600}}");
    }

    // -- split_items --

    #[test]
    fn split_top_level_array() {
        let items = split_items("```json\n[{\"a\":1},{\"b\":2}]\n```");
        assert_eq!(items, vec![r#"{"a":1}"#.to_string(), r#"{"b":2}"#.to_string()]);
    }

    #[test]
    fn split_array_after_commentary() {
        let items = split_items("Here are 2 prompts:\n[\"first\", \"second\"]");
        assert_eq!(items, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn split_wrapper_object() {
        let items = split_items(r#"{"prompts":[{"a":1},{"a":2}]}"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn split_single_object_with_inner_arrays_is_one_item() {
        let text = r#"{"subject":{"description":"x"},"background":{"elements":["a","b"]}}"#;
        let items = split_items(text);
        assert_eq!(items.len(), 1);
        assert!(items[0].contains("background"));
    }

    #[test]
    fn split_skips_null_and_blank_entries() {
        let items = split_items(r#"[{"a":1}, null, "  ", "kept"]"#);
        assert_eq!(items, vec![r#"{"a":1}"#.to_string(), "kept".to_string()]);
    }

    #[test]
    fn split_prose_yields_nothing() {
        assert!(split_items("I cannot help with that.").is_empty());
    }
}
