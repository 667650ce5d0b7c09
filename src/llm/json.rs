//! Lenient JSON extraction from model output.
//!
//! Models asked for "JSON only" still wrap their answer in prose or code
//! fences often enough that every call site needs the same two-phase parse:
//! strict first, then the outermost `{…}` span reparsed.

use serde_json::Value;

/// Parse `text` as a JSON object. Returns `None` when neither the full text
/// nor its outermost brace span parses to an object.
pub fn extract_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if start >= end {
        return None;
    }

    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json_parses() {
        let value = extract_object(r#"{"filePath": "src/a.rs"}"#).unwrap();
        assert_eq!(value["filePath"], "src/a.rs");
    }

    #[test]
    fn test_json_in_code_fence() {
        let text = "Here is the fix:\n```json\n{\"summary\": \"renamed var\"}\n```\nDone.";
        let value = extract_object(text).unwrap();
        assert_eq!(value["summary"], "renamed var");
    }

    #[test]
    fn test_prose_around_object() {
        let text = "Sure! {\"newContent\": \"fn main() {}\"} hope that helps";
        let value = extract_object(text).unwrap();
        assert_eq!(value["newContent"], "fn main() {}");
    }

    #[test]
    fn test_no_object_returns_none() {
        assert!(extract_object("I cannot produce a fix for this.").is_none());
        assert!(extract_object("").is_none());
        assert!(extract_object("} backwards {").is_none());
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(extract_object(r#"["a", "b"]"#).is_none());
    }
}
