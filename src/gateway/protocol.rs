//! Wire types for the JSON-RPC tool-server protocol and the normalization of
//! heterogeneous tool results into a uniform JSON value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            Err(AppError::Gateway(format!(
                "JSON-RPC error {}: {}",
                err.code, err.message
            )))
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// Raw `tools/call` result before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, rename = "structuredContent")]
    pub structured_content: Option<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

fn combined_text(result: &ToolCallResult) -> String {
    result
        .content
        .iter()
        .filter(|p| p.content_type == "text")
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse a tool result into a single JSON value.
///
/// Error results become an `Err` carrying the concatenated text content.
/// Otherwise a structured payload wins; plain text is parsed as JSON when
/// possible and wrapped as `{"text": …}` when not.
pub fn normalize_result(result: ToolCallResult) -> Result<Value> {
    if result.is_error {
        let message = combined_text(&result);
        let message = if message.is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        return Err(AppError::Gateway(format!("tool call failed: {message}")));
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let combined = combined_text(&result).trim().to_string();
    if combined.is_empty() {
        return Ok(serde_json::json!({}));
    }

    Ok(serde_json::from_str(&combined)
        .unwrap_or_else(|_| serde_json::json!({ "text": combined })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_part(text: &str) -> ContentPart {
        ContentPart {
            content_type: "text".to_string(),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_normalize_error_concatenates_text() {
        let result = ToolCallResult {
            content: vec![text_part("boom"), text_part("details")],
            structured_content: None,
            is_error: true,
        };
        let err = normalize_result(result).unwrap_err();
        assert!(err.to_string().contains("boom\ndetails"));
    }

    #[test]
    fn test_normalize_error_without_text_is_unknown() {
        let result = ToolCallResult {
            is_error: true,
            ..Default::default()
        };
        let err = normalize_result(result).unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }

    #[test]
    fn test_normalize_prefers_structured_content() {
        let result = ToolCallResult {
            content: vec![text_part("ignored")],
            structured_content: Some(serde_json::json!({"issues": []})),
            is_error: false,
        };
        let value = normalize_result(result).unwrap();
        assert_eq!(value, serde_json::json!({"issues": []}));
    }

    #[test]
    fn test_normalize_parses_text_as_json() {
        let result = ToolCallResult {
            content: vec![text_part(r#"{"total": 3}"#)],
            structured_content: None,
            is_error: false,
        };
        assert_eq!(
            normalize_result(result).unwrap(),
            serde_json::json!({"total": 3})
        );
    }

    #[test]
    fn test_normalize_wraps_plain_text() {
        let result = ToolCallResult {
            content: vec![text_part("not json")],
            structured_content: None,
            is_error: false,
        };
        assert_eq!(
            normalize_result(result).unwrap(),
            serde_json::json!({"text": "not json"})
        );
    }

    #[test]
    fn test_normalize_empty_result_is_empty_object() {
        let result = ToolCallResult::default();
        assert_eq!(normalize_result(result).unwrap(), serde_json::json!({}));
    }
}
