//! Tool-call data models.
//!
//! These are the only shapes that cross the boundary between the runtime and
//! its caller: a [`ToolCall`] comes in, a [`ToolResult`] goes out.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Description of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object. Advisory only; handlers validate
    /// their own input.
    pub parameters: JsonValue,
    pub strict: bool,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonValue,
        strict: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict,
        }
    }
}

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON text of the arguments object. An inline JSON object is accepted
    /// on input and re-serialized.
    #[serde(default = "empty_arguments", deserialize_with = "arguments_as_text")]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

fn empty_arguments() -> String {
    "{}".to_string()
}

fn arguments_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::String(text) => text,
        JsonValue::Null => empty_arguments(),
        other => other.to_string(),
    })
}

/// Result envelope returned for every tool call.
///
/// `success` is always present, `message` is always present on failure, and
/// tool-specific fields are flattened next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, JsonValue>,
}

impl ToolResult {
    /// A successful result with no extra fields.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            fields: serde_json::Map::new(),
        }
    }

    /// A failed result carrying a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            fields: serde_json::Map::new(),
        }
    }

    /// Build a successful result from a serializable output struct. The
    /// struct's fields become the envelope's extra fields.
    pub fn from_output<T: Serialize>(output: &T) -> Result<Self, serde_json::Error> {
        let mut result = Self::ok();
        match serde_json::to_value(output)? {
            JsonValue::Object(mut map) => {
                map.remove("success");
                if let Some(JsonValue::String(message)) = map.remove("message") {
                    result.message = Some(message);
                }
                result.fields = map;
            }
            JsonValue::Null => {}
            other => {
                result.fields.insert("value".to_string(), other);
            }
        }
        Ok(result)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let key = key.into();
        if key != "success" && key != "message" {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Look up an extra field.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Serialize to the JSON text handed back to the caller.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "message": format!("Failed to serialize tool result: {e}"),
            })
            .to_string()
        })
    }
}

/// Sink for human-readable progress lines.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-call context supplied by the caller. Never retained past the call.
#[derive(Clone)]
pub struct ExecutionContext {
    working_directory: PathBuf,
    log: ProgressSink,
}

impl ExecutionContext {
    /// Create a context rooted at `working_directory` with a silent log sink.
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        let working_directory = working_directory.into();
        let working_directory =
            std::path::absolute(&working_directory).unwrap_or(working_directory);
        Self {
            working_directory,
            log: Arc::new(|_: &str| {}),
        }
    }

    /// Replace the progress sink.
    pub fn with_log(mut self, log: ProgressSink) -> Self {
        self.log = log;
        self
    }

    /// Sandbox root for this call.
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Emit a progress line.
    pub fn log(&self, line: &str) {
        (self.log)(line);
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("working_directory", &self.working_directory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_tool_call_accepts_string_arguments() {
        let json = r#"{"name": "read_file", "arguments": "{\"path\": \"a.txt\"}"}"#;
        let call: ToolCall = serde_json::from_str(json).unwrap();
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments, r#"{"path": "a.txt"}"#);
    }

    #[test]
    fn test_tool_call_accepts_inline_object_arguments() {
        let json = r#"{"name": "read_file", "arguments": {"path": "a.txt"}}"#;
        let call: ToolCall = serde_json::from_str(json).unwrap();
        let args: JsonValue = serde_json::from_str(&call.arguments).unwrap();
        assert_eq!(args["path"], "a.txt");
    }

    #[test]
    fn test_tool_call_missing_arguments_defaults_to_empty_object() {
        let call: ToolCall = serde_json::from_str(r#"{"name": "list_directory"}"#).unwrap();
        assert_eq!(call.arguments, "{}");
    }

    #[test]
    fn test_failure_envelope_shape() {
        let json: JsonValue = serde_json::from_str(&ToolResult::failure("boom").to_json()).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "message": "boom"}));
    }

    #[test]
    fn test_success_envelope_omits_message() {
        let result = ToolResult::ok().with_field("bytes_written", 5);
        let json: JsonValue = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "bytes_written": 5}));
    }

    #[test]
    fn test_from_output_flattens_fields() {
        #[derive(Serialize)]
        struct Output {
            path: String,
            success: bool,
        }
        let result = ToolResult::from_output(&Output {
            path: "a.txt".into(),
            success: false,
        })
        .unwrap();
        assert!(result.success);
        assert_eq!(result.get("path").unwrap(), "a.txt");
        assert!(result.get("success").is_none());
    }

    #[test]
    fn test_with_field_ignores_reserved_keys() {
        let result = ToolResult::ok().with_field("success", false);
        assert!(result.success);
        assert!(result.fields.is_empty());
    }

    #[test]
    fn test_context_log_reaches_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let ctx = ExecutionContext::new("/tmp/ws").with_log(Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        }));
        ctx.log("Executing read_file");
        assert_eq!(lines.lock().unwrap().as_slice(), ["Executing read_file"]);
    }

    #[test]
    fn test_context_working_directory_is_absolute() {
        let ctx = ExecutionContext::new("relative/dir");
        assert!(ctx.working_directory().is_absolute());
    }
}
