//! Tool implementations.
//!
//! Tools are grouped by category, each category a closed enum so that adding a
//! tool forces every match to handle it:
//! - [`file::FileTool`]: `read_file`, `write_file`, `list_directory`
//! - [`diagram::DiagramTool`]: `check_diagram` (runs an external checker)
//! - [`sql::SqlTool`]: `sql_query`, `sql_dry_run`, `sql_format` and the schema tools
//!
//! The [`registry::ToolRegistry`] owns one [`ToolRegistration`] per tool and
//! dispatches calls by name.

pub mod diagram;
pub mod file;
pub mod format;
pub mod registry;
pub mod sql;
pub mod sql_validator;

pub use diagram::DiagramTool;
pub use file::FileTool;
pub use registry::ToolRegistry;
pub use sql::{SqlTool, SqlToolKind};
pub use sql_validator::{SqlValidator, StatementValidity};

use crate::error::{RuntimeResult, ToolError};
use crate::models::{ExecutionContext, ToolDefinition, ToolResult};
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A callable tool.
///
/// Handlers validate their own arguments and report failures through
/// `Err`; the registry turns those into failure envelopes.
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn call<'a>(
        &'a self,
        args: JsonValue,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, RuntimeResult<ToolResult>>;
}

/// One definition paired with its handler.
#[derive(Clone)]
pub struct ToolRegistration {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolRegistration {
    pub fn new(handler: impl ToolHandler + 'static) -> Self {
        Self {
            definition: handler.definition(),
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Deserialize a tool's arguments into its typed input.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: JsonValue) -> RuntimeResult<T> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::invalid_arguments(format!("Invalid arguments for {tool}: {e}")))
}

/// JSON Schema of a typed input, as advertised in the tool definition.
pub fn parameters_schema<T: JsonSchema>() -> JsonValue {
    schemars::schema_for!(T).to_value()
}

/// Wrap a serializable output in a success envelope.
pub fn success<T: serde::Serialize>(output: &T) -> RuntimeResult<ToolResult> {
    ToolResult::from_output(output)
        .map_err(|e| ToolError::internal(format!("Failed to serialize tool output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Input {
        /// A path
        path: String,
    }

    #[test]
    fn test_parse_args_ok() {
        let input: Input = parse_args("read_file", serde_json::json!({"path": "a"})).unwrap();
        assert_eq!(input.path, "a");
    }

    #[test]
    fn test_parse_args_missing_field() {
        let err = parse_args::<Input>("read_file", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(err.to_string().starts_with("Invalid arguments for read_file:"));
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_parameters_schema_lists_properties() {
        let schema = parameters_schema::<Input>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["path"].is_object());
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }
}
