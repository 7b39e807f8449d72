//! Tool registry and dispatcher.
//!
//! The registry is built once from a list of [`ToolRegistration`]s and is
//! read-only afterwards. [`ToolRegistry::dispatch`] never fails: unknown
//! tools, bad argument text, handler errors and handler panics all come back
//! as failure envelopes.

use crate::error::RegistryError;
use crate::models::{ExecutionContext, SqlEnvironment, ToolCall, ToolDefinition, ToolResult};
use crate::tools::{DiagramTool, FileTool, SqlTool, ToolRegistration};
use futures_util::FutureExt;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ToolRegistry {
    /// Registration order, used for listing.
    tools: Vec<ToolRegistration>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry. Names must be unique.
    pub fn new(registrations: Vec<ToolRegistration>) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::with_capacity(registrations.len());
        for (index, registration) in registrations.iter().enumerate() {
            let name = registration.definition.name.clone();
            if by_name.insert(name.clone(), index).is_some() {
                return Err(RegistryError::DuplicateTool { name });
            }
        }
        Ok(Self {
            tools: registrations,
            by_name,
        })
    }

    /// Every built-in tool: file tools, the diagram checker and the SQL tools.
    pub fn builtin(
        sql_env: Option<SqlEnvironment>,
        diagram_checker: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let mut registrations = FileTool::registrations();
        registrations.push(ToolRegistration::new(DiagramTool::new(diagram_checker)));
        registrations.extend(SqlTool::registrations(sql_env));
        Self::new(registrations)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Run one call and always produce an envelope.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ExecutionContext) -> ToolResult {
        let name = call.name.as_str();
        info!(tool = %name, "Tool call");
        ctx.log(&format!("Executing {name}"));

        let args: JsonValue = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, error = %e, "Unparseable arguments");
                return ToolResult::failure(format!("Failed to parse arguments for {name}: {e}"));
            }
        };

        let Some(registration) = self.by_name.get(name).map(|&i| &self.tools[i]) else {
            warn!(tool = %name, "Unknown tool");
            return ToolResult::failure(format!("Unknown tool: {name}"));
        };

        let outcome = AssertUnwindSafe(registration.handler.call(args, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                if !result.success {
                    warn!(tool = %name, message = ?result.message, "Tool reported failure");
                }
                result
            }
            Ok(Err(err)) => {
                warn!(tool = %name, error = %err, "Tool failed");
                let mut result = ToolResult::failure(err.to_string());
                if let Some(suggestion) = err.suggestion() {
                    result = result.with_field("suggestion", suggestion);
                }
                if let Some(code) = err.rejection_code() {
                    result = result.with_field("reason", code);
                }
                result
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %name, panic = %message, "Tool panicked");
                ToolResult::failure(message)
            }
        }
    }

    /// [`dispatch`](Self::dispatch), serialized.
    pub async fn execute(&self, call: &ToolCall, ctx: &ExecutionContext) -> String {
        self.dispatch(call, ctx).await.to_json()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RuntimeResult, ToolError};
    use crate::tools::ToolHandler;
    use futures_util::future::BoxFuture;
    use serde_json::json;

    struct Boom;

    impl ToolHandler for Boom {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("boom", "Always fails", json!({"type": "object"}), false)
        }

        fn call<'a>(
            &'a self,
            _args: JsonValue,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
            async { Err(ToolError::internal("boom")) }.boxed()
        }
    }

    struct Panics;

    impl ToolHandler for Panics {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("panics", "Always panics", json!({"type": "object"}), false)
        }

        fn call<'a>(
            &'a self,
            _args: JsonValue,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
            async {
                if true {
                    panic!("handler exploded");
                }
                Ok(ToolResult::ok())
            }
            .boxed()
        }
    }

    struct Echo;

    impl ToolHandler for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echo arguments", json!({"type": "object"}), false)
        }

        fn call<'a>(
            &'a self,
            args: JsonValue,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
            async move { Ok(ToolResult::ok().with_field("args", args)) }.boxed()
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(std::env::temp_dir())
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let err = ToolRegistry::new(vec![ToolRegistration::new(Boom), ToolRegistration::new(Boom)])
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateTool {
                name: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new(vec![]).unwrap();
        let result = registry.dispatch(&ToolCall::new("nope", "{}"), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure() {
        let registry = ToolRegistry::new(vec![ToolRegistration::new(Boom)]).unwrap();
        let result = registry.dispatch(&ToolCall::new("boom", "{}"), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_failure() {
        let registry = ToolRegistry::new(vec![ToolRegistration::new(Panics)]).unwrap();
        let result = registry.dispatch(&ToolCall::new("panics", "{}"), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("handler exploded"));
    }

    #[tokio::test]
    async fn test_unparseable_arguments() {
        let registry = ToolRegistry::new(vec![ToolRegistration::new(Echo)]).unwrap();
        let result = registry.dispatch(&ToolCall::new("echo", "{not json"), &ctx()).await;
        assert!(!result.success);
        assert!(
            result
                .message
                .unwrap()
                .starts_with("Failed to parse arguments for echo:")
        );
    }

    #[tokio::test]
    async fn test_arguments_reach_handler() {
        let registry = ToolRegistry::new(vec![ToolRegistration::new(Echo)]).unwrap();
        let result = registry
            .dispatch(&ToolCall::new("echo", r#"{"x": 1}"#), &ctx())
            .await;
        assert!(result.success);
        assert_eq!(result.get("args").unwrap(), &json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_progress_sink_sees_execution() {
        let lines = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sink = lines.clone();
        let ctx = ctx().with_log(std::sync::Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        let registry = ToolRegistry::new(vec![ToolRegistration::new(Echo)]).unwrap();
        registry.dispatch(&ToolCall::new("echo", "{}"), &ctx).await;
        assert_eq!(lines.lock().unwrap().as_slice(), ["Executing echo"]);
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = ToolRegistry::builtin(None, "mmdc").unwrap();
        assert_eq!(registry.len(), 11);
        for name in ["read_file", "write_file", "list_directory", "check_diagram", "sql_query"] {
            assert!(registry.contains(name), "{name}");
        }
        assert_eq!(registry.definitions()[0].name, "read_file");
    }

    #[tokio::test]
    async fn test_sandbox_violation_carries_suggestion() {
        let registry = ToolRegistry::builtin(None, "mmdc").unwrap();
        let result = registry
            .dispatch(&ToolCall::new("read_file", r#"{"path": "../x"}"#), &ctx())
            .await;
        assert!(!result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("Access to path outside workspace is not allowed: ../x")
        );
        assert!(result.get("suggestion").is_some());
    }

    #[tokio::test]
    async fn test_statement_rejection_carries_reason() {
        let env = SqlEnvironment::new("postgres://u:p@127.0.0.1:1/db", None).unwrap();
        let registry = ToolRegistry::builtin(Some(env), "mmdc").unwrap();
        let result = registry
            .dispatch(
                &ToolCall::new("sql_query", r#"{"sql": "SELECT 1; DELETE FROM users"}"#),
                &ctx(),
            )
            .await;
        assert!(!result.success);
        assert_eq!(
            result.get("reason").and_then(|v| v.as_str()),
            Some("multiple_statements")
        );
        assert!(result.get("suggestion").is_some());
    }
}
