//! Diagram checker tool.
//!
//! Runs an external renderer (Mermaid's `mmdc` by default) on a workspace file
//! and reports its exit code and output. The rendered artifact goes to a unique
//! file in the OS temp directory and is removed afterwards.

use crate::command;
use crate::error::RuntimeResult;
use crate::models::{ExecutionContext, ToolDefinition, ToolResult};
use crate::sandbox;
use crate::tools::{ToolHandler, parameters_schema, parse_args, success};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Default checker binary.
pub const DEFAULT_DIAGRAM_CHECKER: &str = "mmdc";

/// Input for the check_diagram tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CheckDiagramInput {
    /// Path of the diagram source file, relative to the workspace root
    pub path: String,
}

/// Output from the check_diagram tool. Carried by both success and failure envelopes.
#[derive(Debug, Clone, Serialize)]
pub struct CheckDiagramOutput {
    /// `null` when the checker was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// `check_diagram`: validate a diagram file with an external checker.
#[derive(Debug, Clone)]
pub struct DiagramTool {
    checker: String,
}

impl DiagramTool {
    pub const NAME: &'static str = "check_diagram";

    pub fn new(checker: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
        }
    }

    async fn check(&self, input: CheckDiagramInput, ctx: &ExecutionContext) -> RuntimeResult<ToolResult> {
        let source = sandbox::resolve(&input.path, ctx.working_directory())?;
        ctx.log(&format!("Checking diagram {}", input.path));

        let rendered = render_target();
        let args: [&OsStr; 4] = [
            "-i".as_ref(),
            source.as_os_str(),
            "-o".as_ref(),
            rendered.as_os_str(),
        ];
        let output = command::run(&self.checker, &args, ctx.working_directory()).await;

        if let Err(e) = tokio::fs::remove_file(&rendered).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!(path = %rendered.display(), error = %e, "Failed to remove rendered diagram");
        }

        let fields = CheckDiagramOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        let mut result = success(&fields)?;
        if !output.success {
            warn!(checker = %self.checker, exit_code = ?fields.exit_code, "Diagram check failed");
            result.success = false;
            result.message = Some(failure_message(&self.checker, &fields));
        }
        Ok(result)
    }
}

impl Default for DiagramTool {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGRAM_CHECKER)
    }
}

impl ToolHandler for DiagramTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "Check a diagram source file in the workspace by rendering it with the configured checker. Reports the exit code and the checker's output.",
            parameters_schema::<CheckDiagramInput>(),
            true,
        )
    }

    fn call<'a>(
        &'a self,
        args: JsonValue,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
        async move { self.check(parse_args(Self::NAME, args)?, ctx).await }.boxed()
    }
}

/// A fresh output path in the OS temp directory.
fn render_target() -> PathBuf {
    std::env::temp_dir().join(format!("diagram-check-{}.svg", uuid::Uuid::new_v4()))
}

fn failure_message(checker: &str, output: &CheckDiagramOutput) -> String {
    let detail = output.stderr.trim();
    let status = match output.exit_code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    };
    if detail.is_empty() {
        format!("Diagram checker '{checker}' {status}")
    } else {
        format!("Diagram checker '{checker}' {status}: {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;

    #[test]
    fn test_render_targets_are_unique() {
        let a = render_target();
        let b = render_target();
        assert_ne!(a, b);
        assert!(a.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_failure_message() {
        let output = CheckDiagramOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "Parse error on line 2\n".into(),
        };
        assert_eq!(
            failure_message("mmdc", &output),
            "Diagram checker 'mmdc' exited with code 1: Parse error on line 2"
        );

        let killed = CheckDiagramOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(
            failure_message("mmdc", &killed),
            "Diagram checker 'mmdc' was terminated by a signal"
        );
    }

    #[tokio::test]
    async fn test_path_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(dir.path());
        let err = DiagramTool::default()
            .call(serde_json::json!({"path": "../flow.mmd"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn test_missing_checker_is_failure_envelope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flow.mmd"), "graph TD; A-->B").unwrap();
        let ctx = ExecutionContext::new(dir.path());

        let result = DiagramTool::new("definitely-not-a-real-checker-binary")
            .call(serde_json::json!({"path": "flow.mmd"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.get("exit_code").unwrap(),
            command::SPAWN_FAILURE_EXIT_CODE
        );
        assert!(result.get("stderr").unwrap().as_str().unwrap().contains("Failed to start"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_checker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flow.mmd"), "graph TD; A-->B").unwrap();
        let ctx = ExecutionContext::new(dir.path());

        // `true` ignores its arguments and exits 0.
        let result = DiagramTool::new("true")
            .call(serde_json::json!({"path": "flow.mmd"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.get("exit_code").unwrap(), 0);
    }
}
