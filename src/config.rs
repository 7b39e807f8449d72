//! Configuration handling for the agent tool runtime.
//!
//! All settings come from CLI arguments with environment variable fallbacks.

use crate::error::RuntimeResult;
use crate::models::{SqlEngine, SqlEnvironment};
use crate::tools::diagram::DEFAULT_DIAGRAM_CHECKER;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration for the agent tool runtime.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "agent-tool-runtime",
    about = "Sandboxed tool runtime for AI agents - workspace file tools and read-only SQL tools",
    version
)]
pub struct Config {
    /// Workspace root. Every file path is resolved against it and must stay inside it.
    /// Default: the current directory
    #[arg(short, long, value_name = "DIR", env = "AGENT_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Database connection string for the SQL tools (postgres://... or mysql://...).
    /// Without it, SQL tools report that they are not configured.
    #[arg(long, value_name = "URL", env = "AGENT_DSN", hide_env_values = true)]
    pub dsn: Option<String>,

    /// SQL engine. Default: inferred from the DSN scheme
    #[arg(long, value_enum, env = "AGENT_SQL_ENGINE")]
    pub engine: Option<SqlEngine>,

    /// Command used by check_diagram
    #[arg(
        long,
        value_name = "COMMAND",
        env = "AGENT_DIAGRAM_CHECKER",
        default_value = DEFAULT_DIAGRAM_CHECKER
    )]
    pub diagram_checker: String,

    /// Run a single tool call, print the result JSON and exit
    #[arg(long, value_name = "TOOL")]
    pub call: Option<String>,

    /// JSON arguments for --call
    #[arg(long, value_name = "JSON", default_value = "{}", requires = "call")]
    pub arguments: String,

    /// Print all tool definitions as JSON and exit
    #[arg(long, conflicts_with = "call")]
    pub list_tools: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "AGENT_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "AGENT_JSON_LOGS")]
    pub json_logs: bool,

    /// Write logs to stderr. Off by default to keep the stdio stream clean
    #[arg(long, env = "AGENT_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// The workspace root, defaulting to the current directory.
    pub fn workspace(&self) -> RuntimeResult<PathBuf> {
        match &self.workspace {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// The SQL environment, if a DSN was given.
    ///
    /// A DSN whose engine can be neither inferred nor was given is an error.
    pub fn sql_environment(&self) -> RuntimeResult<Option<SqlEnvironment>> {
        self.dsn
            .as_deref()
            .map(|dsn| SqlEnvironment::new(dsn, self.engine))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("agent-tool-runtime").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = parse(&[]);
        assert_eq!(config.diagram_checker, "mmdc");
        assert_eq!(config.arguments, "{}");
        assert_eq!(config.log_level, "info");
        assert!(!config.enable_logs);
        assert!(!config.list_tools);
        assert!(config.sql_environment().unwrap().is_none());
    }

    #[test]
    fn test_workspace_defaults_to_current_dir() {
        let config = parse(&[]);
        assert_eq!(config.workspace().unwrap(), std::env::current_dir().unwrap());

        let config = parse(&["-w", "/srv/project"]);
        assert_eq!(config.workspace().unwrap(), PathBuf::from("/srv/project"));
    }

    #[test]
    fn test_engine_inferred_from_dsn() {
        let config = parse(&["--dsn", "mysql://root:pw@localhost/shop"]);
        let env = config.sql_environment().unwrap().unwrap();
        assert_eq!(env.engine(), SqlEngine::MySql);
    }

    #[test]
    fn test_explicit_engine_overrides_scheme() {
        let config = parse(&["--dsn", "tcp://db.internal:5432/app", "--engine", "postgres"]);
        let env = config.sql_environment().unwrap().unwrap();
        assert_eq!(env.engine(), SqlEngine::PostgreSql);
    }

    #[test]
    fn test_unknown_scheme_without_engine_is_error() {
        let config = parse(&["--dsn", "tcp://db.internal:5432/app"]);
        let err = config.sql_environment().unwrap_err();
        assert!(matches!(err, ToolError::Configuration { .. }));
    }

    #[test]
    fn test_arguments_require_call() {
        let result = Config::try_parse_from(["agent-tool-runtime", "--arguments", "{}"]);
        assert!(result.is_err());

        let config = parse(&["--call", "read_file", "--arguments", r#"{"path":"a"}"#]);
        assert_eq!(config.call.as_deref(), Some("read_file"));
    }

    #[test]
    fn test_list_tools_conflicts_with_call() {
        let result =
            Config::try_parse_from(["agent-tool-runtime", "--list-tools", "--call", "read_file"]);
        assert!(result.is_err());
    }
}
