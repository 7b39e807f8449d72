//! Error types for the agent tool runtime.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each error variant renders a message the agent can act on (retry with a corrected
//! path or query, ask the user for configuration, ...). Nothing in here ever crosses
//! the dispatcher boundary as-is: the registry converts every error into a
//! failure envelope.

use crate::models::SqlEngine;
use thiserror::Error;

/// Reason a SQL statement was refused by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementRejection {
    /// More than one top-level statement.
    MultipleStatements,
    /// The single statement is not a SELECT (or WITH ... SELECT).
    NotSelect,
    /// Nothing but whitespace and comments.
    EmptyQuery,
}

impl StatementRejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MultipleStatements => "multiple_statements",
            Self::NotSelect => "not_select",
            Self::EmptyQuery => "empty_query",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::MultipleStatements => {
                "Only a single SQL statement is allowed. Remove everything after the first semicolon."
            }
            Self::NotSelect => "Only SELECT statements (optionally preceded by WITH) are allowed.",
            Self::EmptyQuery => "SQL query is empty.",
        }
    }
}

impl std::fmt::Display for StatementRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{message}")]
    InvalidArguments { message: String },

    #[error("Path must not be empty")]
    EmptyPath,

    #[error("Access to path outside workspace is not allowed: {raw_path}")]
    SandboxViolation { raw_path: String },

    #[error("{0}")]
    StatementRejected(StatementRejection),

    #[error("{message}")]
    Configuration { message: String },

    #[error("{message}")]
    Backend {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("{message}")]
    Io { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ToolError {
    /// Create an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a sandbox violation echoing the caller's original path.
    pub fn sandbox_violation(raw_path: impl Into<String>) -> Self {
        Self::SandboxViolation {
            raw_path: raw_path.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The error returned by every SQL tool when no DSN was supplied.
    pub fn sql_not_configured() -> Self {
        Self::configuration(
            "SQL environment is not configured. Pass --dsn to the CLI before invoking SQL tools.",
        )
    }

    /// Create a backend (driver) error.
    pub fn backend(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Backend {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an I/O error that names the operation and the caller's path.
    pub fn io(action: &str, raw_path: &str, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("Failed to {action} '{raw_path}': {err}"),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Convert a driver error into a backend error, composing the message the
    /// way each engine reports it best.
    pub fn from_sqlx(err: sqlx::Error, engine: SqlEngine) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let sql_state = db_err.code().map(|c| c.to_string());
                let message = match engine {
                    SqlEngine::PostgreSql => {
                        match db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                            Some(pg) => compose_postgres_message(pg.message(), pg.detail(), pg.hint()),
                            None => db_err.message().to_string(),
                        }
                    }
                    SqlEngine::MySql => {
                        match db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                            Some(my) => my.message().to_string(),
                            None => db_err.message().to_string(),
                        }
                    }
                };
                Self::backend(message, sql_state)
            }
            sqlx::Error::Configuration(msg) => {
                Self::backend(format!("Invalid connection configuration: {msg}"), None)
            }
            sqlx::Error::Io(io_err) => Self::backend(format!("I/O error: {io_err}"), None),
            sqlx::Error::Tls(tls_err) => Self::backend(format!("TLS error: {tls_err}"), None),
            sqlx::Error::Protocol(msg) => Self::backend(format!("Protocol error: {msg}"), None),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::internal(format!("Failed to decode column {index}: {source}"))
            }
            sqlx::Error::Decode(source) => Self::internal(format!("Decode error: {source}")),
            other => Self::backend(other.to_string(), None),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SandboxViolation { .. } => {
                Some("Use a path relative to the workspace root without '..' segments")
            }
            Self::StatementRejected(StatementRejection::MultipleStatements) => {
                Some("Send one statement per call")
            }
            Self::StatementRejected(StatementRejection::NotSelect) => {
                Some("Rewrite the request as a SELECT query")
            }
            Self::Backend { .. } => Some("Check the SQL syntax and referenced objects"),
            _ => None,
        }
    }

    /// The validator's rejection code, for statements it refused.
    pub fn rejection_code(&self) -> Option<&'static str> {
        match self {
            Self::StatementRejected(reason) => Some(reason.code()),
            _ => None,
        }
    }
}

fn compose_postgres_message(message: &str, detail: Option<&str>, hint: Option<&str>) -> String {
    let mut parts = vec![message.to_string()];
    if let Some(detail) = detail.filter(|d| !d.is_empty()) {
        parts.push(format!("Detail: {detail}"));
    }
    if let Some(hint) = hint.filter(|h| !h.is_empty()) {
        parts.push(format!("Hint: {hint}"));
    }
    parts.join(" ")
}

impl From<StatementRejection> for ToolError {
    fn from(reason: StatementRejection) -> Self {
        Self::StatementRejected(reason)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for tool operations.
pub type RuntimeResult<T> = Result<T, ToolError>;

/// Errors raised while assembling a registry. These are fatal at startup.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool '{name}' is registered more than once")]
    DuplicateTool { name: String },
}
