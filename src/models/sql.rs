//! SQL-related data models.
//!
//! This module defines the engine selector, the per-invocation SQL environment
//! and the filter set accepted by the schema introspection tools.

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RuntimeResult, ToolError};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SqlEngine {
    #[value(name = "postgresql", alias = "postgres")]
    #[serde(rename = "postgresql")]
    PostgreSql,
    /// Includes MariaDB
    #[value(name = "mysql", alias = "mariadb")]
    MySql,
}

impl SqlEngine {
    /// Parse the engine from a DSN scheme.
    pub fn from_dsn(dsn: &str) -> Option<Self> {
        let lower = dsn.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSql)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else {
            None
        }
    }

    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSql => "PostgreSQL",
            Self::MySql => "MySQL",
        }
    }
}

impl std::fmt::Display for SqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection target for the SQL tools. Set once per invocation and read-only
/// afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SqlEnvironment {
    /// Contains credentials - never log, use [`SqlEnvironment::masked_dsn`].
    dsn: String,
    engine: SqlEngine,
}

impl SqlEnvironment {
    /// Build an environment from a DSN. The engine is taken from `engine` when
    /// given, otherwise inferred from the DSN scheme.
    pub fn new(dsn: impl Into<String>, engine: Option<SqlEngine>) -> RuntimeResult<Self> {
        let dsn = dsn.into().trim().to_string();
        if dsn.is_empty() {
            return Err(ToolError::configuration("DSN must not be empty"));
        }
        Url::parse(&dsn).map_err(|e| ToolError::configuration(format!("Invalid DSN: {e}")))?;

        let engine = engine.or_else(|| SqlEngine::from_dsn(&dsn)).ok_or_else(|| {
            ToolError::configuration(
                "Cannot infer the SQL engine from the DSN scheme. Use postgres:// or mysql://, or pass --engine.",
            )
        })?;

        Ok(Self { dsn, engine })
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn engine(&self) -> SqlEngine {
        self.engine
    }

    /// Display-safe version of the DSN (password masked).
    pub fn masked_dsn(&self) -> String {
        match Url::parse(&self.dsn) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => "<invalid dsn>".to_string(),
        }
    }
}

impl std::fmt::Debug for SqlEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEnvironment")
            .field("dsn", &self.masked_dsn())
            .field("engine", &self.engine)
            .finish()
    }
}

/// A fully qualified table reference used by the column schema filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TableRef {
    pub schema_name: String,
    pub table_name: String,
}

/// Optional name filters for the schema introspection tools.
///
/// Each present list must contain at least one non-blank value; values are
/// trimmed and de-duplicated before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SqlFilterSpec {
    /// Restrict to these schemas (PostgreSQL schemas, MySQL databases)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_names: Option<Vec<String>>,
    /// Restrict to these table names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_names: Option<Vec<String>>,
    /// Restrict to these column names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_names: Option<Vec<String>>,
    /// Restrict to these table types, e.g. "BASE TABLE" or "VIEW"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_types: Option<Vec<String>>,
    /// Restrict to these enum type names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_names: Option<Vec<String>>,
    /// Restrict to these index names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_names: Option<Vec<String>>,
    /// Restrict to these exact schema/table pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableRef>>,
}
