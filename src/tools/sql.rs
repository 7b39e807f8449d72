//! SQL tools.
//!
//! All of them need a configured [`SqlEnvironment`]; without one every call
//! fails with the configuration error before anything else is looked at.
//!
//! - `sql_query` / `sql_dry_run`: validated single SELECT, run read-only or explained
//! - `sql_format`: pretty-print with the engine's dialect, executes nothing
//! - `sql_table_schema`, `sql_column_schema`, `sql_enum_definitions`,
//!   `sql_index_definitions`: parameterized metadata queries

use crate::db::{self, IntrospectionTarget, build_introspection_query, effective_limit};
use crate::error::{RuntimeResult, StatementRejection, ToolError};
use crate::models::{
    ExecutionContext, SqlEngine, SqlEnvironment, SqlFilterSpec, TableRef, ToolDefinition,
    ToolResult,
};
use crate::tools::format::{OutputFormat, ResultSet};
use crate::tools::sql_validator::SqlValidator;
use crate::tools::{ToolHandler, ToolRegistration, parameters_schema, parse_args, success};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use tracing::{debug, info};

// =============================================================================
// Inputs and outputs
// =============================================================================

/// Input for the sql_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SqlQueryInput {
    /// A single SELECT statement (optionally starting with WITH). Anything else is rejected.
    pub sql: String,
    /// Maximum rows to return. Default: 100, max: 1000
    #[serde(default)]
    pub limit: Option<u32>,
    /// "json" returns rows only; "table" or "markdown" also adds a rendered `formatted` field
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlQueryOutput {
    pub columns: Vec<db::ColumnInfo>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// More rows matched than `limit` allowed
    pub truncated: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Input for sql_dry_run and sql_format.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SqlStatementInput {
    /// SQL text
    pub sql: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlDryRunOutput {
    /// The validated statement that was explained
    pub statement: String,
    /// The engine's JSON plan
    pub plan: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlFormatOutput {
    pub formatted_sql: String,
}

/// Input for sql_table_schema.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableSchemaInput {
    /// Restrict to these schemas (PostgreSQL schemas, MySQL databases). Default: all non-system schemas
    #[serde(default)]
    pub schema_names: Option<Vec<String>>,
    /// Restrict to these table names
    #[serde(default)]
    pub table_names: Option<Vec<String>>,
    /// Restrict to these table types, e.g. "BASE TABLE" or "VIEW"
    #[serde(default)]
    pub table_types: Option<Vec<String>>,
}

/// Input for sql_column_schema.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ColumnSchemaInput {
    /// Restrict to these schemas. Default: all non-system schemas
    #[serde(default)]
    pub schema_names: Option<Vec<String>>,
    /// Restrict to these table names
    #[serde(default)]
    pub table_names: Option<Vec<String>>,
    /// Restrict to these column names
    #[serde(default)]
    pub column_names: Option<Vec<String>>,
    /// Restrict to these exact schema/table pairs
    #[serde(default)]
    pub tables: Option<Vec<TableRef>>,
}

/// Input for sql_enum_definitions.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnumDefinitionsInput {
    /// Restrict to these schemas. Default: all non-system schemas
    #[serde(default)]
    pub schema_names: Option<Vec<String>>,
    /// Restrict to these enum names (MySQL: ENUM column names)
    #[serde(default)]
    pub enum_names: Option<Vec<String>>,
}

/// Input for sql_index_definitions.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IndexDefinitionsInput {
    /// Restrict to these schemas. Default: all non-system schemas
    #[serde(default)]
    pub schema_names: Option<Vec<String>>,
    /// Restrict to these table names
    #[serde(default)]
    pub table_names: Option<Vec<String>>,
    /// Restrict to these index names
    #[serde(default)]
    pub index_names: Option<Vec<String>>,
}

impl From<TableSchemaInput> for SqlFilterSpec {
    fn from(input: TableSchemaInput) -> Self {
        Self {
            schema_names: input.schema_names,
            table_names: input.table_names,
            table_types: input.table_types,
            ..Default::default()
        }
    }
}

impl From<ColumnSchemaInput> for SqlFilterSpec {
    fn from(input: ColumnSchemaInput) -> Self {
        Self {
            schema_names: input.schema_names,
            table_names: input.table_names,
            column_names: input.column_names,
            tables: input.tables,
            ..Default::default()
        }
    }
}

impl From<EnumDefinitionsInput> for SqlFilterSpec {
    fn from(input: EnumDefinitionsInput) -> Self {
        Self {
            schema_names: input.schema_names,
            enum_names: input.enum_names,
            ..Default::default()
        }
    }
}

impl From<IndexDefinitionsInput> for SqlFilterSpec {
    fn from(input: IndexDefinitionsInput) -> Self {
        Self {
            schema_names: input.schema_names,
            table_names: input.table_names,
            index_names: input.index_names,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaRowsOutput {
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
}

// =============================================================================
// Tool
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlToolKind {
    Query,
    DryRun,
    Format,
    TableSchema,
    ColumnSchema,
    EnumDefinitions,
    IndexDefinitions,
}

impl SqlToolKind {
    pub const ALL: [SqlToolKind; 7] = [
        SqlToolKind::Query,
        SqlToolKind::DryRun,
        SqlToolKind::Format,
        SqlToolKind::TableSchema,
        SqlToolKind::ColumnSchema,
        SqlToolKind::EnumDefinitions,
        SqlToolKind::IndexDefinitions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "sql_query",
            Self::DryRun => "sql_dry_run",
            Self::Format => "sql_format",
            Self::TableSchema => "sql_table_schema",
            Self::ColumnSchema => "sql_column_schema",
            Self::EnumDefinitions => "sql_enum_definitions",
            Self::IndexDefinitions => "sql_index_definitions",
        }
    }

    fn introspection_target(&self) -> Option<IntrospectionTarget> {
        match self {
            Self::TableSchema => Some(IntrospectionTarget::Tables),
            Self::ColumnSchema => Some(IntrospectionTarget::Columns),
            Self::EnumDefinitions => Some(IntrospectionTarget::Enums),
            Self::IndexDefinitions => Some(IntrospectionTarget::Indexes),
            Self::Query | Self::DryRun | Self::Format => None,
        }
    }
}

/// One SQL tool bound to the (optional) environment it runs against.
#[derive(Debug, Clone)]
pub struct SqlTool {
    kind: SqlToolKind,
    env: Option<SqlEnvironment>,
}

impl SqlTool {
    pub fn new(kind: SqlToolKind, env: Option<SqlEnvironment>) -> Self {
        Self { kind, env }
    }

    /// One registration per SQL tool, all sharing `env`.
    pub fn registrations(env: Option<SqlEnvironment>) -> Vec<ToolRegistration> {
        SqlToolKind::ALL
            .into_iter()
            .map(|kind| ToolRegistration::new(Self::new(kind, env.clone())))
            .collect()
    }

    fn env(&self) -> RuntimeResult<&SqlEnvironment> {
        self.env.as_ref().ok_or_else(ToolError::sql_not_configured)
    }

    async fn run(&self, args: JsonValue, ctx: &ExecutionContext) -> RuntimeResult<ToolResult> {
        let env = self.env()?;
        let name = self.kind.name();

        match self.kind {
            SqlToolKind::Query => success(&sql_query(env, parse_args(name, args)?, ctx).await?),
            SqlToolKind::DryRun => success(&sql_dry_run(env, parse_args(name, args)?, ctx).await?),
            SqlToolKind::Format => success(&sql_format(env.engine(), parse_args(name, args)?)?),
            SqlToolKind::TableSchema => {
                let spec = parse_args::<TableSchemaInput>(name, args)?.into();
                success(&self.introspect(env, &spec, ctx).await?)
            }
            SqlToolKind::ColumnSchema => {
                let spec = parse_args::<ColumnSchemaInput>(name, args)?.into();
                success(&self.introspect(env, &spec, ctx).await?)
            }
            SqlToolKind::EnumDefinitions => {
                let spec = parse_args::<EnumDefinitionsInput>(name, args)?.into();
                success(&self.introspect(env, &spec, ctx).await?)
            }
            SqlToolKind::IndexDefinitions => {
                let spec = parse_args::<IndexDefinitionsInput>(name, args)?.into();
                success(&self.introspect(env, &spec, ctx).await?)
            }
        }
    }

    async fn introspect(
        &self,
        env: &SqlEnvironment,
        spec: &SqlFilterSpec,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<SchemaRowsOutput> {
        let Some(target) = self.kind.introspection_target() else {
            return Err(ToolError::internal(format!(
                "{} is not an introspection tool",
                self.kind.name()
            )));
        };
        // Filters are checked here, before any connection is opened.
        let query = build_introspection_query(env.engine(), target, spec)?;

        ctx.log(&format!("Reading {} metadata", env.engine().display_name()));
        let mut rows = db::executor::introspect(env, &query).await?;

        if env.engine() == SqlEngine::MySql && target == IntrospectionTarget::Enums {
            for row in &mut rows {
                let values = row
                    .get("enum_definition")
                    .and_then(JsonValue::as_str)
                    .map(parse_mysql_enum_values)
                    .unwrap_or_default();
                row.insert("enum_values".to_string(), JsonValue::from(values));
            }
        }

        Ok(SchemaRowsOutput {
            row_count: rows.len(),
            rows,
        })
    }
}

impl ToolHandler for SqlTool {
    fn definition(&self) -> ToolDefinition {
        let name = self.kind.name();
        match self.kind {
            SqlToolKind::Query => ToolDefinition::new(
                name,
                "Run one read-only SELECT query (optionally starting with WITH) and return the rows. Multiple statements and any non-SELECT statement are rejected before reaching the database.",
                parameters_schema::<SqlQueryInput>(),
                false,
            ),
            SqlToolKind::DryRun => ToolDefinition::new(
                name,
                "Check a SELECT query without running it and return the engine's JSON execution plan.",
                parameters_schema::<SqlStatementInput>(),
                true,
            ),
            SqlToolKind::Format => ToolDefinition::new(
                name,
                "Pretty-print SQL using the configured engine's dialect. Nothing is executed.",
                parameters_schema::<SqlStatementInput>(),
                true,
            ),
            SqlToolKind::TableSchema => ToolDefinition::new(
                name,
                "List tables and views with their schema and type.",
                parameters_schema::<TableSchemaInput>(),
                false,
            ),
            SqlToolKind::ColumnSchema => ToolDefinition::new(
                name,
                "List columns with their type, nullability and default value.",
                parameters_schema::<ColumnSchemaInput>(),
                false,
            ),
            SqlToolKind::EnumDefinitions => ToolDefinition::new(
                name,
                "List enum types and their values (MySQL: ENUM columns).",
                parameters_schema::<EnumDefinitionsInput>(),
                false,
            ),
            SqlToolKind::IndexDefinitions => ToolDefinition::new(
                name,
                "List indexes with their definitions.",
                parameters_schema::<IndexDefinitionsInput>(),
                false,
            ),
        }
    }

    fn call<'a>(
        &'a self,
        args: JsonValue,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
        self.run(args, ctx).boxed()
    }
}

// =============================================================================
// Operations
// =============================================================================

pub async fn sql_query(
    env: &SqlEnvironment,
    input: SqlQueryInput,
    ctx: &ExecutionContext,
) -> RuntimeResult<SqlQueryOutput> {
    let statement = SqlValidator::for_engine(env.engine())
        .validate(&input.sql)
        .into_result()?;
    let limit = effective_limit(input.limit);

    info!(engine = %env.engine(), limit, "Running read-only query");
    ctx.log(&format!("Querying {}", env.engine().display_name()));
    let result = db::executor::read_only_query(env, &statement, limit).await?;

    let formatted = input.format.render(&ResultSet {
        columns: &result.columns,
        rows: &result.rows,
        truncated: result.truncated,
        execution_time_ms: result.execution_time_ms,
    });

    Ok(SqlQueryOutput {
        row_count: result.rows.len(),
        columns: result.columns,
        rows: result.rows,
        truncated: result.truncated,
        execution_time_ms: result.execution_time_ms,
        formatted,
    })
}

pub async fn sql_dry_run(
    env: &SqlEnvironment,
    input: SqlStatementInput,
    ctx: &ExecutionContext,
) -> RuntimeResult<SqlDryRunOutput> {
    let statement = SqlValidator::for_engine(env.engine())
        .validate(&input.sql)
        .into_result()?;

    ctx.log(&format!("Explaining on {}", env.engine().display_name()));
    let plan = db::executor::dry_run(env, &statement).await?;
    Ok(SqlDryRunOutput { statement, plan })
}

/// Pretty-print every statement in `input.sql`, separated by `;` lines.
pub fn sql_format(engine: SqlEngine, input: SqlStatementInput) -> RuntimeResult<SqlFormatOutput> {
    let dialect: &dyn Dialect = match engine {
        SqlEngine::PostgreSql => &PostgreSqlDialect {},
        SqlEngine::MySql => &MySqlDialect {},
    };

    let statements = Parser::parse_sql(dialect, &input.sql)
        .map_err(|e| ToolError::invalid_arguments(format!("Failed to parse SQL: {e}")))?;
    if statements.is_empty() {
        return Err(StatementRejection::EmptyQuery.into());
    }
    debug!(statements = statements.len(), "Formatting SQL");

    let formatted_sql = statements
        .iter()
        .map(|s| format!("{s:#};"))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(SqlFormatOutput { formatted_sql })
}

/// Values of a MySQL `enum('a','b''c')` column type, unescaped.
pub fn parse_mysql_enum_values(column_type: &str) -> Vec<String> {
    let trimmed = column_type.trim();
    let Some(body) = trimmed
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("enum("))
        .and_then(|_| trimmed[5..].strip_suffix(')'))
    else {
        return Vec::new();
    };

    let mut values = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut value = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    value.push('\'');
                }
                '\'' => break,
                other => value.push(other),
            }
        }
        values.push(value);
    }
    values
}
