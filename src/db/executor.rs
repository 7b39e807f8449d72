//! Statement execution against a transient connection.
//!
//! Every call opens a new connection from the [`SqlEnvironment`], runs its
//! statements and closes the connection before returning, whatever the
//! outcome. Nothing is pooled and no state survives between calls.
//!
//! # Architecture
//!
//! Text that contains the caller's statement is only ever sent as a prepared
//! statement (`sqlx::query`). The server parses it as exactly one command, so
//! a string that slipped past the validator with a second statement in it
//! fails instead of running. `raw_sql` is kept for fixed transaction control.
//!
//! Engine-specific code lives in the `mysql` and `postgres` submodules; both
//! provide the same three operations:
//! - `read_only`: run a validated SELECT inside a read-only transaction that is
//!   always rolled back, fetching at most `limit + 1` rows
//! - `introspect`: run a built metadata query with bound parameters
//! - `dry_run`: explain a validated statement without executing it

use crate::db::query_builder::{BuiltQuery, QueryParam, dry_run_script};
use crate::db::types::{ColumnInfo, RowToJson};
use crate::error::{RuntimeResult, ToolError};
use crate::models::{SqlEngine, SqlEnvironment};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of rows returned by a query.
pub const DEFAULT_ROW_LIMIT: u32 = 100;
/// Upper bound for the `limit` argument.
pub const MAX_ROW_LIMIT: u32 = 1000;

/// Rows returned by a read-only query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// More rows were available than the limit allowed.
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Clamp a requested limit to `[1, MAX_ROW_LIMIT]`.
pub fn effective_limit(requested: Option<u32>) -> u32 {
    requested
        .map(|l| l.clamp(1, MAX_ROW_LIMIT))
        .unwrap_or(DEFAULT_ROW_LIMIT)
}

/// Run a validated SELECT read-only and return at most `limit` rows.
pub async fn read_only_query(
    env: &SqlEnvironment,
    statement: &str,
    limit: u32,
) -> RuntimeResult<QueryRows> {
    let start = Instant::now();
    debug!(engine = %env.engine(), limit, "Executing read-only query");

    let (columns, mut rows) = match env.engine() {
        SqlEngine::PostgreSql => postgres::read_only(env.dsn(), statement, limit).await,
        SqlEngine::MySql => mysql::read_only(env.dsn(), statement, limit).await,
    }
    .map_err(|e| ToolError::from_sqlx(e, env.engine()))?;

    let truncated = rows.len() > limit as usize;
    if truncated {
        rows.truncate(limit as usize);
        warn!(limit, "Query result truncated");
    }

    Ok(QueryRows {
        columns,
        rows,
        truncated,
        execution_time_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run a built introspection query.
pub async fn introspect(
    env: &SqlEnvironment,
    query: &BuiltQuery,
) -> RuntimeResult<Vec<serde_json::Map<String, JsonValue>>> {
    debug!(
        engine = %env.engine(),
        params = query.params.len(),
        "Executing introspection query"
    );
    match env.engine() {
        SqlEngine::PostgreSql => postgres::introspect(env.dsn(), query).await,
        SqlEngine::MySql => mysql::introspect(env.dsn(), query).await,
    }
    .map_err(|e| ToolError::from_sqlx(e, env.engine()))
}

/// Explain a validated statement without executing it. Returns the JSON plan.
pub async fn dry_run(env: &SqlEnvironment, statement: &str) -> RuntimeResult<JsonValue> {
    debug!(engine = %env.engine(), "Dry-running statement");
    match env.engine() {
        SqlEngine::PostgreSql => postgres::dry_run(env.dsn(), statement).await,
        SqlEngine::MySql => mysql::dry_run(env.dsn(), statement).await,
    }
    .map_err(|e| ToolError::from_sqlx(e, env.engine()))
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Parse the text of an EXPLAIN result, keeping it as a string when it is not
/// JSON.
fn plan_from_text(text: String) -> JsonValue {
    serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
}

fn split_rows<R: RowToJson>(rows: Vec<R>) -> (Vec<ColumnInfo>, Vec<serde_json::Map<String, JsonValue>>) {
    let columns = rows.first().map(RowToJson::column_info).unwrap_or_default();
    let rows = rows.iter().map(RowToJson::to_json_map).collect();
    (columns, rows)
}

/// `sql` as a single prepared statement that is not cached on the connection.
fn prepared<DB: sqlx::Database + sqlx::database::HasStatementCache>(sql: &str) -> sqlx::query::Query<'_, DB, DB::Arguments<'_>> {
    sqlx::query(sql).persistent(false)
}

async fn close<C: sqlx::Connection>(conn: C) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Error while closing connection");
    }
}

// =============================================================================
// Engine-Specific Implementations
// =============================================================================
//
// The two modules below are intentionally parallel to make differences obvious.

mod postgres {
    use super::*;
    use sqlx::postgres::{PgArguments, PgConnection, PgRow};
    use sqlx::{Connection, Row};

    type Rows = (Vec<ColumnInfo>, Vec<serde_json::Map<String, JsonValue>>);

    pub async fn read_only(dsn: &str, statement: &str, limit: u32) -> Result<Rows, sqlx::Error> {
        let mut conn = PgConnection::connect(dsn).await?;

        let result = async {
            sqlx::Executor::execute(&mut conn, sqlx::raw_sql("BEGIN READ ONLY")).await?;
            let rows: Vec<PgRow> = prepared::<sqlx::Postgres>(statement)
                .fetch(&mut conn)
                .take(limit as usize + 1)
                .try_collect()
                .await?;
            Ok::<_, sqlx::Error>(rows)
        }
        .await;

        let rollback = sqlx::Executor::execute(&mut conn, sqlx::raw_sql("ROLLBACK")).await;
        close(conn).await;

        let rows = result?;
        rollback?;
        Ok(split_rows(rows))
    }

    pub async fn introspect(
        dsn: &str,
        query: &BuiltQuery,
    ) -> Result<Vec<serde_json::Map<String, JsonValue>>, sqlx::Error> {
        let mut conn = PgConnection::connect(dsn).await?;

        let mut q = sqlx::query(&query.text);
        for param in &query.params {
            q = bind_param(q, param);
        }
        let result = q.fetch_all(&mut conn).await;
        close(conn).await;

        Ok(split_rows(result?).1)
    }

    pub async fn dry_run(dsn: &str, statement: &str) -> Result<JsonValue, sqlx::Error> {
        let script = dry_run_script(SqlEngine::PostgreSql, statement);
        let mut conn = PgConnection::connect(dsn).await?;

        let result = async {
            for step in &script.setup {
                prepared::<sqlx::Postgres>(step).execute(&mut conn).await?;
            }
            prepared::<sqlx::Postgres>(&script.explain)
                .fetch_one(&mut conn)
                .await
        }
        .await;

        let mut teardown_result = Ok(());
        if let Some(teardown) = &script.teardown {
            teardown_result = sqlx::Executor::execute(&mut conn, sqlx::raw_sql(teardown)).await.map(|_| ());
        }
        close(conn).await;

        let row = result?;
        teardown_result?;

        if let Ok(plan) = row.try_get::<JsonValue, _>(0) {
            return Ok(plan);
        }
        Ok(plan_from_text(row.try_get_unchecked::<String, _>(0)?))
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match param {
            QueryParam::Text(v) => query.bind(v.as_str()),
            QueryParam::TextArray(v) => query.bind(v.as_slice()),
        }
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
    use sqlx::{Connection, Row};

    type Rows = (Vec<ColumnInfo>, Vec<serde_json::Map<String, JsonValue>>);

    pub async fn read_only(dsn: &str, statement: &str, limit: u32) -> Result<Rows, sqlx::Error> {
        let mut conn = MySqlConnection::connect(dsn).await?;

        let result = async {
            sqlx::Executor::execute(&mut conn, sqlx::raw_sql("START TRANSACTION READ ONLY"))
                .await?;
            let rows: Vec<MySqlRow> = prepared::<sqlx::MySql>(statement)
                .fetch(&mut conn)
                .take(limit as usize + 1)
                .try_collect()
                .await?;
            Ok::<_, sqlx::Error>(rows)
        }
        .await;

        let rollback = sqlx::Executor::execute(&mut conn, sqlx::raw_sql("ROLLBACK")).await;
        close(conn).await;

        let rows = result?;
        rollback?;
        Ok(split_rows(rows))
    }

    pub async fn introspect(
        dsn: &str,
        query: &BuiltQuery,
    ) -> Result<Vec<serde_json::Map<String, JsonValue>>, sqlx::Error> {
        let mut conn = MySqlConnection::connect(dsn).await?;

        let mut q = sqlx::query(&query.text);
        for param in &query.params {
            q = bind_param(q, param);
        }
        let result = q.fetch_all(&mut conn).await;
        close(conn).await;

        Ok(split_rows(result?).1)
    }

    pub async fn dry_run(dsn: &str, statement: &str) -> Result<JsonValue, sqlx::Error> {
        let script = dry_run_script(SqlEngine::MySql, statement);
        let mut conn = MySqlConnection::connect(dsn).await?;
        let result = prepared::<sqlx::MySql>(&script.explain)
            .fetch_one(&mut conn)
            .await;
        close(conn).await;

        let row = result?;
        let text = match row.try_get::<String, _>(0) {
            Ok(text) => text,
            Err(_) => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(0)?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        Ok(plan_from_text(text))
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::MySql, MySqlArguments> {
        match param {
            QueryParam::Text(v) => query.bind(v.as_str()),
            // MySQL has no array binding; one placeholder per value.
            QueryParam::TextArray(values) => values
                .iter()
                .fold(query, |q, v| q.bind(v.as_str())),
        }
    }
}
