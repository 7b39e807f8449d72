//! Parameterized introspection query builder.
//!
//! Builds the metadata queries behind the schema tools for PostgreSQL and
//! MySQL. User-supplied names only ever travel as bound parameters:
//!
//! - PostgreSQL: `<column> = ANY($n::text[])`, one text-array parameter per filter
//! - MySQL: `<column> IN (?, ?, ...)`, one text parameter per value
//!
//! Filters are joined with `AND`. Schema/table pairs expand to an `OR` of
//! `AND`s, one parameter pair per identifier pair. When no schema filter is
//! given, the engine's system schemas are excluded.

use crate::error::{RuntimeResult, ToolError};
use crate::models::{SqlEngine, SqlFilterSpec, TableRef};
use std::collections::HashSet;
use tracing::debug;

/// Name used for the prepared statement during a PostgreSQL dry run.
pub const DRY_RUN_STATEMENT_NAME: &str = "agent_dry_run";

const POSTGRES_SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];
const MYSQL_SYSTEM_SCHEMAS: &[&str] = &["mysql", "information_schema", "performance_schema", "sys"];

/// A parameter value bound to a built query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Text(String),
    TextArray(Vec<String>),
}

/// Query text plus its positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub text: String,
    pub params: Vec<QueryParam>,
}

/// The metadata a schema tool asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectionTarget {
    Tables,
    Columns,
    Enums,
    Indexes,
}

/// Statements run for a dry run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunScript {
    /// Run before the explain; their results are discarded.
    pub setup: Vec<String>,
    pub explain: String,
    /// Always run last, even when an earlier step failed.
    pub teardown: Option<String>,
}

/// Trim, drop blank entries and de-duplicate, keeping first occurrences.
///
/// `None` stays `None`; a present list that ends up empty is rejected.
pub fn normalize_names(field: &str, values: Option<&[String]>) -> RuntimeResult<Option<Vec<String>>> {
    let Some(values) = values else {
        return Ok(None);
    };

    let mut seen = HashSet::new();
    let normalized: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_string()))
        .map(str::to_string)
        .collect();

    if normalized.is_empty() {
        return Err(ToolError::invalid_arguments(format!(
            "{field} must contain at least one non-empty value"
        )));
    }
    Ok(Some(normalized))
}

/// Same rules as [`normalize_names`] for schema/table pairs. A pair with a
/// blank half is rejected.
pub fn normalize_tables(values: Option<&[TableRef]>) -> RuntimeResult<Option<Vec<TableRef>>> {
    let Some(values) = values else {
        return Ok(None);
    };

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(values.len());
    for table in values {
        let pair = TableRef {
            schema_name: table.schema_name.trim().to_string(),
            table_name: table.table_name.trim().to_string(),
        };
        if pair.schema_name.is_empty() || pair.table_name.is_empty() {
            return Err(ToolError::invalid_arguments(
                "tables entries need both schema_name and table_name",
            ));
        }
        if seen.insert(pair.clone()) {
            normalized.push(pair);
        }
    }

    if normalized.is_empty() {
        return Err(ToolError::invalid_arguments(
            "tables must contain at least one entry",
        ));
    }
    Ok(Some(normalized))
}

/// Filter set after normalization. Building from it cannot fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedFilters {
    pub schema_names: Option<Vec<String>>,
    pub table_names: Option<Vec<String>>,
    pub column_names: Option<Vec<String>>,
    pub table_types: Option<Vec<String>>,
    pub enum_names: Option<Vec<String>>,
    pub index_names: Option<Vec<String>>,
    pub tables: Option<Vec<TableRef>>,
}

impl NormalizedFilters {
    pub fn from_spec(spec: &SqlFilterSpec) -> RuntimeResult<Self> {
        Ok(Self {
            schema_names: normalize_names("schema_names", spec.schema_names.as_deref())?,
            table_names: normalize_names("table_names", spec.table_names.as_deref())?,
            column_names: normalize_names("column_names", spec.column_names.as_deref())?,
            table_types: normalize_names("table_types", spec.table_types.as_deref())?,
            enum_names: normalize_names("enum_names", spec.enum_names.as_deref())?,
            index_names: normalize_names("index_names", spec.index_names.as_deref())?,
            tables: normalize_tables(spec.tables.as_deref())?,
        })
    }
}

/// Accumulates `WHERE` conditions and their parameters.
struct WhereBuilder {
    engine: SqlEngine,
    conditions: Vec<String>,
    params: Vec<QueryParam>,
}

impl WhereBuilder {
    fn new(engine: SqlEngine) -> Self {
        Self {
            engine,
            conditions: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Push a text parameter and return its placeholder.
    fn bind_text(&mut self, value: String) -> String {
        self.params.push(QueryParam::Text(value));
        match self.engine {
            SqlEngine::PostgreSql => format!("${}", self.params.len()),
            SqlEngine::MySql => "?".to_string(),
        }
    }

    /// Fixed SQL written by this module, never user input.
    fn condition(&mut self, sql: impl Into<String>) {
        self.conditions.push(sql.into());
    }

    fn any_of(&mut self, column: &str, values: Option<&Vec<String>>) {
        let Some(values) = values else {
            return;
        };
        match self.engine {
            SqlEngine::PostgreSql => {
                self.params.push(QueryParam::TextArray(values.clone()));
                let n = self.params.len();
                self.conditions.push(format!("{column} = ANY(${n}::text[])"));
            }
            SqlEngine::MySql => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind_text(v.clone())).collect();
                self.conditions
                    .push(format!("{column} IN ({})", placeholders.join(", ")));
            }
        }
    }

    fn table_pairs(&mut self, schema_column: &str, table_column: &str, pairs: Option<&Vec<TableRef>>) {
        let Some(pairs) = pairs else {
            return;
        };
        let alternatives: Vec<String> = pairs
            .iter()
            .map(|pair| {
                let schema = self.bind_text(pair.schema_name.clone());
                let table = self.bind_text(pair.table_name.clone());
                format!("({schema_column} = {schema} AND {table_column} = {table})")
            })
            .collect();
        self.conditions.push(format!("({})", alternatives.join(" OR ")));
    }

    fn schema_filter(&mut self, column: &str, schema_names: Option<&Vec<String>>) {
        if schema_names.is_some() {
            self.any_of(column, schema_names);
            return;
        }
        let system = match self.engine {
            SqlEngine::PostgreSql => POSTGRES_SYSTEM_SCHEMAS,
            SqlEngine::MySql => MYSQL_SYSTEM_SCHEMAS,
        };
        let quoted: Vec<String> = system.iter().map(|s| format!("'{s}'")).collect();
        self.condition(format!("{column} NOT IN ({})", quoted.join(", ")));
    }

    fn finish(self, select: &str, suffix: &str) -> BuiltQuery {
        let mut text = select.trim_end().to_string();
        if !self.conditions.is_empty() {
            text.push_str("\nWHERE ");
            text.push_str(&self.conditions.join("\n  AND "));
        }
        if !suffix.is_empty() {
            text.push('\n');
            text.push_str(suffix);
        }
        BuiltQuery {
            text,
            params: self.params,
        }
    }
}

/// Build the introspection query for `target` from a raw filter spec.
pub fn build_introspection_query(
    engine: SqlEngine,
    target: IntrospectionTarget,
    spec: &SqlFilterSpec,
) -> RuntimeResult<BuiltQuery> {
    let filters = NormalizedFilters::from_spec(spec)?;
    let query = build_from_filters(engine, target, &filters);
    debug!(
        engine = %engine,
        target = ?target,
        params = query.params.len(),
        "Built introspection query"
    );
    Ok(query)
}

/// Build the introspection query for `target` from already normalized filters.
/// Filters that do not apply to `target` are ignored.
pub fn build_from_filters(
    engine: SqlEngine,
    target: IntrospectionTarget,
    filters: &NormalizedFilters,
) -> BuiltQuery {
    let mut w = WhereBuilder::new(engine);
    match (engine, target) {
        (SqlEngine::PostgreSql, IntrospectionTarget::Tables) => {
            w.schema_filter("table_schema::text", filters.schema_names.as_ref());
            w.any_of("table_name::text", filters.table_names.as_ref());
            w.any_of("table_type::text", filters.table_types.as_ref());
            w.finish(
                "SELECT table_schema::text AS schema_name,\n       table_name::text AS table_name,\n       table_type::text AS table_type\nFROM information_schema.tables",
                "ORDER BY table_schema, table_name",
            )
        }
        (SqlEngine::PostgreSql, IntrospectionTarget::Columns) => {
            w.schema_filter("table_schema::text", filters.schema_names.as_ref());
            w.any_of("table_name::text", filters.table_names.as_ref());
            w.any_of("column_name::text", filters.column_names.as_ref());
            w.table_pairs(
                "table_schema::text",
                "table_name::text",
                filters.tables.as_ref(),
            );
            w.finish(
                "SELECT table_schema::text AS schema_name,\n       table_name::text AS table_name,\n       column_name::text AS column_name,\n       ordinal_position::int4 AS ordinal_position,\n       data_type::text AS data_type,\n       udt_name::text AS udt_name,\n       (is_nullable::text = 'YES') AS is_nullable,\n       column_default::text AS column_default,\n       character_maximum_length::int4 AS character_maximum_length\nFROM information_schema.columns",
                "ORDER BY table_schema, table_name, ordinal_position",
            )
        }
        (SqlEngine::PostgreSql, IntrospectionTarget::Enums) => {
            w.schema_filter("n.nspname::text", filters.schema_names.as_ref());
            w.any_of("t.typname::text", filters.enum_names.as_ref());
            w.finish(
                "SELECT n.nspname::text AS schema_name,\n       t.typname::text AS enum_name,\n       array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS enum_values\nFROM pg_type t\nJOIN pg_enum e ON e.enumtypid = t.oid\nJOIN pg_namespace n ON n.oid = t.typnamespace",
                "GROUP BY n.nspname, t.typname\nORDER BY n.nspname, t.typname",
            )
        }
        (SqlEngine::PostgreSql, IntrospectionTarget::Indexes) => {
            w.schema_filter("schemaname::text", filters.schema_names.as_ref());
            w.any_of("tablename::text", filters.table_names.as_ref());
            w.any_of("indexname::text", filters.index_names.as_ref());
            w.finish(
                "SELECT schemaname::text AS schema_name,\n       tablename::text AS table_name,\n       indexname::text AS index_name,\n       indexdef::text AS index_definition\nFROM pg_indexes",
                "ORDER BY schemaname, tablename, indexname",
            )
        }
        (SqlEngine::MySql, IntrospectionTarget::Tables) => {
            w.schema_filter("TABLE_SCHEMA", filters.schema_names.as_ref());
            w.any_of("TABLE_NAME", filters.table_names.as_ref());
            w.any_of("TABLE_TYPE", filters.table_types.as_ref());
            w.finish(
                "SELECT TABLE_SCHEMA AS schema_name,\n       TABLE_NAME AS table_name,\n       TABLE_TYPE AS table_type\nFROM information_schema.TABLES",
                "ORDER BY TABLE_SCHEMA, TABLE_NAME",
            )
        }
        (SqlEngine::MySql, IntrospectionTarget::Columns) => {
            w.schema_filter("TABLE_SCHEMA", filters.schema_names.as_ref());
            w.any_of("TABLE_NAME", filters.table_names.as_ref());
            w.any_of("COLUMN_NAME", filters.column_names.as_ref());
            w.table_pairs("TABLE_SCHEMA", "TABLE_NAME", filters.tables.as_ref());
            w.finish(
                "SELECT TABLE_SCHEMA AS schema_name,\n       TABLE_NAME AS table_name,\n       COLUMN_NAME AS column_name,\n       ORDINAL_POSITION AS ordinal_position,\n       DATA_TYPE AS data_type,\n       COLUMN_TYPE AS column_type,\n       (IS_NULLABLE = 'YES') AS is_nullable,\n       COLUMN_DEFAULT AS column_default,\n       CHARACTER_MAXIMUM_LENGTH AS character_maximum_length\nFROM information_schema.COLUMNS",
                "ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION",
            )
        }
        (SqlEngine::MySql, IntrospectionTarget::Enums) => {
            // MySQL has no named enum types; every ENUM column is reported.
            w.condition("DATA_TYPE = 'enum'");
            w.schema_filter("TABLE_SCHEMA", filters.schema_names.as_ref());
            w.any_of("COLUMN_NAME", filters.enum_names.as_ref());
            w.finish(
                "SELECT TABLE_SCHEMA AS schema_name,\n       TABLE_NAME AS table_name,\n       COLUMN_NAME AS enum_name,\n       COLUMN_TYPE AS enum_definition\nFROM information_schema.COLUMNS",
                "ORDER BY TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME",
            )
        }
        (SqlEngine::MySql, IntrospectionTarget::Indexes) => {
            w.schema_filter("TABLE_SCHEMA", filters.schema_names.as_ref());
            w.any_of("TABLE_NAME", filters.table_names.as_ref());
            w.any_of("INDEX_NAME", filters.index_names.as_ref());
            w.finish(
                "SELECT TABLE_SCHEMA AS schema_name,\n       TABLE_NAME AS table_name,\n       INDEX_NAME AS index_name,\n       (NON_UNIQUE = 0) AS is_unique,\n       INDEX_TYPE AS index_type,\n       GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR ', ') AS column_names\nFROM information_schema.STATISTICS",
                "GROUP BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, NON_UNIQUE, INDEX_TYPE\nORDER BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME",
            )
        }
    }
}

/// Statements for a dry run of an already validated `statement`.
///
/// PostgreSQL prepares the statement inside a transaction (catching errors
/// a plain EXPLAIN would also catch, plus parameter typing), explains it and
/// rolls back. MySQL has no comparable PREPARE check, so it only explains.
pub fn dry_run_script(engine: SqlEngine, statement: &str) -> DryRunScript {
    match engine {
        SqlEngine::PostgreSql => DryRunScript {
            setup: vec![
                "BEGIN".to_string(),
                format!("PREPARE {DRY_RUN_STATEMENT_NAME} AS {statement}\n"),
                format!("DEALLOCATE {DRY_RUN_STATEMENT_NAME}"),
            ],
            explain: format!("EXPLAIN (FORMAT JSON) {statement}\n"),
            teardown: Some("ROLLBACK".to_string()),
        },
        SqlEngine::MySql => DryRunScript {
            setup: Vec::new(),
            explain: format!("EXPLAIN FORMAT=JSON {statement}\n"),
            teardown: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_normalize_names_trims_and_dedupes_in_order() {
        let input = vec![" b ".to_string(), "a".into(), "b".into(), "  ".into()];
        assert_eq!(
            normalize_names("schema_names", Some(input.as_slice())).unwrap(),
            names(&["b", "a"])
        );
    }

    #[test]
    fn test_normalize_names_absent_is_none() {
        assert_eq!(normalize_names("schema_names", None).unwrap(), None);
    }

    #[test]
    fn test_normalize_names_rejects_empty_list() {
        let err = normalize_names("table_names", Some(&[] as &[String])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "table_names must contain at least one non-empty value"
        );
        let blanks = vec!["  ".to_string(), String::new()];
        assert!(normalize_names("table_names", Some(blanks.as_slice())).is_err());
    }

    #[test]
    fn test_normalize_tables() {
        let input = vec![
            TableRef {
                schema_name: " public ".into(),
                table_name: "users".into(),
            },
            TableRef {
                schema_name: "public".into(),
                table_name: "users ".into(),
            },
        ];
        let normalized = normalize_tables(Some(input.as_slice())).unwrap().unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].schema_name, "public");

        let blank = vec![TableRef {
            schema_name: "public".into(),
            table_name: " ".into(),
        }];
        assert!(normalize_tables(Some(blank.as_slice())).is_err());
        assert!(normalize_tables(Some(&[] as &[TableRef])).is_err());
    }

    #[test]
    fn test_postgres_tables_schema_scenario() {
        let spec = SqlFilterSpec {
            schema_names: Some(vec!["public".into(), " sales ".into()]),
            ..Default::default()
        };
        let query =
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Tables, &spec)
                .unwrap();

        assert!(query.text.contains("= ANY($1::text[])"));
        assert!(!query.text.contains("$2"));
        assert_eq!(
            query.params,
            vec![QueryParam::TextArray(vec!["public".into(), "sales".into()])]
        );
        assert!(!query.text.contains("sales"));
    }

    #[test]
    fn test_postgres_excludes_system_schemas_without_filter() {
        let query = build_introspection_query(
            SqlEngine::PostgreSql,
            IntrospectionTarget::Tables,
            &SqlFilterSpec::default(),
        )
        .unwrap();
        assert!(query.text.contains("NOT IN ('pg_catalog', 'information_schema', 'pg_toast')"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_postgres_filters_are_numbered_in_order() {
        let spec = SqlFilterSpec {
            schema_names: names(&["public"]),
            table_names: names(&["users", "orders"]),
            table_types: names(&["BASE TABLE"]),
            ..Default::default()
        };
        let query =
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Tables, &spec)
                .unwrap();
        assert!(query.text.contains("table_schema::text = ANY($1::text[])"));
        assert!(query.text.contains("table_name::text = ANY($2::text[])"));
        assert!(query.text.contains("table_type::text = ANY($3::text[])"));
        assert!(query.text.contains("\n  AND "));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn test_postgres_table_pairs() {
        let spec = SqlFilterSpec {
            tables: Some(vec![
                TableRef {
                    schema_name: "public".into(),
                    table_name: "users".into(),
                },
                TableRef {
                    schema_name: "sales".into(),
                    table_name: "orders".into(),
                },
            ]),
            ..Default::default()
        };
        let query =
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Columns, &spec)
                .unwrap();
        assert!(query.text.contains(
            "((table_schema::text = $1 AND table_name::text = $2) OR (table_schema::text = $3 AND table_name::text = $4))"
        ));
        assert_eq!(
            query.params,
            vec![
                QueryParam::Text("public".into()),
                QueryParam::Text("users".into()),
                QueryParam::Text("sales".into()),
                QueryParam::Text("orders".into()),
            ]
        );
    }

    #[test]
    fn test_mysql_in_list_per_value() {
        let spec = SqlFilterSpec {
            schema_names: names(&["shop"]),
            table_names: names(&["users", "orders"]),
            ..Default::default()
        };
        let query =
            build_introspection_query(SqlEngine::MySql, IntrospectionTarget::Tables, &spec).unwrap();
        assert!(query.text.contains("TABLE_SCHEMA IN (?)"));
        assert!(query.text.contains("TABLE_NAME IN (?, ?)"));
        assert!(!query.text.contains('$'));
        assert_eq!(
            query.params,
            vec![
                QueryParam::Text("shop".into()),
                QueryParam::Text("users".into()),
                QueryParam::Text("orders".into()),
            ]
        );
    }

    #[test]
    fn test_mysql_enums_restrict_to_enum_columns() {
        let spec = SqlFilterSpec {
            enum_names: names(&["status"]),
            ..Default::default()
        };
        let query =
            build_introspection_query(SqlEngine::MySql, IntrospectionTarget::Enums, &spec).unwrap();
        assert!(query.text.contains("DATA_TYPE = 'enum'"));
        assert!(query.text.contains("COLUMN_NAME IN (?)"));
        assert!(query.text.contains("TABLE_SCHEMA NOT IN ('mysql'"));
    }

    #[test]
    fn test_postgres_enums_and_indexes() {
        let spec = SqlFilterSpec {
            schema_names: names(&["public"]),
            enum_names: names(&["mood"]),
            index_names: names(&["users_pkey"]),
            ..Default::default()
        };
        let enums =
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Enums, &spec)
                .unwrap();
        assert!(enums.text.contains("t.typname::text = ANY($2::text[])"));
        assert!(enums.text.contains("GROUP BY"));

        let indexes =
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Indexes, &spec)
                .unwrap();
        assert!(indexes.text.contains("indexname::text = ANY($2::text[])"));
        assert!(!indexes.text.contains("typname"));
    }

    #[test]
    fn test_invalid_filter_rejected_before_building() {
        let spec = SqlFilterSpec {
            column_names: Some(vec!["   ".into()]),
            ..Default::default()
        };
        assert!(matches!(
            build_introspection_query(SqlEngine::PostgreSql, IntrospectionTarget::Columns, &spec),
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_user_values_never_in_text() {
        let hostile = "x'); DROP TABLE users; --";
        let spec = SqlFilterSpec {
            schema_names: names(&[hostile]),
            table_names: names(&[hostile]),
            ..Default::default()
        };
        for engine in [SqlEngine::PostgreSql, SqlEngine::MySql] {
            let query =
                build_introspection_query(engine, IntrospectionTarget::Tables, &spec).unwrap();
            assert!(!query.text.contains("DROP"));
        }
    }

    #[test]
    fn test_dry_run_script_postgres() {
        let script = dry_run_script(SqlEngine::PostgreSql, "SELECT 1");
        assert_eq!(script.setup[0], "BEGIN");
        assert!(script.setup[1].starts_with("PREPARE agent_dry_run AS SELECT 1"));
        assert_eq!(script.setup[2], "DEALLOCATE agent_dry_run");
        assert!(script.explain.starts_with("EXPLAIN (FORMAT JSON) SELECT 1"));
        assert_eq!(script.teardown.as_deref(), Some("ROLLBACK"));
    }

    #[test]
    fn test_dry_run_script_mysql() {
        let script = dry_run_script(SqlEngine::MySql, "SELECT 1 -- note");
        assert!(script.setup.is_empty());
        // Trailing newline keeps a line comment from swallowing anything appended later.
        assert_eq!(script.explain, "EXPLAIN FORMAT=JSON SELECT 1 -- note\n");
        assert!(script.teardown.is_none());
    }
}
