//! Database layer.
//!
//! This module provides:
//! - Parameterized introspection query building
//! - Transient-connection execution (read-only query, introspection, dry run)
//! - Row decoding to JSON

pub mod executor;
pub mod query_builder;
pub mod types;

pub use executor::{DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryRows, effective_limit};
pub use query_builder::{
    BuiltQuery, DryRunScript, IntrospectionTarget, QueryParam, build_introspection_query,
    dry_run_script,
};
pub use types::{ColumnInfo, RowToJson, TypeCategory};
