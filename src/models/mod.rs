//! Data models for the agent tool runtime.
//!
//! This module re-exports all model types used throughout the application.

pub mod sql;
pub mod tool;

// Re-export commonly used types
pub use sql::{SqlEngine, SqlEnvironment, SqlFilterSpec, TableRef};
pub use tool::{ExecutionContext, ProgressSink, ToolCall, ToolDefinition, ToolResult};
