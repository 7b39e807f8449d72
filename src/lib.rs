//! Agent Tool Runtime Library
//!
//! Tools an AI agent can call against a local workspace: file access confined
//! to a sandbox root, an external diagram checker, and read-only SQL tools for
//! PostgreSQL and MySQL guarded by a single-SELECT validator.

pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sandbox;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{RegistryError, RuntimeResult, ToolError};
pub use models::{ExecutionContext, ToolCall, ToolDefinition, ToolResult};
pub use tools::ToolRegistry;
