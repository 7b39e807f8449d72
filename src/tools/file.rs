//! Workspace file tools.
//!
//! `read_file`, `write_file` and `list_directory`. Every path goes through the
//! sandbox first; paths in results echo the caller's argument.

use crate::error::{RuntimeResult, ToolError};
use crate::models::{ExecutionContext, ToolDefinition, ToolResult};
use crate::sandbox;
use crate::tools::{ToolHandler, ToolRegistration, parameters_schema, parse_args, success};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Format a byte count for humans (1024-based units).
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Input for the read_file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileInput {
    /// Path of the file to read, relative to the workspace root
    pub path: String,
}

/// Output from the read_file tool.
#[derive(Debug, Clone, Serialize)]
pub struct ReadFileOutput {
    pub path: String,
    /// UTF-8 file content
    pub content: String,
    pub bytes_read: usize,
}

/// Input for the write_file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WriteFileInput {
    /// Path of the file to write, relative to the workspace root. Missing parent directories are created.
    pub path: String,
    /// Full UTF-8 content. Replaces any existing content.
    pub content: String,
}

/// Output from the write_file tool.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFileOutput {
    pub path: String,
    pub bytes_written: usize,
}

fn default_list_path() -> String {
    ".".to_string()
}

/// Input for the list_directory tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryInput {
    /// Directory to list, relative to the workspace root. Default: the root itself
    #[serde(default = "default_list_path")]
    pub path: String,
}

/// Kind of a directory entry. Symlinks are reported, not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_formatted: Option<String>,
}

/// Output from the list_directory tool.
#[derive(Debug, Clone, Serialize)]
pub struct ListDirectoryOutput {
    pub path: String,
    /// Entries sorted by name
    pub entries: Vec<DirectoryEntry>,
    pub count: usize,
}

/// The workspace file tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTool {
    Read,
    Write,
    List,
}

impl FileTool {
    pub const ALL: [FileTool; 3] = [FileTool::Read, FileTool::Write, FileTool::List];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Read => "read_file",
            Self::Write => "write_file",
            Self::List => "list_directory",
        }
    }

    pub fn registrations() -> Vec<ToolRegistration> {
        Self::ALL.into_iter().map(ToolRegistration::new).collect()
    }
}

impl ToolHandler for FileTool {
    fn definition(&self) -> ToolDefinition {
        match self {
            Self::Read => ToolDefinition::new(
                self.name(),
                "Read a UTF-8 text file from the workspace.",
                parameters_schema::<ReadFileInput>(),
                true,
            ),
            Self::Write => ToolDefinition::new(
                self.name(),
                "Write a UTF-8 text file in the workspace, creating parent directories and replacing existing content.",
                parameters_schema::<WriteFileInput>(),
                true,
            ),
            Self::List => ToolDefinition::new(
                self.name(),
                "List the entries of a workspace directory with their kind and size.",
                parameters_schema::<ListDirectoryInput>(),
                false,
            ),
        }
    }

    fn call<'a>(
        &'a self,
        args: JsonValue,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, RuntimeResult<ToolResult>> {
        async move {
            match self {
                Self::Read => success(&read_file(parse_args(self.name(), args)?, ctx).await?),
                Self::Write => success(&write_file(parse_args(self.name(), args)?, ctx).await?),
                Self::List => success(&list_directory(parse_args(self.name(), args)?, ctx).await?),
            }
        }
        .boxed()
    }
}

pub async fn read_file(input: ReadFileInput, ctx: &ExecutionContext) -> RuntimeResult<ReadFileOutput> {
    let path = sandbox::resolve(&input.path, ctx.working_directory())?;
    ctx.log(&format!("Reading {}", input.path));

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ToolError::io("read", &input.path, e))?;
    debug!(bytes = content.len(), "Read file");

    Ok(ReadFileOutput {
        bytes_read: content.len(),
        path: input.path,
        content,
    })
}

pub async fn write_file(
    input: WriteFileInput,
    ctx: &ExecutionContext,
) -> RuntimeResult<WriteFileOutput> {
    let path = sandbox::resolve(&input.path, ctx.working_directory())?;
    ctx.log(&format!("Writing {}", input.path));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolError::io("create parent directories for", &input.path, e))?;
    }
    tokio::fs::write(&path, input.content.as_bytes())
        .await
        .map_err(|e| ToolError::io("write", &input.path, e))?;
    debug!(bytes = input.content.len(), "Wrote file");

    Ok(WriteFileOutput {
        bytes_written: input.content.len(),
        path: input.path,
    })
}

pub async fn list_directory(
    input: ListDirectoryInput,
    ctx: &ExecutionContext,
) -> RuntimeResult<ListDirectoryOutput> {
    let path = sandbox::resolve(&input.path, ctx.working_directory())?;
    ctx.log(&format!("Listing {}", input.path));

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|e| ToolError::io("list", &input.path, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ToolError::io("list", &input.path, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| ToolError::io("inspect an entry of", &input.path, e))?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let size_bytes = match kind {
            EntryKind::File => entry.metadata().await.ok().map(|m| m.len()),
            _ => None,
        };

        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size_formatted: size_bytes.map(format_size),
            size_bytes,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ListDirectoryOutput {
        count: entries.len(),
        path: input.path,
        entries,
    })
}
