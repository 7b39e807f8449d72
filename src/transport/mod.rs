//! Transports that feed tool calls to the registry.
//!
//! - Stdio: JSON lines in, JSON lines out
//!
//! One-shot calls (`--call`) bypass the transport layer entirely; see `main.rs`.

pub mod stdio;

pub use stdio::StdioTransport;

use crate::error::RuntimeResult;
use crate::models::ProgressSink;
use std::future::Future;
use std::sync::Arc;

/// A long-running source of tool calls.
pub trait Transport: Send + Sync {
    /// Serve calls until the input ends or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = RuntimeResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}

/// Progress sink that forwards tool progress lines to the log.
pub fn log_progress_sink() -> ProgressSink {
    Arc::new(|line: &str| tracing::info!(target: "progress", "{line}"))
}
