//! Stdio transport.
//!
//! Reads one [`ToolCall`] JSON object per stdin line and writes one result
//! envelope per stdout line, in order. Blank lines are skipped; a line that is
//! not a valid call gets a failure envelope and the loop goes on.

use crate::error::RuntimeResult;
use crate::models::{ExecutionContext, ToolCall, ToolResult};
use crate::tools::ToolRegistry;
use crate::transport::{Transport, log_progress_sink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

pub struct StdioTransport {
    registry: Arc<ToolRegistry>,
    workspace: PathBuf,
}

impl StdioTransport {
    pub fn new(registry: Arc<ToolRegistry>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            workspace: workspace.into(),
        }
    }

    /// Serve calls from `reader` until EOF. Returns the number of lines answered.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> RuntimeResult<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut answered = 0;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ToolCall>(line) {
                Ok(call) => {
                    let ctx = ExecutionContext::new(&self.workspace).with_log(log_progress_sink());
                    self.registry.execute(&call, &ctx).await
                }
                Err(e) => {
                    warn!(error = %e, "Malformed tool call line");
                    ToolResult::failure(format!("Invalid tool call: {e}")).to_json()
                }
            };

            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            answered += 1;
        }

        debug!(answered, "Input closed");
        Ok(answered)
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> RuntimeResult<()> {
        info!(workspace = %self.workspace.display(), "Serving tool calls on stdio");

        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        tokio::select! {
            result = self.serve(stdin, stdout) => {
                result?;
                info!("Stdio transport completed normally");
                Ok(())
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received");
                // A pending stdin read cannot be interrupted; leave without waiting for it.
                std::process::exit(0);
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
