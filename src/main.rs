//! Agent Tool Runtime - Main entry point.
//!
//! Lists tools, runs a single call, or serves JSON-line tool calls on stdio.

use agent_tool_runtime::config::Config;
use agent_tool_runtime::transport::{StdioTransport, Transport, log_progress_sink};
use agent_tool_runtime::{ExecutionContext, ToolCall, ToolRegistry};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging. Logs always go to stderr.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    if config.enable_logs {
        init_tracing(&config);
    }

    let workspace = config.workspace()?;
    let sql_env = config.sql_environment()?;
    if let Some(env) = &sql_env {
        info!(engine = %env.engine(), dsn = %env.masked_dsn(), "SQL tools configured");
    }

    let registry = ToolRegistry::builtin(sql_env, config.diagram_checker.clone())?;

    if config.list_tools {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    if let Some(name) = &config.call {
        let ctx = ExecutionContext::new(&workspace).with_log(log_progress_sink());
        let call = ToolCall::new(name.clone(), config.arguments.clone());
        println!("{}", registry.execute(&call, &ctx).await);
        return Ok(());
    }

    info!(
        workspace = %workspace.display(),
        tools = registry.len(),
        "Starting agent tool runtime v{}",
        env!("CARGO_PKG_VERSION")
    );

    let transport = StdioTransport::new(Arc::new(registry), workspace);
    if let Err(e) = transport.run().await {
        error!(transport = transport.name(), error = %e, "Transport error");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
