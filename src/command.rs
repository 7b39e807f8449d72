//! External command runner.
//!
//! Spawns a child process with stdin closed and both output streams captured,
//! waits for it to exit and reports what happened. Nothing here returns an
//! error: spawn failures are folded into the output.
//!
//! There is no timeout. A child that never exits blocks the tool call; callers
//! that need a deadline wrap the future themselves.

use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported when the process could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Captured outcome of one child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` with `args` in `cwd` and wait for it to finish.
pub async fn run<S: AsRef<OsStr>>(command: &str, args: &[S], cwd: &Path) -> CommandOutput {
    debug!(command = %command, args = args.len(), cwd = %cwd.display(), "Spawning command");

    let output = Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) => {
            let exit_code = output.status.code();
            let result = CommandOutput {
                success: exit_code == Some(0),
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            debug!(command = %command, exit_code = ?exit_code, "Command finished");
            result
        }
        Err(e) => {
            warn!(command = %command, error = %e, "Failed to spawn command");
            let mut stderr = String::new();
            append_line(&mut stderr, &format!("Failed to start '{command}': {e}"));
            CommandOutput {
                success: false,
                exit_code: Some(SPAWN_FAILURE_EXIT_CODE),
                stdout: String::new(),
                stderr,
            }
        }
    }
}

fn append_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() && !buffer.ends_with('\n') {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
