//! Out-of-process function execution.
//!
//! The function body runs as `<interpreter> <body file>`. Input goes in on
//! stdin as one JSON document; the process must print one JSON document on
//! stdout and exit 0.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{HostError, HostResult};

pub async fn run_function(
    program: &str,
    script: &Path,
    input: &[u8],
    timeout: Duration,
) -> HostResult<serde_json::Value> {
    let mut child = Command::new(program)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return;
        };
        // A body that never reads its input closes the pipe early.
        if let Err(e) = stdin.write_all(input).await {
            if e.kind() != ErrorKind::BrokenPipe {
                debug!(error = %e, "failed to write function input");
            }
            return;
        }
        let _ = stdin.shutdown().await;
    };

    // Dropping the child on timeout kills it.
    let output = match tokio::time::timeout(timeout, async {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    })
    .await
    {
        Ok(output) => output.map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?,
        Err(_) => return Err(HostError::Timeout(timeout)),
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        let message = if stderr.is_empty() {
            format!("function exited with {}", output.status)
        } else {
            stderr
        };
        return Err(HostError::ExecutionError(message));
    }

    serde_json::from_slice(&output.stdout).map_err(|e| {
        let mut message = format!("invalid function output: {e}");
        if !stderr.is_empty() {
            message.push_str(": ");
            message.push_str(&stderr);
        }
        HostError::ExecutionError(message)
    })
}
