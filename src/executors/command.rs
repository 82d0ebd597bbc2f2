use crate::core::errors::ExecError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was ended by a signal.
    pub exit_code: i32,
    pub duration_ms: u128,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `tool` to completion, capturing stdout and stderr in full. The child
/// is killed once `limit` elapses.
pub async fn execute(tool: &str, args: &[String], limit: Duration) -> Result<CommandResult, ExecError> {
    let start = Instant::now();

    tracing::debug!("Executing: {} {:?}", tool, args);

    let mut cmd = Command::new(tool);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExecError::NotFound {
                tool: tool.to_string(),
            }
        } else {
            ExecError::Io {
                tool: tool.to_string(),
                source,
            }
        }
    })?;

    let (Some(stdout_handle), Some(stderr_handle)) = (child.stdout.take(), child.stderr.take())
    else {
        return Err(ExecError::Io {
            tool: tool.to_string(),
            source: std::io::Error::other("child output pipes were not captured"),
        });
    };

    // Read outputs alongside the wait to avoid pipe buffer stalls
    let outcome = timeout(limit, async {
        tokio::join!(
            read_lines(BufReader::new(stdout_handle)),
            read_lines(BufReader::new(stderr_handle)),
            child.wait()
        )
    })
    .await;

    let duration_ms = start.elapsed().as_millis();

    let (stdout_result, stderr_result, wait_result) = match outcome {
        Ok(parts) => parts,
        Err(_) => {
            let _ = child.kill().await;
            return Err(ExecError::TimedOut {
                tool: tool.to_string(),
                timeout: limit,
            });
        }
    };

    let io_error = |source| ExecError::Io {
        tool: tool.to_string(),
        source,
    };
    let status = wait_result.map_err(io_error)?;
    let stdout = stdout_result.map_err(io_error)?;
    let stderr = stderr_result.map_err(io_error)?;

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
        duration_ms,
    })
}

async fn read_lines<R>(reader: BufReader<R>) -> std::io::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut reader = reader.lines();

    while let Some(line) = reader.next_line().await? {
        lines.push(line);
    }

    Ok(lines.join("\n"))
}
