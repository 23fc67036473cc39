use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::tools::{Invocation, ToolOutput, ToolRunner};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// [`ToolRunner`] backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn spawn_error(invocation: &Invocation, e: std::io::Error) -> ToolError {
        if e.kind() == std::io::ErrorKind::NotFound {
            return ToolError::NotFound {
                tool: invocation.program.display().to_string(),
            };
        }
        ToolError::Spawn {
            tool: invocation.tool_name(),
            context: invocation.context.clone(),
            reason: e.to_string(),
        }
    }

    fn check_status(
        invocation: &Invocation,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    ) -> Result<ToolOutput> {
        if !status.success() {
            warn!(
                tool = %invocation.tool_name(),
                context = %invocation.context,
                %status,
                "External tool failed"
            );
            return Err(ToolError::Failed {
                tool: invocation.tool_name(),
                context: invocation.context.clone(),
                status: status.to_string(),
                stdout,
                stderr,
            }
            .into());
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(context = %invocation.context, "cmd: {}", invocation.command_line());

        let output = Self::command(invocation)
            .output()
            .await
            .map_err(|e| Self::spawn_error(invocation, e))?;

        Self::check_status(
            invocation,
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }

    async fn run_streaming(
        &self,
        invocation: &Invocation,
        sink: &mut (dyn for<'b> FnMut(&'b [u8]) -> Result<()> + Send),
    ) -> Result<ToolOutput> {
        debug!(context = %invocation.context, "cmd: {}", invocation.command_line());

        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let mut stdout = child.stdout.take().ok_or_else(|| ToolError::Spawn {
            tool: invocation.tool_name(),
            context: invocation.context.clone(),
            reason: "stdout was not captured".to_string(),
        })?;

        // Drain stderr concurrently so a chatty tool cannot block on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if let Err(e) = sink(&buf[..n]) {
                let _ = child.kill().await;
                return Err(e);
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        Self::check_status(invocation, status, String::new(), stderr)
    }
}
