//! Running (or echoing) synthesized commands.

use std::io::Write;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::synth::Command;

/// Executes one external command and reports its exit code.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<i32>;
}

/// Runs commands through `sh -c`, inheriting stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

#[async_trait::async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, command: &Command) -> Result<i32> {
        let line = command.render();
        info!(kind = ?command.kind, command = %line, "running");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&line)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .with_context(|| format!("spawning sh for {:?} command", command.kind))?;
        // Killed by a signal: no code, report as a generic failure.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Dry-run executor: writes each command to the given sink and reports success.
pub struct EchoExecutor {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EchoExecutor {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait::async_trait]
impl Executor for EchoExecutor {
    async fn execute(&self, command: &Command) -> Result<i32> {
        let mut out = self.out.lock().map_err(|_| anyhow!("dry-run output lock poisoned"))?;
        writeln!(out, "{}", command.render()).context("writing dry-run command")?;
        out.flush().context("flushing dry-run output")?;
        Ok(0)
    }
}
