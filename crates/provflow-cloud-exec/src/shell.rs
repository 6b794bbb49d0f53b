//! Shell command runner
//!
//! Runs one configured command line through `<shell> -c` with the resource
//! context passed as `PROV_*` environment variables.

use crate::error::{ExecError, Result};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_SHELL: &str = "sh";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Shell command runner
#[derive(Debug, Clone)]
pub struct Shell {
    program: String,
    timeout: Duration,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL, DEFAULT_COMMAND_TIMEOUT)
    }
}

impl Shell {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the shell can be started
    pub async fn check_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("-c")
            .arg("exit 0")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|_| ExecError::ShellNotFound(self.program.clone()))?;

        if !status.success() {
            return Err(ExecError::ShellNotFound(self.program.clone()));
        }
        Ok(())
    }

    /// Run a command line and return its stdout
    pub async fn run(&self, command_line: &str, env: &BTreeMap<String, String>) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c").arg(command_line);
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} -c {}", self.program, command_line);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExecError::CommandFailed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Turn a key into an environment variable suffix (`cidr-block` -> `CIDR_BLOCK`)
pub fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// First non-empty line of the output, trimmed
pub fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}
