//! Subprocess execution of restic.
//!
//! [`CommandRunner`] is the seam between the collector and the outside
//! world: [`ProcessRunner`] spawns the real binary, tests substitute a
//! scripted fake.

use crate::config::{PasswordSource, ResticConfig};
use crate::error::{excerpt, CommandStatus, ExporterError, Result, STDERR_EXCERPT_CHARS};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

const PASSWORD_ENV_VARS: [&str; 3] = [
    "RESTIC_PASSWORD",
    "RESTIC_PASSWORD_FILE",
    "RESTIC_PASSWORD_COMMAND",
];

/// Output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: 0,
        }
    }
}

/// Runs one restic sub-command.
///
/// Implementations spawn exactly one process per call and never retry.
/// A non-zero exit or an exceeded timeout is an
/// [`ExporterError::Execution`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, subcommand: &str, args: &[&str], timeout: Duration)
        -> Result<CommandOutput>;
}

/// Spawns the restic binary with repository and credentials injected
/// through the child environment.
pub struct ProcessRunner {
    binary: String,
    repository: String,
    password: PasswordSource,
    insecure_tls: bool,
}

impl ProcessRunner {
    /// Create a runner from validated restic settings.
    pub fn new(config: &ResticConfig) -> Result<Self> {
        Ok(Self {
            binary: config.binary.clone(),
            repository: config.repository.clone(),
            password: config.password_source()?,
            insecure_tls: config.insecure_tls,
        })
    }

    fn command(&self, subcommand: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-lock");
        if self.insecure_tls {
            cmd.arg("--insecure-tls");
        }
        cmd.arg(subcommand).args(args);

        for var in PASSWORD_ENV_VARS {
            cmd.env_remove(var);
        }
        cmd.env("RESTIC_REPOSITORY", &self.repository)
            .env(self.password.env_var(), self.password.env_value())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Stderr excerpt with the literal password masked.
    fn diagnostic(&self, stderr: &[u8]) -> String {
        let mut text = String::from_utf8_lossy(stderr).into_owned();
        if let Some(secret) = self.password.secret().filter(|s| !s.is_empty()) {
            text = text.replace(secret, "***");
        }
        excerpt(&text, STDERR_EXCERPT_CHARS)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        subcommand: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let started = Instant::now();
        let execution_error = |status: CommandStatus, stderr_excerpt: String| {
            ExporterError::Execution {
                subcommand: subcommand.to_string(),
                status,
                stderr_excerpt,
            }
        };

        let child = self
            .command(subcommand, args)
            .spawn()
            .map_err(|e| execution_error(CommandStatus::SpawnFailed, e.to_string()))?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(execution_error(
                    CommandStatus::TimedOut(timeout),
                    String::new(),
                ))
            }
        };

        debug!(
            "restic {} finished in {:.2}s ({} bytes stdout)",
            subcommand,
            started.elapsed().as_secs_f64(),
            output.stdout.len()
        );

        match output.status.code() {
            Some(0) => Ok(CommandOutput {
                stdout: output.stdout,
                exit_code: 0,
            }),
            Some(code) => Err(execution_error(
                CommandStatus::Exited(code),
                self.diagnostic(&output.stderr),
            )),
            None => Err(execution_error(
                CommandStatus::Signaled,
                self.diagnostic(&output.stderr),
            )),
        }
    }
}
