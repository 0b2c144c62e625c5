//! restic client issuing the read-only sub-commands the exporter needs.
//!
//! Each method runs one invocation through a [`CommandRunner`] and hands
//! the output to the matching parser in [`crate::parse`].

use crate::config::ResticConfig;
use crate::error::Result;
use crate::model::{LegacyStats, LockList, RepositoryStats, Snapshot};
use crate::parse;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::version::ToolVersion;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// restic client.
#[derive(Clone)]
pub struct ResticClient {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ResticClient {
    /// Create a client over any command runner.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Create a client spawning the configured restic binary.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use restic_exporter::client::ResticClient;
    /// use restic_exporter::config::ResticConfig;
    ///
    /// let config = ResticConfig {
    ///     repository: "/srv/restic-repo".to_string(),
    ///     password: None,
    ///     password_file: Some("/etc/restic/password".into()),
    ///     password_command: None,
    ///     binary: "restic".to_string(),
    ///     insecure_tls: false,
    ///     command_timeout_seconds: 1800,
    /// };
    /// let client = ResticClient::from_config(&config).unwrap();
    /// ```
    pub fn from_config(config: &ResticConfig) -> Result<Self> {
        let runner = ProcessRunner::new(config)?;
        Ok(Self::new(Arc::new(runner), config.command_timeout()))
    }

    /// Get the local restic version.
    pub async fn version(&self) -> Result<ToolVersion> {
        debug!("Fetching restic version");
        let output = self.runner.run("version", &[], self.timeout).await?;
        Ok(parse::parse_tool_version(&output.stdout))
    }

    /// Get every snapshot in the repository.
    pub async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        debug!("Fetching snapshot list");
        let output = self.runner.run("snapshots", &["--json"], self.timeout).await?;
        debug!("Raw snapshots response: {} bytes", output.stdout.len());
        parse::parse_snapshots(&output.stdout)
    }

    /// Get restore-size statistics of one snapshot.
    ///
    /// restic reads and hashes the whole snapshot for this, so it is only
    /// used for snapshots without an embedded summary.
    pub async fn snapshot_stats(&self, snapshot_id: &str) -> Result<LegacyStats> {
        debug!("Fetching statistics for snapshot {}", snapshot_id);
        let output = self
            .runner
            .run("stats", &["--json", snapshot_id], self.timeout)
            .await?;
        parse::parse_snapshot_stats(&output.stdout)
    }

    /// Get raw-data statistics of the whole repository.
    pub async fn repository_stats(&self) -> Result<RepositoryStats> {
        debug!("Fetching repository statistics");
        let output = self
            .runner
            .run("stats", &["--json", "--mode", "raw-data"], self.timeout)
            .await?;
        parse::parse_repository_stats(&output.stdout)
    }

    /// Run the repository integrity check. Any failure is an error.
    pub async fn check(&self) -> Result<()> {
        debug!("Checking repository integrity");
        let output = self.runner.run("check", &[], self.timeout).await?;
        debug!("restic check exited with code {}", output.exit_code);
        Ok(())
    }

    /// Count the locks currently held in the repository.
    pub async fn locks(&self) -> Result<LockList> {
        debug!("Listing repository locks");
        let output = self.runner.run("list", &["locks"], self.timeout).await?;
        Ok(parse::parse_locks(&output.stdout))
    }
}
