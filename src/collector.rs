//! One collection cycle against the repository.
//!
//! Sub-collections run sequentially. Each failure is classified as either
//! degrading (the metric is omitted, the cycle continues) or fatal (the
//! cycle is aborted and nothing is published):
//!
//! | sub-collection      | on failure                      |
//! |---------------------|---------------------------------|
//! | version probe       | degrading, version is `unknown` |
//! | snapshot list       | fatal                           |
//! | per-snapshot stats  | fatal                           |
//! | check               | degrading, `check_success = 0`  |
//! | locks               | fatal                           |
//! | global stats        | fatal                           |

use crate::client::ResticClient;
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::metrics::{CycleRecords, LabelOptions, MetricSet, MetricsAggregator};
use crate::model::{group_snapshots, BackupStats, RepositoryCheckResult, Snapshot, StatsSchema};
use crate::version::{ToolVersion, VersionProbe};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which sub-collections are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOptions {
    pub check: bool,
    pub global_stats: bool,
    pub legacy_stats: bool,
    pub locks: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            check: true,
            global_stats: true,
            legacy_stats: true,
            locks: true,
        }
    }
}

impl From<&CollectorConfig> for CollectionOptions {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            check: !config.disable_check,
            global_stats: !config.disable_global_stats,
            legacy_stats: !config.disable_legacy_stats,
            locks: !config.disable_locks,
        }
    }
}

/// Gathers the records of one cycle and aggregates them.
pub struct Collector {
    client: ResticClient,
    probe: VersionProbe,
    options: CollectionOptions,
    aggregator: MetricsAggregator,
}

impl Collector {
    pub fn new(client: ResticClient, options: CollectionOptions, labels: LabelOptions) -> Self {
        Self {
            client,
            probe: VersionProbe::new(),
            options,
            aggregator: MetricsAggregator::new(labels),
        }
    }

    /// Create a collector from the collector settings.
    pub fn from_config(client: ResticClient, config: &CollectorConfig) -> Self {
        Self::new(client, config.into(), config.into())
    }

    /// The cached local restic version, once probed.
    pub fn tool_version(&self) -> Option<ToolVersion> {
        self.probe.cached()
    }

    /// Run one cycle. Returns the complete metric set or the fatal error
    /// that aborted the cycle.
    pub async fn collect(&self) -> Result<MetricSet> {
        let started = Instant::now();
        let tool_version = self.probe.probe(&self.client).await;

        let snapshots = self.client.snapshots().await?;
        debug!("Fetched {} snapshots", snapshots.len());

        let backup_stats = self.collect_backup_stats(&snapshots, tool_version).await?;

        let check = if self.options.check {
            Some(self.collect_check().await)
        } else {
            None
        };

        let locks = if self.options.locks {
            Some(self.client.locks().await?)
        } else {
            None
        };

        let repository_stats = if self.options.global_stats {
            let stats = self.client.repository_stats().await?;
            if stats.snapshots_count != snapshots.len() as u64 {
                debug!(
                    "Repository statistics cover {} snapshots, {} listed",
                    stats.snapshots_count,
                    snapshots.len()
                );
            }
            Some(stats)
        } else {
            None
        };

        let records = CycleRecords {
            tool_version,
            check,
            locks,
            repository_stats,
            snapshots,
            backup_stats,
        };

        Ok(self.aggregator.aggregate(&records, started.elapsed()))
    }

    /// Statistics for the newest snapshot of every backup group.
    ///
    /// Snapshots with an embedded summary never trigger `restic stats`.
    async fn collect_backup_stats(
        &self,
        snapshots: &[Snapshot],
        tool_version: ToolVersion,
    ) -> Result<HashMap<String, BackupStats>> {
        let mut stats = HashMap::new();
        let mut legacy_calls = 0usize;

        for group in group_snapshots(snapshots) {
            let snapshot = group.latest;
            match (snapshot.stats_schema(tool_version), &snapshot.summary) {
                (StatsSchema::Modern, Some(summary)) => {
                    stats.insert(snapshot.id.clone(), BackupStats::Modern(summary.clone()));
                }
                _ if self.options.legacy_stats => {
                    let legacy = self.client.snapshot_stats(&snapshot.id).await.map_err(|e| {
                        debug!("Statistics for snapshot {} failed", snapshot.short_id);
                        e
                    })?;
                    legacy_calls += 1;
                    stats.insert(snapshot.id.clone(), BackupStats::Legacy(legacy));
                }
                _ => {
                    debug!(
                        "Skipping legacy statistics for snapshot {}",
                        snapshot.short_id
                    );
                }
            }
        }

        if legacy_calls > 0 {
            info!("Fetched legacy statistics for {} snapshots", legacy_calls);
        }
        Ok(stats)
    }

    async fn collect_check(&self) -> RepositoryCheckResult {
        let result = match self.client.check().await {
            Ok(()) => RepositoryCheckResult::passed(),
            Err(e) => RepositoryCheckResult::failed(e.to_string()),
        };
        if let Some(diagnostic) = &result.diagnostic {
            warn!("Repository check failed: {}", diagnostic);
        }
        result
    }
}
