//! Prometheus metrics definitions and aggregation logic.
//!
//! A [`MetricSet`] is the immutable result of one collection cycle. It is
//! built by [`MetricsAggregator`] from the normalized records of that cycle
//! and rendered in Prometheus text format on demand.

use crate::config::CollectorConfig;
use crate::error::{ExporterError, Result};
use crate::model::{
    group_snapshots, BackupGroup, BackupStats, LockList, RepositoryCheckResult, RepositoryStats,
    Snapshot,
};
use crate::version::ToolVersion;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

pub const CHECK_SUCCESS: &str = "restic_check_success";
pub const LOCKS_TOTAL: &str = "restic_locks_total";
pub const SNAPSHOTS_TOTAL: &str = "restic_snapshots_total";
pub const SIZE_TOTAL: &str = "restic_size_total";
pub const UNCOMPRESSED_SIZE_TOTAL: &str = "restic_uncompressed_size_total";
pub const COMPRESSION_RATIO: &str = "restic_compression_ratio";
pub const BLOB_COUNT_TOTAL: &str = "restic_blob_count_total";
pub const SCRAPE_DURATION_SECONDS: &str = "restic_scrape_duration_seconds";
pub const VERSION_INFO: &str = "restic_version_info";

pub const BACKUP_TIMESTAMP: &str = "restic_backup_timestamp";
pub const BACKUP_SNAPSHOTS_TOTAL: &str = "restic_backup_snapshots_total";
pub const BACKUP_FILES_TOTAL: &str = "restic_backup_files_total";
pub const BACKUP_SIZE_TOTAL: &str = "restic_backup_size_total";
pub const BACKUP_FILES_NEW: &str = "restic_backup_files_new";
pub const BACKUP_FILES_CHANGED: &str = "restic_backup_files_changed";
pub const BACKUP_FILES_UNMODIFIED: &str = "restic_backup_files_unmodified";
pub const BACKUP_DIRS_NEW: &str = "restic_backup_dirs_new";
pub const BACKUP_DIRS_CHANGED: &str = "restic_backup_dirs_changed";
pub const BACKUP_DIRS_UNMODIFIED: &str = "restic_backup_dirs_unmodified";
pub const BACKUP_DATA_ADDED_BYTES: &str = "restic_backup_data_added_bytes";
pub const BACKUP_DURATION_SECONDS: &str = "restic_backup_duration_seconds";

/// Label names shared by every per-backup family, in exposition order.
pub const BACKUP_LABELS: &[&str] = &[
    "client_hash",
    "client_hostname",
    "client_username",
    "client_version",
    "snapshot_hash",
    "snapshot_tag",
    "snapshot_tags",
    "snapshot_paths",
];

const VERSION_LABELS: &[&str] = &["version"];

/// One labeled sample of a gauge family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

impl Sample {
    /// Value of a label, if the family has it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Value of a metric: a single gauge or a labeled family.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Family {
        label_names: &'static [&'static str],
        samples: Vec<Sample>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub help: &'static str,
    pub value: MetricValue,
}

/// Immutable result of one collection cycle, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    families: BTreeMap<&'static str, MetricFamily>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_gauge(&mut self, name: &'static str, help: &'static str, value: f64) {
        self.families.insert(
            name,
            MetricFamily {
                help,
                value: MetricValue::Gauge(value),
            },
        );
    }

    fn push_sample(
        &mut self,
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
        values: &[String],
        value: f64,
    ) {
        let family = self.families.entry(name).or_insert_with(|| MetricFamily {
            help,
            value: MetricValue::Family {
                label_names,
                samples: Vec::new(),
            },
        });
        if let MetricValue::Family { samples, .. } = &mut family.value {
            samples.push(Sample {
                labels: label_names.iter().copied().zip(values.iter().cloned()).collect(),
                value,
            });
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    /// Value of an unlabeled gauge.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        match self.families.get(name).map(|f| &f.value) {
            Some(MetricValue::Gauge(value)) => Some(*value),
            _ => None,
        }
    }

    /// Samples of a labeled family.
    pub fn samples(&self, name: &str) -> Option<&[Sample]> {
        match self.families.get(name).map(|f| &f.value) {
            Some(MetricValue::Family { samples, .. }) => Some(samples),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.families.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let registry = Registry::new();

        for (name, family) in &self.families {
            let opts = Opts::new(*name, family.help);
            match &family.value {
                MetricValue::Gauge(value) => {
                    let gauge =
                        Gauge::with_opts(opts).map_err(|e| ExporterError::Metrics(e.to_string()))?;
                    registry
                        .register(Box::new(gauge.clone()))
                        .map_err(|e| ExporterError::Metrics(e.to_string()))?;
                    gauge.set(*value);
                }
                MetricValue::Family {
                    label_names,
                    samples,
                } => {
                    let gauge_vec = GaugeVec::new(opts, label_names)
                        .map_err(|e| ExporterError::Metrics(e.to_string()))?;
                    registry
                        .register(Box::new(gauge_vec.clone()))
                        .map_err(|e| ExporterError::Metrics(e.to_string()))?;
                    for sample in samples {
                        let values: Vec<&str> =
                            sample.labels.iter().map(|(_, v)| v.as_str()).collect();
                        gauge_vec
                            .get_metric_with_label_values(&values)
                            .map_err(|e| ExporterError::Metrics(e.to_string()))?
                            .set(sample.value);
                    }
                }
            }
        }

        let mut buffer = Vec::with_capacity(8192);
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(|e| ExporterError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ExporterError::Metrics(e.to_string()))
    }
}

/// Normalized records gathered during one cycle.
#[derive(Debug, Clone)]
pub struct CycleRecords {
    pub tool_version: ToolVersion,
    /// `None` when the check is disabled
    pub check: Option<RepositoryCheckResult>,
    /// `None` when lock collection is disabled
    pub locks: Option<LockList>,
    /// `None` when global statistics are disabled
    pub repository_stats: Option<RepositoryStats>,
    /// Every snapshot in the repository
    pub snapshots: Vec<Snapshot>,
    /// Backup statistics by snapshot id, for group heads that have them
    pub backup_stats: HashMap<String, BackupStats>,
}

/// Which identifying labels carry real values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelOptions {
    pub include_hostname: bool,
    pub include_username: bool,
    pub include_paths: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            include_hostname: true,
            include_username: true,
            include_paths: false,
        }
    }
}

impl From<&CollectorConfig> for LabelOptions {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            include_hostname: config.include_hostname,
            include_username: config.include_username,
            include_paths: config.include_paths,
        }
    }
}

/// Turns the records of one cycle into a [`MetricSet`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    labels: LabelOptions,
}

impl MetricsAggregator {
    pub fn new(labels: LabelOptions) -> Self {
        Self { labels }
    }

    /// Build the metric set. Unavailable values are omitted, never
    /// replaced by a sentinel.
    pub fn aggregate(&self, records: &CycleRecords, scrape_duration: Duration) -> MetricSet {
        let mut set = MetricSet::new();

        if let Some(check) = &records.check {
            set.set_gauge(
                CHECK_SUCCESS,
                "Result of restic check operation in the repository",
                if check.success { 1.0 } else { 0.0 },
            );
        }

        if let Some(locks) = &records.locks {
            set.set_gauge(
                LOCKS_TOTAL,
                "Total number of locks in the repository",
                locks.count as f64,
            );
        }

        set.set_gauge(
            SNAPSHOTS_TOTAL,
            "Total number of snapshots in the repository",
            records.snapshots.len() as f64,
        );

        if let Some(stats) = &records.repository_stats {
            self.update_repository_metrics(&mut set, stats);
        }

        let groups = group_snapshots(&records.snapshots);
        debug!(
            "Aggregating {} backup groups from {} snapshots",
            groups.len(),
            records.snapshots.len()
        );
        for group in &groups {
            self.update_backup_metrics(&mut set, group, records.backup_stats.get(&group.latest.id));
        }

        set.push_sample(
            VERSION_INFO,
            "restic version information",
            VERSION_LABELS,
            &[records.tool_version.to_string()],
            1.0,
        );

        set.set_gauge(
            SCRAPE_DURATION_SECONDS,
            "Amount of time each scrape takes",
            scrape_duration.as_secs_f64(),
        );

        set
    }

    fn update_repository_metrics(&self, set: &mut MetricSet, stats: &RepositoryStats) {
        set.set_gauge(
            SIZE_TOTAL,
            "Total size of the repository in bytes",
            stats.total_size as f64,
        );
        if let Some(uncompressed) = stats.total_uncompressed_size {
            set.set_gauge(
                UNCOMPRESSED_SIZE_TOTAL,
                "Total uncompressed size of the repository in bytes",
                uncompressed as f64,
            );
        }
        if let Some(ratio) = stats.compression_ratio() {
            set.set_gauge(
                COMPRESSION_RATIO,
                "Compression ratio of the repository",
                ratio,
            );
        }
        set.set_gauge(
            BLOB_COUNT_TOTAL,
            "Total number of blobs in the repository",
            stats.total_blob_count as f64,
        );
    }

    fn backup_labels(&self, group: &BackupGroup<'_>) -> Vec<String> {
        let snapshot = group.latest;
        let shown = |include: bool, value: String| if include { value } else { String::new() };

        vec![
            snapshot.identity().fingerprint(),
            shown(self.labels.include_hostname, snapshot.hostname.clone()),
            shown(self.labels.include_username, snapshot.username.clone()),
            snapshot.program_version.clone(),
            group.hash.clone(),
            snapshot.primary_tag().to_string(),
            snapshot.joined_tags(),
            shown(self.labels.include_paths, snapshot.joined_paths()),
        ]
    }

    fn update_backup_metrics(
        &self,
        set: &mut MetricSet,
        group: &BackupGroup<'_>,
        stats: Option<&BackupStats>,
    ) {
        let labels = self.backup_labels(group);
        let mut sample = |name: &'static str, help: &'static str, value: f64| {
            set.push_sample(name, help, BACKUP_LABELS, &labels, value)
        };

        sample(
            BACKUP_TIMESTAMP,
            "Timestamp of the last backup",
            group.latest.timestamp,
        );
        sample(
            BACKUP_SNAPSHOTS_TOTAL,
            "Total number of snapshots",
            group.count as f64,
        );

        let Some(stats) = stats else {
            return;
        };

        sample(
            BACKUP_FILES_TOTAL,
            "Number of files in the backup",
            stats.files_total() as f64,
        );
        if let Some(size) = stats.size_total() {
            sample(
                BACKUP_SIZE_TOTAL,
                "Total size of backup in bytes",
                size as f64,
            );
        }

        if let BackupStats::Modern(modern) = stats {
            sample(
                BACKUP_FILES_NEW,
                "Number of new files in the backup",
                modern.files_new as f64,
            );
            sample(
                BACKUP_FILES_CHANGED,
                "Number of changed files in the backup",
                modern.files_changed as f64,
            );
            sample(
                BACKUP_FILES_UNMODIFIED,
                "Number of unmodified files in the backup",
                modern.files_unmodified as f64,
            );
            sample(
                BACKUP_DIRS_NEW,
                "Number of new directories in the backup",
                modern.dirs_new as f64,
            );
            sample(
                BACKUP_DIRS_CHANGED,
                "Number of changed directories in the backup",
                modern.dirs_changed as f64,
            );
            sample(
                BACKUP_DIRS_UNMODIFIED,
                "Number of unmodified directories in the backup",
                modern.dirs_unmodified as f64,
            );
            sample(
                BACKUP_DATA_ADDED_BYTES,
                "Number of bytes added in the backup",
                modern.data_added as f64,
            );
        }

        if let Some(duration) = stats.duration_seconds() {
            sample(
                BACKUP_DURATION_SECONDS,
                "Amount of time Restic took to make the backup",
                duration,
            );
        }
    }
}
