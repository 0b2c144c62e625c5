//! Normalized records produced from restic output.
//!
//! Every record here is validated once at the parser boundary; the rest of
//! the crate never looks at raw JSON.

use crate::identity::{self, ClientIdentity};
use crate::version::{ToolVersion, SNAPSHOT_SUMMARY_SINCE};
use std::collections::HashMap;

/// One snapshot from `restic snapshots --json`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub short_id: String,
    /// Creation time in Unix seconds, fraction truncated
    pub timestamp: f64,
    pub hostname: String,
    /// Empty when the client did not record one
    pub username: String,
    /// Raw `program_version` as recorded by the client (e.g. "restic 0.17.3")
    pub program_version: String,
    pub client_version: ToolVersion,
    pub tags: Vec<String>,
    pub paths: Vec<String>,
    /// Backup summary embedded by restic >= 0.17
    pub summary: Option<ModernStats>,
}

impl Snapshot {
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::new(&self.hostname, &self.username)
    }

    /// Hash identifying the backup group this snapshot belongs to.
    pub fn group_hash(&self) -> String {
        identity::group_hash(&self.hostname, &self.username, &self.paths)
    }

    /// First tag, kept as a singular label for older dashboards.
    pub fn primary_tag(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or_default()
    }

    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }

    pub fn joined_paths(&self) -> String {
        self.paths.join(",")
    }

    /// Chooses how backup statistics are obtained for this snapshot.
    ///
    /// The modern schema needs a client >= 0.17 that recorded a summary and a
    /// local restic that is not known to predate summaries. Everything else,
    /// including unparseable client versions, falls back to legacy.
    pub fn stats_schema(&self, local: ToolVersion) -> StatsSchema {
        if self.client_version.at_least(SNAPSHOT_SUMMARY_SINCE)
            && self.summary.is_some()
            && !local.known_older_than(SNAPSHOT_SUMMARY_SINCE)
        {
            StatsSchema::Modern
        } else {
            StatsSchema::Legacy
        }
    }
}

/// Snapshots sharing hostname, username and paths.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupGroup<'a> {
    pub hash: String,
    /// Newest snapshot of the group
    pub latest: &'a Snapshot,
    /// Number of snapshots in the group
    pub count: u64,
}

/// Group snapshots by [`Snapshot::group_hash`], keeping the newest one per
/// group (the first seen wins on equal timestamps). Groups come back in
/// order of first appearance.
pub fn group_snapshots(snapshots: &[Snapshot]) -> Vec<BackupGroup<'_>> {
    let mut groups: Vec<BackupGroup<'_>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for snapshot in snapshots {
        let hash = snapshot.group_hash();
        match index.get(&hash) {
            Some(&i) => {
                let group = &mut groups[i];
                group.count += 1;
                if snapshot.timestamp > group.latest.timestamp {
                    group.latest = snapshot;
                }
            }
            None => {
                index.insert(hash.clone(), groups.len());
                groups.push(BackupGroup {
                    hash,
                    latest: snapshot,
                    count: 1,
                });
            }
        }
    }
    groups
}

/// Which per-backup statistics schema applies to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSchema {
    /// `restic stats --json <id>`: an expensive extra call per snapshot
    Legacy,
    /// The snapshot's own summary: no extra call
    Modern,
}

/// Result of `restic check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCheckResult {
    pub success: bool,
    pub diagnostic: Option<String>,
}

impl RepositoryCheckResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            diagnostic: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Result of `restic stats --json --mode raw-data`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryStats {
    /// Stored (compressed) size in bytes
    pub total_size: u64,
    /// Size before compression, only reported by repository format v2
    pub total_uncompressed_size: Option<u64>,
    pub total_blob_count: u64,
    pub snapshots_count: u64,
}

impl RepositoryStats {
    /// uncompressed / compressed, undefined when either side is missing or
    /// the compressed size is zero.
    pub fn compression_ratio(&self) -> Option<f64> {
        let uncompressed = self.total_uncompressed_size?;
        if self.total_size == 0 {
            return None;
        }
        Some(uncompressed as f64 / self.total_size as f64)
    }
}

/// Result of `restic list locks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockList {
    pub count: u64,
}

/// Statistics from `restic stats --json <id>`.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStats {
    pub files_total: u64,
    pub size_total: u64,
}

/// Statistics from a snapshot summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ModernStats {
    pub files_new: u64,
    pub files_changed: u64,
    pub files_unmodified: u64,
    pub dirs_new: u64,
    pub dirs_changed: u64,
    pub dirs_unmodified: u64,
    pub data_added: u64,
    pub size_total: Option<u64>,
    pub duration_seconds: Option<f64>,
}

/// Per-backup statistics; exactly one schema per snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupStats {
    Legacy(LegacyStats),
    Modern(ModernStats),
}

impl BackupStats {
    /// Total files in the backup.
    ///
    /// For the modern schema this is new + changed + unmodified rather than
    /// the tool's own total, which older releases miscounted.
    pub fn files_total(&self) -> u64 {
        match self {
            BackupStats::Legacy(stats) => stats.files_total,
            BackupStats::Modern(stats) => {
                stats
                    .files_new
                    .saturating_add(stats.files_changed)
                    .saturating_add(stats.files_unmodified)
            }
        }
    }

    pub fn size_total(&self) -> Option<u64> {
        match self {
            BackupStats::Legacy(stats) => Some(stats.size_total),
            BackupStats::Modern(stats) => stats.size_total,
        }
    }

    /// Backup duration; never available for the legacy schema.
    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            BackupStats::Legacy(_) => None,
            BackupStats::Modern(stats) => stats.duration_seconds,
        }
    }
}
