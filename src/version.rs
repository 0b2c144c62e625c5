//! restic version parsing and the cached version probe.

use crate::client::ResticClient;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// First restic release that embeds a backup summary in snapshot records.
pub const SNAPSHOT_SUMMARY_SINCE: Version = Version::new(0, 17, 0);

/// Version of a restic binary, either the local one or the client that
/// created a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolVersion {
    Known(Version),
    Unknown,
}

impl ToolVersion {
    /// Parses strings such as `restic 0.17.3`, `0.16.4`,
    /// `restic 0.16.4 compiled with go1.21.6 on linux/amd64` or
    /// `0.18.0-dev (compiled manually)`. Anything else is `Unknown`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let candidate = match text.strip_prefix("restic") {
            Some(rest) => rest.trim_start(),
            None => text,
        };
        let candidate = candidate.strip_prefix('v').unwrap_or(candidate);
        let token = candidate.split_whitespace().next().unwrap_or_default();

        let mut parts = token
            .split(|c: char| !c.is_ascii_digit() && c != '.')
            .next()
            .unwrap_or_default()
            .split('.');

        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = parts.next().and_then(|p| p.parse().ok());
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

        match (major, minor) {
            (Some(major), Some(minor)) => ToolVersion::Known(Version::new(major, minor, patch)),
            _ => ToolVersion::Unknown,
        }
    }

    /// True only when the version is known and not older than `min`.
    pub fn at_least(&self, min: Version) -> bool {
        matches!(self, ToolVersion::Known(v) if *v >= min)
    }

    /// True only when the version is known and older than `min`.
    pub fn known_older_than(&self, min: Version) -> bool {
        matches!(self, ToolVersion::Known(v) if *v < min)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolVersion::Known(v) => v.fmt(f),
            ToolVersion::Unknown => f.write_str("unknown"),
        }
    }
}

/// Determines the local restic version once per process.
///
/// Probing fails open: output that cannot be parsed is cached as
/// [`ToolVersion::Unknown`]. A failed invocation is not cached, so the
/// next cycle probes again.
#[derive(Debug, Default)]
pub struct VersionProbe {
    cached: OnceCell<ToolVersion>,
}

impl VersionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached version, if a probe already succeeded.
    pub fn cached(&self) -> Option<ToolVersion> {
        self.cached.get().copied()
    }

    /// Returns the local restic version, running `restic version` on first use.
    pub async fn probe(&self, client: &ResticClient) -> ToolVersion {
        if let Some(version) = self.cached.get() {
            return *version;
        }

        match client.version().await {
            Ok(version) => {
                if version == ToolVersion::Unknown {
                    warn!("Unable to parse the restic version, assuming legacy behaviour");
                } else {
                    info!("Detected restic version {}", version);
                }
                *self.cached.get_or_init(|| async { version }).await
            }
            Err(e) => {
                warn!("Failed to probe restic version: {}", e);
                debug!("Version probe will be retried on the next cycle");
                ToolVersion::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_variants() {
        assert_eq!(
            ToolVersion::parse("restic 0.17.3 compiled with go1.22.5 on linux/amd64"),
            ToolVersion::Known(Version::new(0, 17, 3))
        );
        assert_eq!(
            ToolVersion::parse("restic 0.15.0"),
            ToolVersion::Known(Version::new(0, 15, 0))
        );
        assert_eq!(
            ToolVersion::parse("0.16.4"),
            ToolVersion::Known(Version::new(0, 16, 4))
        );
        assert_eq!(
            ToolVersion::parse("0.18.0-dev (compiled manually)"),
            ToolVersion::Known(Version::new(0, 18, 0))
        );
        assert_eq!(
            ToolVersion::parse("restic 0.9"),
            ToolVersion::Known(Version::new(0, 9, 0))
        );
    }

    #[test]
    fn test_parse_version_unknown() {
        assert_eq!(ToolVersion::parse(""), ToolVersion::Unknown);
        assert_eq!(ToolVersion::parse("restic"), ToolVersion::Unknown);
        assert_eq!(ToolVersion::parse("rustic 1"), ToolVersion::Unknown);
        assert_eq!(ToolVersion::parse("garbage"), ToolVersion::Unknown);
    }

    #[test]
    fn test_version_comparisons() {
        let modern = ToolVersion::parse("restic 0.17.0");
        let legacy = ToolVersion::parse("restic 0.16.4");
        assert!(modern.at_least(SNAPSHOT_SUMMARY_SINCE));
        assert!(!legacy.at_least(SNAPSHOT_SUMMARY_SINCE));
        assert!(legacy.known_older_than(SNAPSHOT_SUMMARY_SINCE));
        assert!(!ToolVersion::Unknown.at_least(SNAPSHOT_SUMMARY_SINCE));
        assert!(!ToolVersion::Unknown.known_older_than(SNAPSHOT_SUMMARY_SINCE));
        assert!(Version::new(1, 0, 0) > Version::new(0, 99, 99));
    }

    #[test]
    fn test_display() {
        assert_eq!(ToolVersion::parse("restic 0.17.3").to_string(), "0.17.3");
        assert_eq!(ToolVersion::Unknown.to_string(), "unknown");
    }
}
