//! Stable client fingerprints and backup group hashes.
//!
//! Both are SHA-256 based so they stay identical across exporter restarts.

use sha2::{Digest, Sha256};

/// Hex characters kept from the fingerprint digest (64 bits).
const FINGERPRINT_HEX_LEN: usize = 16;

/// The (hostname, username) pair a snapshot was taken by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub hostname: String,
    pub username: String,
}

impl ClientIdentity {
    pub fn new(hostname: &str, username: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            username: username.to_string(),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.hostname, &self.username)
    }
}

/// Derive a client fingerprint from hostname and username.
///
/// A NUL byte separates the two fields so ("ab", "c") and ("a", "bc") hash
/// differently. An empty username is an ordinary input.
pub fn fingerprint(hostname: &str, username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update([0u8]);
    hasher.update(username.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_HEX_LEN].to_string()
}

/// Hash of a backup group: hostname, username and comma-joined paths.
///
/// This is the formula earlier exporter releases used for the
/// `snapshot_hash` label; it is kept as-is so existing series continue.
pub fn group_hash(hostname: &str, username: &str, paths: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(username.as_bytes());
    hasher.update(paths.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint("server1", "root"), fingerprint("server1", "root"));
        assert_eq!(fingerprint("server1", "root").len(), FINGERPRINT_HEX_LEN);
        assert_eq!(
            ClientIdentity::new("server1", "root").fingerprint(),
            fingerprint("server1", "root")
        );
    }

    #[test]
    fn test_fingerprint_field_boundary() {
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
        assert_ne!(fingerprint("server1", ""), fingerprint("", "server1"));
    }

    #[test]
    fn test_fingerprint_empty_username() {
        let fp = fingerprint("server2", "");
        assert_eq!(fp.len(), FINGERPRINT_HEX_LEN);
        assert_ne!(fp, fingerprint("server2", "backup"));
    }

    #[test]
    fn test_fingerprint_no_collisions_in_corpus() {
        let hosts = ["server1", "server2", "nas", "laptop", "db-01", "db-1", ""];
        let users = ["root", "backup", "", "alice", "bob", "r00t"];

        let mut seen = HashSet::new();
        for host in hosts {
            for user in users {
                assert!(
                    seen.insert(fingerprint(host, user)),
                    "collision for ({}, {})",
                    host,
                    user
                );
            }
        }
        assert_eq!(seen.len(), hosts.len() * users.len());
    }

    #[test]
    fn test_group_hash_matches_historical_values() {
        let paths = vec!["/home".to_string(), "/etc".to_string()];
        assert_eq!(
            group_hash("server1", "root", &paths),
            "80873a9c92e8448f9fe8d78e6f6fbe856818af6ab2a86e522d0e4c5612b27eb8"
        );
        assert_eq!(
            group_hash("server1", "", &paths),
            "068a07fc863fce525fc7ff6ccb22f102c98bcb8137d89430a1813b054a6626a0"
        );
    }
}
