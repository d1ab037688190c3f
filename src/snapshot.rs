//! Snapshot persistence.
//!
//! The whole durable state of the gateway is one JSON file: live cache
//! entries plus analytics counters. Writes go to a sibling temp file first
//! and are renamed into place so a crash mid-write leaves the previous
//! snapshot intact. Credential state is deliberately not persisted; pools
//! start fresh on every boot.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::CacheEntry;
use crate::cost::AnalyticsCounters;
use crate::error::{GatewayError, Result};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewaySnapshot {
    pub version: u32,
    pub saved_at: chrono::DateTime<chrono::Utc>,
    pub entries: Vec<CacheEntry>,
    pub analytics: AnalyticsCounters,
}

impl GatewaySnapshot {
    pub fn new(entries: Vec<CacheEntry>, analytics: AnalyticsCounters) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now(),
            entries,
            analytics,
        }
    }

    /// Write atomically: serialize to `<path>.tmp`, then rename over the
    /// target.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), entries = self.entries.len(), "Saved snapshot");
        Ok(())
    }

    /// Load a snapshot. `Ok(None)` when the file does not exist; a corrupt
    /// or version-mismatched file is an error so the caller can decide to
    /// start cold.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: Self = serde_json::from_slice(&body)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GatewayError::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            saved_at = %snapshot.saved_at,
            "Loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Load, but treat any failure as a cold start. Used at boot where a bad
    /// snapshot must never prevent the gateway from coming up.
    pub fn load_or_cold(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CachedResponse};
    use crate::types::Usage;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn entry(key: &str, ttl_minutes: i64) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.to_string(),
            model: "m1".to_string(),
            prompt_tokens: BTreeSet::from(["hello".to_string()]),
            response: CachedResponse {
                content: "hi".to_string(),
                provider: "p1".to_string(),
                model: "m1".to_string(),
                usage: Usage::default(),
            },
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            access_count: 3,
            last_accessed: now,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let snapshot = GatewaySnapshot::new(vec![entry("k1", 60)], AnalyticsCounters {
            hits: 4,
            misses: 6,
            avg_latency_ms: 123.0,
            estimated_savings: 0.02,
        });
        snapshot.save(&path).unwrap();

        let loaded = GatewaySnapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].key, "k1");
        assert_eq!(loaded.analytics.hits, 4);
        assert_eq!(loaded.analytics.misses, 6);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = GatewaySnapshot::load(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_file_is_error_but_cold_start_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(GatewaySnapshot::load(&path).is_err());
        assert!(GatewaySnapshot::load_or_cold(&path).is_none());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut snapshot = GatewaySnapshot::new(vec![], AnalyticsCounters::default());
        snapshot.version = 99;
        snapshot.save(&path).unwrap();

        assert!(GatewaySnapshot::load(&path).is_err());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/snapshot.json");

        GatewaySnapshot::new(vec![], AnalyticsCounters::default())
            .save(&path)
            .unwrap();
        assert!(path.exists());
    }
}
