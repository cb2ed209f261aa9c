//! Watermark persistence - the last processed event timestamp

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::events::parse_timestamp;

/// Persists the watermark as a single JSON document.
///
/// Not locked: only one pipeline instance may use a given state file.
pub struct WatermarkStore {
    path: PathBuf,
}

/// On-disk shape (`last_processed_state.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatermarkState {
    last_processed_timestamp: String,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the watermark. Missing, unreadable or malformed state yields
    /// the minimum representable instant.
    pub async fn load(&self) -> DateTime<Utc> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                info!(
                    "No readable state file at {} ({}). Starting from the beginning.",
                    self.path.display(),
                    e
                );
                return DateTime::<Utc>::MIN_UTC;
            }
        };

        let parsed = serde_json::from_str::<WatermarkState>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|state| {
                parse_timestamp(&state.last_processed_timestamp).ok_or_else(|| {
                    format!("unreadable timestamp {:?}", state.last_processed_timestamp)
                })
            });

        match parsed {
            Ok(ts) => ts,
            Err(e) => {
                info!(
                    "Error reading {}: {}. Starting from the beginning.",
                    self.path.display(),
                    e
                );
                DateTime::<Utc>::MIN_UTC
            }
        }
    }

    /// Overwrite the persisted watermark
    pub async fn save(&self, timestamp: DateTime<Utc>) -> anyhow::Result<()> {
        let state = WatermarkState {
            last_processed_timestamp: timestamp.to_rfc3339(),
        };
        let json = serde_json::to_string(&state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, json).await?;
        debug!("Saved watermark {} to {}", state.last_processed_timestamp, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_returns_minimum() {
        let dir = tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        store.save(ts).await.unwrap();
        assert_eq!(store.load().await, ts);

        std::fs::remove_file(store.path()).unwrap();
        assert_eq!(store.load().await, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_subsecond_precision_survives() {
        let dir = tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let ts = Utc.timestamp_millis_opt(1_728_360_623_613).unwrap();

        store.save(ts).await.unwrap();
        assert_eq!(store.load().await, ts);
    }

    #[tokio::test]
    async fn test_corrupt_file_returns_minimum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(WatermarkStore::new(&path).load().await, DateTime::<Utc>::MIN_UTC);

        std::fs::write(&path, r#"{"last_processed_timestamp": "yesterday"}"#).unwrap();
        assert_eq!(WatermarkStore::new(&path).load().await, DateTime::<Utc>::MIN_UTC);

        std::fs::write(&path, r#"{"other": 1}"#).unwrap();
        assert_eq!(WatermarkStore::new(&path).load().await, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = WatermarkStore::new(dir.path().join("nested").join("state.json"));
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();

        store.save(first).await.unwrap();
        store.save(second).await.unwrap();
        assert_eq!(store.load().await, second);
    }

    #[tokio::test]
    async fn test_feed_format_state_is_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"last_processed_timestamp": "2024-10-08 04:10:23.613000Z"}"#,
        )
        .unwrap();

        let expected = Utc.timestamp_millis_opt(1_728_360_623_613).unwrap();
        assert_eq!(WatermarkStore::new(&path).load().await, expected);
    }
}
