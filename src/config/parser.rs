use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the server manager.
///
/// All fields are optional in the JSON document; missing fields fall back
/// to the defaults below. Paths for individual instances, the registry
/// snapshot and the build workspace are all derived from `data_dir`.
///
/// # JSON Schema
///
/// ```json
/// {
///   "dataDir": "/var/lib/mc-manager",
///   "defaultHeapMb": 1024,
///   "monitorTickMs": 1000,
///   "resourceIntervalMs": 5000,
///   "stopTimeoutSecs": 30,
///   "catalogManifestUrl": "https://example.com/versions.json"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Root directory for all managed data (instances, snapshot, builds).
    pub data_dir: PathBuf,

    /// Heap budget in megabytes handed to newly created servers (Xmx/Xms).
    #[serde(default = "default_heap_mb")]
    pub default_heap_mb: u32,

    /// Monitor loop tick in milliseconds; exited processes are reaped at
    /// this cadence.
    #[serde(default = "default_monitor_tick_ms")]
    pub monitor_tick_ms: u64,

    /// Resource sampling sub-cadence in milliseconds. Snapshots are
    /// refreshed and pushed to subscribers at this interval.
    #[serde(default = "default_resource_interval_ms")]
    pub resource_interval_ms: u64,

    /// How long a graceful stop may take before the process is
    /// hard-terminated during reconciliation.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// URL of the JSON version manifest the catalog is populated from.
    #[serde(default)]
    pub catalog_manifest_url: Option<String>,
}

fn default_heap_mb() -> u32 {
    1024
}

fn default_monitor_tick_ms() -> u64 {
    1000
}

fn default_resource_interval_ms() -> u64 {
    5000
}

fn default_stop_timeout_secs() -> u64 {
    30
}

impl ManagerConfig {
    /// Creates a configuration with defaults rooted at the given data dir.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_heap_mb: default_heap_mb(),
            monitor_tick_ms: default_monitor_tick_ms(),
            resource_interval_ms: default_resource_interval_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
            catalog_manifest_url: None,
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigInvalid(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigInvalid(format!("Failed to parse JSON config: {}", e)))
    }

    /// Directory holding one subdirectory per server instance.
    pub fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    /// Location of the persisted registry snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("servers.json")
    }

    /// Workspace directory for BuildTools runs.
    pub fn build_dir(&self) -> PathBuf {
        self.data_dir.join("build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = ManagerConfig::parse_from_str(r#"{ "dataDir": "/tmp/mc" }"#).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/mc"));
        assert_eq!(config.default_heap_mb, 1024);
        assert_eq!(config.monitor_tick_ms, 1000);
        assert_eq!(config.resource_interval_ms, 5000);
        assert_eq!(config.stop_timeout_secs, 30);
        assert!(config.catalog_manifest_url.is_none());
        assert_eq!(config.servers_dir(), PathBuf::from("/tmp/mc/servers"));
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/mc/servers.json"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = ManagerConfig::parse_from_str(
            r#"{
                "dataDir": "/srv/mc",
                "defaultHeapMb": 2048,
                "monitorTickMs": 500,
                "resourceIntervalMs": 2000,
                "stopTimeoutSecs": 10,
                "catalogManifestUrl": "https://example.com/versions.json"
            }"#,
        )
        .unwrap();

        assert_eq!(config.default_heap_mb, 2048);
        assert_eq!(config.monitor_tick_ms, 500);
        assert_eq!(
            config.catalog_manifest_url.as_deref(),
            Some("https://example.com/versions.json")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ManagerConfig::parse_from_str("not json").is_err());
    }
}
