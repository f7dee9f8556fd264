use crate::config::ManagerConfig;
use crate::error::{Error, Result};

/// Full configuration validation.
///
/// Parsing only checks shape; this checks values the rest of the system
/// relies on.
pub fn validate_config(config: &ManagerConfig) -> Result<()> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("dataDir must not be empty".to_string()));
    }

    if config.default_heap_mb == 0 {
        return Err(Error::ConfigInvalid(
            "defaultHeapMb must be greater than zero".to_string(),
        ));
    }

    if config.monitor_tick_ms == 0 {
        return Err(Error::ConfigInvalid(
            "monitorTickMs must be greater than zero".to_string(),
        ));
    }

    if config.resource_interval_ms < config.monitor_tick_ms {
        return Err(Error::ConfigInvalid(
            "resourceIntervalMs must not be shorter than monitorTickMs".to_string(),
        ));
    }

    Ok(())
}
