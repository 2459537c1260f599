use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SourceError;

/// Configuration applied to every source of a registry.
///
/// Missing fields in a JSON document fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfiguration {
    /// Stream buffer capacity per source in bits (default: 65536).
    /// Must be a non-zero multiple of 8.
    pub buffer_capacity_bits: usize,

    /// Largest single raw read requested from a device, in bytes (default: 512).
    pub read_chunk_bytes: usize,

    /// Feeder pause when the device had no data or the buffer is full (default: 10 ms).
    pub refill_interval_ms: u64,

    /// Raise `TIMEOUT` after this long without device data (None = wait forever).
    pub stall_timeout_ms: Option<u64>,

    /// How long `open()` waits for the connection to settle (default: 250 ms).
    /// Zero makes `open()` return while the source is still connecting.
    pub open_wait_ms: u64,
}

impl SourceConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity_bits == 0 || self.buffer_capacity_bits % 8 != 0 {
            return Err(format!(
                "buffer capacity must be a non-zero multiple of 8 bits, got {}",
                self.buffer_capacity_bits
            ));
        }
        if self.read_chunk_bytes == 0 {
            return Err("read chunk must be at least one byte".into());
        }
        if self.refill_interval_ms == 0 {
            return Err("refill interval must be positive".into());
        }
        if self.stall_timeout_ms == Some(0) {
            return Err("stall timeout must be positive when set".into());
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SourceError::ConfigFile(format!("failed to parse configuration: {}", e)))?;
        config.validate().map_err(SourceError::BadConfig)?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let json = fs::read_to_string(path).map_err(|e| {
            SourceError::ConfigFile(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    pub fn open_wait(&self) -> Duration {
        Duration::from_millis(self.open_wait_ms)
    }
}

impl Default for SourceConfiguration {
    fn default() -> Self {
        Self {
            buffer_capacity_bits: 65_536,
            read_chunk_bytes: 512,
            refill_interval_ms: 10,
            stall_timeout_ms: None,
            open_wait_ms: 250,
        }
    }
}
