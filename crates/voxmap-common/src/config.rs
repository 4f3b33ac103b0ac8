use crate::error::VoxmapError;
use crate::types::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A config file type. `validate` runs after loading and rejects values the
/// binaries can't work with.
pub trait ConfigFile: DeserializeOwned + Default {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Environment variable consulted when no config path is passed on the command line
pub const CONFIG_ENV_VAR: &str = "VOXMAP_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the chunk stream listens on
    pub listen_address: String,
    /// Address of the HTTP chunk upload endpoint
    pub ingest_address: String,
    /// Frames buffered per client before sends start waiting
    pub outbound_queue_capacity: usize,
    pub send_timeout_ms: u64,
    pub max_frame_length: usize,
    pub console_enabled: bool,
    pub log_level: String,
}

impl ServerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8081".to_owned(),
            ingest_address: "127.0.0.1:8082".to_owned(),
            outbound_queue_capacity: 128,
            send_timeout_ms: 5000,
            max_frame_length: 256 * 1024,
            console_enabled: true,
            log_level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub server_address: String,
    /// Half-width of the initial region, in chunks
    pub initial_region_radius: u32,
    pub see_through_water: bool,
    pub worker_threads: usize,
    pub projection_queue_capacity: usize,
    /// Grow the region instead of dropping chunks that land outside it
    pub auto_grow_region: bool,
    /// Upper bound on either region side, in chunks
    pub max_region_side: usize,
    pub frame_rate: u32,
    pub max_frame_length: usize,
    pub log_level: String,
}

impl ViewerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl ConfigFile for ServerConfig {}

impl ConfigFile for ViewerConfig {
    fn validate(&self) -> Result<()> {
        let initial_side = self.initial_region_radius as u64 * 2;
        if initial_side > self.max_region_side as u64 || self.initial_region_radius > i32::MAX as u32 / 2 {
            return Err(VoxmapError::ConfigError(format!(
                "initial_region_radius {} doesn't fit max_region_side {}",
                self.initial_region_radius, self.max_region_side
            )));
        }
        Ok(())
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:8081".to_owned(),
            initial_region_radius: 64,
            see_through_water: true,
            worker_threads: 2,
            projection_queue_capacity: 64,
            auto_grow_region: false,
            max_region_side: 512,
            frame_rate: 60,
            max_frame_length: 256 * 1024,
            log_level: "info".to_owned(),
        }
    }
}

/// Loads and validates a JSON config file. No path means defaults; fields missing
/// from the file also fall back to their defaults.
pub fn load_config<T: ConfigFile>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };

    let contents = std::fs::read_to_string(path).map_err(|err| {
        VoxmapError::ConfigError(format!("Can't read {}: {}", path.display(), err))
    })?;
    let config: T = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Config path from the first CLI argument, else from `VOXMAP_CONFIG`
pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}
