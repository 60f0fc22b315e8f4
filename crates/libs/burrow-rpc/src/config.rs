use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use burrow_wire::{DetailLevel, TypeResolution};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_MULTI_PART_BYTES: u64 = 256 * 1024 * 1024;
/// Smallest multi-part threshold a client accepts.
pub const MIN_MULTI_PART_THRESHOLD: usize = 2048;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub exception_detail: DetailLevel,
    pub multi_part: bool,
    pub max_multi_part_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            exception_detail: DetailLevel::FullDetails,
            multi_part: false,
            max_multi_part_bytes: DEFAULT_MAX_MULTI_PART_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub type_resolution: TypeResolution,
    pub multi_part_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: DEFAULT_SESSION_TIMEOUT.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl SessionConfig {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl RpcConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
