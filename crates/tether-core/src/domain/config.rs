//! PoolConfig - 接続プールの設定レコード
//!
//! Pure data handed to the pool collaborator. The builder validates at
//! `build()` time so a broken harness fails before any pool is started.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the pool picks a connection for the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    Random,
    LeastLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub pipelining_enabled: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub pool_selection_strategy: SelectionStrategy,
    #[serde(default = "default_connect_timeout", with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(default)]
    pub prioritize_latest_request: bool,
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl PoolConfig {
    pub fn builder(host: impl Into<String>, port: u16) -> PoolConfigBuilder {
        PoolConfigBuilder::new(host, port)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder for [`PoolConfig`].
///
/// ```ignore
/// let config = PoolConfig::builder("127.0.0.1", 6379)
///     .pool_size(4)
///     .pipelining(true)
///     .build()?;
/// ```
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            config: PoolConfig {
                host: host.into(),
                port,
                pipelining_enabled: false,
                pool_size: default_pool_size(),
                pool_selection_strategy: SelectionStrategy::default(),
                connect_timeout: default_connect_timeout(),
                prioritize_latest_request: false,
            },
        }
    }

    pub fn pipelining(mut self, enabled: bool) -> Self {
        self.config.pipelining_enabled = enabled;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn selection_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.config.pool_selection_strategy = strategy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn prioritize_latest_request(mut self, enabled: bool) -> Self {
        self.config.prioritize_latest_request = enabled;
        self
    }

    pub fn build(self) -> Result<PoolConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Address of the server the pool talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
