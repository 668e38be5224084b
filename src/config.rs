//! Notifier configuration.
//!
//! Loaded from YAML files and `NEIGHBOURS__*` environment overrides.
//!
//! ```yaml
//! notifier:
//!   call_timeout_ms: 10000
//!   max_concurrent_calls: 4
//! local_region:
//!   id: 6f9b3c1e-0000-4000-8000-000000000001
//!   external_host: sim1.example.org
//!   http_port: 9000
//! neighbours:
//!   - region: 6f9b3c1e-0000-4000-8000-000000000001
//!     neighbours:
//!       - id: 6f9b3c1e-0000-4000-8000-000000000002
//!         external_host: sim2.example.org
//!         http_port: 9000
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::region::RegionDescriptor;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "neighbours.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "NEIGHBOURS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "NEIGHBOURS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "NEIGHBOURS_LOG";

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub notifier: NotifierConfig,
    /// Region announced by the `region-announce` binary.
    pub local_region: Option<RegionDescriptor>,
    /// Static adjacency table used to seed the registry.
    pub neighbours: Vec<StaticNeighbours>,
}

/// How a notification round talks to neighbours.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Upper bound on one neighbour call, reply included.
    pub call_timeout_ms: u64,
    /// Neighbour calls in flight at once. 1 calls neighbours one at a time.
    pub max_concurrent_calls: usize,
    /// Drop repeated disclosures of the same region within one round.
    pub dedupe_disclosures: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_concurrent_calls: 1,
            dedupe_disclosures: false,
        }
    }
}

impl NotifierConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Set the per-call timeout. Sub-millisecond precision is dropped.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_concurrent_calls(mut self, calls: usize) -> Self {
        self.max_concurrent_calls = calls;
        self
    }

    pub fn with_dedupe_disclosures(mut self, dedupe: bool) -> Self {
        self.dedupe_disclosures = dedupe;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "notifier.call_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid(
                "notifier.max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Neighbour list of one region.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticNeighbours {
    /// Region id, as text.
    pub region: String,
    #[serde(default)]
    pub neighbours: Vec<RegionDescriptor>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `neighbours.yaml` in the current directory (if present)
    /// 2. File given by `path` (required if set)
    /// 3. File named by `NEIGHBOURS_CONFIG` (required if set)
    /// 4. `NEIGHBOURS__*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.notifier.validate()?;
        Ok(config)
    }
}
