//! Application configuration.
//!
//! Loaded from YAML files and `VOTESHARE`-prefixed environment variables.
//! Keys follow the relay's published config surface (`mode`, `redis.host`,
//! `poll-interval`, ...).

mod broker;
mod mode;

pub use broker::RedisConfig;
pub use mode::ListenerMode;

use std::time::Duration;

use serde::Deserialize;
use crate::buffer::DEFAULT_CAPACITY;
use crate::error::Result;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "VOTESHARE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "VOTESHARE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "VOTESHARE_LOG";

/// Length of one scheduler tick.
pub const TICK: Duration = Duration::from_millis(50);
/// Default producer flush period, in ticks.
pub const DEFAULT_POLL_INTERVAL: u64 = 100;
/// Lowest poll interval accepted without `allow-unsafe-interval`, in ticks.
pub const MIN_SAFE_POLL_INTERVAL: u64 = 60;
/// Default delay before the first producer tick, in ticks.
pub const DEFAULT_INITIAL_DELAY: u64 = 60;

/// Convert a tick count to wall-clock time.
pub fn ticks(count: u64) -> Duration {
    Duration::from_millis(count.saturating_mul(TICK.as_millis() as u64))
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// BROADCAST or RECEIVER. Unrecognized values select RECEIVER.
    #[serde(deserialize_with = "mode::lenient_mode")]
    pub mode: ListenerMode,
    /// Broker connection settings.
    pub redis: RedisConfig,
    /// Producer flush period, in ticks.
    pub poll_interval: u64,
    /// Disables the 60-tick floor on `poll_interval`.
    pub allow_unsafe_interval: bool,
    /// Delay before the first producer tick, in ticks.
    pub initial_delay: u64,
    /// Number of votes the producer buffers between ticks.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ListenerMode::default(),
            redis: RedisConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            allow_unsafe_interval: false,
            initial_delay: DEFAULT_INITIAL_DELAY,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///
    /// Environment keys are converted to kebab-case, so
    /// `VOTESHARE_REDIS__MAX_IDLE` overrides `redis.max-idle`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Case, Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .convert_case(Case::Kebab)
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Producer flush period in ticks, after applying the safety floor.
    ///
    /// Values at or below [`MIN_SAFE_POLL_INTERVAL`] are raised to it unless
    /// `allow_unsafe_interval` is set. A zero interval is always raised to
    /// one tick.
    pub fn effective_poll_interval(&self) -> u64 {
        if self.poll_interval_clamped() {
            return MIN_SAFE_POLL_INTERVAL;
        }
        self.poll_interval.max(1)
    }

    /// Whether the safety floor overrides the configured poll interval.
    pub fn poll_interval_clamped(&self) -> bool {
        self.poll_interval <= MIN_SAFE_POLL_INTERVAL && !self.allow_unsafe_interval
    }
}
