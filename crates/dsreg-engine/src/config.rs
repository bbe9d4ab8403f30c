//! Engine configuration.
//!
//! Resolved in three layers: built-in defaults, an optional YAML file named by
//! `DSREG_CONFIG`, then individual `DSREG_*` environment overrides. Durations
//! are expressed in milliseconds in both the file and the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dsreg_core::WorkerId;
use serde::Deserialize;

use crate::backoff::RetryPolicy;

/// A lease must outlast this many call timeouts, so a call that completes at
/// its deadline is still saved under the lease that started it.
pub const LEASE_TO_CALL_RATIO: u32 = 2;

/// Runtime options of the claim loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause between ticks when the last claim was not a full batch.
    pub tick_interval: Duration,
    /// Maximum entities claimed per tick.
    pub batch_size: usize,
    /// How long a claim protects an entity from other workers.
    pub lease_timeout: Duration,
    /// Attempts permitted per state before the entity is failed.
    pub max_attempts: u32,
    /// Delay after the first transient failure.
    pub base_backoff: Duration,
    /// Upper bound on any single retry delay.
    pub max_backoff: Duration,
    /// Deadline for a single collaborator call.
    pub call_timeout: Duration,
    /// Identity written into leases claimed by this instance.
    pub worker_id: WorkerId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            batch_size: 10,
            lease_timeout: Duration::from_secs(60),
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            call_timeout: Duration::from_secs(30),
            worker_id: WorkerId::generate(),
        }
    }
}

/// Shape of the optional YAML file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    tick_interval_ms: Option<u64>,
    batch_size: Option<usize>,
    lease_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    worker_id: Option<String>,
}

impl EngineConfig {
    /// Load configuration from `DSREG_CONFIG` and the process environment.
    ///
    /// Variables:
    /// - `DSREG_CONFIG` (path to a YAML file, optional)
    /// - `DSREG_TICK_INTERVAL_MS`, `DSREG_BATCH_SIZE`, `DSREG_LEASE_TIMEOUT_MS`,
    ///   `DSREG_MAX_ATTEMPTS`, `DSREG_BASE_BACKOFF_MS`, `DSREG_MAX_BACKOFF_MS`,
    ///   `DSREG_CALL_TIMEOUT_MS`, `DSREG_WORKER_ID`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("DSREG_CONFIG") {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the values in a YAML file. Not validated.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        if let Some(ms) = file.tick_interval_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(n) = file.batch_size {
            config.batch_size = n;
        }
        if let Some(ms) = file.lease_timeout_ms {
            config.lease_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = file.max_attempts {
            config.max_attempts = n;
        }
        if let Some(ms) = file.base_backoff_ms {
            config.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_backoff_ms {
            config.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.call_timeout_ms {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(id) = file.worker_id {
            config.worker_id = worker_id("worker_id", id)?;
        }
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64, _>(lookup, "DSREG_TICK_INTERVAL_MS")? {
            self.tick_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(lookup, "DSREG_BATCH_SIZE")? {
            self.batch_size = n;
        }
        if let Some(ms) = parse_var::<u64, _>(lookup, "DSREG_LEASE_TIMEOUT_MS")? {
            self.lease_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(lookup, "DSREG_MAX_ATTEMPTS")? {
            self.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64, _>(lookup, "DSREG_BASE_BACKOFF_MS")? {
            self.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(lookup, "DSREG_MAX_BACKOFF_MS")? {
            self.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(lookup, "DSREG_CALL_TIMEOUT_MS")? {
            self.call_timeout = Duration::from_millis(ms);
        }
        if let Some(id) = lookup("DSREG_WORKER_ID") {
            self.worker_id = worker_id("DSREG_WORKER_ID", id)?;
        }
        Ok(())
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be > 0".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick_interval must be > 0".into()));
        }
        let min_lease = self.call_timeout.saturating_mul(LEASE_TO_CALL_RATIO);
        if self.lease_timeout < min_lease {
            return Err(ConfigError::Invalid(format!(
                "lease_timeout ({:?}) must be at least {LEASE_TO_CALL_RATIO}x call_timeout ({:?})",
                self.lease_timeout, self.call_timeout
            )));
        }
        if self.base_backoff > self.max_backoff {
            return Err(ConfigError::Invalid(format!(
                "base_backoff ({:?}) exceeds max_backoff ({:?})",
                self.base_backoff, self.max_backoff
            )));
        }
        Ok(())
    }

    /// The retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_backoff, self.max_backoff)
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

fn worker_id(var: &str, raw: String) -> Result<WorkerId, ConfigError> {
    WorkerId::new(raw.clone()).map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw,
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}
