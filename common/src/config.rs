//! Runtime configuration, loaded from a TOML file with flag overrides on top.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::Endpoint;

pub const DEFAULT_PORT: u16 = 8000;
/// Upper bound for `scanConcurrency`; a /24 sweep never has more candidates.
pub const MAX_SCAN_CONCURRENCY: usize = 254;
const CONFIG_FILE: &str = "linkr.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which delivery failures put an endpoint on the refused list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefusalPolicy {
    /// Any failed verification or write marks the endpoint refused.
    #[default]
    AnyFailure,
    /// Only an active refusal by the peer is remembered; silent hosts are
    /// skipped for the current send but tried again on the next one.
    ActiveRefusalOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// TCP port every endpoint listens on.
    pub port: u16,
    /// Bound on a single connection attempt.
    pub probe_timeout_ms: u64,
    /// Bound on a full subnet sweep.
    pub scan_timeout_ms: u64,
    /// Overall deadline for `establish`, across all retries.
    pub establish_timeout_ms: u64,
    /// Number of establishment rounds before giving up.
    pub max_retries: u32,
    /// Pause between two establishment rounds.
    pub retry_delay_ms: u64,
    /// Maximum probes in flight during a sweep.
    pub scan_concurrency: usize,
    pub manual_override_enabled: bool,
    pub manual_address: Option<String>,
    /// Fall back to subnet discovery when the manual address is unreachable.
    pub manual_fallback: bool,
    pub refusal_policy: RefusalPolicy,
    /// Pins the subnet anchor instead of asking the operating system.
    pub gateway: Option<Ipv4Addr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            probe_timeout_ms: 1_000,
            scan_timeout_ms: 5_000,
            establish_timeout_ms: 20_000,
            max_retries: 3,
            retry_delay_ms: 1_500,
            scan_concurrency: 64,
            manual_override_enabled: false,
            manual_address: None,
            manual_fallback: false,
            refusal_policy: RefusalPolicy::default(),
            gateway: None,
        }
    }
}

impl Config {
    /// Loads `path`, or the platform default location when `None`.
    ///
    /// A missing file is not an error and yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("maxRetries must be at least 1".into()));
        }
        if !(1..=MAX_SCAN_CONCURRENCY).contains(&self.scan_concurrency) {
            return Err(ConfigError::Invalid(format!(
                "scanConcurrency must be between 1 and {MAX_SCAN_CONCURRENCY}"
            )));
        }

        let timeouts = [
            ("probeTimeoutMs", self.probe_timeout_ms),
            ("scanTimeoutMs", self.scan_timeout_ms),
            ("establishTimeoutMs", self.establish_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }

        Ok(())
    }

    /// The manual endpoint, when the override is switched on and filled in.
    pub fn manual_override(&self) -> Option<Endpoint> {
        if !self.manual_override_enabled {
            return None;
        }
        self.manual_address
            .as_deref()
            .map(|addr| Endpoint::new(addr, self.port))
            .filter(|ep| !ep.is_empty())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn establish_timeout(&self) -> Duration {
        Duration::from_millis(self.establish_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

pub fn default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "linkr", "linkr")
}
