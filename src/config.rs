//! Operator configuration from the environment

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const WATCH_NAMESPACE: &str = "WATCH_NAMESPACE";
pub const HEALTH_BIND_ADDRESS: &str = "HEALTH_BIND_ADDRESS";
pub const RETRY_DELAY_SECS: &str = "RETRY_DELAY_SECS";
pub const FINALIZER_RETRY_DELAY_SECS: &str = "FINALIZER_RETRY_DELAY_SECS";
pub const RESYNC_INTERVAL_SECS: &str = "RESYNC_INTERVAL_SECS";
pub const POOL_MAX_SIZE: &str = "POOL_MAX_SIZE";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{variable} must be a non-negative integer, got '{value}'")]
    InvalidNumber { variable: &'static str, value: String },

    #[error("{variable} must be a socket address, got '{value}'")]
    InvalidAddress { variable: &'static str, value: String },

    #[error("{variable} must be greater than zero")]
    Zero { variable: &'static str },
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches the whole cluster
    pub namespace: Option<String>,
    pub health_address: SocketAddr,
    /// Delay before a failed reconcile is retried
    pub retry_delay: Duration,
    /// Delay before retrying after a failed finalizer update
    pub finalizer_retry_delay: Duration,
    /// Periodic re-check of converged resources; `None` waits for changes
    pub resync_interval: Option<Duration>,
    pub pool_max_size: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            health_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            retry_delay: Duration::from_secs(60),
            finalizer_retry_delay: Duration::from_secs(1),
            resync_interval: Some(Duration::from_secs(300)),
            pool_max_size: 4,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = get(WATCH_NAMESPACE);

        let health_address = match get(HEALTH_BIND_ADDRESS) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress {
                    variable: HEALTH_BIND_ADDRESS,
                    value,
                })?,
            None => defaults.health_address,
        };

        let seconds = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                Some(value) => parse_number(key, &value).map(Duration::from_secs),
                None => Ok(default),
            }
        };

        let retry_delay = seconds(RETRY_DELAY_SECS, defaults.retry_delay)?;
        let finalizer_retry_delay =
            seconds(FINALIZER_RETRY_DELAY_SECS, defaults.finalizer_retry_delay)?;
        let resync_interval = match get(RESYNC_INTERVAL_SECS) {
            Some(value) => match parse_number(RESYNC_INTERVAL_SECS, &value)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => defaults.resync_interval,
        };

        let pool_max_size = match get(POOL_MAX_SIZE) {
            Some(value) => {
                let size = parse_number(POOL_MAX_SIZE, &value)?;
                if size == 0 {
                    return Err(ConfigError::Zero {
                        variable: POOL_MAX_SIZE,
                    });
                }
                usize::try_from(size).map_err(|_| ConfigError::InvalidNumber {
                    variable: POOL_MAX_SIZE,
                    value,
                })?
            }
            None => defaults.pool_max_size,
        };

        Ok(Self {
            namespace,
            health_address,
            retry_delay,
            finalizer_retry_delay,
            resync_interval,
            pool_max_size,
        })
    }
}

fn parse_number(variable: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            variable,
            value: value.to_string(),
        })
}
