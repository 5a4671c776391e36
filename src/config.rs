use std::str::FromStr;
use std::time::Duration;

use crate::{GatewayError, GatewayResult};

/// Connection settings for [`PostgresDriver`](crate::PostgresDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long the pool waits for a free connection before giving up.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Read the configuration from the process environment, loading a `.env`
    /// file first if one exists.
    ///
    /// `DATABASE_URL` is required. `DATABASE_MAX_CONNECTIONS` and
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS` fall back to the defaults.
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GatewayResult<Self> {
        let url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GatewayError::Configuration("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(url);

        if let Some(raw) = lookup("DATABASE_MAX_CONNECTIONS") {
            let max_connections: u32 = parse_var("DATABASE_MAX_CONNECTIONS", &raw)?;
            if max_connections == 0 {
                return Err(GatewayError::Configuration(
                    "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
                ));
            }
            config.max_connections = max_connections;
        }

        if let Some(raw) = lookup("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            let secs: u64 = parse_var("DATABASE_ACQUIRE_TIMEOUT_SECS", &raw)?;
            config.acquire_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> GatewayResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| GatewayError::Configuration(format!("{key} has invalid value {raw:?}")))
}
