//! Signal service configuration.
//!
//! Configuration is loaded from environment variables. Every knob has a
//! default, so the service runs with an empty environment.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default WebSocket/HTTP bind address for client signaling.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default grace period before host failover after a host disconnect.
pub const DEFAULT_HOST_FAILOVER_GRACE_SECONDS: u64 = 5;

/// Default per-connection outbound event channel capacity.
pub const DEFAULT_EVENT_CHANNEL_BUFFER: usize = 256;

/// Default instance id prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "signal";

/// Signal service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Client signaling bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Allowed CORS origins. Empty means allow any origin.
    pub allowed_origins: Vec<String>,

    /// Grace period in seconds before the deferred host-failover check
    /// fires after a host disconnect (default: 5).
    pub host_failover_grace_seconds: u64,

    /// Per-connection outbound channel capacity (default: 256).
    pub event_channel_buffer: usize,

    /// Unique identifier for this relay instance.
    pub instance_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIGNAL_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SIGNAL_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        // Comma-separated origin list; whitespace around entries is ignored.
        let allowed_origins = vars
            .get("SIGNAL_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let host_failover_grace_seconds = parse_var(
            vars,
            "SIGNAL_HOST_FAILOVER_GRACE_SECONDS",
            DEFAULT_HOST_FAILOVER_GRACE_SECONDS,
        )?;

        let event_channel_buffer = parse_var(
            vars,
            "SIGNAL_EVENT_CHANNEL_BUFFER",
            DEFAULT_EVENT_CHANNEL_BUFFER,
        )?;

        let instance_id = vars.get("SIGNAL_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000").to_string();
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            allowed_origins,
            host_failover_grace_seconds,
            event_channel_buffer,
            instance_id,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.clone(),
        }),
    }
}
