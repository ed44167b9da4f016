//! Gateway configuration
//!
//! Environment-driven settings with sane defaults for local development.

use std::env;
use std::time::Duration;

/// Default bind address for the WebSocket listener
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default idle time before a heartbeat ping is sent
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the TCP listener binds to
    pub bind_addr: String,
    /// How long a connection may stay silent before we probe it with a
    /// heartbeat ping. Idling never disconnects anyone by itself.
    pub idle_timeout: Duration,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// `TASKWIRE_ADDR` sets the bind address and
    /// `TASKWIRE_IDLE_TIMEOUT_SECS` the heartbeat interval; anything unset
    /// or unparsable falls back to the defaults.
    pub fn from_env() -> Self {
        let bind_addr =
            env::var("TASKWIRE_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let idle_timeout = env::var("TASKWIRE_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);

        Self {
            bind_addr,
            idle_timeout,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
