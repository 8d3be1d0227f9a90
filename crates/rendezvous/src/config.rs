//! Rendezvous server configuration.
//!
//! Configuration is loaded from environment variables; every option
//! has a sensible default, and an unparseable value falls back to the
//! default. Durations are given in integer milliseconds.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default HTTP/WebSocket listen port.
pub const DEFAULT_HTTP_PORT: u16 = 5980;

/// Default UDP listen port for mediation datagrams.
pub const DEFAULT_UDP_PORT: u16 = 5990;

/// Default capture deadline: how long the mediator waits for every
/// member's datagram before aborting (5 minutes).
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 300_000;

/// Default reminder interval: how often uncaptured members are asked
/// again to emit their datagram.
pub const DEFAULT_CONNECT_REQUEST_INTERVAL_MS: u64 = 10_000;

/// Default peer-connect deadline: how long the mediator waits for
/// every member's connectivity report before aborting (5 minutes).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 300_000;

/// Rendezvous server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket listen port. Port 0 binds an ephemeral port.
    pub http_port: u16,

    /// UDP listen port. Port 0 binds an ephemeral port.
    pub udp_port: u16,

    /// Capture deadline `T_capture` in milliseconds.
    pub capture_timeout_ms: u64,

    /// Reminder interval `R` in milliseconds.
    pub connect_request_interval_ms: u64,

    /// Peer-connect deadline `T_connect` in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
            connect_request_interval_ms: DEFAULT_CONNECT_REQUEST_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        Self {
            http_port: parse_or(vars, "ORION_HTTP_PORT", defaults.http_port),
            udp_port: parse_or(vars, "ORION_UDP_PORT", defaults.udp_port),
            capture_timeout_ms: parse_or(
                vars,
                "ORION_PTPM_SERVER_CONNECT_TIMEOUT_MS",
                defaults.capture_timeout_ms,
            ),
            connect_request_interval_ms: parse_or(
                vars,
                "ORION_PTPM_CONNECT_REQUEST_INTERVAL_MS",
                defaults.connect_request_interval_ms,
            ),
            connect_timeout_ms: parse_or(
                vars,
                "ORION_PTPM_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            ),
        }
    }

    /// Capture deadline as a [`Duration`].
    #[must_use]
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Reminder interval as a [`Duration`].
    #[must_use]
    pub fn connect_request_interval(&self) -> Duration {
        Duration::from_millis(self.connect_request_interval_ms)
    }

    /// Peer-connect deadline as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_or<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> T {
    vars.get(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}
