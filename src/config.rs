//! Per-instance transport configuration.
//!
//! Every `Client` and `Server` owns its own copy; there is no process-wide
//! state. The struct deserializes from TOML with a default for every field,
//! so a config file only needs to name what it changes.

use crate::error::Error;
use serde::Deserialize;
use std::time::Duration;

/// Knobs shared by clients and servers.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Disable Nagle's algorithm on every socket.
    #[serde(default = "default_no_delay")]
    pub no_delay: bool,
    /// Maximum number of simultaneous server connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Queue depth above which a warning is logged.
    #[serde(default = "default_queue_warning_threshold")]
    pub queue_warning_threshold: usize,
    /// Minimum number of seconds between two warnings for the same queue.
    #[serde(default = "default_queue_warning_interval_secs")]
    pub queue_warning_interval_secs: u64,
    /// Socket write timeout in milliseconds (0 = block forever).
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Client connect timeout in milliseconds (0 = OS default).
    #[serde(default)]
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            no_delay: default_no_delay(),
            max_connections: default_max_connections(),
            queue_warning_threshold: default_queue_warning_threshold(),
            queue_warning_interval_secs: default_queue_warning_interval_secs(),
            send_timeout_ms: default_send_timeout_ms(),
            connect_timeout_ms: 0,
        }
    }
}

fn default_no_delay() -> bool {
    true
}

fn default_max_connections() -> usize {
    usize::MAX
}

// With ~20 byte messages, 100k queued entries is about 2 MB.
fn default_queue_warning_threshold() -> usize {
    100_000
}

fn default_queue_warning_interval_secs() -> u64 {
    10
}

fn default_send_timeout_ms() -> u64 {
    5000
}

impl TransportConfig {
    /// Parse a configuration table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    pub(crate) fn queue_warning_interval(&self) -> Duration {
        Duration::from_secs(self.queue_warning_interval_secs)
    }

    pub(crate) fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }

    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert!(config.no_delay);
        assert_eq!(config.max_connections, usize::MAX);
        assert_eq!(config.queue_warning_threshold, 100_000);
        assert_eq!(config.queue_warning_interval(), Duration::from_secs(10));
        assert_eq!(config.send_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            no_delay = false
            max_connections = 64
            queue_warning_threshold = 500
            send_timeout_ms = 0
            connect_timeout_ms = 250
        "#;

        let config = TransportConfig::from_toml_str(toml_str).unwrap();
        assert!(!config.no_delay);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.queue_warning_threshold, 500);
        assert_eq!(config.queue_warning_interval_secs, 10);
        assert_eq!(config.send_timeout(), None);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TransportConfig::from_toml_str("").unwrap();
        assert!(config.no_delay);
        assert_eq!(config.send_timeout_ms, 5000);
    }

    #[test]
    fn test_toml_type_error() {
        let result = TransportConfig::from_toml_str("max_connections = \"lots\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
