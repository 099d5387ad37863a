//! Connection engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{ConnectionError, ConnectionResult};

/// Tunables for a single connection's IO engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Read buffer capacity in bytes.
    pub read_buffer_size: usize,

    /// Maximum number of buffers queued on the write path before
    /// writers are told to back off.
    pub write_queue_depth: usize,

    /// Bound on draining the write queue during a flushing close, in seconds.
    pub drain_timeout_secs: u64,

    /// TCP nodelay (disable Nagle's algorithm) on outbound connections.
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 16384,
            write_queue_depth: 512,
            drain_timeout_secs: 5,
            tcp_nodelay: true,
        }
    }
}

impl ConnectionConfig {
    /// Get the drain deadline as a Duration.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Reject values the IO engine cannot run with.
    ///
    /// Deserialization accepts any numbers; call this after loading a
    /// configuration from an external source.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidConfig`] for a zero buffer size
    /// or queue depth.
    pub fn validate(&self) -> ConnectionResult<()> {
        if self.read_buffer_size == 0 {
            return Err(ConnectionError::InvalidConfig {
                reason: "read_buffer_size must be at least 1".to_string(),
            });
        }
        if self.write_queue_depth == 0 {
            return Err(ConnectionError::InvalidConfig {
                reason: "write_queue_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.read_buffer_size, 16384);
        assert_eq!(config.write_queue_depth, 512);
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"write_queue_depth": 64}"#).unwrap();
        assert_eq!(config.write_queue_depth, 64);
        assert_eq!(config.read_buffer_size, 16384);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"write_queue_depth": 0}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectionError::InvalidConfig { .. })
        ));

        let config: ConnectionConfig =
            serde_json::from_str(r#"{"read_buffer_size": 0}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectionError::InvalidConfig { .. })
        ));

        assert!(ConnectionConfig::default().validate().is_ok());
    }
}
