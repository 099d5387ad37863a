//! Registry module configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of the process registering with the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Application name reported to the registry.
    pub app_name: String,

    /// Data center this instance runs in.
    pub data_center: String,

    /// Availability zone within the data center.
    pub zone: String,

    /// Instance identifier; hostname when empty.
    pub instance_id: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            app_name: "meshgate".to_string(),
            data_center: String::new(),
            zone: String::new(),
            instance_id: String::new(),
        }
    }
}

/// Connection settings for the registry control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry server endpoints, `host:port`.
    pub endpoints: Vec<String>,

    /// Connect timeout towards registry servers, in seconds.
    pub connect_timeout_secs: u64,

    /// Heartbeat interval towards registry servers, in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            connect_timeout_secs: 10,
            heartbeat_interval_secs: 30,
        }
    }
}

impl RegistryConfig {
    /// Get the connect timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get the heartbeat interval as a Duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
