//! Registry module bootstrap.

use std::sync::{Arc, Mutex};

use tracing::info;

use super::client::{ClusterManager, ClusterRepublisher, RegistryClient, ServerManager};
use super::config::{RegistryConfig, SystemConfig};
use super::error::RegistryResult;

/// Bootstrap context for the registry module.
///
/// Holds the "module started" state behind its own lock instead of a
/// process-wide global, so independent contexts can be constructed per
/// test. `start` is idempotent: the first call initializes the module
/// and every later call returns the same client without re-initializing.
#[derive(Default)]
pub struct RegistryContext {
    started: Mutex<Option<Arc<RegistryClient>>>,
}

impl RegistryContext {
    /// Create a context with the module not yet started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the module has been started in this context.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.lock().unwrap().is_some()
    }

    /// Start the registry module, or return the already-running client.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry configuration is invalid; the
    /// context stays unstarted and a later call may retry.
    pub fn start(
        &self,
        system: &SystemConfig,
        registry: &RegistryConfig,
    ) -> RegistryResult<Arc<RegistryClient>> {
        let mut started = self.started.lock().unwrap();

        if let Some(client) = started.as_ref() {
            return Ok(Arc::clone(client));
        }

        let servers = Arc::new(ServerManager::new(registry)?);
        let clusters = Arc::new(ClusterManager::new());

        // Registry servers flow into the cluster manager like any other
        // discovered upstream.
        servers.register_listener(Arc::new(ClusterRepublisher::new(Arc::clone(&clusters))));
        servers.update_servers(servers.servers());

        let client = Arc::new(RegistryClient::new(system.clone(), servers, clusters));
        *started = Some(Arc::clone(&client));

        info!(app = %system.app_name, "registry module started");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::client::REGISTRY_SERVER_CLUSTER;
    use crate::registry::error::RegistryError;

    fn configs() -> (SystemConfig, RegistryConfig) {
        (
            SystemConfig::default(),
            RegistryConfig {
                endpoints: vec!["10.0.0.1:9600".to_string()],
                ..RegistryConfig::default()
            },
        )
    }

    #[test]
    fn test_start_is_idempotent() {
        let (system, registry) = configs();
        let context = RegistryContext::new();
        assert!(!context.is_started());

        let first = context.start(&system, &registry).unwrap();
        assert!(context.is_started());

        let second = context.start(&system, &registry).unwrap();
        // Same client, not a re-initialized one.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_start_publishes_registry_servers() {
        let (system, registry) = configs();
        let context = RegistryContext::new();
        let client = context.start(&system, &registry).unwrap();

        let endpoints = client.clusters().endpoints(REGISTRY_SERVER_CLUSTER);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].address, "10.0.0.1:9600".parse().unwrap());
    }

    #[test]
    fn test_failed_start_leaves_context_unstarted() {
        let context = RegistryContext::new();
        let err = context
            .start(&SystemConfig::default(), &RegistryConfig::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoEndpoints));
        assert!(!context.is_started());
    }

    #[test]
    fn test_independent_contexts_do_not_share_state() {
        let (system, registry) = configs();
        let a = RegistryContext::new();
        let b = RegistryContext::new();

        a.start(&system, &registry).unwrap();
        assert!(a.is_started());
        assert!(!b.is_started());
    }
}
