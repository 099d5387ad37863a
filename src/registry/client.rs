//! Registry client, server topology, and cluster publication.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use super::config::{RegistryConfig, SystemConfig};
use super::error::{RegistryError, RegistryResult};

/// One discovered upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The endpoint's address.
    pub address: SocketAddr,

    /// Relative load-balancing weight.
    pub weight: u32,
}

impl Endpoint {
    /// Create an endpoint with the default weight.
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self { address, weight: 1 }
    }
}

/// Observer of registry server topology changes.
pub trait ServerChangeListener: Send + Sync {
    /// Called with the full server list after every topology change.
    fn on_server_change(&self, servers: &[SocketAddr]);
}

/// Tracks the registry server topology and notifies listeners on change.
pub struct ServerManager {
    servers: RwLock<Vec<SocketAddr>>,
    listeners: Mutex<Vec<Arc<dyn ServerChangeListener>>>,
}

impl std::fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("servers", &self.servers)
            .finish_non_exhaustive()
    }
}

impl ServerManager {
    /// Build a manager seeded with the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration has no endpoints or an
    /// endpoint fails to parse.
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        if config.endpoints.is_empty() {
            return Err(RegistryError::NoEndpoints);
        }

        let mut servers = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let addr: SocketAddr =
                endpoint
                    .parse()
                    .map_err(|e: std::net::AddrParseError| RegistryError::InvalidEndpoint {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    })?;
            servers.push(addr);
        }

        Ok(Self {
            servers: RwLock::new(servers),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Register a topology change listener.
    pub fn register_listener(&self, listener: Arc<dyn ServerChangeListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Replace the server list and notify every listener.
    pub fn update_servers(&self, servers: Vec<SocketAddr>) {
        debug!(count = servers.len(), "registry server topology changed");
        *self.servers.write().unwrap() = servers.clone();

        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_server_change(&servers);
        }
    }

    /// Snapshot of the current server list.
    #[must_use]
    pub fn servers(&self) -> Vec<SocketAddr> {
        self.servers.read().unwrap().clone()
    }
}

/// In-memory cluster manager: cluster name to endpoint set.
#[derive(Default)]
pub struct ClusterManager {
    clusters: RwLock<HashMap<String, Vec<Endpoint>>>,
}

impl ClusterManager {
    /// Create an empty cluster manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the endpoint set for a cluster, replacing any previous set.
    pub fn publish(&self, cluster: impl Into<String>, endpoints: Vec<Endpoint>) {
        let cluster = cluster.into();
        debug!(cluster = %cluster, count = endpoints.len(), "publishing cluster endpoints");
        self.clusters.write().unwrap().insert(cluster, endpoints);
    }

    /// Endpoints currently published for a cluster.
    #[must_use]
    pub fn endpoints(&self, cluster: &str) -> Vec<Endpoint> {
        self.clusters
            .read()
            .unwrap()
            .get(cluster)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of known clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.clusters.read().unwrap().len()
    }
}

/// Republishes registry server topology into the cluster manager, so the
/// data plane can reach the control plane through the same routing path
/// as any other upstream.
pub(crate) struct ClusterRepublisher {
    clusters: Arc<ClusterManager>,
}

/// Cluster name under which registry servers are published.
pub const REGISTRY_SERVER_CLUSTER: &str = "registry-servers";

impl ClusterRepublisher {
    pub(crate) fn new(clusters: Arc<ClusterManager>) -> Self {
        Self { clusters }
    }
}

impl ServerChangeListener for ClusterRepublisher {
    fn on_server_change(&self, servers: &[SocketAddr]) {
        let endpoints = servers.iter().copied().map(Endpoint::new).collect();
        self.clusters.publish(REGISTRY_SERVER_CLUSTER, endpoints);
    }
}

/// Client for the service registry control plane.
///
/// Holds the server topology and the cluster manager that discovered
/// endpoints are published into.
pub struct RegistryClient {
    system: SystemConfig,
    servers: Arc<ServerManager>,
    clusters: Arc<ClusterManager>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("servers", &self.servers)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    pub(crate) fn new(
        system: SystemConfig,
        servers: Arc<ServerManager>,
        clusters: Arc<ClusterManager>,
    ) -> Self {
        info!(app = %system.app_name, "registry client created");
        Self {
            system,
            servers,
            clusters,
        }
    }

    /// The identity this client registers under.
    #[must_use]
    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    /// The registry server topology.
    #[must_use]
    pub fn servers(&self) -> &Arc<ServerManager> {
        &self.servers
    }

    /// The cluster manager discovered endpoints are published into.
    #[must_use]
    pub fn clusters(&self) -> &Arc<ClusterManager> {
        &self.clusters
    }

    /// Publish endpoints discovered for an upstream service.
    pub fn publish_endpoints(&self, cluster: impl Into<String>, endpoints: Vec<Endpoint>) {
        self.clusters.publish(cluster, endpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_config(endpoints: &[&str]) -> RegistryConfig {
        RegistryConfig {
            endpoints: endpoints.iter().map(|s| (*s).to_string()).collect(),
            ..RegistryConfig::default()
        }
    }

    #[test]
    fn test_server_manager_rejects_empty_config() {
        let err = ServerManager::new(&RegistryConfig::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NoEndpoints));
    }

    #[test]
    fn test_server_manager_rejects_bad_endpoint() {
        let err = ServerManager::new(&registry_config(&["not-an-addr"])).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_topology_change_notifies_listeners() {
        struct Counting(AtomicUsize);
        impl ServerChangeListener for Counting {
            fn on_server_change(&self, servers: &[SocketAddr]) {
                assert_eq!(servers.len(), 2);
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let manager = ServerManager::new(&registry_config(&["10.0.0.1:9600"])).unwrap();
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        manager.register_listener(listener.clone());

        manager.update_servers(vec![
            "10.0.0.1:9600".parse().unwrap(),
            "10.0.0.2:9600".parse().unwrap(),
        ]);

        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(manager.servers().len(), 2);
    }

    #[test]
    fn test_republisher_updates_cluster_manager() {
        let clusters = Arc::new(ClusterManager::new());
        let republisher = ClusterRepublisher::new(Arc::clone(&clusters));

        let servers: Vec<SocketAddr> = vec!["10.0.0.1:9600".parse().unwrap()];
        republisher.on_server_change(&servers);

        let published = clusters.endpoints(REGISTRY_SERVER_CLUSTER);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].address, servers[0]);
    }

    #[test]
    fn test_cluster_manager_publish_replaces() {
        let clusters = ClusterManager::new();
        clusters.publish("svc", vec![Endpoint::new("10.0.0.1:80".parse().unwrap())]);
        clusters.publish("svc", vec![Endpoint::new("10.0.0.2:80".parse().unwrap())]);

        let endpoints = clusters.endpoints("svc");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].address, "10.0.0.2:80".parse().unwrap());
        assert_eq!(clusters.cluster_count(), 1);
        assert!(clusters.endpoints("missing").is_empty());
    }
}
