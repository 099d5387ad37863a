//! # Service registry
//!
//! Control-plane client that, once started, maintains an idempotent
//! per-context "module started" flag and publishes discovered endpoints
//! into a cluster manager. The connection engine neither depends on nor
//! mutates registry state.

mod client;
mod config;
mod context;
mod error;

pub use client::{
    ClusterManager, Endpoint, RegistryClient, ServerChangeListener, ServerManager,
    REGISTRY_SERVER_CLUSTER,
};
pub use config::{RegistryConfig, SystemConfig};
pub use context::RegistryContext;
pub use error::{RegistryError, RegistryResult};
