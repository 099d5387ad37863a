//! # Role-based access control
//!
//! A boolean policy engine combining AND/OR predicates over destination
//! IP, destination port, and header presence/value. The engine consumes
//! only a read-only view of a connection's local address plus a header
//! map supplied by the upper protocol layer; an absent predicate never
//! restricts.

mod config;
mod engine;
mod error;
mod permission;

pub use config::{PermissionConfig, PolicyConfig, RbacConfig, RuleAction};
pub use engine::AccessControlEngine;
pub use error::{RbacError, RbacResult};
pub use permission::{ConnectionAccessor, HeaderMap};
