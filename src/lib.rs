//! # meshgate
//!
//! A sidecar network proxy mediating traffic between clients and
//! upstream services.
//!
//! ## Architecture
//!
//! The crate is built around the [`network`] connection engine: every
//! filter, codec, and load-balancing decision in the surrounding system
//! executes on top of one [`network::Connection`] per socket, which owns
//! the socket exclusively, drives its lifecycle state machine, and
//! enforces exactly-once close semantics.
//!
//! Two collaborators sit beside the engine:
//!
//! - [`rbac`] — a boolean policy engine over destination address, port,
//!   and headers, consuming only a read-only view of a connection.
//! - [`registry`] — a control-plane client publishing discovered
//!   upstream endpoints into a cluster manager.

pub mod network;
pub mod rbac;
pub mod registry;
