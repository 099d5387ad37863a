//! # Connection lifecycle and IO engine
//!
//! The core of the proxy: each [`Connection`] exclusively owns one
//! bidirectional socket, drives its state machine, multiplexes read and
//! write activity across one read-loop task and one write task, and
//! enforces exactly-once close semantics. Filters, codecs, and
//! load-balancing decisions in the surrounding system all execute on
//! top of this engine.

mod config;
mod connection;
mod dialer;
mod error;
mod listeners;
mod state;

pub use config::ConnectionConfig;
pub use connection::{Connection, ReadConsumer};
pub use dialer::dial;
pub use error::{ConnectionError, ConnectionResult};
pub use listeners::{BytesListener, EventListener};
pub use state::{CloseType, ConnectionEvent, ConnectionState, FlushMode};
