//! Connection state machine types and lifecycle events.

/// Lifecycle state of a connection.
///
/// Transitions are strictly monotonic in declaration order and `Closed`
/// is terminal; no state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Client connection constructed, no network activity yet.
    Init,
    /// Outbound dial in progress.
    Connecting,
    /// Connection established and transferring data.
    Active,
    /// Close in progress.
    Closing,
    /// Connection closed; terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Init => write!(f, "init"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Origin of a close, delivered to event listeners so observers can
/// distinguish a local shutdown from a peer disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseType {
    /// Close requested by the local side.
    LocalClose,
    /// Close initiated by the remote peer (EOF or transport error).
    RemoteClose,
}

impl std::fmt::Display for CloseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseType::LocalClose => write!(f, "local"),
            CloseType::RemoteClose => write!(f, "remote"),
        }
    }
}

/// Whether pending outbound data is drained before the socket is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Deliver all queued data (up to a bounded drain deadline) before closing.
    FlushWrite,
    /// Discard queued data immediately.
    NoFlush,
}

/// A lifecycle-significant event delivered to connection event listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Outbound connect completed successfully.
    Connected,
    /// Outbound connect exceeded its deadline.
    ConnectTimeout,
    /// Outbound connect failed for a non-timeout reason.
    ConnectFailed,
    /// The connection closed, tagged with the origin of the close.
    Closed(CloseType),
}

impl ConnectionEvent {
    /// Whether this event reports a closed connection.
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, ConnectionEvent::Closed(_))
    }

    /// The close origin, if this is a close event.
    #[must_use]
    pub fn close_type(&self) -> Option<CloseType> {
        match self {
            ConnectionEvent::Closed(t) => Some(*t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering_is_monotonic() {
        assert!(ConnectionState::Init < ConnectionState::Connecting);
        assert!(ConnectionState::Connecting < ConnectionState::Active);
        assert!(ConnectionState::Active < ConnectionState::Closing);
        assert!(ConnectionState::Closing < ConnectionState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Init.to_string(), "init");
        assert_eq!(ConnectionState::Active.to_string(), "active");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_event_classification() {
        assert!(ConnectionEvent::Closed(CloseType::LocalClose).is_close());
        assert!(ConnectionEvent::Closed(CloseType::RemoteClose).is_close());
        assert!(!ConnectionEvent::Connected.is_close());
        assert!(!ConnectionEvent::ConnectTimeout.is_close());

        assert_eq!(
            ConnectionEvent::Closed(CloseType::RemoteClose).close_type(),
            Some(CloseType::RemoteClose)
        );
        assert_eq!(ConnectionEvent::Connected.close_type(), None);
    }
}
