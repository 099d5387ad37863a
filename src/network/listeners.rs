//! Connection listener registry.
//!
//! Listener collections are append-only for the life of a connection and
//! iteration order always equals registration order. Listener bodies are
//! invoked behind a containment boundary: a panicking listener is logged
//! and never aborts the IO loops, `close`, or notification of the
//! remaining listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::state::ConnectionEvent;

/// A capability registered by upper layers, invoked on every
/// lifecycle-significant connection event.
pub trait EventListener: Send + Sync {
    /// Called with the event that occurred.
    fn on_event(&self, event: ConnectionEvent);
}

/// Callback invoked with a byte count after a successful read or write.
pub type BytesListener = Arc<dyn Fn(u64) + Send + Sync>;

/// An append-only, insertion-order-preserving listener collection.
///
/// Registration never blocks on IO; the loops only ever take a snapshot
/// and iterate it without holding the lock.
pub(crate) struct ListenerSet<T: Clone> {
    entries: Mutex<Vec<T>>,
}

impl<T: Clone> ListenerSet<T> {
    /// Create an empty set.
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Create a set pre-populated with `entries`, preserving their order.
    pub(crate) fn with_entries(entries: Vec<T>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Append one listener.
    pub(crate) fn register(&self, listener: T) {
        self.entries.lock().unwrap().push(listener);
    }

    /// Snapshot the current listeners in registration order.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of registered listeners.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Invoke every event listener with `event`, containing failures.
pub(crate) fn dispatch_event(listeners: &[Arc<dyn EventListener>], event: ConnectionEvent) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
            warn!(?event, "connection event listener panicked");
        }
    }
}

/// Invoke every byte-counter listener with `count`, containing failures.
pub(crate) fn dispatch_bytes(listeners: &[BytesListener], count: u64) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(count))).is_err() {
            warn!(count, "byte counter listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::state::CloseType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        calls: Arc<AtomicUsize>,
    }

    impl EventListener for CountingListener {
        fn on_event(&self, _event: ConnectionEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingListener;

    impl EventListener for PanickingListener {
        fn on_event(&self, _event: ConnectionEvent) {
            panic!("listener misbehaved");
        }
    }

    #[test]
    fn test_registration_preserves_order() {
        let set: ListenerSet<u32> = ListenerSet::new();
        for i in 0..5 {
            set.register(i);
        }
        assert_eq!(set.len(), 5);
        assert_eq!(set.snapshot(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_registering_n_listeners_yields_n_entries() {
        for n in 0..4 {
            let set: ListenerSet<Arc<dyn EventListener>> = ListenerSet::new();
            for _ in 0..n {
                set.register(Arc::new(CountingListener {
                    calls: Arc::new(AtomicUsize::new(0)),
                }));
            }
            assert_eq!(set.len(), n);
        }
    }

    #[test]
    fn test_panicking_listener_does_not_abort_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let listeners: Vec<Arc<dyn EventListener>> = vec![
            Arc::new(PanickingListener),
            Arc::new(CountingListener {
                calls: Arc::clone(&calls),
            }),
            Arc::new(PanickingListener),
            Arc::new(CountingListener {
                calls: Arc::clone(&calls),
            }),
        ];

        dispatch_event(&listeners, ConnectionEvent::Closed(CloseType::LocalClose));

        // Both well-behaved listeners still ran.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_bytes_listener_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let listeners: Vec<BytesListener> = vec![
            Arc::new(|_| panic!("bad callback")),
            Arc::new(move |n| {
                assert_eq!(n, 42);
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
        ];

        dispatch_bytes(&listeners, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
