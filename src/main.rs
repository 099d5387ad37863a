//! meshgate binary entry point.

use tracing::info;

/// Entry point for meshgate.
///
/// Initializes logging and reports the build; the connection engine is
/// a library driven by the surrounding control plane.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "meshgate starting");
}
