//! Outbound connect with timeout.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use super::error::{ConnectionError, ConnectionResult};

/// Dial `remote` within `timeout`.
///
/// Fails fast with [`ConnectionError::InvalidRemoteAddress`] when no
/// address is supplied; no dial is attempted and no deadline elapses. A
/// zero `timeout` means the dial is unbounded at this layer.
///
/// # Errors
///
/// Returns [`ConnectionError::ConnectTimeout`] (classified as a timeout)
/// when the deadline elapses, or [`ConnectionError::Io`] for other
/// transport failures.
pub async fn dial(remote: Option<SocketAddr>, timeout: Duration) -> ConnectionResult<TcpStream> {
    let address = remote.ok_or(ConnectionError::InvalidRemoteAddress)?;

    debug!(%address, ?timeout, "dialing");

    if timeout.is_zero() {
        return Ok(TcpStream::connect(address).await?);
    }

    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ConnectionError::Io(e)),
        Err(_) => Err(ConnectionError::ConnectTimeout { address, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    #[tokio::test]
    async fn test_dial_missing_address_fails_immediately() {
        let begin = Instant::now();
        let err = dial(None, Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidRemoteAddress));
        // Bounded by a small constant, not by the dial timeout.
        assert!(begin.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_dial_unreachable_address_times_out() {
        // Non-routable address per RFC 5737.
        let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 22222);
        let timeout = Duration::from_millis(200);

        let begin = Instant::now();
        let err = dial(Some(address), timeout).await.unwrap_err();
        let elapsed = begin.elapsed();

        assert!(err.is_timeout(), "expected timeout, got: {err}");
        assert!(elapsed >= timeout - Duration::from_millis(10));
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_dial_reachable_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = dial(Some(addr), Duration::from_secs(1)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }
}
