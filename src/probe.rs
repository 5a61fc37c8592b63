//! Transport-level reachability probing

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Answers whether the television accepts TCP connections right now
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, port: u16, limit: Duration) -> bool;
}

/// Bare TCP connect with a deadline
///
/// Reaching the control port says nothing about the session; it only gates
/// whether connecting is worth trying.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16, limit: Duration) -> bool {
        match timeout(limit, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::trace!("Probe of {}:{} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                tracing::trace!("Probe of {}:{} timed out", host, port);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(TcpProber.probe("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!TcpProber.probe("127.0.0.1", port, Duration::from_secs(1)).await);
    }
}
