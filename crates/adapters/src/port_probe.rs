//! TCP-connect readiness probe.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Checks whether a TCP listener is accepting connections on `127.0.0.1:port`.
#[async_trait]
pub trait PortProbe: Send + Sync + 'static {
    async fn check(&self, port: u16) -> bool;
}

/// Real probe: attempts a TCP connect with a short per-attempt timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPortProbe;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[async_trait]
impl PortProbe for TokioPortProbe {
    async fn check(&self, port: u16) -> bool {
        let addr = format!("127.0.0.1:{port}");
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePortProbe;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Test double: reports a port "open" once it has been added via
    /// `open()`, simulating a server binding to it after some delay.
    #[derive(Clone, Default)]
    pub struct FakePortProbe {
        open_ports: Arc<Mutex<BTreeSet<u16>>>,
    }

    impl FakePortProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn open(&self, port: u16) {
            self.open_ports.lock().insert(port);
        }

        pub fn close(&self, port: u16) {
            self.open_ports.lock().remove(&port);
        }
    }

    #[async_trait]
    impl PortProbe for FakePortProbe {
        async fn check(&self, port: u16) -> bool {
            self.open_ports.lock().contains(&port)
        }
    }
}

#[cfg(test)]
#[path = "port_probe_tests.rs"]
mod tests;
