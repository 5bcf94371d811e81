//! HTTP-GET readiness probe.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpProbeError {
    #[error("request failed: {0}")]
    Request(String),
}

/// Issues a GET request; success per spec.md §4.3 is any response with
/// status < 500. Redirects are never followed for readiness purposes.
#[async_trait]
pub trait HttpProbe: Send + Sync + 'static {
    async fn check(&self, url: &str) -> Result<bool, HttpProbeError>;
}

#[derive(Clone)]
pub struct ReqwestHttpProbe {
    client: reqwest::Client,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

impl ReqwestHttpProbe {
    pub fn new() -> Self {
        // No redirect following: a 3xx from a not-yet-ready server should
        // not be chased into an arbitrary location.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for ReqwestHttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn check(&self, url: &str) -> Result<bool, HttpProbeError> {
        match self.client.get(url).send().await {
            Ok(resp) => Ok(resp.status().as_u16() < 500),
            Err(e) => Err(HttpProbeError::Request(e.to_string())),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHttpProbe;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Test double: returns a pre-programmed status for a URL, or a
    /// connection-refused error if the URL was never registered.
    #[derive(Clone, Default)]
    pub struct FakeHttpProbe {
        statuses: Arc<Mutex<BTreeMap<String, u16>>>,
    }

    impl FakeHttpProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, url: impl Into<String>, status: u16) {
            self.statuses.lock().insert(url.into(), status);
        }
    }

    #[async_trait]
    impl HttpProbe for FakeHttpProbe {
        async fn check(&self, url: &str) -> Result<bool, HttpProbeError> {
            match self.statuses.lock().get(url) {
                Some(status) => Ok(*status < 500),
                None => Err(HttpProbeError::Request("connection refused".to_string())),
            }
        }
    }
}

#[cfg(test)]
#[path = "http_probe_tests.rs"]
mod tests;
