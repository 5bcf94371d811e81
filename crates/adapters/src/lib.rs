//! ph-adapters: thin wrappers around OS/network facts consumed by the
//! Readiness Engine and Health Monitor, so the engine depends on traits
//! rather than `tokio::net`/`reqwest`/`sysinfo` directly.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod http_probe;
pub mod log_matcher;
pub mod port_probe;
pub mod sampler;

pub use http_probe::{HttpProbe, ReqwestHttpProbe};
pub use log_matcher::matches_pattern;
pub use port_probe::{PortProbe, TokioPortProbe};
pub use sampler::{ProcessSampler, SysinfoSampler};

#[cfg(any(test, feature = "test-support"))]
pub use http_probe::FakeHttpProbe;
#[cfg(any(test, feature = "test-support"))]
pub use port_probe::FakePortProbe;
#[cfg(any(test, feature = "test-support"))]
pub use sampler::FakeSampler;
