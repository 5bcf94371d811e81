//! Process resource sampling for the Health Monitor (spec.md §4.4).

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// A single CPU/RSS reading for a live pid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub cpu_pct: f64,
    pub rss_bytes: u64,
}

/// Samples OS-reported resource usage for a pid. Returns `None` once the
/// pid is no longer present (the Health Monitor treats that as "stop
/// sampling", not as an error — the exit path owns that transition).
#[async_trait]
pub trait ProcessSampler: Send + Sync + 'static {
    async fn sample(&self, pid: u32) -> Option<Sample>;
}

/// Real sampler backed by `sysinfo`. Refreshing per-call is deliberate:
/// health sampling runs on a multi-second interval (default 2s) so the cost
/// of a targeted refresh is negligible next to spawning a shell.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSampler for SysinfoSampler {
    async fn sample(&self, pid: u32) -> Option<Sample> {
        let mut system = self.system.lock();
        let sys_pid = Pid::from_u32(pid);
        system.refresh_process(sys_pid);
        let process = system.process(sys_pid)?;
        Some(Sample {
            cpu_pct: process.cpu_usage() as f64,
            rss_bytes: process.memory(),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSampler;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub struct FakeSampler {
        samples: Mutex<BTreeMap<u32, Sample>>,
    }

    impl FakeSampler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, pid: u32, sample: Sample) {
            self.samples.lock().insert(pid, sample);
        }

        pub fn remove(&self, pid: u32) {
            self.samples.lock().remove(&pid);
        }
    }

    #[async_trait]
    impl ProcessSampler for FakeSampler {
        async fn sample(&self, pid: u32) -> Option<Sample> {
            self.samples.lock().get(&pid).copied()
        }
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
