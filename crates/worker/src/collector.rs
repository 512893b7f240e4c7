//! Host introspection for benchmark reports.
//!
//! [`SystemInfoCollector`] takes a one-shot [`SystemInfo`] snapshot:
//! logical CPU count and total memory via `sysinfo`, GPU model names via
//! NVML. Unlike a metrics daemon, a worker with no detectable GPU is
//! misconfigured, so NVML failures are errors here rather than an empty
//! device list.

use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use sysinfo::System;
use voxbench_core::types::SystemInfo;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    #[error("No GPU detected")]
    NoGpu,
}

/// Anything that can produce the startup [`SystemInfo`] snapshot.
pub trait SystemInfoSource: Send + Sync {
    fn snapshot(&self) -> Result<SystemInfo, CollectorError>;
}

/// Collects system info from the local host.
#[derive(Debug, Default)]
pub struct SystemInfoCollector;

impl SystemInfoCollector {
    pub fn new() -> Self {
        Self
    }

    /// Names of every GPU visible to NVML, one per line.
    fn gpu_names(&self) -> Result<String, CollectorError> {
        let nvml = Nvml::init()?;
        let count = nvml.device_count()?;
        if count == 0 {
            return Err(CollectorError::NoGpu);
        }

        let mut names = Vec::with_capacity(count as usize);
        for idx in 0..count {
            names.push(nvml.device_by_index(idx)?.name()?);
        }
        Ok(names.join("\n"))
    }
}

impl SystemInfoSource for SystemInfoCollector {
    fn snapshot(&self) -> Result<SystemInfo, CollectorError> {
        let gpu = self.gpu_names()?;

        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let info = SystemInfo {
            vcpu: sys.cpus().len(),
            mem_gb: SystemInfo::bytes_to_gb(sys.total_memory()),
            gpu,
        };
        tracing::info!(
            vcpu = info.vcpu,
            mem_gb = info.mem_gb,
            gpu = %info.gpu,
            "System info collected",
        );
        Ok(info)
    }
}

/// A fixed snapshot, for hosts where introspection is done elsewhere.
impl SystemInfoSource for SystemInfo {
    fn snapshot(&self) -> Result<SystemInfo, CollectorError> {
        Ok(self.clone())
    }
}
