//! Host snapshot handed to the model with each question.
//!
//! The snapshot is all-or-nothing: if any section cannot be read the whole
//! gather fails, so the model never sees a half-filled picture.

use anyhow::{anyhow, Result};
use serde::Serialize;
use shared::ContextSource;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

const TOP_PROCESS_COUNT: usize = 5;

#[derive(Debug, Serialize)]
pub struct HostInfo {
    pub os_name: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub hostname: String,
    pub architecture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CpuInfo {
    pub logical_cores: usize,
    pub usage_percent: f32,
    pub load_average: [f64; 3],
    pub uptime_secs: u64,
    pub boot_time: u64,
}

#[derive(Debug, Serialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub resident_bytes: u64,
    pub cpu_percent: f32,
}

#[derive(Debug, Serialize)]
pub struct SystemSnapshot {
    pub host: HostInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub top_processes: Vec<ProcessInfo>,
}

/// Live host reader backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostContext;

impl HostContext {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<SystemSnapshot> {
        let sys = sampled_system();

        let host = HostInfo {
            os_name: System::name().ok_or_else(|| anyhow!("OS name unavailable"))?,
            os_version: System::long_os_version(),
            kernel_version: System::kernel_version(),
            hostname: System::host_name().ok_or_else(|| anyhow!("host name unavailable"))?,
            architecture: System::cpu_arch(),
        };

        let load = System::load_average();
        let cpu = CpuInfo {
            logical_cores: sys.cpus().len(),
            usage_percent: sys.global_cpu_info().cpu_usage(),
            load_average: [load.one, load.five, load.fifteen],
            uptime_secs: System::uptime(),
            boot_time: System::boot_time(),
        };

        if sys.total_memory() == 0 {
            return Err(anyhow!("memory information unavailable"));
        }
        let memory = MemoryInfo {
            total_bytes: sys.total_memory(),
            used_bytes: sys.used_memory(),
            available_bytes: sys.available_memory(),
            swap_total_bytes: sys.total_swap(),
            swap_used_bytes: sys.used_swap(),
        };

        let processes: Vec<ProcessInfo> = sys
            .processes()
            .values()
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                resident_bytes: p.memory(),
                cpu_percent: p.cpu_usage(),
            })
            .collect();
        if processes.is_empty() {
            return Err(anyhow!("process list unavailable"));
        }

        Ok(SystemSnapshot {
            host,
            cpu,
            memory,
            top_processes: top_by_memory(processes, TOP_PROCESS_COUNT),
        })
    }

    /// Indented JSON form of [`HostContext::collect`].
    pub fn gather(&self) -> Result<String> {
        let snapshot = self.collect()?;
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

impl ContextSource for HostContext {
    fn snapshot(&self) -> Result<String> {
        self.gather()
    }
}

/// CPU usage is a delta between two refreshes; a back-to-back pair reads as
/// zero for every process.
fn sampled_system() -> System {
    let mut sys = System::new_all();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    sys.refresh_processes();
    sys
}

/// Highest resident memory first; ties broken by pid for a stable order.
pub fn top_by_memory(mut processes: Vec<ProcessInfo>, n: usize) -> Vec<ProcessInfo> {
    processes.sort_by(|a, b| {
        b.resident_bytes
            .cmp(&a.resident_bytes)
            .then(a.pid.cmp(&b.pid))
    });
    processes.truncate(n);
    processes
}
