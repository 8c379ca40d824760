//! Host CPU and memory sampling.
//!
//! # Platform Support
//!
//! - **Linux**: `/proc/stat` and `/proc/meminfo`
//! - **Other platforms**: core count only, usage and memory read as zero

use serde::{Deserialize, Serialize};

/// Detect the number of logical CPU cores.
pub fn detect_cpu_cores() -> usize {
    std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub cores: usize,
}

impl CpuInfo {
    pub fn detect() -> Self {
        Self {
            cores: detect_cpu_cores(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Aggregate busy percentage, 0-100
    pub usage: f32,
    pub per_core_usage: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub used_percent: f32,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// One host snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
}

/// Cumulative jiffies for one `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Busy percentage between `earlier` and `self`.
    pub fn usage_since(&self, earlier: &CpuTimes) -> f32 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle.saturating_sub(earlier.idle).min(total);
        ((total - idle) as f64 * 100.0 / total as f64) as f32
    }
}

/// Parse `/proc/stat`; the aggregate line comes first, then one per core.
pub fn parse_proc_stat(content: &str) -> Vec<CpuTimes> {
    content
        .lines()
        .filter(|line| line.starts_with("cpu"))
        .filter_map(|line| {
            let fields: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .take(8)
                .map(|f| f.parse().unwrap_or(0))
                .collect();
            if fields.len() < 4 {
                return None;
            }
            // idle + iowait
            let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
            Some(CpuTimes {
                idle,
                total: fields.iter().sum(),
            })
        })
        .collect()
}

/// Parse `/proc/meminfo` into (total, available) bytes.
pub fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        // Format: "MemTotal:       16384000 kB"
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else {
            continue;
        };
        match key {
            "MemTotal:" => total = Some(kb * 1024),
            "MemAvailable:" => available = Some(kb * 1024),
            "MemFree:" => free = Some(kb * 1024),
            _ => {}
        }
    }

    let total = total?;
    Some((total, available.or(free).unwrap_or(0).min(total)))
}

#[cfg(target_os = "linux")]
fn read_cpu_times() -> Vec<CpuTimes> {
    std::fs::read_to_string("/proc/stat")
        .map(|content| parse_proc_stat(&content))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times() -> Vec<CpuTimes> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn read_memory() -> MemoryStats {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|content| parse_meminfo(&content))
        .map(|(total, available)| memory_stats(total, available))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_memory() -> MemoryStats {
    MemoryStats::default()
}

fn memory_stats(total: u64, available: u64) -> MemoryStats {
    let used = total.saturating_sub(available);
    let used_percent = if total == 0 {
        0.0
    } else {
        (used as f64 * 100.0 / total as f64) as f32
    };
    MemoryStats {
        used_percent,
        used_bytes: used,
        total_bytes: total,
    }
}

/// Samples host usage; CPU figures cover the time since the previous sample.
///
/// The first sample reports usage since boot.
#[derive(Debug, Default)]
pub struct HostSampler {
    previous: Vec<CpuTimes>,
}

impl HostSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self) -> HostStats {
        let current = read_cpu_times();
        let cpu = self.cpu_stats(&current);
        if !current.is_empty() {
            self.previous = current;
        }
        HostStats {
            cpu,
            memory: read_memory(),
        }
    }

    fn cpu_stats(&self, current: &[CpuTimes]) -> CpuStats {
        let usage: Vec<f32> = current
            .iter()
            .enumerate()
            .map(|(i, now)| {
                let before = self.previous.get(i).copied().unwrap_or_default();
                now.usage_since(&before)
            })
            .collect();

        match usage.split_first() {
            Some((aggregate, per_core)) => CpuStats {
                usage: *aggregate,
                per_core_usage: per_core.to_vec(),
            },
            None => CpuStats::default(),
        }
    }
}
