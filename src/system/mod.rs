//! Host resource information.

mod host;

pub use host::{
    CpuInfo, CpuStats, CpuTimes, HostSampler, HostStats, MemoryStats, detect_cpu_cores, parse_meminfo,
    parse_proc_stat,
};
