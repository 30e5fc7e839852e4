// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host resource sampling.
//!
//! CPU usage is the 1-minute load average divided by the number of logical
//! cores, as a percentage. Memory usage is the share of physical memory not
//! available to new allocations, as a percentage. Both are rounded to two
//! decimals.
//!
//! Linux hosts are sampled from `/proc`; other platforms go through `sysinfo`.
//! Windows has no load average, so its CPU usage reads as 0.

use crate::errors::SamplingError;
use tracing::debug;

#[cfg(target_os = "linux")]
const PROC_LOADAVG_PATH: &str = "/proc/loadavg"; // "0.42 0.35 0.30 1/123 4567"
#[cfg(target_os = "linux")]
const PROC_MEMINFO_PATH: &str = "/proc/meminfo"; // "MemTotal:  16303428 kB" per line

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostStats {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
}

pub trait HostStatsReader: Send + Sync {
    fn read(&self) -> Result<HostStats, SamplingError>;
}

/// Samples the host this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostStatsReader;

impl HostStatsReader for SystemHostStatsReader {
    #[cfg(target_os = "linux")]
    fn read(&self) -> Result<HostStats, SamplingError> {
        let loadavg = read_proc_file(PROC_LOADAVG_PATH)?;
        let meminfo = read_proc_file(PROC_MEMINFO_PATH)?;

        let load_1m = parse_loadavg(&loadavg)?;
        let (total_kb, available_kb) = parse_meminfo(&meminfo)?;
        let cores = num_cpus::get();
        debug!("load_1m={load_1m} cores={cores} mem_total_kb={total_kb} mem_available_kb={available_kb}");

        Ok(HostStats {
            cpu_usage_pct: cpu_usage_pct(load_1m, cores),
            memory_usage_pct: memory_usage_pct(total_kb, available_kb),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn read(&self) -> Result<HostStats, SamplingError> {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(SamplingError::Unsupported);
        }
        let available = sys.available_memory().min(total);
        let load_1m = sysinfo::System::load_average().one;
        let cores = num_cpus::get();
        debug!("load_1m={load_1m} cores={cores} mem_total={total} mem_available={available}");

        Ok(HostStats {
            cpu_usage_pct: cpu_usage_pct(load_1m, cores),
            memory_usage_pct: memory_usage_pct(total, available),
        })
    }
}

#[cfg(target_os = "linux")]
fn read_proc_file(path: &'static str) -> Result<String, SamplingError> {
    std::fs::read_to_string(path).map_err(|source| SamplingError::Read { path, source })
}

/// Returns the 1-minute load average from the contents of `/proc/loadavg`.
pub fn parse_loadavg(contents: &str) -> Result<f64, SamplingError> {
    let first = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| SamplingError::Malformed {
            path: "/proc/loadavg",
            reason: "empty".to_string(),
        })?;
    first.parse::<f64>().map_err(|e| SamplingError::Malformed {
        path: "/proc/loadavg",
        reason: format!("failed to parse {first:?}: {e}"),
    })
}

/// Returns `(MemTotal, MemAvailable)` in kB from the contents of `/proc/meminfo`.
///
/// Kernels older than 3.14 have no `MemAvailable`; `MemFree` is used instead.
pub fn parse_meminfo(contents: &str) -> Result<(u64, u64), SamplingError> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let slot = match key {
            "MemTotal:" => &mut total,
            "MemAvailable:" => &mut available,
            "MemFree:" => &mut free,
            _ => continue,
        };
        *slot = Some(value.parse::<u64>().map_err(|e| SamplingError::Malformed {
            path: "/proc/meminfo",
            reason: format!("failed to parse {key} {value:?}: {e}"),
        })?);
    }

    let total = total.ok_or_else(|| SamplingError::Malformed {
        path: "/proc/meminfo",
        reason: "missing MemTotal".to_string(),
    })?;
    if total == 0 {
        return Err(SamplingError::Malformed {
            path: "/proc/meminfo",
            reason: "MemTotal is 0".to_string(),
        });
    }
    let available = available.or(free).ok_or_else(|| SamplingError::Malformed {
        path: "/proc/meminfo",
        reason: "missing MemAvailable and MemFree".to_string(),
    })?;

    Ok((total, available.min(total)))
}

pub fn cpu_usage_pct(load_1m: f64, cores: usize) -> f64 {
    round2(load_1m / cores.max(1) as f64 * 100.0)
}

pub fn memory_usage_pct(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    round2(used as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB
MemFree:         2000000 kB
MemAvailable:    4000000 kB
Buffers:          500000 kB
";

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap(), 0.52);
    }

    #[test]
    fn test_parse_loadavg_malformed() {
        assert!(parse_loadavg("").is_err());
        assert!(parse_loadavg("abc 0.1 0.1").is_err());
    }

    #[test]
    fn test_parse_meminfo_prefers_available() {
        assert_eq!(parse_meminfo(MEMINFO).unwrap(), (16_000_000, 4_000_000));
    }

    #[test]
    fn test_parse_meminfo_falls_back_to_free() {
        let contents = "MemTotal: 1000 kB\nMemFree: 250 kB\n";
        assert_eq!(parse_meminfo(contents).unwrap(), (1000, 250));
    }

    #[test]
    fn test_parse_meminfo_missing_total() {
        let err = parse_meminfo("MemFree: 250 kB\n").unwrap_err();
        assert_eq!(err.to_string(), "malformed /proc/meminfo: missing MemTotal");
    }

    #[test]
    fn test_parse_meminfo_zero_total() {
        assert!(parse_meminfo("MemTotal: 0 kB\nMemFree: 0 kB\n").is_err());
    }

    #[test]
    fn test_cpu_usage_pct() {
        assert_eq!(cpu_usage_pct(2.0, 4), 50.0);
        assert_eq!(cpu_usage_pct(0.333, 1), 33.3);
        // Zero cores reported is treated as one
        assert_eq!(cpu_usage_pct(1.0, 0), 100.0);
    }

    #[test]
    fn test_memory_usage_pct() {
        assert_eq!(memory_usage_pct(16_000_000, 4_000_000), 75.0);
        assert_eq!(memory_usage_pct(3, 2), 33.33);
        assert_eq!(memory_usage_pct(0, 0), 0.0);
    }

    #[test]
    fn test_system_reader_samples_host() {
        let stats = SystemHostStatsReader
            .read()
            .expect("failed to sample host resources");
        assert!(stats.cpu_usage_pct >= 0.0);
        assert!((0.0..=100.0).contains(&stats.memory_usage_pct));
        assert_eq!(stats.cpu_usage_pct, round2(stats.cpu_usage_pct));
        assert_eq!(stats.memory_usage_pct, round2(stats.memory_usage_pct));
    }
}
