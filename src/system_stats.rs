//! Host statistics for the health report, read from `/proc` and `/sys`.
//!
//! Every field is optional: minimal images often lack thermal zones, and
//! non-Linux hosts have none of these files.

use std::fs;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total_mb: f64,
    pub available_mb: f64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub platform: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_release: Option<String>,
    pub cpu_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_uptime: Option<String>,
}

impl SystemStats {
    pub fn collect() -> Self {
        let read = |path: &str| fs::read_to_string(path).ok();

        SystemStats {
            platform: std::env::consts::OS,
            platform_release: read("/proc/sys/kernel/osrelease").map(|s| s.trim().to_string()),
            cpu_count: std::thread::available_parallelism().ok().map(|n| n.get()),
            memory: read("/proc/meminfo").and_then(|s| parse_meminfo(&s)),
            load_average: read("/proc/loadavg").and_then(|s| parse_loadavg(&s)),
            cpu_temp_c: read("/sys/class/thermal/thermal_zone0/temp")
                .and_then(|s| parse_thermal(&s)),
            system_uptime: read("/proc/uptime").and_then(|s| parse_uptime(&s)),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn meminfo_kb(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        value.split_whitespace().next()?.parse().ok()
    })
}

pub fn parse_meminfo(contents: &str) -> Option<MemoryInfo> {
    let total = meminfo_kb(contents, "MemTotal")?;
    let available = meminfo_kb(contents, "MemAvailable")?;
    if total == 0 {
        return None;
    }

    Some(MemoryInfo {
        total_mb: round_to(total as f64 / 1024.0, 1),
        available_mb: round_to(available as f64 / 1024.0, 1),
        used_percent: round_to((total - available.min(total)) as f64 / total as f64 * 100.0, 1),
    })
}

pub fn parse_loadavg(contents: &str) -> Option<[f64; 3]> {
    let mut fields = contents.split_whitespace().map(|f| f.parse::<f64>().ok());
    Some([
        round_to(fields.next()??, 2),
        round_to(fields.next()??, 2),
        round_to(fields.next()??, 2),
    ])
}

pub fn parse_thermal(contents: &str) -> Option<f64> {
    let millidegrees: f64 = contents.trim().parse().ok()?;
    Some(round_to(millidegrees / 1000.0, 1))
}

pub fn parse_uptime(contents: &str) -> Option<String> {
    let seconds: f64 = contents.split_whitespace().next()?.parse().ok()?;
    let seconds = seconds as u64;
    Some(format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60))
}
