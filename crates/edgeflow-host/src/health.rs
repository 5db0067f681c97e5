//! Coarse liveness report for the health endpoint.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub function_count: usize,
    pub process_memory_stats: MemoryStats,
}

/// Process memory figures in bytes. Fields are `None` where the platform
/// does not expose them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub resident_bytes: Option<u64>,
    pub peak_resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
}

impl MemoryStats {
    /// Read the current process's figures from `/proc/self/status`.
    pub fn current() -> Self {
        std::fs::read_to_string("/proc/self/status")
            .map(|status| Self::parse(&status))
            .unwrap_or_default()
    }

    fn parse(status: &str) -> Self {
        let mut stats = Self::default();
        for line in status.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "VmRSS" => &mut stats.resident_bytes,
                "VmHWM" => &mut stats.peak_resident_bytes,
                "VmSize" => &mut stats.virtual_bytes,
                _ => continue,
            };
            *slot = value
                .trim()
                .strip_suffix("kB")
                .and_then(|kb| kb.trim().parse::<u64>().ok())
                .map(|kb| kb * 1024);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_status_kilobytes() {
        let status = "Name:\tedgeflowd\nVmHWM:\t  2048 kB\nVmRSS:\t  1024 kB\nVmSize:\t 8192 kB\nThreads:\t4\n";
        let stats = MemoryStats::parse(status);
        assert_eq!(stats.resident_bytes, Some(1024 * 1024));
        assert_eq!(stats.peak_resident_bytes, Some(2048 * 1024));
        assert_eq!(stats.virtual_bytes, Some(8192 * 1024));
    }

    #[test]
    fn missing_fields_stay_none() {
        let stats = MemoryStats::parse("Name:\tx\n");
        assert_eq!(stats, MemoryStats::default());
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = HealthReport {
            status: "healthy",
            function_count: 2,
            process_memory_stats: MemoryStats::default(),
        };
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["functionCount"], 2);
        assert!(json["processMemoryStats"]["residentBytes"].is_null());
    }
}
