//! Usage samples as published by cAdvisor's Kafka storage driver
//!
//! Only the fields the load calculator needs are decoded; everything else in
//! the message (network, diskio, labels, ...) is ignored.

use crate::error::SampleDecodeError;
use chrono::{DateTime, FixedOffset, Timelike};
use serde::Deserialize;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// One point-in-time measurement of a container
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    /// Container name as reported by the runtime (contains the container id)
    pub container_name: String,
    pub timestamp: DateTime<FixedOffset>,
    /// Cumulative CPU time consumed since container start
    pub cpu_usage_nanos: u64,
    pub memory_usage_bytes: u64,
}

#[derive(Deserialize)]
struct WireSample {
    #[serde(rename = "container_Name")]
    container_name: String,
    timestamp: String,
    container_stats: WireStats,
}

#[derive(Deserialize)]
struct WireStats {
    cpu: WireCpu,
    memory: WireMemory,
}

#[derive(Deserialize)]
struct WireCpu {
    usage: WireCpuUsage,
}

#[derive(Deserialize)]
struct WireCpuUsage {
    total: u64,
}

#[derive(Deserialize)]
struct WireMemory {
    usage: u64,
}

impl UsageSample {
    /// Decode a sample from its JSON wire form
    pub fn from_json(payload: &[u8]) -> Result<Self, SampleDecodeError> {
        let wire: WireSample = serde_json::from_slice(payload)?;
        let timestamp = DateTime::parse_from_rfc3339(&wire.timestamp).map_err(|source| {
            SampleDecodeError::Timestamp {
                value: wire.timestamp.clone(),
                source,
            }
        })?;

        Ok(Self {
            container_name: wire.container_name,
            timestamp,
            cpu_usage_nanos: wire.container_stats.cpu.usage.total,
            memory_usage_bytes: wire.container_stats.memory.usage,
        })
    }

    /// Nanoseconds since midnight of the timestamp's own day
    ///
    /// The date is discarded, so a pair of samples spanning midnight yields a
    /// negative interval.
    pub fn time_of_day_nanos(&self) -> u64 {
        let time = self.timestamp.time();
        u64::from(time.num_seconds_from_midnight()) * NANOS_PER_SEC + u64::from(time.nanosecond())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CADVISOR_MESSAGE: &str = r#"{
        "timestamp": "2024-03-05T12:34:56.500000000Z",
        "machine_name": "edge-1",
        "container_Name": "/kubepods/burstable/pod1234/0f3c9a7e",
        "container_Id": "0f3c9a7e",
        "container_labels": {"io.kubernetes.pod.name": "upf-0"},
        "container_stats": {
            "timestamp": "2024-03-05T12:34:56.500000000Z",
            "cpu": {"usage": {"total": 123456789, "user": 100, "system": 23}},
            "memory": {"usage": 4096, "working_set": 2048},
            "network": {"rx_bytes": 1, "tx_bytes": 2},
            "diskio": {}
        }
    }"#;

    #[test]
    fn test_decode_cadvisor_message() {
        let sample = UsageSample::from_json(CADVISOR_MESSAGE.as_bytes()).unwrap();

        assert_eq!(sample.container_name, "/kubepods/burstable/pod1234/0f3c9a7e");
        assert_eq!(sample.cpu_usage_nanos, 123_456_789);
        assert_eq!(sample.memory_usage_bytes, 4096);
    }

    #[test]
    fn test_time_of_day_keeps_fractional_seconds() {
        let sample = UsageSample::from_json(CADVISOR_MESSAGE.as_bytes()).unwrap();

        let expected = (12 * 3600 + 34 * 60 + 56) * NANOS_PER_SEC + 500_000_000;
        assert_eq!(sample.time_of_day_nanos(), expected);
    }

    #[test]
    fn test_time_of_day_ignores_date() {
        let a = r#"{"timestamp":"2024-03-05T00:00:10Z","container_Name":"c","container_stats":{"cpu":{"usage":{"total":1}},"memory":{"usage":1}}}"#;
        let b = r#"{"timestamp":"2031-11-20T00:00:10Z","container_Name":"c","container_stats":{"cpu":{"usage":{"total":1}},"memory":{"usage":1}}}"#;

        let a = UsageSample::from_json(a.as_bytes()).unwrap();
        let b = UsageSample::from_json(b.as_bytes()).unwrap();
        assert_eq!(a.time_of_day_nanos(), b.time_of_day_nanos());
        assert_eq!(a.time_of_day_nanos(), 10 * NANOS_PER_SEC);
    }

    #[test]
    fn test_missing_stats_is_rejected() {
        let err = UsageSample::from_json(br#"{"timestamp":"2024-03-05T00:00:10Z","container_Name":"c"}"#)
            .unwrap_err();
        assert!(matches!(err, SampleDecodeError::Json(_)));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let payload = r#"{"timestamp":"12:00","container_Name":"c","container_stats":{"cpu":{"usage":{"total":1}},"memory":{"usage":1}}}"#;
        let err = UsageSample::from_json(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, SampleDecodeError::Timestamp { .. }));
    }
}
