//! CPU and memory load calculation
//!
//! CPU load is derived from the rate of change of a cumulative CPU counter,
//! so every container keeps its own previous reading. The first sample of a
//! container only establishes that baseline and never yields a CPU load.

use crate::error::{RebalancerError, Result};
use crate::models::{ContainerRef, NodeSpec};
use crate::sample::UsageSample;
use std::collections::HashMap;

/// Previous reading of one container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerLoadState {
    pub previous_cpu_usage_nanos: u64,
    pub previous_sample_time_nanos: u64,
}

impl ContainerLoadState {
    /// No sample has been applied yet
    pub fn is_uninitialized(&self) -> bool {
        self.previous_cpu_usage_nanos == 0 && self.previous_sample_time_nanos == 0
    }
}

/// Result of applying one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadComputation {
    pub cpu_load_percent: f64,
    pub memory_load_percent: f64,
    pub new_state: ContainerLoadState,
}

/// Compute the load of `container` on `node` from a new sample and its prior state
pub fn compute(
    sample: &UsageSample,
    container: &ContainerRef,
    node: &NodeSpec,
    state: &ContainerLoadState,
) -> Result<LoadComputation> {
    if !node.is_valid() {
        return Err(RebalancerError::InvalidCapacity {
            node_id: container.node_id.clone(),
            num_cpu_cores: node.num_cpu_cores,
            memory_capacity_bytes: node.memory_capacity_bytes,
        });
    }

    let memory_load_percent =
        sample.memory_usage_bytes as f64 / node.memory_capacity_bytes as f64 * 100.0;

    let now = sample.time_of_day_nanos();
    let cpu_load_percent = if state.is_uninitialized() {
        0.0
    } else {
        let cpu_delta = i128::from(sample.cpu_usage_nanos) - i128::from(state.previous_cpu_usage_nanos);
        let system_delta = i128::from(now) - i128::from(state.previous_sample_time_nanos);

        // Counter reset or clock going backwards (including midnight rollover)
        if system_delta <= 0 || cpu_delta < 0 {
            0.0
        } else {
            cpu_delta as f64 / system_delta as f64 / f64::from(node.num_cpu_cores) * 100.0
        }
    };

    Ok(LoadComputation {
        cpu_load_percent,
        memory_load_percent,
        new_state: ContainerLoadState {
            previous_cpu_usage_nanos: sample.cpu_usage_nanos,
            previous_sample_time_nanos: now,
        },
    })
}

/// Per-container load state, keyed by container id
///
/// Owned by the ingestion loop; entries are created lazily on the first
/// matched sample and live until restart.
#[derive(Debug, Default)]
pub struct LoadStateTable {
    states: HashMap<String, ContainerLoadState>,
}

impl LoadStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a sample to the container's state, advancing it on success
    pub fn apply(
        &mut self,
        sample: &UsageSample,
        container: &ContainerRef,
        node: &NodeSpec,
    ) -> Result<LoadComputation> {
        let state = self.states.entry(container.id.clone()).or_default();
        let computation = compute(sample, container, node, state)?;
        *state = computation.new_state;
        Ok(computation)
    }

    pub fn get(&self, container_id: &str) -> Option<&ContainerLoadState> {
        self.states.get(container_id)
    }

    pub fn contains(&self, container_id: &str) -> bool {
        self.states.contains_key(container_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    const GIB: u64 = 1024 * 1024 * 1024;
    const SEC: u64 = 1_000_000_000;

    fn sample(time: &str, cpu_usage_nanos: u64, memory_usage_bytes: u64) -> UsageSample {
        UsageSample {
            container_name: "/kubepods/pod/c1".to_string(),
            timestamp: DateTime::parse_from_rfc3339(&format!("2024-03-05T{}Z", time)).unwrap(),
            cpu_usage_nanos,
            memory_usage_bytes,
        }
    }

    fn container() -> ContainerRef {
        ContainerRef {
            id: "c1".to_string(),
            node_id: "n1".to_string(),
            ns_id: "ns".to_string(),
            vnf_id: "vnf".to_string(),
            kdu_id: "kdu".to_string(),
        }
    }

    fn node() -> NodeSpec {
        NodeSpec::new(2, 8 * GIB)
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let result = compute(
            &sample("00:00:10", 1_000_000_000, 4 * GIB),
            &container(),
            &node(),
            &ContainerLoadState::default(),
        )
        .unwrap();

        assert_eq!(result.cpu_load_percent, 0.0);
        assert!((result.memory_load_percent - 50.0).abs() < 1e-9);
        assert_eq!(result.new_state.previous_cpu_usage_nanos, 1_000_000_000);
        assert_eq!(result.new_state.previous_sample_time_nanos, 10 * SEC);
    }

    #[test]
    fn test_cpu_load_from_deltas() {
        let state = ContainerLoadState {
            previous_cpu_usage_nanos: 1_000_000_000,
            previous_sample_time_nanos: 10 * SEC,
        };
        let result = compute(&sample("00:00:11", 1_500_000_000, 4 * GIB), &container(), &node(), &state)
            .unwrap();

        // 0.5s of CPU over 1s of wall time on 2 cores
        assert!((result.cpu_load_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_reset_yields_zero_and_advances() {
        let state = ContainerLoadState {
            previous_cpu_usage_nanos: 5_000_000_000,
            previous_sample_time_nanos: 10 * SEC,
        };
        let result = compute(&sample("00:00:11", 100, GIB), &container(), &node(), &state).unwrap();

        assert_eq!(result.cpu_load_percent, 0.0);
        assert_eq!(result.new_state.previous_cpu_usage_nanos, 100);
        assert_eq!(result.new_state.previous_sample_time_nanos, 11 * SEC);
    }

    #[test]
    fn test_non_positive_interval_yields_zero() {
        let state = ContainerLoadState {
            previous_cpu_usage_nanos: 1_000,
            previous_sample_time_nanos: 11 * SEC,
        };

        let same_time = compute(&sample("00:00:11", 2_000, GIB), &container(), &node(), &state).unwrap();
        assert_eq!(same_time.cpu_load_percent, 0.0);

        let earlier = compute(&sample("00:00:09", 2_000, GIB), &container(), &node(), &state).unwrap();
        assert_eq!(earlier.cpu_load_percent, 0.0);
        assert_eq!(earlier.new_state.previous_sample_time_nanos, 9 * SEC);
    }

    #[test]
    fn test_midnight_rollover_is_treated_as_reset() {
        let state = ContainerLoadState {
            previous_cpu_usage_nanos: 1_000,
            previous_sample_time_nanos: (23 * 3600 + 59 * 60 + 59) * SEC,
        };
        let result = compute(&sample("00:00:01", 2_000_000_000, GIB), &container(), &node(), &state)
            .unwrap();

        assert_eq!(result.cpu_load_percent, 0.0);
        assert_eq!(result.new_state.previous_sample_time_nanos, SEC);
    }

    #[test]
    fn test_memory_load_scaling() {
        let state = ContainerLoadState::default();
        let full = compute(&sample("00:00:01", 1, 8 * GIB), &container(), &node(), &state).unwrap();
        assert!((full.memory_load_percent - 100.0).abs() < 1e-9);

        let quarter = compute(&sample("00:00:01", 1, 2 * GIB), &container(), &node(), &state).unwrap();
        assert!((quarter.memory_load_percent - 25.0).abs() < 1e-9);

        let bigger_node = NodeSpec::new(2, 16 * GIB);
        let halved = compute(&sample("00:00:01", 1, 2 * GIB), &container(), &bigger_node, &state).unwrap();
        assert!((halved.memory_load_percent - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_capacity_is_rejected() {
        let state = ContainerLoadState::default();

        let no_memory = compute(&sample("00:00:01", 1, 1), &container(), &NodeSpec::new(2, 0), &state);
        assert!(matches!(no_memory, Err(RebalancerError::InvalidCapacity { .. })));

        let no_cores = compute(&sample("00:00:01", 1, 1), &container(), &NodeSpec::new(0, GIB), &state);
        assert!(matches!(no_cores, Err(RebalancerError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_state_table_keeps_containers_apart() {
        let mut table = LoadStateTable::new();
        let c1 = container();
        let c2 = ContainerRef {
            id: "c2".to_string(),
            ..container()
        };

        table.apply(&sample("00:00:10", 1_000_000_000, GIB), &c1, &node()).unwrap();
        // Interleaved sample of another container must not disturb c1's baseline
        let first_c2 = table.apply(&sample("00:00:10", 9_000_000_000, GIB), &c2, &node()).unwrap();
        assert_eq!(first_c2.cpu_load_percent, 0.0);

        let second_c1 = table.apply(&sample("00:00:11", 1_500_000_000, GIB), &c1, &node()).unwrap();
        assert!((second_c1.cpu_load_percent - 25.0).abs() < 1e-9);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("c2").unwrap().previous_cpu_usage_nanos, 9_000_000_000);
    }

    #[test]
    fn test_state_table_does_not_advance_on_invalid_capacity() {
        let mut table = LoadStateTable::new();
        let result = table.apply(&sample("00:00:10", 5, GIB), &container(), &NodeSpec::new(0, 0));

        assert!(result.is_err());
        assert!(table.get("c1").unwrap().is_uninitialized());
    }
}
