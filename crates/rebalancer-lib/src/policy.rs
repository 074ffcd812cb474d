//! Migration decision policy
//!
//! The decision is a strict threshold check on either load. Target selection
//! sits behind [`TargetSelector`] so a real placement strategy can replace the
//! random one without touching the engine.

use crate::models::{ContainerRef, NodeId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// Load thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 60.0,
        }
    }
}

impl Thresholds {
    pub fn should_migrate(&self, cpu_load_percent: f64, memory_load_percent: f64) -> bool {
        should_migrate(
            cpu_load_percent,
            memory_load_percent,
            self.cpu_percent,
            self.memory_percent,
        )
    }
}

/// True when either load strictly exceeds its threshold
pub fn should_migrate(
    cpu_load_percent: f64,
    memory_load_percent: f64,
    cpu_threshold: f64,
    memory_threshold: f64,
) -> bool {
    cpu_load_percent > cpu_threshold || memory_load_percent > memory_threshold
}

/// Chooses the destination node of a migration
pub trait TargetSelector: Send + Sync {
    /// Pick a node for `container` among `known_nodes`; `None` when there is none
    fn select_target(&self, container: &ContainerRef, known_nodes: &[NodeId]) -> Option<NodeId>;
}

/// Uniform random choice over every known node
///
/// The container's current host is not excluded, so a no-op migration to the
/// same node is possible.
pub struct RandomTargetSelector {
    rng: Mutex<StdRng>,
}

impl RandomTargetSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector (for testing)
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomTargetSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSelector for RandomTargetSelector {
    fn select_target(&self, _container: &ContainerRef, known_nodes: &[NodeId]) -> Option<NodeId> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        known_nodes.choose(&mut *rng).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn container() -> ContainerRef {
        ContainerRef {
            id: "c1".to_string(),
            node_id: "n1".to_string(),
            ns_id: String::new(),
            vnf_id: String::new(),
            kdu_id: String::new(),
        }
    }

    #[test]
    fn test_equality_does_not_trigger() {
        assert!(!should_migrate(80.0, 60.0, 80.0, 60.0));
    }

    #[test]
    fn test_either_load_triggers() {
        assert!(should_migrate(80.01, 0.0, 80.0, 60.0));
        assert!(should_migrate(0.0, 60.01, 80.0, 60.0));
        assert!(should_migrate(95.0, 95.0, 80.0, 60.0));
        assert!(!should_migrate(25.0, 50.0, 80.0, 60.0));
    }

    #[test]
    fn test_thresholds_default() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.cpu_percent, 80.0);
        assert_eq!(thresholds.memory_percent, 60.0);
        assert!(thresholds.should_migrate(25.0, 62.5));
    }

    #[test]
    fn test_random_selector_empty_nodes() {
        let selector = RandomTargetSelector::seeded(7);
        assert_eq!(selector.select_target(&container(), &[]), None);
    }

    #[test]
    fn test_random_selector_covers_all_nodes_including_current() {
        let selector = RandomTargetSelector::seeded(42);
        let nodes: Vec<NodeId> = vec!["n1".into(), "n2".into(), "n3".into()];

        let picked: HashSet<NodeId> = (0..200)
            .filter_map(|_| selector.select_target(&container(), &nodes))
            .collect();

        assert_eq!(picked.len(), 3);
        assert!(picked.contains("n1"));
    }

    #[test]
    fn test_seeded_selector_is_deterministic() {
        let nodes: Vec<NodeId> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let a = RandomTargetSelector::seeded(9);
        let b = RandomTargetSelector::seeded(9);

        for _ in 0..20 {
            assert_eq!(
                a.select_target(&container(), &nodes),
                b.select_target(&container(), &nodes)
            );
        }
    }
}
