//! Utilization calculation
//!
//! Consumption is summed per node from either declared container resources
//! (requests or limits) or live usage samples, then divided by node capacity.
//! A malformed quantity on one container is logged and skipped; it never
//! aborts the node.

use crate::models::{
    ConsumptionMode, NodeResources, PodResources, PodUsage, RawResources, Utilization,
};
use crate::quantity::{parse_cpu, parse_memory};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Percentage of capacity consumed; zero capacity yields zero
pub fn utilization_pct(consumed: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 || !capacity.is_finite() {
        return 0.0;
    }
    ((consumed / capacity) * 100.0).max(0.0)
}

/// CPU and memory utilization of a node
pub fn compute(capacity: &NodeResources, consumed: &NodeResources) -> Utilization {
    Utilization {
        cpu_pct: utilization_pct(consumed.cpu_cores(), capacity.cpu_cores()),
        memory_pct: utilization_pct(consumed.memory_gib(), capacity.memory_gib()),
    }
}

/// Parse raw cpu/memory strings; absent fields are zero, malformed ones are
/// logged and counted as zero. Returns the parsed pair and the number of
/// fields skipped.
pub fn parse_resources(raw: &RawResources, owner: &str) -> (NodeResources, usize) {
    let mut skipped = 0;

    let cpu = match raw.cpu.as_deref() {
        None => 0.0,
        Some(s) => match parse_cpu(s) {
            Ok(q) => q.value(),
            Err(e) => {
                warn!(owner = %owner, error = %e, "Skipping malformed cpu quantity");
                skipped += 1;
                0.0
            }
        },
    };

    let memory = match raw.memory.as_deref() {
        None => 0.0,
        Some(s) => match parse_memory(s) {
            Ok(q) => q.value(),
            Err(e) => {
                warn!(owner = %owner, error = %e, "Skipping malformed memory quantity");
                skipped += 1;
                0.0
            }
        },
    };

    (NodeResources::new(cpu, memory), skipped)
}

/// Consumed resources per node for one cycle, built from a single mode
#[derive(Debug, Clone, Default)]
pub struct ConsumptionIndex {
    mode: ConsumptionMode,
    by_node: HashMap<String, NodeResources>,
    skipped: usize,
}

impl ConsumptionIndex {
    /// Sum declared requests or limits of every live pod onto its node
    pub fn from_declared(pods: &[PodResources], mode: ConsumptionMode) -> Self {
        let mut index = Self {
            mode,
            ..Default::default()
        };

        for pod in pods {
            let Some(node) = pod.node_name.as_deref() else {
                continue;
            };
            if pod.is_terminated() {
                continue;
            }

            for container in &pod.containers {
                let raw = match mode {
                    ConsumptionMode::Limits => &container.limits,
                    _ => &container.requests,
                };
                let owner = format!("{}/{}/{}", pod.namespace, pod.name, container.name);
                index.add(node, raw, &owner);
            }
        }

        index
    }

    /// Sum live usage samples onto the node each pod is scheduled to
    pub fn from_usage(pods: &[PodResources], usage: &[PodUsage]) -> Self {
        let mut index = Self {
            mode: ConsumptionMode::Usage,
            ..Default::default()
        };

        let placement: HashMap<(&str, &str), &str> = pods
            .iter()
            .filter_map(|p| {
                p.node_name
                    .as_deref()
                    .map(|node| ((p.namespace.as_str(), p.name.as_str()), node))
            })
            .collect();

        for sample in usage {
            let Some(node) = placement.get(&(sample.namespace.as_str(), sample.name.as_str()))
            else {
                debug!(pod = %sample.name, namespace = %sample.namespace, "Usage sample for unscheduled pod");
                continue;
            };

            for container in &sample.containers {
                let owner = format!("{}/{}/{}", sample.namespace, sample.name, container.name);
                index.add(node, &container.usage, &owner);
            }
        }

        index
    }

    fn add(&mut self, node: &str, raw: &RawResources, owner: &str) {
        let (parsed, skipped) = parse_resources(raw, owner);
        self.skipped += skipped;
        self.by_node.entry(node.to_string()).or_default().add(&parsed);
    }

    pub fn mode(&self) -> ConsumptionMode {
        self.mode
    }

    /// Consumed resources on a node; nodes with no pods consume nothing
    pub fn for_node(&self, node: &str) -> NodeResources {
        self.by_node.get(node).copied().unwrap_or_default()
    }

    /// Number of malformed quantities skipped while building the index
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
