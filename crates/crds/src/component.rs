//! Fixed component set of a trace stack
//!
//! Component health is reported per component as buckets of pod names.
//! The component list is closed: the controller only ever creates and
//! inspects workloads for these six components.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Workload shape backing a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Stateless workload (Deployment)
    Stateless,

    /// Replicated, ordered workload (StatefulSet)
    Stateful,
}

/// One of the fixed sub-services of a trace stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    /// Ingestion tier, fans writes out to ingesters
    Distributor,

    /// Span storage tier, the only stateful component
    Ingester,

    /// Background block compaction
    Compactor,

    /// Query execution tier
    Querier,

    /// Query scheduling and result merging
    QueryFrontend,

    /// Network edge for external traffic
    Gateway,
}

impl Component {
    /// All components, in render order.
    pub const ALL: [Component; 6] = [
        Component::Distributor,
        Component::Ingester,
        Component::Compactor,
        Component::Querier,
        Component::QueryFrontend,
        Component::Gateway,
    ];

    /// Component name as used in labels, service names, and secret names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Distributor => "distributor",
            Component::Ingester => "ingester",
            Component::Compactor => "compactor",
            Component::Querier => "querier",
            Component::QueryFrontend => "query-frontend",
            Component::Gateway => "gateway",
        }
    }

    /// Workload shape backing this component.
    pub fn workload(&self) -> WorkloadKind {
        match self {
            Component::Ingester => WorkloadKind::Stateful,
            _ => WorkloadKind::Stateless,
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health bucket a pod is classified into.
///
/// `Running` means running with every container ready; a running pod with a
/// non-ready container is reported as `Pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum PodBucket {
    /// Running and ready
    Running,

    /// Scheduled or starting, or running but not ready
    Pending,

    /// Failed
    Failed,

    /// Phase could not be determined
    Unknown,
}

/// Pod names per health bucket.
pub type PodStatusMap = BTreeMap<PodBucket, Vec<String>>;

/// Per-component pod health, one entry per fixed component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsStatus {
    /// Distributor pod buckets
    #[serde(default)]
    pub distributor: PodStatusMap,

    /// Ingester pod buckets
    #[serde(default)]
    pub ingester: PodStatusMap,

    /// Compactor pod buckets
    #[serde(default)]
    pub compactor: PodStatusMap,

    /// Querier pod buckets
    #[serde(default)]
    pub querier: PodStatusMap,

    /// Query-frontend pod buckets
    #[serde(default)]
    pub query_frontend: PodStatusMap,

    /// Gateway pod buckets
    #[serde(default)]
    pub gateway: PodStatusMap,
}

impl ComponentsStatus {
    /// Pod buckets for a component.
    pub fn get(&self, component: Component) -> &PodStatusMap {
        match component {
            Component::Distributor => &self.distributor,
            Component::Ingester => &self.ingester,
            Component::Compactor => &self.compactor,
            Component::Querier => &self.querier,
            Component::QueryFrontend => &self.query_frontend,
            Component::Gateway => &self.gateway,
        }
    }

    /// Mutable pod buckets for a component.
    pub fn get_mut(&mut self, component: Component) -> &mut PodStatusMap {
        match component {
            Component::Distributor => &mut self.distributor,
            Component::Ingester => &mut self.ingester,
            Component::Compactor => &mut self.compactor,
            Component::Querier => &mut self.querier,
            Component::QueryFrontend => &mut self.query_frontend,
            Component::Gateway => &mut self.gateway,
        }
    }

    /// Total number of pods in `bucket` across all components.
    pub fn count(&self, bucket: PodBucket) -> usize {
        Component::ALL
            .iter()
            .map(|c| self.get(*c).get(&bucket).map_or(0, Vec::len))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_sums_across_components() {
        let mut status = ComponentsStatus::default();
        status
            .get_mut(Component::Distributor)
            .insert(PodBucket::Pending, vec!["d-0".into()]);
        status
            .get_mut(Component::Ingester)
            .insert(PodBucket::Pending, vec!["i-0".into(), "i-1".into()]);
        status
            .get_mut(Component::Querier)
            .insert(PodBucket::Running, vec!["q-0".into()]);

        assert_eq!(status.count(PodBucket::Pending), 3);
        assert_eq!(status.count(PodBucket::Running), 1);
        assert_eq!(status.count(PodBucket::Failed), 0);
    }

    #[test]
    fn component_names_are_stable() {
        assert_eq!(Component::QueryFrontend.as_str(), "query-frontend");
        assert_eq!(Component::Ingester.workload(), WorkloadKind::Stateful);
        assert_eq!(Component::Gateway.workload(), WorkloadKind::Stateless);
    }
}
