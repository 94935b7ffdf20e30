//! TraceStack CRD
//!
//! Declares one managed trace stack instance. The spec names a chart
//! template and carries a free-form values document; the controller owns
//! the status sub-resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::component::ComponentsStatus;
use crate::condition::StackCondition;

/// Desired state of a trace stack instance.
///
/// The spec is operator-immutable: the controller never writes it.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traceops.microscaler.io",
    version = "v1alpha1",
    kind = "TraceStack",
    namespaced,
    status = "TraceStackStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TraceStackSpec {
    /// Chart template reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    /// Values document merged over the chart defaults
    #[serde(default)]
    pub values: serde_json::Value,
}

/// Observed state, written only by the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceStackStatus {
    /// Per-component pod health buckets
    #[serde(default)]
    pub components: ComponentsStatus,

    /// Ordered condition list, one condition per type
    #[serde(default)]
    pub conditions: Vec<StackCondition>,
}
