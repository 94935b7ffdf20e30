//! Component health sampling and condition derivation.
//!
//! Health is sampled per component through label-selector pod lists, then
//! reduced to the four typed conditions in a fixed order: Pending,
//! ConfigurationError, Failed, and finally Ready, which is purely derived
//! from the other three's settled values.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use cluster_store::ClusterStore;
use crds::{
    find_condition, Component, ComponentsStatus, ConditionType, PodBucket, PodStatusMap,
    StackCondition, TraceStack, WorkloadKind,
};

use crate::error::{ControllerError, ErrorClass};
use crate::labels::selector_labels;

/// Message on a true Ready condition.
pub const MESSAGE_READY: &str = "All components are operational";

/// Message on a Failed condition caused by component health.
pub const MESSAGE_FAILED: &str = "Some components failed";

/// Message on a true Pending condition.
pub const MESSAGE_PENDING: &str = "Some components are waiting on dependencies";

/// Reason on the Ready condition.
pub const REASON_READY: &str = "Ready";

/// Reason on the Pending condition.
pub const REASON_PENDING_COMPONENTS: &str = "PendingComponents";

/// Reason on a Failed condition caused by component health.
pub const REASON_FAILED_COMPONENTS: &str = "FailedComponents";

/// Reason on a Failed condition caused by a reconcile error.
pub const REASON_RECONCILE_FAILED: &str = "ReconciliationFailed";

/// Default reason on the ConfigurationError condition.
pub const REASON_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

/// Whether every container of the pod reports ready.
fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().all(|c| c.ready))
        .unwrap_or(true)
}

/// Bucket one pod by phase. A running pod with a non-ready container is not
/// healthy and lands in the Pending bucket.
fn classify_pod(pod: &Pod) -> PodBucket {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Running") => {
            if pod_ready(pod) {
                PodBucket::Running
            } else {
                PodBucket::Pending
            }
        }
        Some("Pending") => PodBucket::Pending,
        Some("Failed") => PodBucket::Failed,
        _ => PodBucket::Unknown,
    }
}

fn bucket_pods(pods: &[Pod]) -> PodStatusMap {
    let mut map = PodStatusMap::new();
    for pod in pods {
        let name = pod.metadata.name.clone().unwrap_or_default();
        map.entry(classify_pod(pod)).or_default().push(name);
    }
    map
}

async fn pods_status(
    store: &dyn ClusterStore,
    namespace: &str,
    instance: &str,
    component: Component,
) -> Result<PodStatusMap, ControllerError> {
    let pods = store
        .list_pods(namespace, &selector_labels(instance, component))
        .await?;
    Ok(bucket_pods(&pods))
}

/// Health of a component backed by a replicated, ordered workload.
///
/// Between creation and pod admission the pod list is empty, and a
/// terminating pod still reports Running; both would misreport health. When
/// the workload's ready-replica count is below its declared count, every pod
/// is bucketed Pending (the workload name stands in when no pods exist yet);
/// per-pod classification applies only once the counts match.
async fn stateful_status(
    store: &dyn ClusterStore,
    namespace: &str,
    instance: &str,
    component: Component,
) -> Result<PodStatusMap, ControllerError> {
    let selector = selector_labels(instance, component);
    let stateful_sets = store.list_stateful_sets(namespace, &selector).await?;

    for sts in &stateful_sets {
        let declared = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let ready = sts
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        if ready < declared {
            debug!(
                "{}/{} {} has {}/{} ready replicas, reporting all pods pending",
                namespace, instance, component, ready, declared
            );
            let pods = store.list_pods(namespace, &selector).await?;
            let names: Vec<String> = if pods.is_empty() {
                vec![sts.metadata.name.clone().unwrap_or_default()]
            } else {
                pods.iter()
                    .map(|p| p.metadata.name.clone().unwrap_or_default())
                    .collect()
            };
            let mut map = PodStatusMap::new();
            map.insert(PodBucket::Pending, names);
            return Ok(map);
        }
    }

    pods_status(store, namespace, instance, component).await
}

/// Sample live pod health for every fixed component.
pub async fn compute_components_status(
    store: &dyn ClusterStore,
    stack: &TraceStack,
) -> Result<ComponentsStatus, ControllerError> {
    let namespace = stack.metadata.namespace.as_deref().unwrap_or("default");
    let instance = stack.metadata.name.as_deref().unwrap_or("");

    let mut status = ComponentsStatus::default();
    for component in Component::ALL {
        *status.get_mut(component) = match component.workload() {
            WorkloadKind::Stateless => {
                pods_status(store, namespace, instance, component).await?
            }
            WorkloadKind::Stateful => {
                stateful_status(store, namespace, instance, component).await?
            }
        };
    }
    Ok(status)
}

/// Disable a condition without touching its other fields, or create a new
/// disabled one with the default reason.
fn reset_condition(
    previous: &[StackCondition],
    condition_type: ConditionType,
    default_reason: &str,
    now: DateTime<Utc>,
) -> StackCondition {
    match find_condition(previous, condition_type) {
        Some(existing) => {
            let mut condition = existing.clone();
            condition.status = false;
            condition
        }
        None => StackCondition::new(condition_type, false, default_reason, "", now),
    }
}

/// Upsert a condition, moving the transition timestamp only when the status
/// value actually flips.
fn set_condition(conditions: &mut Vec<StackCondition>, condition: StackCondition, now: DateTime<Utc>) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = now;
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        None => {
            let mut condition = condition;
            condition.last_transition_time = now;
            conditions.push(condition);
        }
    }
}

/// Derive the condition list from component health and the last reconcile
/// error. Pure: the caller supplies the clock and the previous conditions.
///
/// Evaluation order is fixed; Ready must come last because it is derived
/// from the settled values of the other three.
pub fn derive_conditions(
    previous: &[StackCondition],
    components: &ComponentsStatus,
    reconcile_error: Option<&ControllerError>,
    now: DateTime<Utc>,
) -> Vec<StackCondition> {
    let pending = StackCondition::new(
        ConditionType::Pending,
        components.count(PodBucket::Pending) > 0,
        REASON_PENDING_COMPONENTS,
        MESSAGE_PENDING,
        now,
    );

    let configuration_error = match reconcile_error {
        Some(err) if err.class() == ErrorClass::Configuration => StackCondition::new(
            ConditionType::ConfigurationError,
            true,
            err.condition_reason(),
            err.to_string(),
            now,
        ),
        _ => reset_condition(
            previous,
            ConditionType::ConfigurationError,
            REASON_INVALID_CONFIGURATION,
            now,
        ),
    };

    let failed_pods =
        components.count(PodBucket::Failed) + components.count(PodBucket::Unknown);
    let failed = match reconcile_error {
        Some(err) if err.class() != ErrorClass::Configuration => StackCondition::new(
            ConditionType::Failed,
            true,
            REASON_RECONCILE_FAILED,
            err.to_string(),
            now,
        ),
        _ if failed_pods > 0 => StackCondition::new(
            ConditionType::Failed,
            true,
            REASON_FAILED_COMPONENTS,
            MESSAGE_FAILED,
            now,
        ),
        _ => reset_condition(previous, ConditionType::Failed, REASON_FAILED_COMPONENTS, now),
    };

    let ready = StackCondition::new(
        ConditionType::Ready,
        !pending.status && !failed.status && !configuration_error.status,
        REASON_READY,
        MESSAGE_READY,
        now,
    );

    let mut conditions = previous.to_vec();
    set_condition(&mut conditions, pending, now);
    set_condition(&mut conditions, configuration_error, now);
    set_condition(&mut conditions, failed, now);
    set_condition(&mut conditions, ready, now);
    conditions
}
