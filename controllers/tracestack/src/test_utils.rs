//! Test utilities for unit testing reconcilers
//!
//! Helpers for creating test resources and wiring a reconciler against the
//! in-memory mock store.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetStatus};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use cluster_store::MockClusterStore;
use crds::{Component, TraceStack, TraceStackSpec};

use crate::labels::{component_labels, selector_labels};
use crate::reconciler::certificates::{CertificateManager, ServicePrincipal};
use crate::reconciler::Reconciler;
use crate::render::StackRenderer;

/// TraceStack with a fixed uid and the given values document.
pub fn make_stack(name: &str, namespace: &str, values: serde_json::Value) -> TraceStack {
    TraceStack {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            ..Default::default()
        },
        spec: TraceStackSpec {
            chart: None,
            values,
        },
        status: None,
    }
}

/// Pod labelled for one component, with a single container status.
pub fn make_pod(
    name: &str,
    namespace: &str,
    instance: &str,
    component: Component,
    phase: &str,
    ready: bool,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(selector_labels(instance, component)),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(vec![ContainerStatus {
                name: component.as_str().to_string(),
                ready,
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Ingester StatefulSet with the given declared and ready replica counts.
pub fn make_ingester_stateful_set(
    namespace: &str,
    instance: &str,
    declared: i32,
    ready: i32,
) -> StatefulSet {
    let name = format!("{instance}-ingester");
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(component_labels(instance, Component::Ingester)),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(declared),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance, Component::Ingester)),
                ..Default::default()
            },
            service_name: Some(name),
            template: PodTemplateSpec::default(),
            ..Default::default()
        }),
        status: Some(StatefulSetStatus {
            ready_replicas: Some(ready),
            ..Default::default()
        }),
    }
}

/// Reconciler over the mock store with the default renderer and principal.
pub fn new_reconciler(store: Arc<MockClusterStore>) -> Reconciler {
    Reconciler::new(
        store,
        Arc::new(StackRenderer),
        CertificateManager::new(ServicePrincipal::default()),
    )
}
