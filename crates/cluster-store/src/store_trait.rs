//! ClusterStore trait for mocking
//!
//! This trait abstracts the cluster object store to enable mocking in unit
//! tests. The concrete [`crate::KubeStore`] implements it against the
//! Kubernetes API; tests use the in-memory mock behind the `test-util`
//! feature.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;

use crds::{TraceStack, TraceStackStatus};

use crate::error::StoreError;
use crate::models::{ManifestKind, ManifestObject, ObjectRef};

/// Typed CRUD plus the label-scoped lists the status engine samples.
///
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime. Every call is cancellable by dropping the future; a cancelled or
/// timed-out call surfaces as [`StoreError::Timeout`].
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch one owned object by kind, namespace, and name.
    async fn get(
        &self,
        kind: ManifestKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManifestObject, StoreError>;

    /// Create an object; the returned object carries server-assigned metadata
    /// (uid, resource version).
    async fn create(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError>;

    /// Replace an object. The object must carry the live resource version;
    /// a stale version fails with [`StoreError::Conflict`].
    async fn update(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError>;

    /// Delete an object by reference.
    async fn delete(&self, reference: &ObjectRef) -> Result<(), StoreError>;

    /// List pods in a namespace matching all of the given labels.
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError>;

    /// List stateful sets in a namespace matching all of the given labels.
    async fn list_stateful_sets(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StatefulSet>, StoreError>;

    /// Fetch a TraceStack; `None` when it does not exist.
    async fn get_stack(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TraceStack>, StoreError>;

    /// Merge-patch the status sub-resource of a TraceStack.
    async fn patch_stack_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TraceStackStatus,
    ) -> Result<(), StoreError>;
}
