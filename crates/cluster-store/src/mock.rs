//! Mock cluster store for unit testing
//!
//! Stores objects in memory and records every mutating call so tests can
//! assert convergence properties (idempotence, pruning) without a running
//! cluster. Conflicts can be injected to exercise optimistic-concurrency
//! retry paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;

use crds::{TraceStack, TraceStackStatus};

use crate::error::StoreError;
use crate::models::{ManifestKind, ManifestObject, ObjectRef};
use crate::store_trait::ClusterStore;

/// Counts of mutating calls issued against the mock store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Object creations
    pub creates: u64,

    /// Object replacements
    pub updates: u64,

    /// Object deletions
    pub deletes: u64,

    /// Status sub-resource patches
    pub status_patches: u64,
}

impl CallCounts {
    /// Total object mutations, status patches excluded.
    pub fn mutations(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

type ObjectKey = (ManifestKind, String, String);

/// In-memory [`ClusterStore`] for tests.
#[derive(Clone, Default)]
pub struct MockClusterStore {
    objects: Arc<Mutex<BTreeMap<ObjectKey, ManifestObject>>>,
    stacks: Arc<Mutex<HashMap<(String, String), TraceStack>>>,
    pods: Arc<Mutex<Vec<Pod>>>,
    counts: Arc<Mutex<CallCounts>>,
    next_uid: Arc<Mutex<u64>>,
    status_patch_conflicts: Arc<Mutex<u32>>,
}

fn object_key(kind: ManifestKind, namespace: &str, name: &str) -> ObjectKey {
    (kind, namespace.to_string(), name.to_string())
}

fn labels_match(selector: &BTreeMap<String, String>, labels: Option<&BTreeMap<String, String>>) -> bool {
    let Some(labels) = labels else {
        return selector.is_empty();
    };
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl MockClusterStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_uid(&self) -> String {
        let mut next = self.next_uid.lock().unwrap();
        *next += 1;
        format!("uid-{}", *next)
    }

    /// Insert an object directly, bypassing call counters (for test setup).
    pub fn add_object(&self, mut object: ManifestObject) {
        if object.uid().is_none() {
            object.metadata_mut().uid = Some(self.assign_uid());
        }
        let key = object_key(object.kind(), object.namespace(), object.name());
        self.objects.lock().unwrap().insert(key, object);
    }

    /// Insert a TraceStack, assigning a uid if missing (for test setup).
    pub fn add_stack(&self, mut stack: TraceStack) {
        if stack.metadata.uid.is_none() {
            stack.metadata.uid = Some(self.assign_uid());
        }
        let key = (
            stack.metadata.namespace.clone().unwrap_or_default(),
            stack.metadata.name.clone().unwrap_or_default(),
        );
        self.stacks.lock().unwrap().insert(key, stack);
    }

    /// Insert a pod (for test setup).
    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    /// Fetch a stored object without going through the trait (for assertions).
    pub fn object(&self, kind: ManifestKind, namespace: &str, name: &str) -> Option<ManifestObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_key(kind, namespace, name))
            .cloned()
    }

    /// All stored objects of a kind (for assertions).
    pub fn objects_of_kind(&self, kind: ManifestKind) -> Vec<ManifestObject> {
        self.objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect()
    }

    /// Fetch a stored stack without going through the trait (for assertions).
    pub fn stack(&self, namespace: &str, name: &str) -> Option<TraceStack> {
        self.stacks
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshot of the mutating call counters.
    pub fn counts(&self) -> CallCounts {
        *self.counts.lock().unwrap()
    }

    /// Zero the mutating call counters.
    pub fn reset_counts(&self) {
        *self.counts.lock().unwrap() = CallCounts::default();
    }

    /// Make the next `n` status patches fail with a conflict.
    pub fn inject_status_patch_conflicts(&self, n: u32) {
        *self.status_patch_conflicts.lock().unwrap() = n;
    }
}

#[async_trait::async_trait]
impl ClusterStore for MockClusterStore {
    async fn get(
        &self,
        kind: ManifestKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManifestObject, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{kind} {namespace}/{name}")))
    }

    async fn create(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError> {
        let key = object_key(object.kind(), object.namespace(), object.name());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} {}/{} already exists",
                object.kind(),
                object.namespace(),
                object.name()
            )));
        }
        let mut stored = object.clone();
        stored.metadata_mut().uid = Some(self.assign_uid());
        stored.metadata_mut().resource_version = Some("1".to_string());
        objects.insert(key, stored.clone());
        self.counts.lock().unwrap().creates += 1;
        Ok(stored)
    }

    async fn update(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError> {
        let key = object_key(object.kind(), object.namespace(), object.name());
        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get(&key) else {
            return Err(StoreError::NotFound(format!(
                "{} {}/{}",
                object.kind(),
                object.namespace(),
                object.name()
            )));
        };
        let mut stored = object.clone();
        stored.metadata_mut().uid = existing.uid().map(str::to_string);
        let version = existing
            .metadata()
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        stored.metadata_mut().resource_version = Some((version + 1).to_string());
        objects.insert(key, stored.clone());
        self.counts.lock().unwrap().updates += 1;
        Ok(stored)
    }

    async fn delete(&self, reference: &ObjectRef) -> Result<(), StoreError> {
        let key = object_key(reference.kind, &reference.namespace, &reference.name);
        let removed = self.objects.lock().unwrap().remove(&key);
        if removed.is_none() {
            return Err(StoreError::NotFound(reference.to_string()));
        }
        self.counts.lock().unwrap().deletes += 1;
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| labels_match(labels, p.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StatefulSet>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter_map(|o| match o {
                ManifestObject::StatefulSet(sts) => Some(sts),
                _ => None,
            })
            .filter(|sts| sts.metadata.namespace.as_deref() == Some(namespace))
            .filter(|sts| labels_match(labels, sts.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn get_stack(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TraceStack>, StoreError> {
        Ok(self
            .stacks
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_stack_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TraceStackStatus,
    ) -> Result<(), StoreError> {
        {
            let mut conflicts = self.status_patch_conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::Conflict(format!(
                    "TraceStack {namespace}/{name} status patch conflict"
                )));
            }
        }
        let mut stacks = self.stacks.lock().unwrap();
        let Some(stack) = stacks.get_mut(&(namespace.to_string(), name.to_string())) else {
            return Err(StoreError::NotFound(format!("TraceStack {namespace}/{name}")));
        };
        stack.status = Some(status.clone());
        self.counts.lock().unwrap().status_patches += 1;
        Ok(())
    }
}
