//! Kubernetes-backed store implementation

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};

use crds::{TraceStack, TraceStackStatus};

use crate::error::{from_kube, StoreError};
use crate::models::{ManifestKind, ManifestObject, ObjectRef};
use crate::store_trait::ClusterStore;

/// Production [`ClusterStore`] over typed `kube::Api` handles.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap a kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Render a label map as a list selector string (`k1=v1,k2=v2`).
fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get(
        &self,
        kind: ManifestKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManifestObject, StoreError> {
        let ns = namespace;
        match kind {
            ManifestKind::ConfigMap => self
                .api::<ConfigMap>(ns)
                .get(name)
                .await
                .map(ManifestObject::ConfigMap),
            ManifestKind::Secret => self
                .api::<Secret>(ns)
                .get(name)
                .await
                .map(ManifestObject::Secret),
            ManifestKind::Service => self
                .api::<Service>(ns)
                .get(name)
                .await
                .map(ManifestObject::Service),
            ManifestKind::ServiceAccount => self
                .api::<ServiceAccount>(ns)
                .get(name)
                .await
                .map(ManifestObject::ServiceAccount),
            ManifestKind::Deployment => self
                .api::<Deployment>(ns)
                .get(name)
                .await
                .map(ManifestObject::Deployment),
            ManifestKind::StatefulSet => self
                .api::<StatefulSet>(ns)
                .get(name)
                .await
                .map(ManifestObject::StatefulSet),
            ManifestKind::Ingress => self
                .api::<Ingress>(ns)
                .get(name)
                .await
                .map(ManifestObject::Ingress),
        }
        .map_err(from_kube)
    }

    async fn create(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError> {
        let ns = object.namespace();
        let pp = PostParams::default();
        match object {
            ManifestObject::ConfigMap(o) => self
                .api::<ConfigMap>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::ConfigMap),
            ManifestObject::Secret(o) => self
                .api::<Secret>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::Secret),
            ManifestObject::Service(o) => self
                .api::<Service>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::Service),
            ManifestObject::ServiceAccount(o) => self
                .api::<ServiceAccount>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::ServiceAccount),
            ManifestObject::Deployment(o) => self
                .api::<Deployment>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::Deployment),
            ManifestObject::StatefulSet(o) => self
                .api::<StatefulSet>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::StatefulSet),
            ManifestObject::Ingress(o) => self
                .api::<Ingress>(ns)
                .create(&pp, o)
                .await
                .map(ManifestObject::Ingress),
        }
        .map_err(from_kube)
    }

    async fn update(&self, object: &ManifestObject) -> Result<ManifestObject, StoreError> {
        let ns = object.namespace();
        let name = object.name();
        let pp = PostParams::default();
        match object {
            ManifestObject::ConfigMap(o) => self
                .api::<ConfigMap>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::ConfigMap),
            ManifestObject::Secret(o) => self
                .api::<Secret>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::Secret),
            ManifestObject::Service(o) => self
                .api::<Service>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::Service),
            ManifestObject::ServiceAccount(o) => self
                .api::<ServiceAccount>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::ServiceAccount),
            ManifestObject::Deployment(o) => self
                .api::<Deployment>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::Deployment),
            ManifestObject::StatefulSet(o) => self
                .api::<StatefulSet>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::StatefulSet),
            ManifestObject::Ingress(o) => self
                .api::<Ingress>(ns)
                .replace(name, &pp, o)
                .await
                .map(ManifestObject::Ingress),
        }
        .map_err(from_kube)
    }

    async fn delete(&self, reference: &ObjectRef) -> Result<(), StoreError> {
        let ns = reference.namespace.as_str();
        let name = reference.name.as_str();
        let dp = DeleteParams::default();
        match reference.kind {
            ManifestKind::ConfigMap => self
                .api::<ConfigMap>(ns)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            ManifestKind::Secret => self.api::<Secret>(ns).delete(name, &dp).await.map(|_| ()),
            ManifestKind::Service => self.api::<Service>(ns).delete(name, &dp).await.map(|_| ()),
            ManifestKind::ServiceAccount => self
                .api::<ServiceAccount>(ns)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            ManifestKind::Deployment => self
                .api::<Deployment>(ns)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            ManifestKind::StatefulSet => self
                .api::<StatefulSet>(ns)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            ManifestKind::Ingress => self.api::<Ingress>(ns).delete(name, &dp).await.map(|_| ()),
        }
        .map_err(from_kube)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError> {
        let lp = ListParams::default().labels(&label_selector(labels));
        let list = self
            .api::<Pod>(namespace)
            .list(&lp)
            .await
            .map_err(from_kube)?;
        Ok(list.items)
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<StatefulSet>, StoreError> {
        let lp = ListParams::default().labels(&label_selector(labels));
        let list = self
            .api::<StatefulSet>(namespace)
            .list(&lp)
            .await
            .map_err(from_kube)?;
        Ok(list.items)
    }

    async fn get_stack(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TraceStack>, StoreError> {
        self.api::<TraceStack>(namespace)
            .get_opt(name)
            .await
            .map_err(from_kube)
    }

    async fn patch_stack_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TraceStackStatus,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api::<TraceStack>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(from_kube)
    }
}
