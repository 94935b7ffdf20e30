//! Managed object convergence.
//!
//! Upserts the desired object set for one instance and prunes objects owned
//! by the previous reconcile that fell out of the set. Repeating an
//! unchanged desired set issues no mutating calls, so a crashed reconcile
//! can always be resumed by re-running the whole sequence.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use tracing::{debug, info};

use cluster_store::{ClusterStore, ManifestKind, ManifestObject, ObjectRef};
use crds::TraceStack;

use crate::error::ControllerError;

/// Objects owned after a reconcile, keyed by uid.
///
/// Used solely to detect objects to prune on the next pass.
pub type OwnedIndex = BTreeMap<String, ObjectRef>;

/// Bounded retries for update-on-conflict.
const UPSERT_ATTEMPTS: u32 = 3;

/// Apply order: singletons, then configuration and secrets, then workloads,
/// then network-exposing objects. Keeps workloads from starting before their
/// configuration exists.
pub(super) fn kind_rank(kind: ManifestKind) -> u8 {
    match kind {
        ManifestKind::ServiceAccount => 0,
        ManifestKind::ConfigMap => 1,
        ManifestKind::Secret => 2,
        ManifestKind::StatefulSet => 3,
        ManifestKind::Deployment => 4,
        ManifestKind::Service => 5,
        ManifestKind::Ingress => 6,
    }
}

/// Converge the desired object set and prune orphans.
///
/// Every desired object is stamped with a controller owner reference to
/// `owner`, then created or updated in place; its live uid is recorded in
/// the returned index. Afterwards every entry of `previous` missing from
/// the new index is deleted.
pub async fn reconcile_managed_objects(
    store: &dyn ClusterStore,
    owner: &TraceStack,
    mut desired: Vec<ManifestObject>,
    previous: &OwnedIndex,
) -> Result<OwnedIndex, ControllerError> {
    desired.sort_by_key(|o| kind_rank(o.kind()));
    let owner_ref = controller_owner_ref(owner)?;

    let mut index = OwnedIndex::new();
    for mut object in desired {
        object.metadata_mut().owner_references = Some(vec![owner_ref.clone()]);
        let live = upsert(store, object).await?;
        if let Some(uid) = live.uid() {
            index.insert(uid.to_string(), live.object_ref());
        }
    }

    for (uid, reference) in previous {
        if index.contains_key(uid) {
            continue;
        }
        info!("Pruning {} no longer in the desired set", reference);
        match store.delete(reference).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", reference);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(index)
}

/// Create the object if absent, update it only when the payload differs.
///
/// Returns the live object. An update that loses an optimistic-concurrency
/// race re-fetches and recomputes instead of overwriting blindly.
async fn upsert(
    store: &dyn ClusterStore,
    desired: ManifestObject,
) -> Result<ManifestObject, ControllerError> {
    let kind = desired.kind();
    let namespace = desired.namespace().to_string();
    let name = desired.name().to_string();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.get(kind, &namespace, &name).await {
            Err(e) if e.is_not_found() => {
                debug!("Creating {} {}/{}", kind, namespace, name);
                match store.create(&desired).await {
                    Ok(live) => return Ok(live),
                    Err(e) if e.is_conflict() && attempt < UPSERT_ATTEMPTS => {
                        debug!(
                            "{} {}/{} appeared concurrently, re-fetching",
                            kind, namespace, name
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
            Ok(live) => {
                if manifest_matches(&live, &desired) {
                    debug!("{} {}/{} already up to date", kind, namespace, name);
                    return Ok(live);
                }
                let mut updated = desired.clone();
                updated.metadata_mut().resource_version =
                    live.metadata().resource_version.clone();
                match store.update(&updated).await {
                    Ok(live) => {
                        info!("Updated {} {}/{}", kind, namespace, name);
                        return Ok(live);
                    }
                    Err(e) if e.is_conflict() && attempt < UPSERT_ATTEMPTS => {
                        debug!(
                            "Conflict updating {} {}/{}, re-fetching",
                            kind, namespace, name
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

/// Whether the live object already carries the desired payload.
///
/// Compares the fields the renderer sets; server-populated metadata and
/// status are ignored so a steady-state pass stays read-only.
fn manifest_matches(live: &ManifestObject, desired: &ManifestObject) -> bool {
    let live_meta = live.metadata();
    let desired_meta = desired.metadata();

    let labels_ok = match &desired_meta.labels {
        None => true,
        Some(want) => match &live_meta.labels {
            None => want.is_empty(),
            Some(have) => want.iter().all(|(k, v)| have.get(k) == Some(v)),
        },
    };
    if !labels_ok {
        return false;
    }

    let owners_ok = match (&desired_meta.owner_references, &live_meta.owner_references) {
        (None, _) => true,
        (Some(want), Some(have)) => want.iter().all(|w| have.contains(w)),
        (Some(_), None) => false,
    };
    if !owners_ok {
        return false;
    }

    match (live, desired) {
        (ManifestObject::ConfigMap(a), ManifestObject::ConfigMap(b)) => a.data == b.data,
        (ManifestObject::Secret(a), ManifestObject::Secret(b)) => {
            a.data == b.data && a.type_ == b.type_
        }
        (ManifestObject::Service(a), ManifestObject::Service(b)) => {
            let ports = |s: &k8s_openapi::api::core::v1::Service| {
                s.spec.as_ref().map(|sp| (sp.selector.clone(), sp.ports.clone()))
            };
            ports(a) == ports(b)
        }
        (ManifestObject::ServiceAccount(_), ManifestObject::ServiceAccount(_)) => true,
        (ManifestObject::Deployment(a), ManifestObject::Deployment(b)) => a.spec == b.spec,
        (ManifestObject::StatefulSet(a), ManifestObject::StatefulSet(b)) => a.spec == b.spec,
        (ManifestObject::Ingress(a), ManifestObject::Ingress(b)) => a.spec == b.spec,
        _ => false,
    }
}

/// Controller owner reference pointing at the TraceStack.
///
/// Cascade deletion of the whole instance is delegated to the platform's
/// ownership garbage collection.
fn controller_owner_ref(owner: &TraceStack) -> Result<OwnerReference, ControllerError> {
    let name = owner
        .metadata
        .name
        .clone()
        .ok_or_else(|| ControllerError::Internal("TraceStack has no name".to_string()))?;
    let uid = owner
        .metadata
        .uid
        .clone()
        .ok_or_else(|| ControllerError::Internal("TraceStack has no uid".to_string()))?;
    Ok(OwnerReference {
        api_version: TraceStack::api_version(&()).into_owned(),
        kind: TraceStack::kind(&()).into_owned(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}
