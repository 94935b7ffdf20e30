//! Manifest object model
//!
//! The controller produces a closed set of cluster object kinds. Keeping the
//! union closed means every kind the store can be asked to create, update, or
//! delete is known at compile time; unknown kinds are rejected at the
//! renderer boundary instead of dispatched dynamically.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Kinds of cluster objects the controller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestKind {
    /// Component configuration
    ConfigMap,

    /// Credential material (CA and leaf certificates)
    Secret,

    /// Network-exposed service
    Service,

    /// Service identity
    ServiceAccount,

    /// Stateless workload
    Deployment,

    /// Replicated, ordered workload
    StatefulSet,

    /// Ingress route
    Ingress,
}

impl ManifestKind {
    /// Kind name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::ConfigMap => "ConfigMap",
            ManifestKind::Secret => "Secret",
            ManifestKind::Service => "Service",
            ManifestKind::ServiceAccount => "ServiceAccount",
            ManifestKind::Deployment => "Deployment",
            ManifestKind::StatefulSet => "StatefulSet",
            ManifestKind::Ingress => "Ingress",
        }
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an owned cluster object, sufficient to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Object kind
    pub kind: ManifestKind,

    /// Object namespace
    pub namespace: String,

    /// Object name
    pub name: String,
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A concrete cluster object the controller creates and owns.
///
/// Transient: produced per reconcile, never persisted beyond apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestObject {
    /// Component configuration
    ConfigMap(ConfigMap),

    /// Credential material
    Secret(Secret),

    /// Network-exposed service
    Service(Service),

    /// Service identity
    ServiceAccount(ServiceAccount),

    /// Stateless workload
    Deployment(Deployment),

    /// Replicated, ordered workload
    StatefulSet(StatefulSet),

    /// Ingress route
    Ingress(Ingress),
}

impl ManifestObject {
    /// Kind of the wrapped object.
    pub fn kind(&self) -> ManifestKind {
        match self {
            ManifestObject::ConfigMap(_) => ManifestKind::ConfigMap,
            ManifestObject::Secret(_) => ManifestKind::Secret,
            ManifestObject::Service(_) => ManifestKind::Service,
            ManifestObject::ServiceAccount(_) => ManifestKind::ServiceAccount,
            ManifestObject::Deployment(_) => ManifestKind::Deployment,
            ManifestObject::StatefulSet(_) => ManifestKind::StatefulSet,
            ManifestObject::Ingress(_) => ManifestKind::Ingress,
        }
    }

    /// Shared object metadata.
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ManifestObject::ConfigMap(o) => &o.metadata,
            ManifestObject::Secret(o) => &o.metadata,
            ManifestObject::Service(o) => &o.metadata,
            ManifestObject::ServiceAccount(o) => &o.metadata,
            ManifestObject::Deployment(o) => &o.metadata,
            ManifestObject::StatefulSet(o) => &o.metadata,
            ManifestObject::Ingress(o) => &o.metadata,
        }
    }

    /// Mutable object metadata.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ManifestObject::ConfigMap(o) => &mut o.metadata,
            ManifestObject::Secret(o) => &mut o.metadata,
            ManifestObject::Service(o) => &mut o.metadata,
            ManifestObject::ServiceAccount(o) => &mut o.metadata,
            ManifestObject::Deployment(o) => &mut o.metadata,
            ManifestObject::StatefulSet(o) => &mut o.metadata,
            ManifestObject::Ingress(o) => &mut o.metadata,
        }
    }

    /// Object name; empty when unset.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or("")
    }

    /// Object namespace; empty when unset.
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or("")
    }

    /// Server-assigned unique id, present on live objects.
    pub fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    /// Deletable reference to this object.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }
}
