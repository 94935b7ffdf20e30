//! Cluster object store for TraceOps controllers
//!
//! Wraps the Kubernetes API behind the [`ClusterStore`] trait so reconcilers
//! can be unit-tested against an in-memory store. The production
//! implementation is [`KubeStore`]; enable the `test-util` feature for
//! [`MockClusterStore`].

pub mod error;
pub mod models;
pub mod store_trait;

pub mod kube_store;

#[cfg(feature = "test-util")]
pub mod mock;

pub use error::StoreError;
pub use kube_store::KubeStore;
pub use models::{ManifestKind, ManifestObject, ObjectRef};
pub use store_trait::ClusterStore;

#[cfg(feature = "test-util")]
pub use mock::{CallCounts, MockClusterStore};
