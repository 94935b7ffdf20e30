//! Reconciliation logic for TraceStack resources.
//!
//! One pass per resource key: render the desired object set, optionally
//! append mTLS credentials, converge the cluster against the previous owned
//! index, then always sample component health and fold the pass outcome into
//! status conditions before returning the retry decision.

pub mod apply;
pub mod certificates;
pub mod status;

#[cfg(test)]
mod apply_test;
#[cfg(test)]
mod certificates_test;
#[cfg(test)]
mod reconcile_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use kube_runtime::controller::Action;
use tracing::{debug, error, info};

use cluster_store::ClusterStore;
use crds::{ComponentsStatus, TraceStack, TraceStackStatus};

use crate::backoff::backoff_for_error_count;
use crate::error::ControllerError;
use crate::render::{Renderer, StackValues};
use crate::reconciler::apply::OwnedIndex;
use crate::reconciler::certificates::CertificateManager;

/// Requeue interval after a successful pass, keeping component health fresh
/// between spec edits.
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Bounded retries for the status patch when it loses a concurrent write.
const STATUS_PATCH_ATTEMPTS: u32 = 3;

/// Backoff window in minutes for failed passes.
const BACKOFF_MIN_MINUTES: u64 = 1;
const BACKOFF_MAX_MINUTES: u64 = 10;

/// Reconciles TraceStack resources.
pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    renderer: Arc<dyn Renderer>,
    certificates: CertificateManager,
    /// Owned index of the previous pass per resource key (namespace/name).
    /// Starts empty after a restart; the first pass repopulates it.
    owned: Mutex<HashMap<String, OwnedIndex>>,
    /// Consecutive error count per resource key, feeding the backoff.
    error_counts: Mutex<HashMap<String, u32>>,
}

impl Reconciler {
    /// Create a reconciler over the given collaborators.
    pub fn new(
        store: Arc<dyn ClusterStore>,
        renderer: Arc<dyn Renderer>,
        certificates: CertificateManager,
    ) -> Self {
        Self {
            store,
            renderer,
            certificates,
            owned: Mutex::new(HashMap::new()),
            error_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Run one reconcile pass for a TraceStack.
    ///
    /// A deleted resource is a silent no-op. Any converge failure still runs
    /// the status computation and patch, so status is never stale relative
    /// to the most recent attempt; the error itself is returned afterwards
    /// and its classification drives the work queue.
    pub async fn reconcile(&self, stack: &TraceStack) -> Result<Action, ControllerError> {
        let name = stack
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Internal("TraceStack missing name".to_string()))?;
        let namespace = stack.metadata.namespace.as_deref().unwrap_or("default");
        let key = format!("{namespace}/{name}");

        info!("Reconciling TraceStack {}", key);

        let Some(stack) = self.store.get_stack(namespace, name).await? else {
            debug!("TraceStack {} no longer exists, nothing to do", key);
            self.owned.lock().unwrap().remove(&key);
            self.reset_errors(&key);
            return Ok(Action::await_change());
        };

        let converge_error = self.converge(&key, &stack).await.err();
        self.update_status(namespace, name, &stack, converge_error.as_ref())
            .await?;

        match converge_error {
            Some(err) => {
                error!("Reconciliation of TraceStack {} failed: {}", key, err);
                Err(err)
            }
            None => {
                self.reset_errors(&key);
                Ok(Action::requeue(RESYNC_INTERVAL))
            }
        }
    }

    /// Render, provision credentials, and apply. Stops at the first failure.
    async fn converge(&self, key: &str, stack: &TraceStack) -> Result<(), ControllerError> {
        let values = StackValues::from_spec(&stack.spec)?;
        let mut manifests = self.renderer.render(stack, &values)?;

        if values.mtls_enabled() {
            let certs = self.certificates.ensure(self.store.as_ref(), stack).await?;
            manifests.extend(certs);
        }

        let previous = self
            .owned
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default();
        let index =
            apply::reconcile_managed_objects(self.store.as_ref(), stack, manifests, &previous)
                .await?;
        self.owned.lock().unwrap().insert(key.to_string(), index);
        Ok(())
    }

    /// Sample component health, fold it with the pass outcome into the
    /// condition list, and patch the status sub-resource.
    ///
    /// A concurrent status write is handled by re-fetching the latest
    /// conditions and recomputing the patch.
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        stack: &TraceStack,
        reconcile_error: Option<&ControllerError>,
    ) -> Result<(), ControllerError> {
        let components = match status::compute_components_status(self.store.as_ref(), stack).await
        {
            Ok(components) => components,
            Err(e) => {
                error!("could not get status of each component: {}", e);
                ComponentsStatus::default()
            }
        };

        let mut previous = stack.status.clone().unwrap_or_default();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let conditions = status::derive_conditions(
                &previous.conditions,
                &components,
                reconcile_error,
                Utc::now(),
            );
            let new_status = TraceStackStatus {
                components: components.clone(),
                conditions,
            };
            match self
                .store
                .patch_stack_status(namespace, name, &new_status)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < STATUS_PATCH_ATTEMPTS => {
                    debug!(
                        "Status patch conflict for TraceStack {}/{}, re-fetching",
                        namespace, name
                    );
                    match self.store.get_stack(namespace, name).await? {
                        Some(latest) => previous = latest.status.unwrap_or_default(),
                        None => return Ok(()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record a failed pass and return the backoff for the next retry.
    pub fn backoff_for(&self, key: &str) -> Duration {
        let mut counts = self.error_counts.lock().unwrap();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        backoff_for_error_count(*count, BACKOFF_MIN_MINUTES, BACKOFF_MAX_MINUTES)
    }

    /// Clear the error count after a successful pass.
    pub fn reset_errors(&self, key: &str) {
        self.error_counts.lock().unwrap().remove(key);
    }
}
