//! Kubernetes resource watchers.
//!
//! Watches TraceStack resources and drives reconciliation through
//! `kube_runtime::Controller`, which guarantees per-key serialization while
//! reconciling distinct keys concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use tracing::{debug, error, info, warn};

use crds::TraceStack;

use crate::error::ControllerError;
use crate::reconciler::Reconciler;

/// Generic watcher helper over `kube_runtime::Controller`.
///
/// The controller handles reconnection, retries, and event batching; the
/// error policy turns the returned error's classification into the retry
/// decision. Terminal errors wait for the next spec change instead of
/// requeueing.
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(
            Arc<Reconciler>,
            Arc<K>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>,
        > + Send
        + Sync
        + Clone
        + 'static,
{
    info!("Starting {} watcher", resource_name);

    // The returned error's classification - not any side channel - decides
    // between waiting for a spec change and requeueing with backoff.
    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!(
            "{}/{}",
            obj.namespace().unwrap_or_else(|| "default".to_string()),
            obj.name_any()
        );
        if error.is_terminal() {
            warn!(
                "Terminal error for {}: {}; waiting for a spec correction",
                key, error
            );
            Action::await_change()
        } else {
            let delay = ctx.backoff_for(&key);
            warn!("Reconciliation of {} failed: {}; retrying in {:?}", key, error, delay);
            Action::requeue(delay)
        }
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let resource_name = resource_name.to_string();
        async move {
            debug!("Reconciling {} {}", resource_name, obj.name_any());
            reconcile_fn(ctx, obj).await
        }
    };

    // Debounce batches bursts of status updates; concurrency bounds the
    // worker pool while the Controller serializes per key.
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches TraceStack resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    stack_api: Api<TraceStack>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, stack_api: Api<TraceStack>) -> Self {
        Self {
            reconciler,
            stack_api,
        }
    }

    /// Starts watching TraceStack resources.
    pub async fn watch_trace_stacks(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.stack_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| {
                Box::pin(async move { reconciler.reconcile(&resource).await })
            },
            "TraceStack",
        )
        .await
    }
}
