//! Main controller implementation.
//!
//! Wires the kube client, cluster store, renderer, certificate manager, and
//! reconciler together and runs the TraceStack watcher until shutdown.

use std::sync::Arc;

use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::info;

use cluster_store::KubeStore;
use crds::TraceStack;

use crate::error::ControllerError;
use crate::reconciler::certificates::{CertificateManager, ServicePrincipal};
use crate::reconciler::Reconciler;
use crate::render::StackRenderer;
use crate::watcher::Watcher;

/// Main controller for TraceStack management.
pub struct Controller {
    stack_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        namespace: Option<String>,
        principal: ServicePrincipal,
    ) -> Result<Self, ControllerError> {
        info!("Initializing TraceStack controller");

        let kube_client = Client::try_default().await?;

        let ns = namespace.as_deref().unwrap_or("default");
        let stack_api: Api<TraceStack> = Api::namespaced(kube_client.clone(), ns);

        let store = Arc::new(KubeStore::new(kube_client));
        let reconciler = Arc::new(Reconciler::new(
            store,
            Arc::new(StackRenderer),
            CertificateManager::new(principal),
        ));

        let watcher = Arc::new(Watcher::new(reconciler, stack_api));
        let stack_watcher = tokio::spawn(async move { watcher.watch_trace_stacks().await });

        Ok(Self { stack_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("TraceStack controller running");

        self.stack_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("TraceStack watcher panicked: {e}")))?
            .map_err(|e| ControllerError::Watch(format!("TraceStack watcher error: {e}")))?;

        Ok(())
    }
}
