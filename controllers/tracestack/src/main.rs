//! TraceStack Controller
//!
//! Converges declared trace stack instances toward their desired state:
//! renders the component manifests, provisions internal mTLS credentials
//! when enabled, prunes objects that fall out of the desired set, and keeps
//! an aggregate health summary in the status sub-resource.

mod backoff;
mod controller;
mod error;
mod labels;
mod pki;
mod reconciler;
mod render;
mod watcher;

#[cfg(test)]
mod test_utils;

use std::env;

use tracing::info;

use controller::Controller;
use reconciler::certificates::ServicePrincipal;

use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting TraceStack controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();

    let mut principal = ServicePrincipal::default();
    if let Ok(name) = env::var("PRINCIPAL_NAME") {
        principal.common_name = name;
    }
    if let Ok(groups) = env::var("PRINCIPAL_GROUPS") {
        principal.organizations = groups.split(',').map(str::to_string).collect();
    }

    info!("Configuration:");
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("default")
    );
    info!("  Service principal: {}", principal.common_name);

    // Initialize and run controller
    let controller = Controller::new(namespace, principal).await?;
    controller.run().await?;

    Ok(())
}
