//! Shared labels for managed objects.
//!
//! The selector labels are the stable subset workloads are matched on;
//! instance labels add the bookkeeping labels every owned object carries.

use std::collections::BTreeMap;

use crds::Component;

/// `app.kubernetes.io/name` value on every owned object.
pub const APP_NAME: &str = "tracestack";

/// Value of the `managed-by` label.
pub const MANAGED_BY: &str = "tracestack-controller";

/// Immutable selector labels for one component of one instance.
pub fn selector_labels(instance: &str, component: Component) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), instance.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            component.as_str().to_string(),
        ),
    ])
}

/// Full label set for one component's objects.
pub fn component_labels(instance: &str, component: Component) -> BTreeMap<String, String> {
    let mut labels = selector_labels(instance, component);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

/// Label set for instance-scoped objects not tied to one component.
pub fn instance_labels(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), instance.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
    ])
}
