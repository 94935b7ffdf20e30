//! Unit tests for the reconcile orchestrator

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cluster_store::{ManifestKind, MockClusterStore};
    use crds::{find_condition, ConditionType};

    use crate::test_utils::{make_stack, new_reconciler};

    #[tokio::test]
    async fn full_pass_creates_objects_and_patches_status() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        store.add_stack(stack.clone());
        let reconciler = new_reconciler(store.clone());

        reconciler.reconcile(&stack).await.unwrap();

        assert_eq!(store.objects_of_kind(ManifestKind::Deployment).len(), 5);
        assert_eq!(store.objects_of_kind(ManifestKind::StatefulSet).len(), 1);
        assert_eq!(store.objects_of_kind(ManifestKind::Service).len(), 6);
        assert_eq!(store.objects_of_kind(ManifestKind::Secret).len(), 0);
        assert_eq!(store.counts().status_patches, 1);

        let status = store.stack("default", "demo").unwrap().status.unwrap();
        assert_eq!(status.conditions.len(), 4);
        // The ingester has no ready replicas yet, so the stack is pending.
        assert!(find_condition(&status.conditions, ConditionType::Pending).unwrap().status);
        assert!(!find_condition(&status.conditions, ConditionType::Ready).unwrap().status);
        assert!(!find_condition(&status.conditions, ConditionType::Failed).unwrap().status);
    }

    #[tokio::test]
    async fn repeated_pass_only_patches_status() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        store.add_stack(stack.clone());
        let reconciler = new_reconciler(store.clone());

        reconciler.reconcile(&stack).await.unwrap();
        store.reset_counts();
        reconciler.reconcile(&stack).await.unwrap();

        assert_eq!(store.counts().mutations(), 0);
        assert_eq!(store.counts().status_patches, 1);
    }

    #[tokio::test]
    async fn disabling_mtls_prunes_credential_secrets() {
        let store = Arc::new(MockClusterStore::new());
        let enabled = make_stack(
            "demo",
            "default",
            serde_json::json!({"server": {"mtls": {"enabled": true}}}),
        );
        store.add_stack(enabled.clone());
        let reconciler = new_reconciler(store.clone());

        reconciler.reconcile(&enabled).await.unwrap();
        // CA secret plus one leaf per component.
        assert_eq!(store.objects_of_kind(ManifestKind::Secret).len(), 7);

        let disabled = make_stack("demo", "default", serde_json::Value::Null);
        store.add_stack(disabled.clone());
        reconciler.reconcile(&disabled).await.unwrap();

        assert_eq!(store.objects_of_kind(ManifestKind::Secret).len(), 0);
        assert_eq!(store.objects_of_kind(ManifestKind::Deployment).len(), 5);
    }

    #[tokio::test]
    async fn invalid_values_are_terminal_and_surface_as_configuration_error() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack(
            "demo",
            "default",
            serde_json::json!({"ingester": {"replicas": 0}}),
        );
        store.add_stack(stack.clone());
        let reconciler = new_reconciler(store.clone());

        let err = reconciler.reconcile(&stack).await.unwrap_err();
        assert!(err.is_terminal());

        // Nothing was applied, but status still reflects the attempt.
        assert!(store.objects_of_kind(ManifestKind::Deployment).is_empty());
        let status = store.stack("default", "demo").unwrap().status.unwrap();
        let config = find_condition(&status.conditions, ConditionType::ConfigurationError).unwrap();
        assert!(config.status);
        assert!(config.message.contains("ingester.replicas"));
        assert!(!find_condition(&status.conditions, ConditionType::Failed).unwrap().status);
        assert!(!find_condition(&status.conditions, ConditionType::Ready).unwrap().status);
    }

    #[tokio::test]
    async fn deleted_stack_is_a_silent_noop() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        let reconciler = new_reconciler(store.clone());

        reconciler.reconcile(&stack).await.unwrap();

        assert_eq!(store.counts().mutations(), 0);
        assert_eq!(store.counts().status_patches, 0);
    }

    #[tokio::test]
    async fn status_patch_conflicts_are_retried() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        store.add_stack(stack.clone());
        store.inject_status_patch_conflicts(1);
        let reconciler = new_reconciler(store.clone());

        reconciler.reconcile(&stack).await.unwrap();

        assert_eq!(store.counts().status_patches, 1);
        assert!(store.stack("default", "demo").unwrap().status.is_some());
    }
}
