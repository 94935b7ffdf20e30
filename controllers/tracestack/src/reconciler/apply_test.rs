//! Unit tests for managed object convergence

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use cluster_store::{ManifestKind, ManifestObject, MockClusterStore};

    use crate::reconciler::apply::{kind_rank, reconcile_managed_objects, OwnedIndex};
    use crate::render::{Renderer, StackRenderer, StackValues};
    use crate::test_utils::make_stack;

    fn config_map(name: &str, value: &str) -> ManifestObject {
        ManifestObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
            ..Default::default()
        })
    }

    fn rendered_set() -> (crds::TraceStack, Vec<ManifestObject>) {
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        let values = StackValues::from_spec(&stack.spec).unwrap();
        let manifests = StackRenderer.render(&stack, &values).unwrap();
        (stack, manifests)
    }

    #[tokio::test]
    async fn repeated_apply_issues_no_mutating_calls() {
        let store = Arc::new(MockClusterStore::new());
        let (stack, manifests) = rendered_set();

        let first = reconcile_managed_objects(
            store.as_ref(),
            &stack,
            manifests.clone(),
            &OwnedIndex::new(),
        )
        .await
        .unwrap();
        assert_eq!(store.counts().creates, manifests.len() as u64);
        assert_eq!(first.len(), manifests.len());

        store.reset_counts();
        let second =
            reconcile_managed_objects(store.as_ref(), &stack, manifests, &first)
                .await
                .unwrap();
        assert_eq!(store.counts().mutations(), 0);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn objects_leaving_the_desired_set_are_pruned() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);

        let previous = reconcile_managed_objects(
            store.as_ref(),
            &stack,
            vec![config_map("a", "1"), config_map("b", "1")],
            &OwnedIndex::new(),
        )
        .await
        .unwrap();
        let b_uid = store
            .object(ManifestKind::ConfigMap, "default", "b")
            .unwrap()
            .uid()
            .unwrap()
            .to_string();

        store.reset_counts();
        let index = reconcile_managed_objects(
            store.as_ref(),
            &stack,
            vec![config_map("b", "1"), config_map("c", "1")],
            &previous,
        )
        .await
        .unwrap();

        // A deleted, B untouched, C created.
        assert!(store.object(ManifestKind::ConfigMap, "default", "a").is_none());
        assert!(store.object(ManifestKind::ConfigMap, "default", "c").is_some());
        assert_eq!(store.counts().deletes, 1);
        assert_eq!(store.counts().creates, 1);
        assert_eq!(store.counts().updates, 0);
        assert!(index.contains_key(&b_uid));
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn changed_objects_are_updated_in_place() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);

        let previous = reconcile_managed_objects(
            store.as_ref(),
            &stack,
            vec![config_map("a", "1")],
            &OwnedIndex::new(),
        )
        .await
        .unwrap();

        store.reset_counts();
        reconcile_managed_objects(
            store.as_ref(),
            &stack,
            vec![config_map("a", "2")],
            &previous,
        )
        .await
        .unwrap();

        assert_eq!(store.counts().updates, 1);
        assert_eq!(store.counts().creates, 0);
        assert_eq!(store.counts().deletes, 0);
        let live = store
            .object(ManifestKind::ConfigMap, "default", "a")
            .unwrap();
        match live {
            ManifestObject::ConfigMap(cm) => {
                assert_eq!(cm.data.unwrap().get("key"), Some(&"2".to_string()));
            }
            other => panic!("unexpected kind {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn applied_objects_carry_the_controller_owner_reference() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);

        reconcile_managed_objects(
            store.as_ref(),
            &stack,
            vec![config_map("a", "1")],
            &OwnedIndex::new(),
        )
        .await
        .unwrap();

        let live = store
            .object(ManifestKind::ConfigMap, "default", "a")
            .unwrap();
        let owners = live.metadata().owner_references.clone().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "TraceStack");
        assert_eq!(owners[0].name, "demo");
        assert_eq!(owners[0].uid, "demo-uid");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn apply_order_puts_configuration_before_workloads() {
        assert!(kind_rank(ManifestKind::ServiceAccount) < kind_rank(ManifestKind::ConfigMap));
        assert!(kind_rank(ManifestKind::ConfigMap) < kind_rank(ManifestKind::Secret));
        assert!(kind_rank(ManifestKind::Secret) < kind_rank(ManifestKind::StatefulSet));
        assert!(kind_rank(ManifestKind::StatefulSet) < kind_rank(ManifestKind::Deployment));
        assert!(kind_rank(ManifestKind::Deployment) < kind_rank(ManifestKind::Service));
        assert!(kind_rank(ManifestKind::Service) < kind_rank(ManifestKind::Ingress));
    }
}
