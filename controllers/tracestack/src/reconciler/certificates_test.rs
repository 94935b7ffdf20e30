//! Unit tests for certificate provisioning

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;

    use cluster_store::{ManifestObject, MockClusterStore};
    use crds::Component;

    use crate::pki::CertificateInfo;
    use crate::reconciler::certificates::{
        ca_secret_name, component_secret_name, CertificateManager, ServicePrincipal,
        CA_BUNDLE_KEY, TLS_CERT_KEY, TLS_KEY_KEY,
    };
    use crate::test_utils::make_stack;

    fn manager() -> CertificateManager {
        CertificateManager::new(ServicePrincipal::default())
    }

    fn secret_of(manifest: &ManifestObject) -> &Secret {
        match manifest {
            ManifestObject::Secret(secret) => secret,
            other => panic!("expected a Secret, found {}", other.kind()),
        }
    }

    fn data_of<'a>(secret: &'a Secret, key: &str) -> &'a [u8] {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|b| b.0.as_slice())
            .unwrap_or_else(|| panic!("secret missing key {key}"))
    }

    #[tokio::test]
    async fn issues_ca_and_one_leaf_per_component() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);

        let manifests = manager().ensure(store.as_ref(), &stack).await.unwrap();
        assert_eq!(manifests.len(), 1 + Component::ALL.len());
        assert_eq!(manifests[0].name(), ca_secret_name("demo"));

        let ca_secret = secret_of(&manifests[0]);
        let ca_cert = data_of(ca_secret, TLS_CERT_KEY).to_vec();
        data_of(ca_secret, TLS_KEY_KEY);

        for (component, manifest) in Component::ALL.iter().zip(&manifests[1..]) {
            assert_eq!(manifest.name(), component_secret_name("demo", *component));
            let secret = secret_of(manifest);
            data_of(secret, TLS_CERT_KEY);
            data_of(secret, TLS_KEY_KEY);
            // CA bundle rides along so dependents can validate peers
            // without a separate fetch.
            assert_eq!(data_of(secret, CA_BUNDLE_KEY), ca_cert.as_slice());
        }
    }

    #[tokio::test]
    async fn leaf_subject_is_bound_to_the_principal() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        let principal = ServicePrincipal {
            common_name: "system:stacks:demo".to_string(),
            serial_number: "42".to_string(),
            organizations: vec!["system:observability".to_string()],
        };

        let manifests = CertificateManager::new(principal)
            .ensure(store.as_ref(), &stack)
            .await
            .unwrap();
        let leaf = secret_of(&manifests[1]);
        let cert_pem = String::from_utf8(data_of(leaf, TLS_CERT_KEY).to_vec()).unwrap();
        let info = CertificateInfo::from_pem(&cert_pem).unwrap();
        assert_eq!(info.common_name, "system:stacks:demo");
    }

    #[tokio::test]
    async fn stored_material_is_reused_byte_identically() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        let mgr = manager();

        let first = mgr.ensure(store.as_ref(), &stack).await.unwrap();
        for manifest in &first {
            store.add_object(manifest.clone());
        }

        let second = mgr.ensure(store.as_ref(), &stack).await.unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(secret_of(a).data, secret_of(b).data, "{} changed", a.name());
        }
    }

    #[tokio::test]
    async fn leaf_with_stale_ca_bundle_is_reissued() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);
        let mgr = manager();

        let first = mgr.ensure(store.as_ref(), &stack).await.unwrap();
        let ca_cert = data_of(secret_of(&first[0]), TLS_CERT_KEY).to_vec();
        for (i, manifest) in first.iter().enumerate() {
            let mut manifest = manifest.clone();
            if i == 1 {
                // Simulate a leaf issued under a previous CA.
                if let ManifestObject::Secret(secret) = &mut manifest {
                    secret
                        .data
                        .as_mut()
                        .unwrap()
                        .insert(CA_BUNDLE_KEY.to_string(), ByteString(b"stale".to_vec()));
                }
            }
            store.add_object(manifest);
        }

        let second = mgr.ensure(store.as_ref(), &stack).await.unwrap();
        let reissued = secret_of(&second[1]);
        assert_eq!(data_of(reissued, CA_BUNDLE_KEY), ca_cert.as_slice());
        assert_ne!(
            data_of(reissued, TLS_CERT_KEY),
            data_of(secret_of(&first[1]), TLS_CERT_KEY)
        );
    }

    #[tokio::test]
    async fn malformed_ca_secret_is_replaced() {
        let store = Arc::new(MockClusterStore::new());
        let stack = make_stack("demo", "default", serde_json::Value::Null);

        store.add_object(ManifestObject::Secret(Secret {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(ca_secret_name("demo")),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }));

        let manifests = manager().ensure(store.as_ref(), &stack).await.unwrap();
        let ca_secret = secret_of(&manifests[0]);
        data_of(ca_secret, TLS_CERT_KEY);
        data_of(ca_secret, TLS_KEY_KEY);
    }
}
