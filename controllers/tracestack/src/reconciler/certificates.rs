//! Certificate authority lifecycle for component mTLS.
//!
//! One CA secret per instance, one leaf secret per component. Secrets are
//! fetched from the store and reissued only when absent, malformed, signed
//! by a different CA, or inside their renewal window; otherwise the stored
//! bytes are returned unchanged so a steady-state reconcile is a no-op.
//!
//! This module only reads from the store. The returned manifests join the
//! desired object set, so the apply step is the single write path and
//! disabling the mTLS gate prunes the secrets again.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use thiserror::Error;
use tracing::{debug, info, warn};

use cluster_store::{ClusterStore, ManifestKind, ManifestObject, StoreError};
use crds::{Component, TraceStack};

use crate::pki::{unix_now, CertificateAuthority, CertificateInfo, PkiError};

/// Secret key holding the certificate bytes.
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret key holding the private-key bytes.
pub const TLS_KEY_KEY: &str = "tls.key";

/// Secret key holding the CA bundle on component secrets.
pub const CA_BUNDLE_KEY: &str = "ca.crt";

/// Errors from certificate provisioning.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Store access failed; retryable
    #[error("certificate store access failed: {0}")]
    Store(#[from] StoreError),

    /// Key or certificate generation failed
    #[error(transparent)]
    Pki(#[from] PkiError),

    /// A stored secret has an unexpected shape
    #[error("secret {secret} is malformed: {detail}")]
    Malformed {
        /// Secret name
        secret: String,
        /// What was wrong
        detail: String,
    },
}

/// Service principal bound into leaf certificate subjects.
///
/// Explicit configuration passed into [`CertificateManager::new`] so it is
/// testable and overridable per deployment.
#[derive(Debug, Clone)]
pub struct ServicePrincipal {
    /// Subject common name
    pub common_name: String,

    /// Subject serialNumber attribute; empty to omit
    pub serial_number: String,

    /// Subject organization (group) identities
    pub organizations: Vec<String>,
}

impl Default for ServicePrincipal {
    fn default() -> Self {
        Self {
            common_name: "system:tracestacks".to_string(),
            serial_number: String::new(),
            organizations: vec!["system:observability".to_string()],
        }
    }
}

/// Name of the per-instance CA secret.
pub fn ca_secret_name(instance: &str) -> String {
    format!("{instance}-ca-cert")
}

/// Name of a component's leaf certificate secret.
pub fn component_secret_name(instance: &str, component: Component) -> String {
    format!("{instance}-{component}-certs")
}

/// Hostnames a component's leaf certificate must cover.
fn component_hostnames(instance: &str, namespace: &str, component: Component) -> Vec<String> {
    let service = format!("{instance}-{component}");
    vec![
        service.clone(),
        format!("{service}.{namespace}.svc.cluster.local"),
    ]
}

/// Ensures CA and per-component leaf certificates exist and are current.
pub struct CertificateManager {
    principal: ServicePrincipal,
}

impl CertificateManager {
    /// Create a manager bound to the given service principal.
    pub fn new(principal: ServicePrincipal) -> Self {
        Self { principal }
    }

    /// Ensure the CA and all component certificates for one instance.
    ///
    /// Returns the CA secret followed by one leaf secret per component, in
    /// component order.
    pub async fn ensure(
        &self,
        store: &dyn ClusterStore,
        stack: &TraceStack,
    ) -> Result<Vec<ManifestObject>, CertificateError> {
        let namespace = stack.metadata.namespace.as_deref().unwrap_or("default");
        let instance = stack.metadata.name.as_deref().unwrap_or("");

        let (ca, ca_secret) = self
            .ensure_ca(store, namespace, &ca_secret_name(instance))
            .await?;

        let mut manifests = vec![ca_secret];
        for component in Component::ALL {
            manifests.push(
                self.ensure_component_cert(store, &ca, namespace, instance, component)
                    .await?,
            );
        }
        Ok(manifests)
    }

    /// Fetch the CA secret, generating a fresh self-signed CA when the
    /// secret is absent, malformed, or inside its renewal window.
    ///
    /// A store error other than not-found is fatal to the whole reconcile.
    pub async fn ensure_ca(
        &self,
        store: &dyn ClusterStore,
        namespace: &str,
        name: &str,
    ) -> Result<(CertificateAuthority, ManifestObject), CertificateError> {
        match store.get(ManifestKind::Secret, namespace, name).await {
            Ok(object) => {
                let secret = as_secret(object, name)?;
                match ca_from_secret(&secret) {
                    Ok(ca) => {
                        if !ca.info()?.needs_renewal_at(unix_now()) {
                            debug!("CA secret {}/{} is current, reusing", namespace, name);
                            return Ok((ca, ManifestObject::Secret(secret)));
                        }
                        info!(
                            "CA secret {}/{} is inside its renewal window, reissuing",
                            namespace, name
                        );
                    }
                    Err(e) => {
                        warn!("CA secret {}/{} is unusable ({}), reissuing", namespace, name, e);
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                info!("CA secret {}/{} not found, issuing a new CA", namespace, name);
            }
            Err(e) => return Err(e.into()),
        }

        let ca = CertificateAuthority::generate("tracestack-ca")?;
        let secret = tls_secret(namespace, name, ca.cert_pem(), ca.key_pem(), None);
        Ok((ca, secret))
    }

    /// Fetch one component's leaf secret, issuing a new leaf when the secret
    /// is absent, malformed, signed by a different CA, or inside its renewal
    /// window.
    pub async fn ensure_component_cert(
        &self,
        store: &dyn ClusterStore,
        ca: &CertificateAuthority,
        namespace: &str,
        instance: &str,
        component: Component,
    ) -> Result<ManifestObject, CertificateError> {
        let name = component_secret_name(instance, component);
        match store.get(ManifestKind::Secret, namespace, &name).await {
            Ok(object) => {
                let secret = as_secret(object, &name)?;
                match leaf_is_current(&secret, ca) {
                    Ok(true) => {
                        debug!("leaf secret {}/{} is current, reusing", namespace, name);
                        return Ok(ManifestObject::Secret(secret));
                    }
                    Ok(false) => {
                        info!("leaf secret {}/{} needs reissue", namespace, name);
                    }
                    Err(e) => {
                        warn!(
                            "leaf secret {}/{} is unusable ({}), reissuing",
                            namespace, name, e
                        );
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                info!("leaf secret {}/{} not found, issuing", namespace, name);
            }
            Err(e) => return Err(e.into()),
        }

        let hostnames = component_hostnames(instance, namespace, component);
        let (cert_pem, key_pem) = ca.issue_leaf(
            &self.principal.common_name,
            &self.principal.serial_number,
            &self.principal.organizations,
            &hostnames,
        )?;
        Ok(tls_secret(
            namespace,
            &name,
            &cert_pem,
            &key_pem,
            Some(ca.cert_pem()),
        ))
    }
}

fn as_secret(object: ManifestObject, name: &str) -> Result<Secret, CertificateError> {
    match object {
        ManifestObject::Secret(secret) => Ok(secret),
        other => Err(CertificateError::Malformed {
            secret: name.to_string(),
            detail: format!("expected a Secret, found {}", other.kind()),
        }),
    }
}

fn secret_bytes<'a>(secret: &'a Secret, key: &str) -> Result<&'a [u8], CertificateError> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| b.0.as_slice())
        .ok_or_else(|| CertificateError::Malformed {
            secret: secret.metadata.name.clone().unwrap_or_default(),
            detail: format!("missing key {key}"),
        })
}

fn secret_str<'a>(secret: &'a Secret, key: &str) -> Result<&'a str, CertificateError> {
    std::str::from_utf8(secret_bytes(secret, key)?).map_err(|e| CertificateError::Malformed {
        secret: secret.metadata.name.clone().unwrap_or_default(),
        detail: format!("{key} is not UTF-8: {e}"),
    })
}

fn ca_from_secret(secret: &Secret) -> Result<CertificateAuthority, CertificateError> {
    let cert_pem = secret_str(secret, TLS_CERT_KEY)?;
    let key_pem = secret_str(secret, TLS_KEY_KEY)?;
    Ok(CertificateAuthority::from_pem(cert_pem, key_pem)?)
}

/// A leaf is current when it parses, its CA bundle matches the active CA,
/// and it is outside its renewal window.
fn leaf_is_current(secret: &Secret, ca: &CertificateAuthority) -> Result<bool, CertificateError> {
    let cert_pem = secret_str(secret, TLS_CERT_KEY)?;
    secret_str(secret, TLS_KEY_KEY)?;
    let bundle = secret_str(secret, CA_BUNDLE_KEY)?;
    if bundle != ca.cert_pem() {
        return Ok(false);
    }
    let info = CertificateInfo::from_pem(cert_pem)?;
    Ok(!info.needs_renewal_at(unix_now()))
}

fn tls_secret(
    namespace: &str,
    name: &str,
    cert_pem: &str,
    key_pem: &str,
    ca_bundle: Option<&str>,
) -> ManifestObject {
    let mut data = BTreeMap::from([
        (
            TLS_CERT_KEY.to_string(),
            ByteString(cert_pem.as_bytes().to_vec()),
        ),
        (
            TLS_KEY_KEY.to_string(),
            ByteString(key_pem.as_bytes().to_vec()),
        ),
    ]);
    if let Some(bundle) = ca_bundle {
        data.insert(
            CA_BUNDLE_KEY.to_string(),
            ByteString(bundle.as_bytes().to_vec()),
        );
    }
    ManifestObject::Secret(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(data),
        ..Default::default()
    })
}
