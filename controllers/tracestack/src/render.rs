//! Rendering of component manifests from the values document.
//!
//! `StackValues` is the typed view over the free-form values document in the
//! TraceStack spec; serde defaults stand in for chart-default merging. The
//! `Renderer` trait is the seam the orchestrator calls through, and
//! `StackRenderer` is the built-in implementation producing one ConfigMap,
//! Service, and workload per component.
//!
//! The mTLS gate is read at exactly `server.mtls.enabled`; no other path is
//! consulted.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, HTTPGetAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use thiserror::Error;

use cluster_store::ManifestObject;
use crds::{Component, TraceStack, TraceStackSpec, WorkloadKind};

use crate::labels::{component_labels, instance_labels, selector_labels};
use crate::reconciler::certificates::component_secret_name;

/// Errors produced at the renderer boundary.
///
/// Both kinds require a spec correction; they classify as configuration
/// errors and are terminal.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The values document could not be deserialized
    #[error("values document is invalid: {0}")]
    InvalidValues(String),

    /// The values document deserialized but fails validation
    #[error("values validation failed: {0}")]
    Validation(String),
}

/// Image reference knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageValues {
    /// Image repository
    pub repository: String,

    /// Image tag
    pub tag: String,
}

impl Default for ImageValues {
    fn default() -> Self {
        Self {
            repository: "docker.io/microscaler/tracestack".to_string(),
            tag: "latest".to_string(),
        }
    }
}

/// mTLS gate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MtlsValues {
    /// Whether components authenticate each other with mutual TLS
    pub enabled: bool,
}

/// Shared server knobs applied to every component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerValues {
    /// HTTP listen port
    pub http_listen_port: i32,

    /// gRPC listen port
    pub grpc_listen_port: i32,

    /// Mutual TLS gate
    pub mtls: MtlsValues,
}

impl Default for ServerValues {
    fn default() -> Self {
        Self {
            http_listen_port: 3200,
            grpc_listen_port: 9095,
            mtls: MtlsValues::default(),
        }
    }
}

/// Knobs for a stateless component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkloadValues {
    /// Replica count
    pub replicas: i32,
}

impl Default for WorkloadValues {
    fn default() -> Self {
        Self { replicas: 1 }
    }
}

/// Knobs for the ingester.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngesterValues {
    /// Replica count; must be at least 1
    pub replicas: i32,

    /// Size of the per-replica data volume
    pub storage_size: String,
}

impl Default for IngesterValues {
    fn default() -> Self {
        Self {
            replicas: 1,
            storage_size: "10Gi".to_string(),
        }
    }
}

/// Ingress knobs for the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngressValues {
    /// Whether to expose the gateway through an Ingress
    pub enabled: bool,

    /// Ingress host
    pub host: String,
}

/// Knobs for the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayValues {
    /// Replica count
    pub replicas: i32,

    /// Optional ingress exposure
    pub ingress: IngressValues,
}

impl Default for GatewayValues {
    fn default() -> Self {
        Self {
            replicas: 1,
            ingress: IngressValues::default(),
        }
    }
}

/// Typed view over the merged values document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StackValues {
    /// Image reference
    pub image: ImageValues,

    /// Shared server knobs
    pub server: ServerValues,

    /// Distributor knobs
    pub distributor: WorkloadValues,

    /// Ingester knobs
    pub ingester: IngesterValues,

    /// Compactor knobs
    pub compactor: WorkloadValues,

    /// Querier knobs
    pub querier: WorkloadValues,

    /// Query-frontend knobs
    pub query_frontend: WorkloadValues,

    /// Gateway knobs
    pub gateway: GatewayValues,
}

impl StackValues {
    /// Parse and validate the values document of a spec.
    pub fn from_spec(spec: &TraceStackSpec) -> Result<Self, RenderError> {
        let values = if spec.values.is_null() {
            StackValues::default()
        } else {
            serde_json::from_value(spec.values.clone())
                .map_err(|e| RenderError::InvalidValues(e.to_string()))?
        };
        values.validate()?;
        Ok(values)
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.image.repository.is_empty() {
            return Err(RenderError::Validation(
                "image.repository must not be empty".to_string(),
            ));
        }
        if self.ingester.replicas < 1 {
            return Err(RenderError::Validation(
                "ingester.replicas must be at least 1".to_string(),
            ));
        }
        if self.ingester.storage_size.is_empty() {
            return Err(RenderError::Validation(
                "ingester.storageSize must not be empty".to_string(),
            ));
        }
        for component in Component::ALL {
            if self.replicas(component) < 0 {
                return Err(RenderError::Validation(format!(
                    "{component}.replicas must not be negative"
                )));
            }
        }
        if self.gateway.ingress.enabled && self.gateway.ingress.host.is_empty() {
            return Err(RenderError::Validation(
                "gateway.ingress.host is required when gateway.ingress.enabled is true".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether mutual TLS credential provisioning is enabled.
    pub fn mtls_enabled(&self) -> bool {
        self.server.mtls.enabled
    }

    /// Declared replica count for a component.
    pub fn replicas(&self, component: Component) -> i32 {
        match component {
            Component::Distributor => self.distributor.replicas,
            Component::Ingester => self.ingester.replicas,
            Component::Compactor => self.compactor.replicas,
            Component::Querier => self.querier.replicas,
            Component::QueryFrontend => self.query_frontend.replicas,
            Component::Gateway => self.gateway.replicas,
        }
    }

    /// Full image reference.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image.repository, self.image.tag)
    }
}

/// Produces the ordered candidate object list for one instance.
pub trait Renderer: Send + Sync {
    /// Render the desired object set from the spec and parsed values.
    fn render(
        &self,
        stack: &TraceStack,
        values: &StackValues,
    ) -> Result<Vec<ManifestObject>, RenderError>;
}

/// Built-in renderer producing typed manifests per component.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackRenderer;

fn stack_name(stack: &TraceStack) -> &str {
    stack.metadata.name.as_deref().unwrap_or("")
}

fn stack_namespace(stack: &TraceStack) -> &str {
    stack.metadata.namespace.as_deref().unwrap_or("default")
}

/// Name of a component's ConfigMap, Service, and workload.
pub fn component_object_name(instance: &str, component: Component) -> String {
    format!("{instance}-{component}")
}

/// Name of the instance service account.
pub fn service_account_name(instance: &str) -> String {
    format!("{instance}-tracestack")
}

fn object_meta(
    stack: &TraceStack,
    name: String,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(stack_namespace(stack).to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn service_account(stack: &TraceStack) -> ManifestObject {
    let instance = stack_name(stack);
    ManifestObject::ServiceAccount(ServiceAccount {
        metadata: object_meta(
            stack,
            service_account_name(instance),
            instance_labels(instance),
        ),
        ..Default::default()
    })
}

fn config_map(stack: &TraceStack, values: &StackValues, component: Component) -> ManifestObject {
    let instance = stack_name(stack);
    let config = format!(
        "target: {component}\n\
         server:\n  \
           http_listen_port: {http}\n  \
           grpc_listen_port: {grpc}\n  \
           mtls_enabled: {mtls}\n",
        http = values.server.http_listen_port,
        grpc = values.server.grpc_listen_port,
        mtls = values.mtls_enabled(),
    );
    ManifestObject::ConfigMap(ConfigMap {
        metadata: object_meta(
            stack,
            component_object_name(instance, component),
            component_labels(instance, component),
        ),
        data: Some(BTreeMap::from([("config.yaml".to_string(), config)])),
        ..Default::default()
    })
}

fn service(stack: &TraceStack, values: &StackValues, component: Component) -> ManifestObject {
    let instance = stack_name(stack);
    ManifestObject::Service(Service {
        metadata: object_meta(
            stack,
            component_object_name(instance, component),
            component_labels(instance, component),
        ),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(instance, component)),
            ports: Some(vec![
                ServicePort {
                    name: Some("http".to_string()),
                    port: values.server.http_listen_port,
                    target_port: Some(IntOrString::Int(values.server.http_listen_port)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("grpc".to_string()),
                    port: values.server.grpc_listen_port,
                    target_port: Some(IntOrString::Int(values.server.grpc_listen_port)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn pod_template(stack: &TraceStack, values: &StackValues, component: Component) -> PodTemplateSpec {
    let instance = stack_name(stack);
    let config_name = component_object_name(instance, component);

    let mut volume_mounts = vec![VolumeMount {
        name: "config".to_string(),
        mount_path: "/etc/tracestack".to_string(),
        read_only: Some(true),
        ..Default::default()
    }];
    let mut volumes = vec![Volume {
        name: "config".to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_name,
            ..Default::default()
        }),
        ..Default::default()
    }];

    if values.mtls_enabled() {
        volume_mounts.push(VolumeMount {
            name: "tls".to_string(),
            mount_path: "/etc/tracestack/tls".to_string(),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(Volume {
            name: "tls".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(component_secret_name(instance, component)),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    if component.workload() == WorkloadKind::Stateful {
        volume_mounts.push(VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/tracestack".to_string(),
            ..Default::default()
        });
    }

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(component_labels(instance, component)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(service_account_name(instance)),
            containers: vec![Container {
                name: component.as_str().to_string(),
                image: Some(values.image_ref()),
                args: Some(vec![
                    format!("-target={component}"),
                    "-config.file=/etc/tracestack/config.yaml".to_string(),
                ]),
                ports: Some(vec![
                    ContainerPort {
                        name: Some("http".to_string()),
                        container_port: values.server.http_listen_port,
                        ..Default::default()
                    },
                    ContainerPort {
                        name: Some("grpc".to_string()),
                        container_port: values.server.grpc_listen_port,
                        ..Default::default()
                    },
                ]),
                readiness_probe: Some(Probe {
                    http_get: Some(HTTPGetAction {
                        path: Some("/ready".to_string()),
                        port: IntOrString::Int(values.server.http_listen_port),
                        ..Default::default()
                    }),
                    initial_delay_seconds: Some(15),
                    ..Default::default()
                }),
                volume_mounts: Some(volume_mounts),
                ..Default::default()
            }],
            volumes: Some(volumes),
            ..Default::default()
        }),
    }
}

fn deployment(stack: &TraceStack, values: &StackValues, component: Component) -> ManifestObject {
    let instance = stack_name(stack);
    ManifestObject::Deployment(Deployment {
        metadata: object_meta(
            stack,
            component_object_name(instance, component),
            component_labels(instance, component),
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(values.replicas(component)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance, component)),
                ..Default::default()
            },
            template: pod_template(stack, values, component),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn stateful_set(stack: &TraceStack, values: &StackValues, component: Component) -> ManifestObject {
    let instance = stack_name(stack);
    ManifestObject::StatefulSet(StatefulSet {
        metadata: object_meta(
            stack,
            component_object_name(instance, component),
            component_labels(instance, component),
        ),
        spec: Some(StatefulSetSpec {
            replicas: Some(values.replicas(component)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance, component)),
                ..Default::default()
            },
            service_name: Some(component_object_name(instance, component)),
            template: pod_template(stack, values, component),
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("data".to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(values.ingester.storage_size.clone()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn ingress(stack: &TraceStack, values: &StackValues) -> ManifestObject {
    let instance = stack_name(stack);
    ManifestObject::Ingress(Ingress {
        metadata: object_meta(
            stack,
            component_object_name(instance, Component::Gateway),
            component_labels(instance, Component::Gateway),
        ),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(values.gateway.ingress.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: component_object_name(instance, Component::Gateway),
                                port: Some(ServiceBackendPort {
                                    number: Some(values.server.http_listen_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

impl Renderer for StackRenderer {
    fn render(
        &self,
        stack: &TraceStack,
        values: &StackValues,
    ) -> Result<Vec<ManifestObject>, RenderError> {
        let mut manifests = vec![service_account(stack)];
        for component in Component::ALL {
            manifests.push(config_map(stack, values, component));
            manifests.push(service(stack, values, component));
            manifests.push(match component.workload() {
                WorkloadKind::Stateless => deployment(stack, values, component),
                WorkloadKind::Stateful => stateful_set(stack, values, component),
            });
        }
        if values.gateway.ingress.enabled {
            manifests.push(ingress(stack, values));
        }
        Ok(manifests)
    }
}
