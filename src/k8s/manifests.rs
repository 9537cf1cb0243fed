//! Experiment workload manifests
//!
//! Objects are built as typed k8s-openapi resources and serialized to YAML,
//! one file per object, so kubectl can apply or delete each independently.

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::experiment::{ManifestKind, manifest_path, object_name};
use crate::config::settings::WorkloadSettings;

/// Port the service exposes on its load balancer
pub const SERVICE_PORT: i32 = 80;

fn app_labels(app: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), app.to_string()),
        ("scalelab/role".to_string(), role.to_string()),
    ])
}

fn metadata(name: String, namespace: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

/// Kubernetes count fields are `int32`
fn int32(field: &str, value: u32) -> Result<i32> {
    i32::try_from(value)
        .with_context(|| format!("{} = {} is larger than Kubernetes allows", field, value))
}

fn deployment_with(
    name: String,
    namespace: &str,
    labels: BTreeMap<String, String>,
    replicas: i32,
    container: Container,
) -> Deployment {
    Deployment {
        metadata: metadata(name, namespace, &labels),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `<app>-deployment`: the scaled web workload
pub fn deployment(app: &str, namespace: &str, workload: &WorkloadSettings) -> Result<Deployment> {
    let container = Container {
        name: app.to_string(),
        image: Some(workload.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(workload.container_port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(&workload.cpu_request, &workload.memory_request)),
            limits: Some(quantities(&workload.cpu_limit, &workload.memory_limit)),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(deployment_with(
        object_name(app, ManifestKind::Deployment),
        namespace,
        app_labels(app, "web"),
        int32("workload.replicas", workload.replicas)?,
        container,
    ))
}

/// `<app>-service`: LoadBalancer on port 80 in front of the deployment
pub fn service(app: &str, namespace: &str, workload: &WorkloadSettings) -> Service {
    let labels = app_labels(app, "web");
    Service {
        metadata: metadata(object_name(app, ManifestKind::Service), namespace, &labels),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(i32::from(workload.container_port))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `<app>-hpa`: autoscaling/v2 on average CPU utilization
pub fn hpa(
    app: &str,
    namespace: &str,
    workload: &WorkloadSettings,
) -> Result<HorizontalPodAutoscaler> {
    let min_replicas = int32("workload.hpa_min_replicas", workload.hpa_min_replicas)?;
    let max_replicas = int32("workload.hpa_max_replicas", workload.hpa_max_replicas)?;
    let cpu_target = int32("workload.hpa_cpu_target", workload.hpa_cpu_target)?;

    Ok(HorizontalPodAutoscaler {
        metadata: metadata(
            object_name(app, ManifestKind::Hpa),
            namespace,
            &app_labels(app, "autoscaler"),
        ),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: object_name(app, ManifestKind::Deployment),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(cpu_target),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// In-cluster URL of the application's service
pub fn service_url(app: &str, namespace: &str) -> String {
    format!(
        "http://{}.{}.svc.cluster.local:{}/",
        object_name(app, ManifestKind::Service),
        namespace,
        SERVICE_PORT
    )
}

/// `<app>-loadgen`: a deployment of clients requesting the service in a loop
pub fn loadgen(app: &str, namespace: &str, workload: &WorkloadSettings) -> Result<Deployment> {
    let script = format!(
        "while true; do wget -q -O /dev/null {} || true; done",
        service_url(app, namespace)
    );

    let container = Container {
        name: "loadgen".to_string(),
        image: Some(workload.loadgen_image.clone()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities("100m", "32Mi")),
            limits: Some(quantities("250m", "64Mi")),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(deployment_with(
        object_name(app, ManifestKind::LoadGen),
        namespace,
        app_labels(app, "loadgen"),
        int32("workload.loadgen_replicas", workload.loadgen_replicas)?,
        container,
    ))
}

/// Serialize any manifest to a YAML document
pub fn to_yaml<T: Serialize>(object: &T) -> Result<String> {
    serde_yaml::to_string(object).context("Failed to serialize manifest")
}

/// YAML for one kind of workload object
pub fn render(
    kind: ManifestKind,
    app: &str,
    namespace: &str,
    workload: &WorkloadSettings,
) -> Result<String> {
    match kind {
        ManifestKind::Deployment => to_yaml(&deployment(app, namespace, workload)?),
        ManifestKind::Service => to_yaml(&service(app, namespace, workload)),
        ManifestKind::Hpa => to_yaml(&hpa(app, namespace, workload)?),
        ManifestKind::LoadGen => to_yaml(&loadgen(app, namespace, workload)?),
    }
}

/// Write every workload manifest for `app` into `dir`, returning the paths written
pub fn render_to_dir(
    dir: &Path,
    app: &str,
    namespace: &str,
    workload: &WorkloadSettings,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create manifests directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(ManifestKind::ALL.len());
    for kind in ManifestKind::ALL {
        let path = manifest_path(dir, app, kind);
        let yaml = render(kind, app, namespace, workload)?;
        fs::write(&path, yaml)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        crate::log_info!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}
