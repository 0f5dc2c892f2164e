use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Pod, PodStatus, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::fallback::{FallbackSource, FallbackTarget, fallback_items, fallback_version};
use crate::k8s::{ClientSet, RawCollections};
use crate::kubeconfig::{KubeTarget, ResolvedKubeconfig};
use crate::model::{
    ClusterSummary, DETAIL_ROW_LIMIT, DeploymentRow, IngressRow, NamespaceStats, NodeRow,
    NodeStats, PodRow, PvcRow, ResourceKind, ServiceRow, StorageCounts, SummaryDetails,
    TOP_NAMESPACES, WorkloadCounts,
};

const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io";

/// Builds cluster summaries on demand.
///
/// Holds no per-cluster state: every call loads its own kubeconfig copy and
/// client set, so concurrent calls for different contexts do not interfere.
pub struct SummaryEngine<F> {
    kubeconfig_path: PathBuf,
    fallback: F,
}

impl<F> SummaryEngine<F>
where
    F: FallbackSource,
{
    pub fn new(kubeconfig_path: PathBuf, fallback: F) -> Self {
        Self {
            kubeconfig_path,
            fallback,
        }
    }

    pub async fn build_summary(&self, context: Option<&str>, detail: bool) -> Result<ClusterSummary> {
        let mut kubeconfig = ResolvedKubeconfig::load(&self.kubeconfig_path)?;
        let clients = ClientSet::for_context(&mut kubeconfig, context).await?;
        let target = clients.target().clone();

        let raw = RawCollections::fetch(&clients).await;
        let fallback_target = FallbackTarget {
            kubeconfig_path: kubeconfig.path().to_path_buf(),
            context: target.context.clone(),
        };

        assemble(target, raw, detail, &self.fallback, &fallback_target).await
    }
}

/// Folds settled retrievals into a summary.
///
/// Version and node failures abort. Any other failed or empty kind gets one
/// fallback attempt, in `ResourceKind::ALL` order; fallback errors leave the
/// kind empty.
pub async fn assemble<F>(
    target: KubeTarget,
    raw: RawCollections,
    detail: bool,
    fallback: &F,
    fallback_target: &FallbackTarget,
) -> Result<ClusterSummary>
where
    F: FallbackSource,
{
    let RawCollections {
        version,
        nodes,
        namespaces,
        pods,
        deployments,
        statefulsets,
        daemonsets,
        services,
        ingresses,
        storage_classes,
        persistent_volumes,
        persistent_volume_claims,
        custom_resource_definitions,
    } = raw;

    let version = version.with_context(|| critical_failure(ResourceKind::Version))?;
    let nodes = nodes.with_context(|| critical_failure(ResourceKind::Nodes))?;

    let version = match version {
        Some(version) => Some(version),
        None => match fallback_version(fallback, fallback_target).await {
            Ok(version) => version,
            Err(error) => {
                debug!("fallback for {} failed: {error:#}", ResourceKind::Version);
                None
            }
        },
    };

    let nodes = settle(ResourceKind::Nodes, Ok(nodes), fallback, fallback_target).await;
    let namespaces = settle(ResourceKind::Namespaces, namespaces, fallback, fallback_target).await;
    let pods = settle(ResourceKind::Pods, pods, fallback, fallback_target).await;
    let deployments =
        settle(ResourceKind::Deployments, deployments, fallback, fallback_target).await;
    let statefulsets =
        settle(ResourceKind::StatefulSets, statefulsets, fallback, fallback_target).await;
    let daemonsets = settle(ResourceKind::DaemonSets, daemonsets, fallback, fallback_target).await;
    let services = settle(ResourceKind::Services, services, fallback, fallback_target).await;
    let ingresses = settle(ResourceKind::Ingresses, ingresses, fallback, fallback_target).await;
    let storage_classes = settle(
        ResourceKind::StorageClasses,
        storage_classes,
        fallback,
        fallback_target,
    )
    .await;
    let persistent_volumes = settle(
        ResourceKind::PersistentVolumes,
        persistent_volumes,
        fallback,
        fallback_target,
    )
    .await;
    let persistent_volume_claims = settle(
        ResourceKind::PersistentVolumeClaims,
        persistent_volume_claims,
        fallback,
        fallback_target,
    )
    .await;
    let custom_resource_definitions = settle(
        ResourceKind::CustomResourceDefinitions,
        custom_resource_definitions,
        fallback,
        fallback_target,
    )
    .await;

    let details = detail.then(|| SummaryDetails {
        pods: pods.iter().take(DETAIL_ROW_LIMIT).map(pod_row).collect(),
        deployments: deployments
            .iter()
            .take(DETAIL_ROW_LIMIT)
            .map(deployment_row)
            .collect(),
        services: services.iter().take(DETAIL_ROW_LIMIT).map(service_row).collect(),
        ingresses: ingresses
            .iter()
            .take(DETAIL_ROW_LIMIT)
            .map(ingress_row)
            .collect(),
        pvcs: persistent_volume_claims
            .iter()
            .take(DETAIL_ROW_LIMIT)
            .map(pvc_row)
            .collect(),
    });

    Ok(ClusterSummary {
        context: target.context,
        server: target.cluster_server,
        user: target.user_name,
        namespace: target.namespace,
        version,
        nodes: node_stats(&nodes),
        namespaces: NamespaceStats {
            total: namespaces.len(),
            top_by_pods: top_namespaces_by_pods(&pods, TOP_NAMESPACES),
        },
        workloads: WorkloadCounts {
            deployments: deployments.len(),
            statefulsets: statefulsets.len(),
            daemonsets: daemonsets.len(),
            pods: pods.len(),
            services: services.len(),
            ingresses: ingresses.len(),
        },
        storage: StorageCounts {
            storage_classes: storage_classes.len(),
            persistent_volumes: persistent_volumes.len(),
            persistent_volume_claims: persistent_volume_claims.len(),
        },
        crds: custom_resource_definitions.len(),
        details,
    })
}

fn critical_failure(kind: ResourceKind) -> String {
    debug_assert!(kind.is_critical());
    format!("cluster unreachable: {} failed", kind.api_call())
}

/// Unwraps one non-critical kind, trying the fallback once when the primary
/// result is an error or an empty list.
async fn settle<T, F>(
    kind: ResourceKind,
    outcome: Result<Vec<T>>,
    fallback: &F,
    fallback_target: &FallbackTarget,
) -> Vec<T>
where
    T: DeserializeOwned,
    F: FallbackSource,
{
    let items = outcome.unwrap_or_else(|error| {
        debug!("{kind}: {} failed: {error:#}", kind.api_call());
        Vec::new()
    });
    if !items.is_empty() {
        return items;
    }

    match fallback_items(fallback, kind, fallback_target).await {
        Ok(items) => {
            if !items.is_empty() {
                info!("fallback recovered {} {kind}", items.len());
            }
            items
        }
        Err(error) => {
            debug!("fallback for {kind} failed: {error:#}");
            Vec::new()
        }
    }
}

fn node_stats(nodes: &[Node]) -> NodeStats {
    let total = nodes.len();
    let ready = nodes.iter().filter(|node| node_is_ready(node)).count();

    NodeStats {
        total,
        ready,
        not_ready: total.saturating_sub(ready),
        items: nodes.iter().map(node_row).collect(),
    }
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
}

fn node_row(node: &Node) -> NodeRow {
    let info = node
        .status
        .as_ref()
        .and_then(|status| status.node_info.as_ref());
    let capacity = node
        .status
        .as_ref()
        .and_then(|status| status.capacity.as_ref());
    let known = |value: Option<&String>| {
        value
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    };

    NodeRow {
        name: node.name_any(),
        roles: node_roles(node),
        kubelet_version: known(info.map(|info| &info.kubelet_version)),
        os_image: known(info.map(|info| &info.os_image)),
        container_runtime: known(info.map(|info| &info.container_runtime_version)),
        cpu: capacity
            .and_then(|capacity| capacity.get("cpu"))
            .map(|quantity| quantity.0.clone()),
        memory: capacity
            .and_then(|capacity| capacity.get("memory"))
            .map(|quantity| quantity.0.clone()),
    }
}

fn node_roles(node: &Node) -> Vec<String> {
    node.labels()
        .keys()
        .filter(|key| key.starts_with(NODE_ROLE_PREFIX))
        .map(|key| {
            key.split('/')
                .nth(1)
                .filter(|role| !role.is_empty())
                .unwrap_or("role")
                .to_string()
        })
        .collect()
}

/// Tallies pods per namespace and returns the `limit` busiest ones.
///
/// Equal counts keep the order in which their namespace was first seen.
fn top_namespaces_by_pods(pods: &[Pod], limit: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for pod in pods {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        match index.get(&namespace) {
            Some(&position) => counts[position].1 += 1,
            None => {
                index.insert(namespace.clone(), counts.len());
                counts.push((namespace, 1));
            }
        }
    }

    counts.sort_by(|left, right| right.1.cmp(&left.1));
    counts.truncate(limit);
    counts
}

fn pod_row(pod: &Pod) -> PodRow {
    let (ready, total, restarts) = pod
        .status
        .as_ref()
        .map(pod_readiness)
        .unwrap_or((0, 0, 0));

    PodRow {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_else(|| "default".to_string()),
        phase: pod
            .status
            .as_ref()
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready: format!("{ready}/{total}"),
        restarts,
        node: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
    }
}

fn pod_readiness(status: &PodStatus) -> (usize, usize, i32) {
    let container_statuses = status.container_statuses.as_deref().unwrap_or(&[]);
    let total = container_statuses.len();
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

fn deployment_row(deployment: &Deployment) -> DeploymentRow {
    let status = deployment.status.as_ref();
    let ready = status
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .or_else(|| status.and_then(|status| status.replicas))
        .unwrap_or(0);

    DeploymentRow {
        name: deployment.name_any(),
        namespace: deployment.namespace().unwrap_or_default(),
        ready: format!("{ready}/{replicas}"),
    }
}

fn service_row(service: &Service) -> ServiceRow {
    let spec = service.spec.as_ref();

    ServiceRow {
        name: service.name_any(),
        namespace: service.namespace().unwrap_or_default(),
        type_: spec
            .and_then(|spec| spec.type_.clone())
            .unwrap_or_else(|| "ClusterIP".to_string()),
        cluster_ip: spec.and_then(|spec| spec.cluster_ip.clone()),
        ports: service_ports_summary(service),
    }
}

fn service_ports_summary(service: &Service) -> String {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or(&[]);
    if ports.is_empty() {
        return "-".to_string();
    }

    ports
        .iter()
        .map(|port| {
            let protocol = port.protocol.as_deref().unwrap_or("TCP");
            format!("{}/{protocol}", port.port)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn ingress_row(ingress: &Ingress) -> IngressRow {
    let spec = ingress.spec.as_ref();
    let hosts = spec
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or(&[])
        .iter()
        .filter_map(|rule| rule.host.clone())
        .filter(|host| !host.is_empty())
        .collect();

    IngressRow {
        name: ingress.name_any(),
        namespace: ingress.namespace().unwrap_or_default(),
        class: spec.and_then(|spec| spec.ingress_class_name.clone()),
        hosts,
    }
}

fn pvc_row(pvc: &PersistentVolumeClaim) -> PvcRow {
    let status = pvc.status.as_ref();
    let spec = pvc.spec.as_ref();

    PvcRow {
        name: pvc.name_any(),
        namespace: pvc.namespace().unwrap_or_default(),
        status: status
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "-".to_string()),
        capacity: status
            .and_then(|status| status.capacity.as_ref())
            .and_then(|capacity| capacity.get("storage"))
            .map(|quantity| quantity.0.clone()),
        storage_class: spec.and_then(|spec| spec.storage_class_name.clone()),
        volume: spec.and_then(|spec| spec.volume_name.clone()),
    }
}
