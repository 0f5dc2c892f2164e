use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Length of the "top namespaces by pod count" list.
pub const TOP_NAMESPACES: usize = 10;

/// Cap applied to every detail row list.
pub const DETAIL_ROW_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Version,
    Nodes,
    Namespaces,
    Pods,
    Deployments,
    StatefulSets,
    DaemonSets,
    Services,
    Ingresses,
    StorageClasses,
    PersistentVolumes,
    PersistentVolumeClaims,
    CustomResourceDefinitions,
}

impl ResourceKind {
    /// Every tracked kind, in the order fallbacks are attempted.
    pub const ALL: [Self; 13] = [
        Self::Version,
        Self::Nodes,
        Self::Namespaces,
        Self::Pods,
        Self::Deployments,
        Self::StatefulSets,
        Self::DaemonSets,
        Self::Services,
        Self::Ingresses,
        Self::StorageClasses,
        Self::PersistentVolumes,
        Self::PersistentVolumeClaims,
        Self::CustomResourceDefinitions,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Version => "Version",
            Self::Nodes => "Nodes",
            Self::Namespaces => "Namespaces",
            Self::Pods => "Pods",
            Self::Deployments => "Deployments",
            Self::StatefulSets => "StatefulSets",
            Self::DaemonSets => "DaemonSets",
            Self::Services => "Services",
            Self::Ingresses => "Ingresses",
            Self::StorageClasses => "StorageClasses",
            Self::PersistentVolumes => "PersistentVolumes",
            Self::PersistentVolumeClaims => "PVC",
            Self::CustomResourceDefinitions => "CRD",
        }
    }

    /// The primary API call backing this kind, as shown in error messages.
    pub fn api_call(self) -> &'static str {
        match self {
            Self::Version => "get server version",
            Self::Nodes => "list nodes",
            Self::Namespaces => "list namespaces",
            Self::Pods => "list pods (all namespaces)",
            Self::Deployments => "list deployments (all namespaces)",
            Self::StatefulSets => "list statefulsets (all namespaces)",
            Self::DaemonSets => "list daemonsets (all namespaces)",
            Self::Services => "list services (all namespaces)",
            Self::Ingresses => "list ingresses (all namespaces)",
            Self::StorageClasses => "list storage classes",
            Self::PersistentVolumes => "list persistent volumes",
            Self::PersistentVolumeClaims => "list persistent volume claims (all namespaces)",
            Self::CustomResourceDefinitions => "list custom resource definitions",
        }
    }

    pub fn kubectl_args(self) -> &'static [&'static str] {
        match self {
            Self::Version => &["version"],
            Self::Nodes => &["get", "nodes"],
            Self::Namespaces => &["get", "namespaces"],
            Self::Pods => &["get", "pods", "--all-namespaces"],
            Self::Deployments => &["get", "deployments", "--all-namespaces"],
            Self::StatefulSets => &["get", "statefulsets", "--all-namespaces"],
            Self::DaemonSets => &["get", "daemonsets", "--all-namespaces"],
            Self::Services => &["get", "services", "--all-namespaces"],
            Self::Ingresses => &["get", "ingresses", "--all-namespaces"],
            Self::StorageClasses => &["get", "storageclass"],
            Self::PersistentVolumes => &["get", "pv"],
            Self::PersistentVolumeClaims => &["get", "pvc", "--all-namespaces"],
            Self::CustomResourceDefinitions => &["get", "crd"],
        }
    }

    /// Kinds whose failure means the cluster is unreachable.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Version | Self::Nodes)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub git_version: String,
    pub platform: String,
}

/// Snapshot of one cluster context. Built fresh for every request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub context: String,
    pub server: Option<String>,
    pub user: Option<String>,
    pub namespace: Option<String>,
    pub version: Option<VersionInfo>,
    pub nodes: NodeStats,
    pub namespaces: NamespaceStats,
    pub workloads: WorkloadCounts,
    pub storage: StorageCounts,
    pub crds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SummaryDetails>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub total: usize,
    pub ready: usize,
    pub not_ready: usize,
    pub items: Vec<NodeRow>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    pub name: String,
    pub roles: Vec<String>,
    pub kubelet_version: String,
    pub os_image: String,
    pub container_runtime: String,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    pub total: usize,
    /// `(namespace, pod count)` pairs, highest count first.
    pub top_by_pods: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadCounts {
    pub deployments: usize,
    pub statefulsets: usize,
    pub daemonsets: usize,
    pub pods: usize,
    pub services: usize,
    pub ingresses: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCounts {
    pub storage_classes: usize,
    pub persistent_volumes: usize,
    pub persistent_volume_claims: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDetails {
    pub pods: Vec<PodRow>,
    pub deployments: Vec<DeploymentRow>,
    pub services: Vec<ServiceRow>,
    pub ingresses: Vec<IngressRow>,
    pub pvcs: Vec<PvcRow>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRow {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub ready: String,
    pub restarts: i32,
    pub node: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRow {
    pub name: String,
    pub namespace: String,
    pub ready: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub cluster_ip: Option<String>,
    pub ports: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRow {
    pub name: String,
    pub namespace: String,
    pub class: Option<String>,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcRow {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub capacity: Option<String>,
    pub storage_class: Option<String>,
    pub volume: Option<String>,
}
