use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

use crate::kubeconfig::{KubeTarget, ResolvedKubeconfig};
use crate::model::VersionInfo;

/// Upper bound on objects returned per list call; continue tokens are not followed.
const LIST_LIMIT: u32 = 5_000;

/// Typed API handles bound to one kubeconfig context.
#[derive(Clone)]
pub struct ClientSet {
    client: Client,
    target: KubeTarget,
}

impl ClientSet {
    /// Selects `context` (or keeps the file's current context) on the given
    /// copy and builds a client for it.
    pub async fn for_context(
        kubeconfig: &mut ResolvedKubeconfig,
        context: Option<&str>,
    ) -> Result<Self> {
        if let Some(context) = context {
            kubeconfig.select_context(context)?;
        }
        let target = kubeconfig.active_target()?;

        let options = KubeConfigOptions {
            context: Some(target.context.clone()),
            cluster: None,
            user: None,
        };
        let config = Config::from_custom_kubeconfig(kubeconfig.config().clone(), &options)
            .await
            .with_context(|| {
                format!(
                    "failed to infer Kubernetes configuration for context '{}'",
                    target.context
                )
            })?;
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        debug!(
            "client ready: context={} cluster={}",
            target.context, target.cluster_name
        );
        Ok(Self { client, target })
    }

    pub fn target(&self) -> &KubeTarget {
        &self.target
    }

    // version

    pub async fn server_version(&self) -> Result<Option<VersionInfo>> {
        let info = self.client.apiserver_version().await?;
        if info.git_version.is_empty() {
            return Ok(None);
        }
        Ok(Some(VersionInfo {
            git_version: info.git_version,
            platform: info.platform,
        }))
    }

    // core/v1

    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    pub fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    pub fn pods(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    pub fn services(&self) -> Api<Service> {
        Api::all(self.client.clone())
    }

    pub fn persistent_volumes(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    pub fn persistent_volume_claims(&self) -> Api<PersistentVolumeClaim> {
        Api::all(self.client.clone())
    }

    // apps/v1

    pub fn deployments(&self) -> Api<Deployment> {
        Api::all(self.client.clone())
    }

    pub fn statefulsets(&self) -> Api<StatefulSet> {
        Api::all(self.client.clone())
    }

    pub fn daemonsets(&self) -> Api<DaemonSet> {
        Api::all(self.client.clone())
    }

    // networking.k8s.io/v1

    pub fn ingresses(&self) -> Api<Ingress> {
        Api::all(self.client.clone())
    }

    // storage.k8s.io/v1

    pub fn storage_classes(&self) -> Api<StorageClass> {
        Api::all(self.client.clone())
    }

    // apiextensions.k8s.io/v1

    pub fn custom_resource_definitions(&self) -> Api<CustomResourceDefinition> {
        Api::all(self.client.clone())
    }
}

/// Outcome of every primary retrieval, each settled on its own.
pub struct RawCollections {
    pub version: Result<Option<VersionInfo>>,
    pub nodes: Result<Vec<Node>>,
    pub namespaces: Result<Vec<Namespace>>,
    pub pods: Result<Vec<Pod>>,
    pub deployments: Result<Vec<Deployment>>,
    pub statefulsets: Result<Vec<StatefulSet>>,
    pub daemonsets: Result<Vec<DaemonSet>>,
    pub services: Result<Vec<Service>>,
    pub ingresses: Result<Vec<Ingress>>,
    pub storage_classes: Result<Vec<StorageClass>>,
    pub persistent_volumes: Result<Vec<PersistentVolume>>,
    pub persistent_volume_claims: Result<Vec<PersistentVolumeClaim>>,
    pub custom_resource_definitions: Result<Vec<CustomResourceDefinition>>,
}

impl RawCollections {
    /// Issues all retrievals at once and waits for every one of them; a
    /// failure in one never cancels the others.
    pub async fn fetch(clients: &ClientSet) -> Self {
        let (
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
        ) = tokio::join!(
            clients.server_version(),
            list_all(clients.nodes()),
            list_all(clients.namespaces()),
            list_all(clients.pods()),
            list_all(clients.deployments()),
            list_all(clients.statefulsets()),
            list_all(clients.daemonsets()),
            list_all(clients.services()),
            list_all(clients.ingresses()),
            list_all(clients.storage_classes()),
            list_all(clients.persistent_volumes()),
            list_all(clients.persistent_volume_claims()),
            list_all(clients.custom_resource_definitions()),
        );

        Self {
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
        }
    }
}

async fn list_all<K>(api: Api<K>) -> Result<Vec<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    let list = api.list(&list_params()).await?;
    Ok(list.items)
}

fn list_params() -> ListParams {
    ListParams::default().limit(LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::ClientSet;
    use crate::kubeconfig::ResolvedKubeconfig;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: dev-cluster
    cluster:
      server: https://dev.example:6443
users:
  - name: dev-user
    user:
      token: dev-token
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
"#;

    #[tokio::test]
    async fn unknown_context_fails_before_building_a_client() {
        let path = std::env::temp_dir().join(format!(
            "kubeglance-clientset-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, KUBECONFIG).expect("write temp kubeconfig");
        let mut kubeconfig = ResolvedKubeconfig::load(&path).expect("kubeconfig loads");

        let error = ClientSet::for_context(&mut kubeconfig, Some("staging"))
            .await
            .err()
            .expect("staging is not defined");

        assert!(
            error.to_string().contains("context 'staging' not found"),
            "unexpected error: {error:#}"
        );
        assert_eq!(kubeconfig.current_context(), Some("dev"));
    }
}
