use anyhow::{Context, Result};
use kube::config::Kubeconfig;
use std::fs;
use std::path::{Path, PathBuf};

/// A kubeconfig file loaded for a single request.
///
/// Every aggregation call loads its own copy so that selecting a context
/// never leaks into a concurrent call targeting a different one.
#[derive(Debug, Clone)]
pub struct ResolvedKubeconfig {
    path: PathBuf,
    config: Kubeconfig,
}

/// Connection details of the active context, read locally from the file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KubeTarget {
    pub context: String,
    pub cluster_name: String,
    pub cluster_server: Option<String>,
    pub user_name: Option<String>,
    pub namespace: Option<String>,
}

impl ResolvedKubeconfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
        if raw.trim().is_empty() {
            anyhow::bail!("kubeconfig {} is empty", path.display());
        }

        let config = Kubeconfig::read_from(path)
            .with_context(|| format!("failed to parse kubeconfig {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Kubeconfig {
        &self.config
    }

    pub fn current_context(&self) -> Option<&str> {
        self.config.current_context.as_deref()
    }

    pub fn context_names(&self) -> Vec<String> {
        self.config
            .contexts
            .iter()
            .map(|named| named.name.clone())
            .collect()
    }

    /// Makes `context` the active context of this copy.
    pub fn select_context(&mut self, context: &str) -> Result<()> {
        if !self
            .config
            .contexts
            .iter()
            .any(|named| named.name == context)
        {
            anyhow::bail!(
                "context '{context}' not found in kubeconfig {} (available: {})",
                self.path.display(),
                self.context_names().join(", ")
            );
        }

        self.config.current_context = Some(context.to_string());
        Ok(())
    }

    pub fn active_target(&self) -> Result<KubeTarget> {
        let Some(active) = self.current_context() else {
            anyhow::bail!(
                "kubeconfig {} has no current context and none was requested",
                self.path.display()
            );
        };

        let context = self
            .config
            .contexts
            .iter()
            .find(|named| named.name == active)
            .with_context(|| {
                format!(
                    "current context '{active}' not found in kubeconfig {}",
                    self.path.display()
                )
            })?
            .context
            .as_ref()
            .with_context(|| format!("context '{active}' has no cluster or user entry"))?;

        let cluster = self
            .config
            .clusters
            .iter()
            .find(|named| named.name == context.cluster)
            .with_context(|| {
                format!(
                    "context '{active}' references unknown cluster '{}'",
                    context.cluster
                )
            })?;

        if let Some(user) = context.user.as_deref()
            && !self
                .config
                .auth_infos
                .iter()
                .any(|named| named.name == user)
        {
            anyhow::bail!("context '{active}' references unknown user '{user}'");
        }

        Ok(KubeTarget {
            context: active.to_string(),
            cluster_name: context.cluster.clone(),
            cluster_server: cluster
                .cluster
                .as_ref()
                .and_then(|entry| entry.server.clone()),
            user_name: context.user.clone(),
            namespace: context.namespace.clone(),
        })
    }
}

/// Picks the kubeconfig file to read.
///
/// An explicit path wins, then the first `KUBECONFIG` entry, then
/// `$HOME/.kube/config`.
pub fn resolve_kubeconfig_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os("KUBECONFIG")
        .and_then(|value| first_path_entry(&value.to_string_lossy()))
    {
        return Ok(path);
    }

    let home = std::env::var("HOME").context("cannot locate kubeconfig: HOME is not set")?;
    Ok(PathBuf::from(home).join(".kube").join("config"))
}

fn first_path_entry(value: &str) -> Option<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    value
        .split(separator)
        .map(str::trim)
        .find(|entry| !entry.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::{ResolvedKubeconfig, first_path_entry};
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: dev-cluster
    cluster:
      server: https://dev.example:6443
  - name: prod-cluster
    cluster:
      server: https://prod.example:6443
users:
  - name: dev-user
    user:
      token: dev-token
  - name: prod-user
    user:
      token: prod-token
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
  - name: prod
    context:
      cluster: prod-cluster
      user: prod-user
      namespace: payments
  - name: broken
    context:
      cluster: missing-cluster
      user: dev-user
"#;

    fn write_kubeconfig(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "kubeglance-{}-{name}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, contents).expect("write temp kubeconfig");
        path
    }

    #[test]
    fn loads_current_context_target() {
        let path = write_kubeconfig("current", SAMPLE);
        let kubeconfig = ResolvedKubeconfig::load(&path).expect("kubeconfig loads");

        let target = kubeconfig.active_target().expect("target resolves");
        assert_eq!(target.context, "dev");
        assert_eq!(target.cluster_name, "dev-cluster");
        assert_eq!(
            target.cluster_server.as_deref(),
            Some("https://dev.example:6443")
        );
        assert_eq!(target.user_name.as_deref(), Some("dev-user"));
        assert_eq!(target.namespace, None);
        assert_eq!(kubeconfig.context_names(), ["dev", "prod", "broken"]);
    }

    #[test]
    fn select_context_switches_private_copy_only() {
        let path = write_kubeconfig("select", SAMPLE);
        let original = ResolvedKubeconfig::load(&path).expect("kubeconfig loads");
        let mut copy = original.clone();

        copy.select_context("prod").expect("prod exists");
        let target = copy.active_target().expect("target resolves");
        assert_eq!(target.context, "prod");
        assert_eq!(target.namespace.as_deref(), Some("payments"));
        assert_eq!(original.current_context(), Some("dev"));
    }

    #[test]
    fn unknown_context_is_rejected_with_its_name() {
        let path = write_kubeconfig("unknown", SAMPLE);
        let mut kubeconfig = ResolvedKubeconfig::load(&path).expect("kubeconfig loads");

        let error = kubeconfig
            .select_context("staging")
            .expect_err("staging is not defined");
        assert!(error.to_string().contains("'staging'"));
        assert_eq!(kubeconfig.current_context(), Some("dev"));
    }

    #[test]
    fn dangling_cluster_reference_fails() {
        let path = write_kubeconfig("dangling", SAMPLE);
        let mut kubeconfig = ResolvedKubeconfig::load(&path).expect("kubeconfig loads");
        kubeconfig.select_context("broken").expect("context exists");

        let error = kubeconfig.active_target().expect_err("cluster is missing");
        assert!(error.to_string().contains("missing-cluster"));
    }

    #[test]
    fn empty_or_missing_file_fails() {
        let path = write_kubeconfig("empty", "  \n");
        let error = ResolvedKubeconfig::load(&path).expect_err("empty file");
        assert!(error.to_string().contains("is empty"));

        let missing = std::env::temp_dir().join("kubeglance-does-not-exist.yaml");
        assert!(ResolvedKubeconfig::load(&missing).is_err());
    }

    #[test]
    fn kubeconfig_env_uses_first_non_empty_entry() {
        let separator = if cfg!(windows) { ";" } else { ":" };
        let value = format!("{separator}/tmp/a.yaml{separator}/tmp/b.yaml");
        assert_eq!(first_path_entry(&value), Some(PathBuf::from("/tmp/a.yaml")));
        assert_eq!(first_path_entry(""), None);
    }
}
