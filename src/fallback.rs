use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::model::{ResourceKind, VersionInfo};

/// Where a fallback lookup should point: the same file and context the
/// primary client was built from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FallbackTarget {
    pub kubeconfig_path: PathBuf,
    pub context: String,
}

/// Secondary source of resource data, consulted one kind at a time.
pub trait FallbackSource {
    async fn fetch_json(&self, kind: ResourceKind, target: &FallbackTarget) -> Result<Value>;
}

/// Search path used to locate kubectl and the credential helpers it spawns.
///
/// Built once at startup. The process environment is left untouched; the
/// augmented value is only handed to child processes.
#[derive(Debug, Clone)]
pub struct ToolPath {
    value: OsString,
}

impl ToolPath {
    pub fn init(extra_dirs: &[PathBuf]) -> Result<Self> {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::from_parts(&current, extra_dirs, home.as_deref())
    }

    fn from_parts(current: &OsStr, extra_dirs: &[PathBuf], home: Option<&Path>) -> Result<Self> {
        let mut dirs = std::env::split_paths(current)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        let mut candidates = extra_dirs.to_vec();
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/opt/homebrew/bin"));
        if let Some(home) = home {
            candidates.push(home.join(".local/bin"));
            candidates.push(home.join("bin"));
        }

        for candidate in candidates {
            if !candidate.as_os_str().is_empty() && !dirs.contains(&candidate) {
                dirs.push(candidate);
            }
        }

        let value = std::env::join_paths(dirs).context("failed to build tool search path")?;
        Ok(Self { value })
    }

    pub fn as_os_str(&self) -> &OsStr {
        &self.value
    }

    pub fn locate(&self, program: &str) -> Result<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(program, Some(&self.value), cwd)
            .with_context(|| format!("'{program}' was not found on the search path"))
    }
}

/// Re-derives resource lists by shelling out to kubectl.
#[derive(Debug, Clone)]
pub struct KubectlFallback {
    program: String,
    tool_path: ToolPath,
}

impl KubectlFallback {
    pub fn new(program: impl Into<String>, tool_path: ToolPath) -> Self {
        Self {
            program: program.into(),
            tool_path,
        }
    }
}

impl FallbackSource for KubectlFallback {
    async fn fetch_json(&self, kind: ResourceKind, target: &FallbackTarget) -> Result<Value> {
        let program = self.tool_path.locate(&self.program)?;
        let args = kind.kubectl_args();

        let mut cmd = TokioCommand::new(&program);
        cmd.args(args)
            .arg("--context")
            .arg(&target.context)
            .arg("-o")
            .arg("json")
            .env("KUBECONFIG", &target.kubeconfig_path)
            .env("PATH", self.tool_path.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("fallback: {} {}", program.display(), args.join(" "));
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to execute {} {}", self.program, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "{} {} returned output that is not JSON",
                self.program,
                args.join(" ")
            )
        })
    }
}

#[derive(Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionOutput {
    server_version: Option<ServerVersion>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerVersion {
    #[serde(default)]
    git_version: String,
    #[serde(default)]
    platform: String,
}

pub async fn fallback_items<T, F>(
    source: &F,
    kind: ResourceKind,
    target: &FallbackTarget,
) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: FallbackSource,
{
    let value = source.fetch_json(kind, target).await?;
    let list: ItemList<T> = serde_json::from_value(value)
        .with_context(|| format!("fallback output for {kind} is not an item list"))?;
    Ok(list.items)
}

pub async fn fallback_version<F>(
    source: &F,
    target: &FallbackTarget,
) -> Result<Option<VersionInfo>>
where
    F: FallbackSource,
{
    let value = source.fetch_json(ResourceKind::Version, target).await?;
    let output: VersionOutput =
        serde_json::from_value(value).context("fallback version output is malformed")?;

    Ok(output
        .server_version
        .filter(|server| !server.git_version.is_empty())
        .map(|server| VersionInfo {
            git_version: server.git_version,
            platform: server.platform,
        }))
}

#[cfg(test)]
pub mod testing {
    use super::{FallbackSource, FallbackTarget};
    use crate::model::ResourceKind;
    use anyhow::Result;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed JSON per kind and records every kind it was asked for.
    #[derive(Default)]
    pub struct CannedFallback {
        responses: HashMap<ResourceKind, Value>,
        calls: Mutex<Vec<ResourceKind>>,
    }

    impl CannedFallback {
        pub fn with(mut self, kind: ResourceKind, value: Value) -> Self {
            self.responses.insert(kind, value);
            self
        }

        pub fn calls(&self) -> Vec<ResourceKind> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl FallbackSource for CannedFallback {
        async fn fetch_json(&self, kind: ResourceKind, _target: &FallbackTarget) -> Result<Value> {
            self.calls.lock().expect("calls lock").push(kind);
            self.responses
                .get(&kind)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no canned output for {kind}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CannedFallback;
    use super::{
        FallbackSource, FallbackTarget, KubectlFallback, ToolPath, fallback_items,
        fallback_version,
    };
    use crate::model::ResourceKind;
    use k8s_openapi::api::core::v1::Namespace;
    use serde_json::json;
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    fn target() -> FallbackTarget {
        FallbackTarget {
            kubeconfig_path: PathBuf::from("/tmp/kubeconfig"),
            context: "dev".to_string(),
        }
    }

    #[test]
    fn tool_path_appends_missing_dirs_once() {
        let current = std::env::join_paths(["/usr/bin", "/usr/local/bin"]).expect("join");
        let tool_path = ToolPath::from_parts(
            &current,
            &[PathBuf::from("/opt/tools"), PathBuf::from("/usr/bin")],
            Some(Path::new("/home/ops")),
        )
        .expect("tool path");

        let dirs = std::env::split_paths(tool_path.as_os_str()).collect::<Vec<_>>();
        assert_eq!(
            dirs,
            [
                PathBuf::from("/usr/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/opt/tools"),
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/home/ops/.local/bin"),
                PathBuf::from("/home/ops/bin"),
            ]
        );
    }

    #[tokio::test]
    async fn parses_item_lists_into_typed_objects() {
        let source = CannedFallback::default().with(
            ResourceKind::Namespaces,
            json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [
                    {"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "default"}},
                    {"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "kube-system"}}
                ]
            }),
        );

        let namespaces: Vec<Namespace> =
            fallback_items(&source, ResourceKind::Namespaces, &target())
                .await
                .expect("namespaces parse");
        let names = namespaces
            .iter()
            .filter_map(|namespace| namespace.metadata.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, ["default", "kube-system"]);
        assert_eq!(source.calls(), [ResourceKind::Namespaces]);
    }

    #[tokio::test]
    async fn malformed_item_list_is_an_error() {
        let source =
            CannedFallback::default().with(ResourceKind::Namespaces, json!({"items": "nope"}));
        let result: anyhow::Result<Vec<Namespace>> =
            fallback_items(&source, ResourceKind::Namespaces, &target()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn version_reads_server_version_only() {
        let source = CannedFallback::default().with(
            ResourceKind::Version,
            json!({
                "clientVersion": {"gitVersion": "v1.31.0", "platform": "darwin/arm64"},
                "serverVersion": {"gitVersion": "v1.30.2", "platform": "linux/amd64"}
            }),
        );

        let version = fallback_version(&source, &target())
            .await
            .expect("version parses")
            .expect("server version present");
        assert_eq!(version.git_version, "v1.30.2");
        assert_eq!(version.platform, "linux/amd64");
    }

    #[tokio::test]
    async fn version_without_server_section_is_absent() {
        let source = CannedFallback::default().with(
            ResourceKind::Version,
            json!({"clientVersion": {"gitVersion": "v1.31.0"}}),
        );
        let version = fallback_version(&source, &target())
            .await
            .expect("version parses");
        assert_eq!(version, None);
    }

    #[tokio::test]
    async fn missing_program_fails_before_spawning() {
        let tool_path = ToolPath::from_parts(&OsString::new(), &[], None).expect("tool path");
        let fallback = KubectlFallback::new("kubeglance-no-such-kubectl", tool_path);

        let error = fallback
            .fetch_json(ResourceKind::Pods, &target())
            .await
            .expect_err("program does not exist");
        assert!(error.to_string().contains("kubeglance-no-such-kubectl"));
    }
}
