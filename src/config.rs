use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_KUBECTL: &str = "kubectl";
const DEFAULT_REFRESH_MS: u64 = 15_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings read from the optional runtime config file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RuntimeConfig {
    pub source: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub kubectl: String,
    pub extra_path_dirs: Vec<PathBuf>,
    pub refresh_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct GlanceConfigFile {
    #[serde(default)]
    kubeconfig: Option<PathBuf>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default, alias = "kubectl_path")]
    kubectl: Option<String>,
    #[serde(default, alias = "path_dirs")]
    extra_path_dirs: Vec<PathBuf>,
    #[serde(default, alias = "refresh")]
    refresh_ms: Option<u64>,
    #[serde(default, alias = "timeout")]
    timeout_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source: None,
            kubeconfig: None,
            context: None,
            kubectl: DEFAULT_KUBECTL.to_string(),
            extra_path_dirs: Vec::new(),
            refresh_ms: DEFAULT_REFRESH_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RuntimeConfig {
    /// Loads the first config file found, or defaults when there is none.
    pub fn discover() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        let parsed: GlanceConfigFile = if raw.trim().is_empty() {
            GlanceConfigFile::default()
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse runtime config {}", path.display()))?
        };

        let defaults = Self::default();
        Ok(Self {
            source: Some(path.display().to_string()),
            kubeconfig: parsed.kubeconfig,
            context: parsed
                .context
                .filter(|context| !context.trim().is_empty()),
            kubectl: parsed
                .kubectl
                .filter(|kubectl| !kubectl.trim().is_empty())
                .unwrap_or(defaults.kubectl),
            extra_path_dirs: parsed.extra_path_dirs,
            refresh_ms: parsed.refresh_ms.unwrap_or(defaults.refresh_ms),
            timeout_secs: parsed.timeout_secs.unwrap_or(defaults.timeout_secs),
        })
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBEGLANCE_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("kubeglance.yaml"),
        PathBuf::from("kubeglance.yml"),
        PathBuf::from(".kubeglance.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kubeglance/config.yaml"),
            PathBuf::from(&home).join(".config/kubeglance/config.yml"),
            PathBuf::from(&home).join(".kubeglance.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
