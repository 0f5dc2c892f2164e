use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubeglance",
    version,
    about = "Read-only summary of a Kubernetes cluster from your kubeconfig."
)]
pub struct CliArgs {
    /// Kubeconfig context to summarize (defaults to the current context)
    #[arg(short, long)]
    pub context: Option<String>,

    /// Include pod, deployment, service, ingress and PVC rows
    #[arg(short, long)]
    pub detail: bool,

    /// Path to the kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Keep refreshing instead of printing a single summary
    #[arg(short, long)]
    pub watch: bool,

    /// Refresh interval in milliseconds when watching
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// Timeout for a single summary request, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
