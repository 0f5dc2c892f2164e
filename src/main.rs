mod cli;
mod config;
mod fallback;
mod k8s;
mod kubeconfig;
mod model;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use config::RuntimeConfig;
use fallback::{KubectlFallback, ToolPath};
use model::ClusterSummary;
use summary::SummaryEngine;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const MIN_REFRESH_MS: u64 = 1_000;

struct RequestOptions {
    context: Option<String>,
    detail: bool,
    timeout: Duration,
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let runtime = RuntimeConfig::discover()?;
    if let Some(source) = &runtime.source {
        debug!("runtime config loaded from {source}");
    }

    let kubeconfig_path = kubeconfig::resolve_kubeconfig_path(
        args.kubeconfig.as_deref().or(runtime.kubeconfig.as_deref()),
    )?;
    let tool_path = ToolPath::init(&runtime.extra_path_dirs)?;
    let engine = SummaryEngine::new(
        kubeconfig_path,
        KubectlFallback::new(runtime.kubectl.clone(), tool_path),
    );

    let options = RequestOptions {
        context: args.context.clone().or(runtime.context.clone()),
        detail: args.detail,
        timeout: Duration::from_secs(args.timeout_secs.unwrap_or(runtime.timeout_secs).max(1)),
        pretty: args.pretty,
    };

    if args.watch {
        let refresh_ms = args
            .refresh_ms
            .unwrap_or(runtime.refresh_ms)
            .max(MIN_REFRESH_MS);
        watch(&engine, &options, refresh_ms).await
    } else {
        let summary = request_summary(&engine, &options).await?;
        print_summary(&summary, options.pretty)
    }
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

async fn watch(
    engine: &SummaryEngine<KubectlFallback>,
    options: &RequestOptions,
    refresh_ms: u64,
) -> Result<()> {
    let refresh = move || async move {
        match request_summary(engine, options).await {
            Ok(summary) => print_summary(&summary, options.pretty),
            Err(error) => {
                warn!("summary refresh failed: {error:#}");
                Ok(())
            }
        }
    };
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")
    };
    watch_until(refresh_ms, refresh, shutdown).await
}

/// Runs `refresh` on every tick until `shutdown` resolves. The shutdown future
/// is polled across ticks and against the refresh in flight.
async fn watch_until<R, Fut, S>(refresh_ms: u64, mut refresh: R, shutdown: S) -> Result<()>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
    S: Future<Output = Result<()>>,
{
    let mut ticker = interval(Duration::from_millis(refresh_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    result = refresh() => result?,
                    result = &mut shutdown => return result,
                }
            }
            result = &mut shutdown => return result,
        }
    }
}

async fn request_summary(
    engine: &SummaryEngine<KubectlFallback>,
    options: &RequestOptions,
) -> Result<ClusterSummary> {
    match timeout(
        options.timeout,
        engine.build_summary(options.context.as_deref(), options.detail),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => anyhow::bail!(
            "cluster summary timed out after {}s",
            options.timeout.as_secs()
        ),
    }
}

fn print_summary(summary: &ClusterSummary, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(summary)
    } else {
        serde_json::to_string(summary)
    }
    .context("failed to serialize cluster summary")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::watch_until;
    use anyhow::{Context, Result, anyhow};
    use std::future::pending;
    use tokio::sync::oneshot;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn shutdown_interrupts_a_refresh_in_flight() {
        let (started, stop) = oneshot::channel::<()>();
        let mut started = Some(started);
        let mut calls = 0;

        let refresh = || {
            calls += 1;
            if let Some(started) = started.take() {
                let _ = started.send(());
            }
            pending::<Result<()>>()
        };
        let shutdown = async { stop.await.context("refresh never started") };

        let result = timeout(
            Duration::from_secs(5),
            watch_until(60_000, refresh, shutdown),
        )
        .await
        .expect("watch loop should stop while the refresh is pending");

        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn refresh_error_ends_the_loop() {
        let result = watch_until(
            60_000,
            || async { Err(anyhow!("stdout closed")) },
            pending::<Result<()>>(),
        )
        .await;

        let error = result.expect_err("refresh error should propagate");
        assert_eq!(error.to_string(), "stdout closed");
    }
}
