//! camhook: post a webhook whenever an application starts or stops using the camera.

use camhook::prelude::*;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long, default_value = "camhook.yaml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset (overrides the settings file)
    #[arg(long)]
    log_level: Option<String>,

    /// Enumerate the watched entries, print them and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "camhook stopped");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = MonitorSettings::builder()
        .with_file(&cli.config)
        .files_optional(true)
        .with_env_overrides("CAMHOOK", "__")
        .build()?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let store = open_store()?;

    if cli.list {
        let roots = settings.namespace_roots.clone();
        let entries = tokio::task::spawn_blocking(move || {
            camhook::watch::EntryEnumerator::new(store).enumerate(&roots)
        })
        .await
        .map_err(|e| MonitorError::Other(e.to_string()))?;
        for entry in entries {
            println!("{}\t{}", entry.display_name(), entry);
        }
        return Ok(());
    }

    let sink = Arc::new(WebhookSink::from_settings(&settings.webhook)?);
    let monitor = Monitor::new(store, sink, settings);
    #[cfg(feature = "metrics")]
    let monitor = monitor.with_metrics(camhook::metrics::MonitorMetrics::new(
        opentelemetry::global::meter("camhook"),
    ));
    let report = monitor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!(
        entries = report.entries.len(),
        delivered = report.dispatch.delivered,
        failed = report.dispatch.failed,
        "Exiting"
    );
    Ok(())
}

#[cfg(windows)]
fn open_store() -> Result<Arc<dyn ConfigStore>> {
    Ok(Arc::new(RegistryStore::new()))
}

#[cfg(not(windows))]
fn open_store() -> Result<Arc<dyn ConfigStore>> {
    Err(MonitorError::Other(
        "the camera consent store is only available on Windows".to_string(),
    ))
}
