use clap::Parser;
use intel_pipeline::config::{self, PipelineConfig};
use intel_pipeline::intel::alert::{LogNotifier, Notifier, WebhookNotifier};
use intel_pipeline::pipeline::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Threat-intel fan-out and detection pipeline.
#[derive(Parser, Debug)]
#[command(name = "intel-pipeline")]
#[command(about = "Records and cross-matches IOCs and entities", long_about = None)]
struct Args {
    /// TOML topology file. Built-in defaults are used when omitted.
    #[arg(long, env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", PipelineConfig::default().to_toml()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,intel_pipeline=debug".into()),
        )
        .init();

    // 1. Configuration:
    let mut config = config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let bind_addr = config.server.bind.clone();

    // 2. Alert destination:
    let notifier: Arc<dyn Notifier> = match &config.alert.webhook_url {
        Some(url) => {
            tracing::info!("Alerts go to the configured webhook");
            Arc::new(WebhookNotifier::new(url.clone())?)
        }
        None => {
            tracing::warn!("No alert webhook configured, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // 3. Pipeline:
    let mut pipeline = Pipeline::build(config, notifier)?;
    pipeline.start();

    // 4. HTTP admin surface:
    let app = pipeline.router();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    // 5. Drain consumer groups:
    pipeline.shutdown().await;

    Ok(())
}
