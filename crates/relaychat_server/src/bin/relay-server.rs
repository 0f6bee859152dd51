//! Relaychat relay server.
//!
//! Sits between the chat client and the model-serving backend: stores
//! uploads, forwards generation requests and relays buffered or streamed
//! answers.

use clap::Parser;
use relaychat_core::{LogFormat, init_metrics, init_tracing};
use relaychat_server::{RelayConfig, serve};
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments for the relay server.
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Relaychat relay - upload storage and generation passthrough")]
#[command(version)]
struct Args {
    /// Path to the relay configuration file (defaults to ./relay.toml if present)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<String>,

    /// Base URL of the model-serving backend
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Directory receiving uploads
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Log line format
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// OTLP/HTTP collector for relay metrics (with the `metrics` feature)
    #[arg(long)]
    metrics_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut overrides = Vec::new();
    if let Some(listen) = args.listen {
        overrides.push(("listen_addr", listen));
    }
    if let Some(url) = args.backend_url {
        overrides.push(("backend_url", url));
    }
    if let Some(dir) = args.upload_dir {
        overrides.push(("upload_dir", dir.to_string_lossy().into_owned()));
    }
    if let Some(format) = args.log_format {
        overrides.push(("log_format", format.to_string()));
    }
    if let Some(endpoint) = args.metrics_endpoint {
        overrides.push(("metrics_endpoint", endpoint));
    }

    let config = RelayConfig::load_with_overrides(args.config.as_deref(), overrides)?;
    init_tracing(*config.log_format());
    let _metrics = init_metrics(
        "relaychat-relay",
        config.metrics_endpoint().as_deref(),
        config.metrics_interval(),
    )?;

    info!(
        listen_addr = %config.listen_addr(),
        backend_url = %config.backend_url(),
        upload_dir = ?config.upload_dir(),
        reference_style = ?config.reference_style(),
        "Starting relay"
    );

    let result = serve(config).await;

    if let Err(e) = &result {
        error!(error = %e, "Relay exited with error");
    }
    Ok(result?)
}
