mod args_parse;

use std::{net::SocketAddr, path::Path, time::Duration};

use crate::args_parse::Args;

use anyhow::{Context, Result};
use clap::Parser;
use relay_pipeline::{
    init_metrics, run_uploads, LoadConfiguration, Pipeline, ServiceConfiguration,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load the configuration from the YAML file, or fall back to the defaults
    let mut service_config = match &args.config_file {
        Some(path) => ServiceConfiguration::load(Path::new(path))?,
        None => {
            info!("no config file given, using defaults");
            ServiceConfiguration::try_from(LoadConfiguration::default())?
        }
    };

    // Command-line values override the config file
    if let Some(root) = &args.destination_root {
        service_config.destination = service_config.destination.with_root(root);
    }
    if let Some(prom_exporter) = &args.prom_exporter {
        let prom_address: SocketAddr = prom_exporter.parse().context(format!(
            "Failed to parse into Socket address: {}",
            prom_exporter
        ))?;
        service_config.prom_exporter = Some(prom_address);
    }

    init_metrics(service_config.prom_exporter)?;

    let pipeline = Pipeline::start(&service_config)?;

    let cancel = CancellationToken::new();
    let uploader = (!args.uploads.is_empty()).then(|| {
        tokio::spawn(run_uploads(
            pipeline.source(),
            args.uploads.clone(),
            Duration::from_secs(args.upload_interval_secs),
            cancel.clone(),
        ))
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("shutdown signal received");

    cancel.cancel();
    if let Some(uploader) = uploader {
        match uploader.await {
            Ok(Ok(done)) => info!(uploads = done, "upload client finished"),
            Ok(Err(e)) => warn!("upload client failed: {}", e),
            Err(e) => warn!("upload client task failed: {}", e),
        }
    }
    pipeline.shutdown().await;
    Ok(())
}
