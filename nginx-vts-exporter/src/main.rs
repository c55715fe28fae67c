//! Prometheus exporter for the nginx VTS module.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use nginx_vts_common::init_tracing;
use nginx_vts_exporter::{DescriptorRegistry, ExporterConfig, HttpFetcher, HttpServer, VtsCollector};

/// Prometheus exporter for the nginx VTS module.
#[derive(Parser, Debug)]
#[command(name = "nginx-vts-exporter")]
#[command(about = "Export nginx virtual host traffic status as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "NGINX_VTS_CONFIG")]
    config: Option<String>,

    /// URI of the VTS JSON status page (overrides config).
    #[arg(long, env = "NGINX_STATUS")]
    scrape_uri: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long, env = "METRICS_ADDR")]
    listen: Option<String>,

    /// Path of the metrics endpoint (overrides config).
    #[arg(long, env = "METRICS_ENDPOINT")]
    metrics_path: Option<String>,

    /// Metric name namespace (overrides config).
    #[arg(long, env = "METRICS_NS")]
    namespace: Option<String>,

    /// Accept invalid TLS certificates from the status page.
    #[arg(long, env = "NGINX_VTS_INSECURE")]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long, env = "NGINX_VTS_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // CLI overrides
    if let Some(uri) = args.scrape_uri {
        config.scrape.uri = uri;
    }
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(path) = args.metrics_path {
        config.prometheus.path = path;
    }
    if let Some(namespace) = args.namespace {
        config.prometheus.namespace = namespace;
    }
    if args.insecure {
        config.scrape.insecure = true;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    config.validate()?;
    init_tracing(&config.logging)?;

    // Create the collector
    let fetcher = HttpFetcher::new(&config.scrape)?;
    let registry = DescriptorRegistry::new(&config.prometheus.namespace);
    let collector = Arc::new(VtsCollector::new(fetcher, registry));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        scrape_uri = %collector.source().uri(),
        namespace = collector.registry().namespace(),
        "Starting nginx VTS exporter"
    );
    if config.scrape.insecure {
        warn!("TLS certificate verification is disabled for the status page");
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    )
    .with_const_labels(config.prometheus.const_labels.clone());

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal, or for the server to stop on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = &mut http_task => {
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    if tokio::time::timeout(Duration::from_secs(5), http_task)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop within 5s");
    }

    // Print final stats
    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        scrape_failures = stats.failures,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Resolves when SIGTERM is received. Never resolves off unix or when the
/// handler cannot be installed.
async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
