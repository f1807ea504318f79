//! dix-server binary: in-memory catalogue service

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dix_server::{ServerBuilder, ServerConfig};

#[derive(Parser)]
#[command(name = "dix-server")]
#[command(about = "Serve component catalogues of distributed indices")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port, overrides the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Record limit, overrides the configuration
    #[arg(long)]
    max_records: Option<usize>,

    /// Serve Prometheus metrics on /metrics
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dix_server=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(limit) = args.max_records {
        config.max_records = Some(limit);
    }
    config.metrics |= args.metrics;

    let mut builder = ServerBuilder::new(config.clone());
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    let server = builder.build()?;

    tracing::info!(
        addr = %server.addr(),
        max_records = ?config.max_records,
        metrics = config.metrics,
        "catalogue service ready"
    );
    server.run().await?;

    Ok(())
}
