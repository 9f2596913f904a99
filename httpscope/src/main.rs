mod config;
mod graph;
mod logging;
mod output;
mod procfs;
mod runtime;

use anyhow::Result;
use tracing::{error, info};

use config::{Args, MergedConfig};
use runtime::TraceSession;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let parsed_args = Args::parse_args();
    let config_path = parsed_args.config.clone();
    let merged_config = MergedConfig::new_with_explicit_config(parsed_args.clone(), config_path)?;

    logging::initialize_logging(&merged_config)?;
    info!("httpscope {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Output: {:?}, dependency graph: {}",
        merged_config.format, merged_config.graph
    );

    parsed_args.validate()?;

    let session = TraceSession::attach(&merged_config)?;
    info!("Probe attached, waiting for requests (Ctrl+C to stop)");
    session.run().await
}
