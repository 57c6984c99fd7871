mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use jobmeter::config::Config;
use jobmeter::instrumentation::Instrumentation;
use jobmeter::observability::PrometheusSink;
use jobmeter::server::{self, ExporterState};
use jobmeter::stats::{HttpStatsBackend, StatsBackend};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let sink = Arc::new(PrometheusSink::new(config.metrics.namespace.clone()));
    let backend = HttpStatsBackend::from_config(&config.stats)?
        .map(|backend| (Arc::new(backend) as Arc<dyn StatsBackend>, config.stats.timeout.as_duration()));
    let instrumentation = Instrumentation::new(config.settings(), sink.clone(), backend);
    let state = ExporterState::new(instrumentation, sink);

    match cli.command {
        Commands::Serve(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            server::run(address, state).await?
        }
        Commands::Collect => print!("{}", state.scrape().await?),
    }

    Ok(())
}
