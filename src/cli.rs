use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobmeter")]
#[command(about = "Job queue metrics exporter", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $JOBMETER_CONFIG or config/jobmeter.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve /metrics and /health over HTTP
    Serve(ServeArgs),
    /// Run one collection and print the metrics
    Collect,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the exporter to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
