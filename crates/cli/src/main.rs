//! Function Kube Benchmark CLI
//!
//! A command-line tool that scrapes a running serverless exporter and
//! prints per-function, per-pod, and cluster-wide results.

mod client;
mod commands;
mod config;
mod exposition;
mod output;
mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{functions, pods, summary};
use std::path::PathBuf;

/// Function Kube Benchmark CLI
#[derive(Parser)]
#[command(name = "fkb")]
#[command(
    author,
    version,
    about = "CLI for the Function Kube Benchmark exporter",
    long_about = None
)]
pub struct Cli {
    /// Exporter base URL (defaults to the config file, then http://localhost:8000)
    #[arg(long, env = "FKB_EXPORTER_URL")]
    pub exporter_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show pod counts and scaling deltas per function
    Functions {
        /// Filter by platform (fission, knative, openfaas, openwhisk)
        #[arg(long, short)]
        platform: Option<String>,
    },

    /// Show boot duration and resource usage per pod
    Pods {
        /// Filter by function name
        #[arg(long)]
        function: Option<String>,
    },

    /// Show cluster-wide totals and average cold start
    Summary {
        /// Measurement window start (RFC 3339); defaults to the exporter's
        #[arg(long)]
        since: Option<String>,
    },

    /// Write the Markdown benchmark report
    Report {
        /// Report file path
        #[arg(long, short, default_value = "report.md")]
        output: PathBuf,

        /// Measurement window start (RFC 3339); defaults to the exporter's
        #[arg(long)]
        since: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.format(cli.format);
    let client = client::ExporterClient::new(&config.exporter_url(cli.exporter_url))?;

    match cli.command {
        Commands::Functions { platform } => {
            functions::show_functions(&client, platform, format).await?;
        }
        Commands::Pods { function } => {
            pods::show_pods(&client, function, format).await?;
        }
        Commands::Summary { since } => {
            summary::show_summary(&client, since, format).await?;
        }
        Commands::Report { output, since } => {
            commands::report::write_report(&client, &output, since).await?;
        }
    }

    Ok(())
}
