mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tier")]
#[command(about = "Bastion-gated two-tier networks, declared in KDL", long_about = None)]
struct Cli {
    /// Topology file (default: search the current directory)
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and check the topology
    Validate,
    /// Show the provisioning plan
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report access policy violations and advisories
    Audit,
    /// Provision the plan against the simulated backend
    Apply {
        /// Steps that may run at the same time
        #[arg(short = 'p', long, default_value = "4")]
        max_parallel: usize,
        /// Start nothing new after the first failure
        #[arg(long)]
        halt_on_failure: bool,
    },
    /// Resolve outputs from recorded handles
    Outputs {
        /// Print outputs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    // Version needs no topology
    if matches!(cli.command, Commands::Version) {
        println!("tierflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loaded = utils::load(cli.file.as_deref())?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&loaded),
        Commands::Plan { json } => commands::plan::handle(&loaded, json),
        Commands::Audit => commands::audit::handle(&loaded),
        Commands::Apply {
            max_parallel,
            halt_on_failure,
        } => commands::apply::handle(&loaded, max_parallel, halt_on_failure).await,
        Commands::Outputs { json } => commands::outputs::handle(&loaded, json).await,
        Commands::Version => unreachable!("Version is handled before topology loading"),
    }
}
