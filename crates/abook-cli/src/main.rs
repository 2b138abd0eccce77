use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;

#[derive(Parser)]
#[command(name = "abook", version, about = "abook - optimistic address book commands")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Print the configuration with environment variables resolved
        #[arg(long)]
        print: bool,
    },
    /// Show the remote's request quota
    Quota,
    /// Run add commands against the simulated remote and print their results
    Run {
        /// Name of a person to add (repeatable)
        #[arg(long = "add", value_name = "NAME", required = true)]
        names: Vec<String>,
        /// Cancel commands still in their grace period after this many seconds
        #[arg(long, value_name = "SECS")]
        cancel_after: Option<u64>,
        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Run a randomized simulation and check its invariants
    Sim {
        /// RNG seed (defaults to the configured remote seed, then 0)
        #[arg(long)]
        seed: Option<u64>,
        /// Number of random operations
        #[arg(long, default_value = "200")]
        steps: usize,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config: config_path,
        command,
        ..
    } = cli;

    match command {
        Commands::Validate { print } => {
            let path = config::find_config(config_path).ok_or_else(|| {
                anyhow::anyhow!(
                    "No configuration file found. Use --config, set ABOOK_CONFIG, or create abook.yaml"
                )
            })?;
            commands::validate::run(&path, print)
        }
        Commands::Quota => commands::quota::run(&config::load(config_path)?).await,
        Commands::Run {
            names,
            cancel_after,
            json,
        } => commands::run::run(&config::load(config_path)?, names, cancel_after, json).await,
        Commands::Sim { seed, steps, json } => {
            let config = config::load(config_path)?;
            let seed = seed.or(config.remote.seed).unwrap_or(0);
            commands::sim::run(config, seed, steps, json).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(err.exit_code().clamp(0, 255) as u8);
        }
    };
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
