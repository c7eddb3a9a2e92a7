use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use contract_tools::{logging, ToolchainConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "contract-tools")]
#[command(about = "Load, validate and inspect contract toolchain configuration")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Check,
    /// Print the resolved configuration
    Show {
        /// Print as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the RPC endpoint of a network profile
    Endpoint {
        /// Network profile (defaults to development)
        #[arg(short, long)]
        network: Option<String>,
    },
    /// Print the solc standard-json settings fragment
    SolcSettings,
    /// Check that a network's node accepts TCP connections
    Probe {
        /// Network profile (defaults to development)
        #[arg(short, long)]
        network: Option<String>,
        /// Connection timeout in milliseconds
        #[arg(long, default_value_t = 3000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs)?;

    let config = ToolchainConfig::load(cli.config.as_deref())
        .context("failed to load toolchain configuration")?;

    match cli.command {
        Commands::Check => {
            let source = config
                .source()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            println!("Configuration OK: {}", source);
            for key in config.ignored_keys() {
                println!("  ignored: {}", key);
            }
            Ok(())
        }
        Commands::Show { json } => {
            if json {
                println!("{}", config.to_json()?);
            } else {
                println!("{}", config);
            }
            Ok(())
        }
        Commands::Endpoint { network } => {
            let (_, profile) = config.select_network(network.as_deref())?;
            println!("{}", profile.endpoint());
            Ok(())
        }
        Commands::SolcSettings => {
            let settings = config.compilers().solc().standard_json_settings();
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Probe {
            network,
            timeout_ms,
        } => {
            let (name, profile) = config.select_network(network.as_deref())?;
            let outcome = profile.probe(Duration::from_millis(timeout_ms)).await;
            println!("{} ({}): {}", name, profile.endpoint(), outcome);
            if !outcome.is_reachable() {
                bail!("network {} is not reachable", name);
            }
            Ok(())
        }
    }
}
