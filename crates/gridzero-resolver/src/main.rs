use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridzero_ledger::ResolverCredentials;
use gridzero_prover::{LeaderboardInput, score_leaderboard};
use gridzero_resolver::{ResolverApp, config_loader, logging};
use gridzero_types::{LedgerBackend, LoggingConfig};
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gridzero-resolver")]
#[command(about = "GridZero round settlement pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the resolver until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Force the in-process devnet ledger with simulated players
        #[arg(long)]
        devnet: bool,
    },

    /// Generate a resolver signing key and a randomness secret
    Keygen {
        /// Chain id the key will sign for
        #[arg(long, default_value = "0")]
        chain_id: u64,
    },

    /// Score a player's mining history
    Leaderboard {
        /// JSON file with `player_address` and `mining_history`
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, devnet } => {
            let mut config = config_loader::load(config.as_deref())
                .with_context(|| "loading configuration")?;
            if devnet {
                config.ledger.backend = LedgerBackend::Devnet;
            }
            logging::init_logging(&config.logging, cli.verbose)?;
            info!(
                version = gridzero_types::constants::VERSION,
                "starting {}",
                gridzero_types::constants::SERVICE_NAME
            );

            let app = ResolverApp::build(config).await.context("building resolver")?;
            if let Some(addr) = app.ops_addr() {
                info!(%addr, "ops endpoint bound");
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("interrupt received; shutting down"),
                    Err(e) => warn!(error = %e, "signal handler failed; shutting down"),
                }
                let _ = shutdown_tx.send(true);
            });

            app.run(shutdown_rx).await?;
        }
        Commands::Keygen { chain_id } => {
            logging::init_logging(&LoggingConfig::default(), cli.verbose)?;
            let credentials = ResolverCredentials::generate(chain_id);
            let randomness: [u8; 32] = rand::thread_rng().r#gen();
            println!("resolver_key      = {}", credentials.secret_hex());
            println!(
                "resolver_public   = {}",
                hex::encode(credentials.verifying_key().to_bytes())
            );
            println!("randomness_secret = {}", hex::encode(randomness));
        }
        Commands::Leaderboard { input } => {
            logging::init_logging(&LoggingConfig::default(), cli.verbose)?;
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let input: LeaderboardInput =
                serde_json::from_str(&text).context("parsing leaderboard input")?;
            let output = score_leaderboard(&input)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            println!("statement = {}", hex::encode(output.statement()));
        }
    }

    Ok(())
}
