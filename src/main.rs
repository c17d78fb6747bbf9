use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use custody_ledger::anchor::periodic;
use custody_ledger::chain::pow::MiningBudget;
use custody_ledger::chain::BlockChain;
use custody_ledger::config::Config;
use custody_ledger::ledger::EvidenceLedger;
use custody_ledger::server::{self, AppState};

#[derive(Parser)]
#[command(name = "custody-ledger")]
#[command(about = "Tamper-evident evidence ledger with a local proof-of-work anchor chain")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. "info", "custody_ledger=debug")
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(Config),
    /// Mine one block on a fresh chain and print it as JSON
    Mine {
        /// Block payload
        #[arg(long)]
        data: String,
        /// Leading zero hex characters required
        #[arg(long, default_value_t = 3)]
        difficulty: u32,
        /// Maximum nonces to try
        #[arg(long, default_value_t = 5_000_000)]
        max_attempts: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    match cli.command {
        Commands::Serve(config) => serve(config).await?,
        Commands::Mine {
            data,
            difficulty,
            max_attempts,
        } => {
            let chain = BlockChain::new();
            let block = chain.mine(&data, difficulty, &MiningBudget::attempts(max_attempts))?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let ledger = Arc::new(EvidenceLedger::new());
    let chain = Arc::new(config.build_chain().await?);
    let anchor = Arc::new(config.anchor_gateway(Arc::clone(&chain)));

    tracing::info!(
        mode = %config.anchor_mode,
        difficulty = config.difficulty,
        height = chain.height(),
        "Anchor gateway ready"
    );

    if let Some(every) = config.anchor_interval() {
        periodic::spawn(Arc::clone(&ledger), Arc::clone(&anchor), every);
    }

    let state = AppState {
        ledger,
        chain,
        anchor,
    };
    server::serve(state, &config.listen).await?;

    Ok(())
}
