use clap::{Parser, Subcommand};

pub mod commands;

/// Bitcoin Stamps transaction engine
#[derive(Parser)]
#[command(name = "stamp-tx-engine")]
#[command(about = "Build unsigned Bitcoin Stamps transactions as PSBTs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build an unsigned protocol transaction for a payload
    Build(commands::build::BuildCommand),
    /// List the spendable coins of an address
    Utxos(commands::utxos::UtxosCommand),
    /// Recover the payload from a PSBT or raw transaction
    Decode(commands::decode::DecodeCommand),
}

pub async fn run() -> anyhow::Result<()> {
    // Uses RUST_LOG environment variable (defaults to "error" if not set)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(command) => command.run().await,
        Commands::Utxos(command) => command.run().await,
        Commands::Decode(command) => command.run(),
    }
}
