use crate::builder::StampEngine;
use crate::cli::commands::{ConfigArgs, OutputFormat};
use crate::types::Coin;
use anyhow::Context;
use clap::Args;
use serde_json::json;

/// List the spendable coins of an address
#[derive(Args)]
pub struct UtxosCommand {
    pub address: String,

    /// Mark coins carrying Counterparty balances
    #[arg(long)]
    pub check_protocol: bool,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl UtxosCommand {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let engine = StampEngine::from_config(config)?;
        let address = engine.parse_address(&self.address, "query")?;

        let coins = engine
            .resolver()
            .get_spendable_coins(&address)
            .await
            .with_context(|| format!("Failed to list coins of {}", address))?;

        let protocol = if self.check_protocol {
            engine.counterparty().protocol_outpoints(&address).await?
        } else {
            Default::default()
        };

        match self.format {
            OutputFormat::Json => {
                let rows: Vec<_> = coins
                    .iter()
                    .map(|coin| {
                        json!({
                            "txid": coin.txid.to_string(),
                            "vout": coin.vout,
                            "value": coin.value,
                            "script_pubkey": coin.script_hex(),
                            "script_type": coin.script_type.as_str(),
                            "confirmed": coin.confirmed,
                            "effective_rate": coin.ancestor.map(|a| a.effective_rate),
                            "protocol": protocol.contains(&coin.outpoint()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            OutputFormat::Text => {
                println!("\n=== Coins of {} ===", address);
                for coin in &coins {
                    print_coin(coin, protocol.contains(&coin.outpoint()));
                }
                let total: u64 = coins.iter().map(|c| c.value).sum();
                println!();
                println!("{} coins, {} sats", coins.len(), total);
            }
        }
        Ok(())
    }
}

fn print_coin(coin: &Coin, protocol: bool) {
    let status = if coin.confirmed { "confirmed" } else { "unconfirmed" };
    let marker = if protocol { "  [protocol]" } else { "" };
    println!(
        "{:<70} {:>12} sats  {:<7} {}{}",
        coin.outpoint(),
        coin.value,
        coin.script_type.as_str(),
        status,
        marker
    );
}
