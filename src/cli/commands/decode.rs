use crate::cli::commands::{ConfigArgs, OutputFormat};
use crate::decoder::{parse_transaction_input, DecodedPayload, PayloadDecoder};
use crate::encoding::EmbeddingStrategy;
use anyhow::Context;
use clap::Args;
use std::fs;
use std::path::PathBuf;

/// Recover the payload from a PSBT or raw transaction
#[derive(Args)]
pub struct DecodeCommand {
    /// PSBT (hex or base64) or raw transaction hex
    #[arg(conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the PSBT or transaction from a file instead
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "multisig")]
    pub strategy: EmbeddingStrategy,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl DecodeCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let decoder = PayloadDecoder::from_config(&config)?;

        let input = match (&self.input, &self.input_file) {
            (Some(input), _) => input.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, None) => anyhow::bail!("Provide a transaction or --input-file"),
        };

        let tx = parse_transaction_input(&input)?;
        let decoded = decoder
            .decode_transaction(&tx, self.strategy)
            .with_context(|| format!("Failed to decode {}", tx.compute_txid()))?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decoded)?),
            OutputFormat::Text => print_decoded_text(&decoded),
        }
        Ok(())
    }
}

fn print_decoded_text(decoded: &DecodedPayload) {
    println!("\n=== Decoded Payload ===");
    println!("{}", decoded.summary());
    println!();
    match &decoded.json {
        Some(json) => {
            println!("JSON:");
            println!(
                "{}",
                serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
            );
        }
        None => {
            println!("Body (hex):");
            println!("{}", hex::encode(&decoded.body));
        }
    }
}
