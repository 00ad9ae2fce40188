use crate::builder::{BuildOptions, BuildRequest, BuildResult, StampEngine};
use crate::cli::commands::{ConfigArgs, OutputFormat};
use crate::encoding::{EmbeddingStrategy, Payload, PayloadEncoding};
use crate::resolver::counterparty::parse_utxo_ref;
use anyhow::{bail, Context};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Build an unsigned protocol transaction for a payload
#[derive(Args)]
pub struct BuildCommand {
    /// Address whose coins fund the transaction
    #[arg(long)]
    pub funding_address: String,

    /// Change address (default: funding address)
    #[arg(long)]
    pub change_address: Option<String>,

    /// Recipient of the protocol operation
    #[arg(long)]
    pub recipient_address: Option<String>,

    /// Fee rate in sat/vB
    #[arg(long)]
    pub fee_rate: f64,

    /// Inline JSON operation body
    #[arg(long, conflicts_with_all = ["json_file", "file"])]
    pub json: Option<String>,

    /// File containing the JSON operation body
    #[arg(long, conflicts_with = "file")]
    pub json_file: Option<PathBuf>,

    /// Binary file to embed (witness-hash only)
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "multisig")]
    pub strategy: EmbeddingStrategy,

    #[arg(long, value_enum, default_value = "json")]
    pub encoding: PayloadEncoding,

    /// Final sequence on every input instead of signalling replaceability
    #[arg(long)]
    pub no_rbf: bool,

    /// Allow spending coins that carry Counterparty balances
    #[arg(long)]
    pub no_exclude_protocol_coins: bool,

    /// Ignore ancestor package rates of unconfirmed coins
    #[arg(long)]
    pub no_ancestor_fees: bool,

    /// Multiplier applied to ancestor package rates
    #[arg(long, default_value = "1.0")]
    pub ancestor_multiplier: f64,

    /// Never spend this coin (txid:vout); repeatable
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Stop after coin selection and report fee figures only
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl BuildCommand {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let engine = StampEngine::from_config(config)?;

        let request = BuildRequest {
            funding_address: self.funding_address.clone(),
            change_address: self.change_address.clone(),
            recipient_address: self.recipient_address.clone(),
            fee_rate: self.fee_rate,
            payload: self.payload()?,
        };
        let options = self.options()?;

        info!(
            "Building {} transaction funded by {} at {} sat/vB",
            options.strategy.as_str(),
            request.funding_address,
            request.fee_rate
        );
        let result = engine.build_protocol_transaction(&request, &options).await?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Text => print_result_text(&result),
        }
        Ok(())
    }

    fn payload(&self) -> anyhow::Result<Payload> {
        if let Some(json) = &self.json {
            let value = serde_json::from_str(json).context("--json is not valid JSON")?;
            return Ok(Payload::Json(value));
        }
        if let Some(path) = &self.json_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            return Ok(Payload::Json(value));
        }
        if let Some(path) = &self.file {
            let bytes =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(Payload::File(bytes));
        }
        bail!("One of --json, --json-file or --file is required")
    }

    fn options(&self) -> anyhow::Result<BuildOptions> {
        let exclude_outpoints = self
            .exclude
            .iter()
            .map(|utxo| {
                parse_utxo_ref(utxo)
                    .with_context(|| format!("--exclude {} is not a txid:vout reference", utxo))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(BuildOptions {
            strategy: self.strategy,
            encoding: self.encoding,
            rbf: !self.no_rbf,
            exclude_protocol_coins: !self.no_exclude_protocol_coins,
            use_ancestor_fees: !self.no_ancestor_fees,
            ancestor_multiplier: self.ancestor_multiplier,
            exclude_outpoints,
            extra_output_count: 0,
            dry_run: self.dry_run,
        })
    }
}

fn print_result_text(result: &BuildResult) {
    println!("\n=== Stamp Transaction ===");
    println!("Strategy:        {}", result.strategy.as_str());
    println!("Data outputs:    {}", result.data_output_count);
    println!("Inputs to sign:  {}", result.inputs_to_sign.len());
    println!("Input value:     {} sats", result.input_value);
    println!("Output value:    {} sats", result.output_value);
    println!("Dust total:      {} sats", result.dust_total);
    println!("Change:          {} sats", result.change);
    println!("Fee:             {} sats", result.fee);
    println!("Estimated vsize: {} vB", result.estimated_vsize);

    match (&result.psbt_base64, &result.psbt_hex) {
        (Some(base64), Some(hex)) => {
            println!();
            println!("PSBT (base64):");
            println!("{}", base64);
            println!();
            println!("PSBT (hex):");
            println!("{}", hex);
            if let Some(tx_hex) = &result.unsigned_tx_hex {
                println!();
                println!("Unsigned transaction (hex):");
                println!("{}", tx_hex);
            }
        }
        _ => {
            println!();
            println!("Dry run: no PSBT assembled");
        }
    }
}
