//! End-to-end build of a protocol transaction
//!
//! frame -> plan outputs -> resolve -> select -> obfuscate/embed -> assemble.
//! Multisig data scripts depend on the first selected input, so they are
//! planned as pending outputs of known size and only embedded once a
//! [`SelectedFunding`] exists.

use crate::builder::assembler::{assemble, fetch_previous_transactions, finalise_outputs};
use crate::config::AppConfig;
use crate::crypto::arc4;
use crate::encoding::{
    frame, multisig, witness_hash, EmbeddingStrategy, Payload, PayloadEncoding,
};
use crate::errors::{AppError, AppResult};
use crate::resolver::{CoinResolver, CounterpartyClient, HttpTransport, ReqwestTransport};
use crate::selection::fees::validate_fee_rate;
use crate::selection::{dust_floor_for, select_coins, SelectedFunding, SelectionParams};
use crate::types::{InputToSign, OutputRole, PlannedOutput};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Address, Amount, Network, OutPoint, ScriptBuf, TxOut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Caller inputs for one build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub funding_address: String,
    /// Defaults to the funding address
    pub change_address: Option<String>,
    pub recipient_address: Option<String>,
    /// sat/vB
    pub fee_rate: f64,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub strategy: EmbeddingStrategy,
    pub encoding: PayloadEncoding,
    pub rbf: bool,
    /// Skip coins carrying Counterparty balances
    pub exclude_protocol_coins: bool,
    pub use_ancestor_fees: bool,
    pub ancestor_multiplier: f64,
    pub exclude_outpoints: Vec<OutPoint>,
    pub extra_output_count: usize,
    /// Stop after selection; no PSBT and no previous-transaction lookups
    pub dry_run: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strategy: EmbeddingStrategy::Multisig,
            encoding: PayloadEncoding::Json,
            rbf: true,
            exclude_protocol_coins: true,
            use_ancestor_fees: true,
            ancestor_multiplier: 1.0,
            exclude_outpoints: Vec::new(),
            extra_output_count: 0,
            dry_run: false,
        }
    }
}

/// Outcome of a build; PSBT fields are absent for dry runs
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub unsigned_tx_hex: Option<String>,
    pub psbt_hex: Option<String>,
    pub psbt_base64: Option<String>,
    pub inputs_to_sign: Vec<InputToSign>,
    pub fee: u64,
    /// `0` when no change output was created
    pub change: u64,
    /// Recipient plus data output values
    pub dust_total: u64,
    pub estimated_vsize: u64,
    pub input_value: u64,
    pub output_value: u64,
    pub data_output_count: usize,
    pub strategy: EmbeddingStrategy,
}

/// Frame and planned outputs for a payload, before any coin is chosen
#[derive(Debug, Clone)]
pub struct PayloadPlan {
    pub frame: Vec<u8>,
    pub outputs: Vec<PlannedOutput>,
    pub data_output_count: usize,
}

/// Builds protocol transactions against a fixed configuration
pub struct StampEngine {
    config: AppConfig,
    network: Network,
    resolver: CoinResolver,
    counterparty: CounterpartyClient,
    filler: [u8; multisig::PUBKEY_LEN],
}

impl StampEngine {
    /// Engine talking to providers over `transport`
    pub fn new(config: AppConfig, transport: Arc<dyn HttpTransport>) -> AppResult<Self> {
        let network = config.bitcoin_network()?;
        let filler = multisig::parse_filler(&config.protocol.filler_pubkey)?;
        let resolver = CoinResolver::new(&config.resolver, network, Arc::clone(&transport));
        let counterparty = CounterpartyClient::new(
            &config.counterparty,
            config.resolver.request_timeout_seconds,
            transport,
        );

        Ok(Self {
            config,
            network,
            resolver,
            counterparty,
            filler,
        })
    }

    /// Engine using the production HTTP client
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let transport = ReqwestTransport::new(config.resolver.request_timeout_seconds)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn resolver(&self) -> &CoinResolver {
        &self.resolver
    }

    pub fn counterparty(&self) -> &CounterpartyClient {
        &self.counterparty
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Parse an address for this engine's network
    pub fn parse_address(&self, address: &str, role: &str) -> AppResult<Address> {
        parse_address(address, self.network).map_err(|reason| AppError::InvalidAddress {
            role: role.to_string(),
            address: address.to_string(),
            reason,
        })
    }

    /// Frame `payload` and plan every non-change output
    ///
    /// Fails with [`AppError::PayloadTooLarge`] before any network access.
    pub fn plan_payload(
        &self,
        payload: &Payload,
        recipient: Option<&Address>,
        options: &BuildOptions,
    ) -> AppResult<PayloadPlan> {
        payload.check_strategy(options.strategy)?;
        let (prefix_bytes, body) = payload.to_parts(&self.config.protocol.prefix, options.encoding)?;
        let framed = frame(&prefix_bytes, &body, options.strategy.chunk_size())?;
        let dust = &self.config.dust;

        let mut outputs = Vec::new();
        if let Some(recipient) = recipient {
            outputs.push(PlannedOutput::to_address(
                recipient.clone(),
                dust.recipient,
                OutputRole::Recipient,
            ));
        }

        let data_output_count = match options.strategy {
            EmbeddingStrategy::Multisig => {
                let count = framed.len() / multisig::CHUNK_SIZE;
                outputs.extend(
                    (0..count).map(|_| PlannedOutput::pending_data(multisig::SCRIPT_LEN, dust.multisig)),
                );
                count
            }
            EmbeddingStrategy::WitnessHash => {
                let scripts = witness_hash::embed(&framed)?;
                let count = scripts.len();
                outputs.extend(scripts.into_iter().enumerate().map(|(index, script)| {
                    PlannedOutput::to_script(
                        script,
                        witness_hash::chunk_value(dust.witness_hash_base, index),
                        OutputRole::Data,
                    )
                }));
                count
            }
        };

        let service_fee = &self.config.service_fee;
        if service_fee.enabled && service_fee.amount_sats > 0 {
            let address = self.parse_address(&service_fee.address, "service fee")?;
            outputs.push(PlannedOutput::to_address(
                address,
                service_fee.amount_sats,
                OutputRole::ServiceFee,
            ));
        }

        for (index, output) in outputs.iter().enumerate() {
            let floor = dust_floor_for(&output.target);
            if output.value < floor {
                return Err(AppError::DustOutput {
                    index,
                    value: output.value,
                    floor,
                });
            }
        }

        debug!(
            "Framed {} byte payload into {} {} data outputs",
            framed.len(),
            data_output_count,
            options.strategy.as_str()
        );

        Ok(PayloadPlan {
            frame: framed,
            outputs,
            data_output_count,
        })
    }

    /// Coins that must not be spent as plain funding
    async fn excluded_outpoints(
        &self,
        funding: &Address,
        options: &BuildOptions,
    ) -> AppResult<HashSet<OutPoint>> {
        let mut exclude: HashSet<OutPoint> = options.exclude_outpoints.iter().copied().collect();
        if options.exclude_protocol_coins {
            exclude.extend(self.counterparty.protocol_outpoints(funding).await?);
        }
        Ok(exclude)
    }

    /// Build an unsigned protocol transaction
    pub async fn build_protocol_transaction(
        &self,
        request: &BuildRequest,
        options: &BuildOptions,
    ) -> AppResult<BuildResult> {
        let mut rng = StdRng::from_entropy();
        self.build_protocol_transaction_with_rng(request, options, &mut rng)
            .await
    }

    /// As [`Self::build_protocol_transaction`], drawing key bytes from `rng`
    pub async fn build_protocol_transaction_with_rng<R: Rng + Send>(
        &self,
        request: &BuildRequest,
        options: &BuildOptions,
        rng: &mut R,
    ) -> AppResult<BuildResult> {
        validate_fee_rate(request.fee_rate)?;

        let funding_address = parse_address(&request.funding_address, self.network).map_err(
            |reason| AppError::InvalidFundingAddress {
                address: request.funding_address.clone(),
                reason,
            },
        )?;
        let change_address = match &request.change_address {
            Some(change) => self.parse_address(change, "change")?,
            None => funding_address.clone(),
        };
        let recipient = request
            .recipient_address
            .as_deref()
            .map(|r| self.parse_address(r, "recipient"))
            .transpose()?;

        let plan = self.plan_payload(&request.payload, recipient.as_ref(), options)?;

        let mut coins = self.resolver.get_spendable_coins(&funding_address).await?;
        if options.use_ancestor_fees {
            coins = self
                .resolver
                .attach_ancestors(
                    &funding_address,
                    coins,
                    self.config.resolver.prev_tx_concurrency,
                )
                .await?;
        }
        let exclude = self.excluded_outpoints(&funding_address, options).await?;
        info!(
            "Resolved {} coins for {} ({} excluded outpoints)",
            coins.len(),
            funding_address,
            exclude.len()
        );

        let change_script = change_address.script_pubkey();
        let params = SelectionParams {
            fee_rate: request.fee_rate,
            extra_output_count: options.extra_output_count,
            ancestor_multiplier: options.ancestor_multiplier,
            use_ancestor_fees: options.use_ancestor_fees,
            exclude,
            change_script_len: change_script.len(),
            change_floor: self.config.dust.change_floor,
        };
        let funding = select_coins(&coins, &plan.outputs, &params)?;

        let dust_total = plan
            .outputs
            .iter()
            .filter(|o| matches!(o.role, OutputRole::Recipient | OutputRole::Data))
            .map(|o| o.value)
            .sum();

        let mut result = BuildResult {
            unsigned_tx_hex: None,
            psbt_hex: None,
            psbt_base64: None,
            inputs_to_sign: (0..funding.coins().len())
                .map(|index| InputToSign { index })
                .collect(),
            fee: funding.fee(),
            change: funding.change(),
            dust_total,
            estimated_vsize: funding.estimated_vsize(),
            input_value: funding.input_total(),
            output_value: funding.output_total() + funding.change(),
            data_output_count: plan.data_output_count,
            strategy: options.strategy,
        };

        if options.dry_run {
            info!("Dry run: {} inputs, fee {} sats", funding.coins().len(), funding.fee());
            return Ok(result);
        }

        let data_scripts = self.embed_data(&funding, &plan.frame, options.strategy, rng)?;
        let mut outputs = finalise_outputs(&plan.outputs, data_scripts)?;
        if funding.has_change() {
            outputs.push(TxOut {
                value: Amount::from_sat(funding.change()),
                script_pubkey: change_script,
            });
        }

        let previous = fetch_previous_transactions(
            &self.resolver,
            funding.coins(),
            self.config.resolver.prev_tx_concurrency,
        )
        .await?;
        let assembled = assemble(&funding, outputs, &previous, options.rbf)?;

        info!(
            "Built {} transaction: {} inputs, {} outputs, fee {} sats",
            options.strategy.as_str(),
            assembled.unsigned_tx().input.len(),
            assembled.unsigned_tx().output.len(),
            funding.fee()
        );

        result.unsigned_tx_hex = Some(serialize_hex(assembled.unsigned_tx()));
        result.psbt_hex = Some(assembled.psbt_hex());
        result.psbt_base64 = Some(assembled.psbt_base64());
        result.inputs_to_sign = assembled.inputs_to_sign;
        Ok(result)
    }

    /// Scripts for pending data outputs; empty when the strategy plans them up front
    pub fn embed_data<R: Rng + ?Sized>(
        &self,
        funding: &SelectedFunding,
        framed: &[u8],
        strategy: EmbeddingStrategy,
        rng: &mut R,
    ) -> AppResult<Vec<ScriptBuf>> {
        if !strategy.obfuscates() {
            return Ok(Vec::new());
        }

        let first_txid = funding
            .first_txid()
            .ok_or_else(|| AppError::Transaction("Selection chose no inputs".to_string()))?;
        let key = arc4::obfuscation_key(&first_txid);
        let obfuscated = arc4::obfuscate(framed, &key)?;
        multisig::embed(
            &obfuscated,
            &self.filler,
            self.config.protocol.max_point_attempts,
            rng,
        )
    }
}

/// Parse `address` and require it to belong to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address, String> {
    Address::from_str(address.trim())
        .map_err(|e| e.to_string())?
        .require_network(network)
        .map_err(|e| e.to_string())
}
