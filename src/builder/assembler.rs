//! Transaction Assembler
//!
//! Lowers planned outputs into `TxOut`s, attaches a funding proof to every
//! input and wraps the unsigned transaction in a PSBT. Witness-program inputs
//! carry the spent output (`witness_utxo`); all others carry the full previous
//! transaction (`non_witness_utxo`).

use crate::errors::{AppError, AppResult};
use crate::resolver::CoinResolver;
use crate::selection::SelectedFunding;
use crate::types::{Coin, InputToSign, OutputTarget, PlannedOutput};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::psbt::Psbt;
use bitcoin::{
    absolute, transaction, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use futures::stream::{self, StreamExt};
use tracing::debug;

/// Signer-ready unsigned transaction
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub psbt: Psbt,
    pub inputs_to_sign: Vec<InputToSign>,
}

impl AssembledTransaction {
    pub fn psbt_hex(&self) -> String {
        hex::encode(self.psbt.serialize())
    }

    pub fn psbt_base64(&self) -> String {
        STANDARD.encode(self.psbt.serialize())
    }

    pub fn unsigned_tx(&self) -> &Transaction {
        &self.psbt.unsigned_tx
    }
}

/// Replace pending data targets with `data_scripts`, in order
pub fn finalise_outputs(
    planned: &[PlannedOutput],
    data_scripts: Vec<ScriptBuf>,
) -> AppResult<Vec<TxOut>> {
    let mut scripts = data_scripts.into_iter();
    let mut outputs = Vec::with_capacity(planned.len());

    for (index, output) in planned.iter().enumerate() {
        let script_pubkey = match &output.target {
            OutputTarget::PendingData { script_len } => {
                let script = scripts.next().ok_or_else(|| {
                    AppError::Transaction(format!("No data script for output {}", index))
                })?;
                if script.len() != *script_len {
                    return Err(AppError::Transaction(format!(
                        "Output {} was sized for a {} byte script but got {}",
                        index,
                        script_len,
                        script.len()
                    )));
                }
                script
            }
            OutputTarget::Address(address) => address.script_pubkey(),
            OutputTarget::Script(script) => script.clone(),
        };
        outputs.push(TxOut {
            value: Amount::from_sat(output.value),
            script_pubkey,
        });
    }

    if scripts.next().is_some() {
        return Err(AppError::Transaction(
            "More data scripts than planned data outputs".to_string(),
        ));
    }
    Ok(outputs)
}

/// Previous transactions of every selected coin, in input order
pub async fn fetch_previous_transactions(
    resolver: &CoinResolver,
    coins: &[Coin],
    concurrency: usize,
) -> AppResult<Vec<Transaction>> {
    let results: Vec<AppResult<Transaction>> = stream::iter(coins)
        .map(|coin| resolver.get_raw_transaction(&coin.txid))
        .buffered(concurrency.max(1))
        .collect()
        .await;
    results.into_iter().collect()
}

/// Check `prev_tx` really funds `coin` and return the spent output
fn spent_output<'a>(coin: &Coin, prev_tx: &'a Transaction) -> AppResult<&'a TxOut> {
    if prev_tx.compute_txid() != coin.txid {
        return Err(AppError::Transaction(format!(
            "Funding proof for {} is transaction {}",
            coin.outpoint(),
            prev_tx.compute_txid()
        )));
    }
    let output = prev_tx.output.get(coin.vout as usize).ok_or_else(|| {
        AppError::Transaction(format!("Transaction {} has no output {}", coin.txid, coin.vout))
    })?;
    if output.value.to_sat() != coin.value {
        return Err(AppError::Transaction(format!(
            "Coin {} reported {} sats but the chain says {}",
            coin.outpoint(),
            coin.value,
            output.value.to_sat()
        )));
    }
    Ok(output)
}

/// Build the PSBT for `funding` paying `outputs`
pub fn assemble(
    funding: &SelectedFunding,
    outputs: Vec<TxOut>,
    previous_transactions: &[Transaction],
    rbf: bool,
) -> AppResult<AssembledTransaction> {
    let coins = funding.coins();
    if coins.len() != previous_transactions.len() {
        return Err(AppError::Transaction(format!(
            "{} inputs but {} funding proofs",
            coins.len(),
            previous_transactions.len()
        )));
    }

    let sequence = if rbf {
        Sequence::ENABLE_RBF_NO_LOCKTIME
    } else {
        Sequence::MAX
    };

    let unsigned_tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: coins
            .iter()
            .map(|coin| TxIn {
                previous_output: coin.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)?;
    for ((input, coin), prev_tx) in psbt
        .inputs
        .iter_mut()
        .zip(coins)
        .zip(previous_transactions)
    {
        let spent = spent_output(coin, prev_tx)?;
        if spent.script_pubkey.is_witness_program() {
            input.witness_utxo = Some(spent.clone());
        } else {
            input.non_witness_utxo = Some(prev_tx.clone());
        }
    }

    debug!(
        "Assembled PSBT with {} inputs and {} outputs",
        psbt.inputs.len(),
        psbt.outputs.len()
    );

    let inputs_to_sign = (0..coins.len()).map(|index| InputToSign { index }).collect();
    Ok(AssembledTransaction {
        psbt,
        inputs_to_sign,
    })
}
