//! Per-provider request URLs and response parsing
//!
//! mempool.space and blockstream.info both speak the Esplora API. blockchain.info
//! and blockcypher have their own shapes and only serve some networks.

use crate::config::{ProviderEndpoint, ProviderKind};
use crate::errors::{ProviderError, ProviderResult};
use crate::resolver::normalise::{ConfirmationStatus, UtxoRecord};
use crate::types::AncestorInfo;
use bitcoin::consensus::deserialize;
use bitcoin::{Address, Network, Transaction, Txid};
use serde::Deserialize;

impl ProviderKind {
    /// Whether this provider can answer for `network`
    pub fn supports(&self, network: Network) -> bool {
        match self {
            ProviderKind::Mempool | ProviderKind::Blockstream => true,
            ProviderKind::BlockchainInfo => network == Network::Bitcoin,
            ProviderKind::Blockcypher => blockcypher_chain(network).is_some(),
        }
    }
}

fn blockcypher_chain(network: Network) -> Option<&'static str> {
    match network {
        Network::Bitcoin => Some("main"),
        Network::Testnet => Some("test3"),
        _ => None,
    }
}

fn base(endpoint: &ProviderEndpoint) -> &str {
    endpoint.base_url.trim_end_matches('/')
}

/// Bulk unspent-outputs URL for `address`
pub fn utxos_url(endpoint: &ProviderEndpoint, address: &Address, network: Network) -> String {
    match endpoint.kind {
        ProviderKind::Mempool | ProviderKind::Blockstream => {
            format!("{}/address/{}/utxo", base(endpoint), address)
        }
        ProviderKind::BlockchainInfo => format!("{}/unspent?active={}", base(endpoint), address),
        ProviderKind::Blockcypher => format!(
            "{}/v1/btc/{}/addrs/{}?unspentOnly=true&includeScript=true",
            base(endpoint),
            blockcypher_chain(network).unwrap_or("main"),
            address
        ),
    }
}

/// Decoded-transaction URL, used for single coin lookups
pub fn transaction_url(endpoint: &ProviderEndpoint, txid: &Txid, network: Network) -> String {
    match endpoint.kind {
        ProviderKind::Mempool | ProviderKind::Blockstream => {
            format!("{}/tx/{}", base(endpoint), txid)
        }
        ProviderKind::BlockchainInfo => format!("{}/rawtx/{}", base(endpoint), txid),
        ProviderKind::Blockcypher => format!(
            "{}/v1/btc/{}/txs/{}?includeHex=true&includeScript=true",
            base(endpoint),
            blockcypher_chain(network).unwrap_or("main"),
            txid
        ),
    }
}

/// Serialised-transaction URL
pub fn raw_transaction_url(endpoint: &ProviderEndpoint, txid: &Txid, network: Network) -> String {
    match endpoint.kind {
        ProviderKind::Mempool | ProviderKind::Blockstream => {
            format!("{}/tx/{}/hex", base(endpoint), txid)
        }
        ProviderKind::BlockchainInfo => format!("{}/rawtx/{}?format=hex", base(endpoint), txid),
        // blockcypher only returns hex inside the decoded JSON
        ProviderKind::Blockcypher => transaction_url(endpoint, txid, network),
    }
}

#[derive(Debug, Deserialize)]
struct BlockchainInfoUnspent {
    #[serde(default)]
    unspent_outputs: Vec<UtxoRecord>,
}

#[derive(Debug, Deserialize)]
struct BlockcypherAddress {
    #[serde(default)]
    txrefs: Vec<UtxoRecord>,
}

/// blockchain.info answers an address with no coins with a 500 and this text
const BLOCKCHAIN_INFO_NO_OUTPUTS: &str = "No free outputs to spend";

/// Whether a non-2xx answer really means "no coins"
pub fn is_empty_answer(kind: ProviderKind, status: u16, body: &str) -> bool {
    kind == ProviderKind::BlockchainInfo && status == 500 && body.contains(BLOCKCHAIN_INFO_NO_OUTPUTS)
}

/// Parse a bulk unspent-outputs body into raw records
pub fn parse_utxos(kind: ProviderKind, body: &str) -> ProviderResult<Vec<UtxoRecord>> {
    match kind {
        ProviderKind::Mempool | ProviderKind::Blockstream => Ok(serde_json::from_str(body)?),
        ProviderKind::BlockchainInfo => {
            let parsed: BlockchainInfoUnspent = serde_json::from_str(body)?;
            Ok(parsed.unspent_outputs)
        }
        ProviderKind::Blockcypher => {
            let parsed: BlockcypherAddress = serde_json::from_str(body)?;
            Ok(parsed.txrefs)
        }
    }
}

#[derive(Debug, Deserialize)]
struct EsploraVin {
    #[serde(default)]
    is_coinbase: bool,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    scriptpubkey: String,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraTransaction {
    #[serde(default)]
    vin: Vec<EsploraVin>,
    vout: Vec<EsploraVout>,
    #[serde(default)]
    status: Option<ConfirmationStatus>,
    #[serde(default)]
    fee: Option<u64>,
    #[serde(default)]
    weight: Option<u64>,
    #[serde(default)]
    ancestor_fees: Option<u64>,
    #[serde(default)]
    ancestor_size: Option<u64>,
    #[serde(default)]
    effective_fee_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BlockchainInfoOut {
    value: u64,
    #[serde(default)]
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockchainInfoTransaction {
    out: Vec<BlockchainInfoOut>,
    #[serde(default)]
    block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlockcypherOutput {
    value: u64,
    #[serde(default)]
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockcypherTransaction {
    outputs: Vec<BlockcypherOutput>,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    hex: Option<String>,
}

/// One output of a decoded transaction, with the transaction's ancestry
#[derive(Debug, Clone)]
pub struct TransactionOutput {
    pub record: UtxoRecord,
    pub ancestor: Option<AncestorInfo>,
    pub is_coinbase: bool,
}

/// Extract output `vout` from a decoded-transaction body
pub fn parse_transaction_output(
    kind: ProviderKind,
    body: &str,
    txid: &Txid,
    vout: u32,
) -> ProviderResult<TransactionOutput> {
    let missing = || ProviderError::NotFound(format!("{}:{}", txid, vout));
    let txid_hex = Some(txid.to_string());

    match kind {
        ProviderKind::Mempool | ProviderKind::Blockstream => {
            let tx: EsploraTransaction = serde_json::from_str(body)?;
            let out = tx.vout.get(vout as usize).ok_or_else(missing)?;
            let confirmed = tx.status.as_ref().map(|s| s.confirmed).unwrap_or(false);
            let ancestor = esplora_ancestor(kind, &tx);
            Ok(TransactionOutput {
                record: UtxoRecord {
                    txid: txid_hex,
                    vout: Some(vout),
                    value: Some(out.value),
                    scriptpubkey: Some(out.scriptpubkey.clone()),
                    status: Some(ConfirmationStatus { confirmed }),
                    ..UtxoRecord::default()
                },
                ancestor,
                is_coinbase: tx.vin.first().map(|v| v.is_coinbase).unwrap_or(false),
            })
        }
        ProviderKind::BlockchainInfo => {
            let tx: BlockchainInfoTransaction = serde_json::from_str(body)?;
            let out = tx.out.get(vout as usize).ok_or_else(missing)?;
            Ok(TransactionOutput {
                record: UtxoRecord {
                    txid: txid_hex,
                    vout: Some(vout),
                    value: Some(out.value),
                    script: out.script.clone(),
                    confirmations: Some(u64::from(tx.block_height.unwrap_or(0) > 0)),
                    ..UtxoRecord::default()
                },
                ancestor: None,
                is_coinbase: false,
            })
        }
        ProviderKind::Blockcypher => {
            let tx: BlockcypherTransaction = serde_json::from_str(body)?;
            let out = tx.outputs.get(vout as usize).ok_or_else(missing)?;
            Ok(TransactionOutput {
                record: UtxoRecord {
                    txid: txid_hex,
                    vout: Some(vout),
                    value: Some(out.value),
                    script: out.script.clone(),
                    confirmations: Some(tx.confirmations),
                    ..UtxoRecord::default()
                },
                ancestor: None,
                is_coinbase: false,
            })
        }
    }
}

/// Ancestor package for an Esplora transaction
///
/// mempool.space may report the package directly; otherwise the transaction's
/// own fee and weight stand in for it.
fn esplora_ancestor(kind: ProviderKind, tx: &EsploraTransaction) -> Option<AncestorInfo> {
    if kind == ProviderKind::Mempool {
        if let (Some(fees), Some(size)) = (tx.ancestor_fees, tx.ancestor_size) {
            return Some(AncestorInfo::new(fees, size, tx.effective_fee_rate));
        }
    }
    let fee = tx.fee?;
    let vsize = tx.weight?.div_ceil(4);
    Some(AncestorInfo::new(fee, vsize, None))
}

/// Decode a serialised transaction body and check it is the one requested
pub fn parse_raw_transaction(kind: ProviderKind, body: &str, txid: &Txid) -> ProviderResult<Transaction> {
    let hex_str = match kind {
        ProviderKind::Blockcypher => {
            let tx: BlockcypherTransaction = serde_json::from_str(body)?;
            tx.hex
                .ok_or_else(|| ProviderError::Malformed(format!("No hex for {}", txid)))?
        }
        _ => body.trim().to_string(),
    };

    let bytes = hex::decode(&hex_str)
        .map_err(|e| ProviderError::Malformed(format!("Transaction {} is not hex: {}", txid, e)))?;
    let tx: Transaction = deserialize(&bytes).map_err(|e| {
        ProviderError::Malformed(format!("Failed to deserialise transaction {}: {}", txid, e))
    })?;

    if tx.compute_txid() != *txid {
        return Err(ProviderError::Malformed(format!(
            "Requested {} but provider returned {}",
            txid,
            tx.compute_txid()
        )));
    }
    Ok(tx)
}
