//! Normalisation of provider UTXO records into [`Coin`]s
//!
//! Providers disagree on field names (`txid`/`tx_hash`, `vout`/`tx_output_n`,
//! `scriptpubkey`/`script`/`scriptPubKey.hex`) and on txid byte order. A
//! record's locking script is kept only if it is hex with one of the five
//! standard prefixes; otherwise it is rebuilt from the funding address.

use crate::config::ProviderKind;
use crate::types::Coin;
use bitcoin::{Address, ScriptBuf, Txid};
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// Locking script prefixes accepted from providers, as hex
pub const STANDARD_SCRIPT_PREFIXES: [&str; 5] = [
    "0014", // P2WPKH
    "5120", // P2TR
    "a914", // P2SH
    "76a9", // P2PKH
    "0020", // P2WSH
];

/// `scriptPubKey` is either a bare hex string or an object carrying `hex`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptPubKeyField {
    Object { hex: Option<String> },
    Hex(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationStatus {
    #[serde(default)]
    pub confirmed: bool,
}

/// Union of the UTXO record shapes returned by the supported providers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UtxoRecord {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_hash_big_endian: Option<String>,
    #[serde(default, alias = "tx_output_n", alias = "n")]
    pub vout: Option<u32>,
    #[serde(default, alias = "amount", alias = "value_sat")]
    pub value: Option<u64>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub scriptpubkey: Option<String>,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: Option<ScriptPubKeyField>,
    #[serde(default)]
    pub status: Option<ConfirmationStatus>,
    #[serde(default)]
    pub confirmations: Option<u64>,
}

impl UtxoRecord {
    /// Txid in display (big-endian) order
    ///
    /// blockchain.info reports `tx_hash` byte-reversed next to a
    /// `tx_hash_big_endian` copy; other providers use display order.
    pub fn display_txid(&self, kind: ProviderKind) -> Option<String> {
        if let Some(txid) = &self.txid {
            return Some(txid.clone());
        }
        if let Some(big_endian) = &self.tx_hash_big_endian {
            return Some(big_endian.clone());
        }
        let hash = self.tx_hash.as_ref()?;
        match kind {
            ProviderKind::BlockchainInfo => Some(reverse_endian(hash)),
            _ => Some(hash.clone()),
        }
    }

    /// First script field the provider populated
    pub fn script_hex(&self) -> Option<&str> {
        self.script
            .as_deref()
            .or(self.scriptpubkey.as_deref())
            .or(match &self.script_pub_key {
                Some(ScriptPubKeyField::Object { hex }) => hex.as_deref(),
                Some(ScriptPubKeyField::Hex(hex)) => Some(hex.as_str()),
                None => None,
            })
            .filter(|s| !s.is_empty())
    }

    pub fn is_confirmed(&self) -> bool {
        match (&self.status, self.confirmations) {
            (Some(status), _) => status.confirmed,
            (None, Some(confirmations)) => confirmations > 0,
            (None, None) => false,
        }
    }
}

/// Reverse the byte order of a hex string
pub fn reverse_endian(hex_str: &str) -> String {
    let padded = if hex_str.len() % 2 == 1 {
        format!("0{}", hex_str)
    } else {
        hex_str.to_string()
    };
    padded
        .as_bytes()
        .chunks(2)
        .rev()
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect()
}

/// Hex with one of the five standard script prefixes
pub fn is_valid_script_hex(script_hex: &str) -> bool {
    !script_hex.is_empty()
        && script_hex.len() % 2 == 0
        && script_hex.chars().all(|c| c.is_ascii_hexdigit())
        && STANDARD_SCRIPT_PREFIXES
            .iter()
            .any(|prefix| script_hex.to_ascii_lowercase().starts_with(prefix))
}

/// Provider script if usable, otherwise the address's own locking script
pub fn resolve_script(script_hex: Option<&str>, address: &Address) -> Option<ScriptBuf> {
    if let Some(script_hex) = script_hex {
        if is_valid_script_hex(script_hex) {
            if let Ok(bytes) = hex::decode(script_hex) {
                return Some(ScriptBuf::from_bytes(bytes));
            }
        }
        debug!(
            "Provider script {} unusable, rebuilding from {}",
            script_hex, address
        );
    }

    let rebuilt = address.script_pubkey();
    if is_valid_script_hex(&rebuilt.to_hex_string()) {
        Some(rebuilt)
    } else {
        None
    }
}

/// Lower one provider record into a [`Coin`], `None` if it cannot be used
pub fn normalise_record(record: &UtxoRecord, kind: ProviderKind, address: &Address) -> Option<Coin> {
    let txid_hex = record.display_txid(kind)?;
    let txid = match Txid::from_str(&txid_hex) {
        Ok(txid) => txid,
        Err(e) => {
            debug!("Dropping record with bad txid {}: {}", txid_hex, e);
            return None;
        }
    };
    let vout = record.vout?;
    let value = record.value?;

    let Some(script) = resolve_script(record.script_hex(), address) else {
        debug!("Dropping {}:{} with no usable locking script", txid, vout);
        return None;
    };

    match Coin::new(txid, vout, value, script, record.is_confirmed()) {
        Ok(coin) => Some(coin),
        Err(e) => {
            debug!("Dropping {}:{}: {}", txid, vout, e);
            None
        }
    }
}

/// Normalise a provider's record list, dropping unusable entries
pub fn normalise_records(records: &[UtxoRecord], kind: ProviderKind, address: &Address) -> Vec<Coin> {
    records
        .iter()
        .filter_map(|record| normalise_record(record, kind, address))
        .collect()
}
