//! Spendable coin records
//!
//! Every chain-data provider answers in its own shape; the resolver lowers all
//! of them into [`Coin`]. A coin is never mutated after construction - selection
//! produces a new ordered list rather than marking coins as spent.

use crate::errors::{AppError, AppResult};
use bitcoin::{OutPoint, Script, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

/// Locking script families the engine can fund from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Pay-to-PubKey-Hash (legacy)
    P2PKH,
    /// Pay-to-Script-Hash, sized as nested P2WPKH
    P2SH,
    /// Pay-to-Witness-PubKey-Hash (SegWit v0)
    P2WPKH,
    /// Pay-to-Witness-Script-Hash (SegWit v0)
    P2WSH,
    /// Pay-to-Taproot (SegWit v1)
    P2TR,
}

impl ScriptType {
    /// Classify a locking script, `None` for anything outside the five standard forms
    pub fn from_script(script: &Script) -> Option<Self> {
        if script.is_p2pkh() {
            Some(ScriptType::P2PKH)
        } else if script.is_p2sh() {
            Some(ScriptType::P2SH)
        } else if script.is_p2wpkh() {
            Some(ScriptType::P2WPKH)
        } else if script.is_p2wsh() {
            Some(ScriptType::P2WSH)
        } else if script.is_p2tr() {
            Some(ScriptType::P2TR)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::P2PKH => "p2pkh",
            ScriptType::P2SH => "p2sh",
            ScriptType::P2WPKH => "p2wpkh",
            ScriptType::P2WSH => "p2wsh",
            ScriptType::P2TR => "p2tr",
        }
    }

    /// Native segwit output: the previous output alone proves the input's value
    pub fn is_witness_program(&self) -> bool {
        matches!(
            self,
            ScriptType::P2WPKH | ScriptType::P2WSH | ScriptType::P2TR
        )
    }

    /// Spending this output puts data in the witness (P2SH assumed nested segwit)
    pub fn spends_with_witness(&self) -> bool {
        !matches!(self, ScriptType::P2PKH)
    }

    /// Estimated weight of one spending input, in weight units
    pub fn input_weight(&self) -> u64 {
        match self {
            // 148 bytes, no witness discount
            ScriptType::P2PKH => 592,
            // 64 non-witness bytes + 108 witness bytes
            ScriptType::P2SH => 364,
            ScriptType::P2WPKH => 272,
            // 2-of-3 style witness script
            ScriptType::P2WSH => 416,
            // key-path spend, 64-byte Schnorr signature
            ScriptType::P2TR => 230,
        }
    }

    /// Estimated virtual size of one spending input, rounded up
    pub fn input_vsize(&self) -> u64 {
        self.input_weight().div_ceil(4)
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unconfirmed ancestor package of a coin's funding transaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AncestorInfo {
    pub fee: u64,
    pub vsize: u64,
    /// sat/vB as reported by the provider, or derived from fee / vsize
    pub effective_rate: f64,
}

impl AncestorInfo {
    pub fn new(fee: u64, vsize: u64, reported_rate: Option<f64>) -> Self {
        let effective_rate = match reported_rate {
            Some(rate) if rate > 0.0 => rate,
            _ if vsize > 0 => fee as f64 / vsize as f64,
            _ => 0.0,
        };
        Self {
            fee,
            vsize,
            effective_rate,
        }
    }
}

/// A spendable output owned by the funding address
#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    pub script_pubkey: ScriptBuf,
    pub script_type: ScriptType,
    pub is_witness: bool,
    pub estimated_input_vsize: u64,
    pub confirmed: bool,
    pub ancestor: Option<AncestorInfo>,
    pub is_coinbase: bool,
}

impl Coin {
    /// Build a coin, deriving script type and size estimates from the locking script
    pub fn new(
        txid: Txid,
        vout: u32,
        value: u64,
        script_pubkey: ScriptBuf,
        confirmed: bool,
    ) -> AppResult<Self> {
        let script_type = ScriptType::from_script(&script_pubkey).ok_or_else(|| {
            AppError::InvalidScript(format!(
                "{}:{} has non-standard locking script {}",
                txid,
                vout,
                script_pubkey.to_hex_string()
            ))
        })?;

        Ok(Self {
            txid,
            vout,
            value,
            script_pubkey,
            script_type,
            is_witness: script_type.is_witness_program(),
            estimated_input_vsize: script_type.input_vsize(),
            confirmed,
            ancestor: None,
            is_coinbase: false,
        })
    }

    pub fn with_ancestor(mut self, ancestor: Option<AncestorInfo>) -> Self {
        self.ancestor = ancestor;
        self
    }

    pub fn with_coinbase(mut self, is_coinbase: bool) -> Self {
        self.is_coinbase = is_coinbase;
        self
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }

    /// Locking script as lowercase hex
    pub fn script_hex(&self) -> String {
        self.script_pubkey.to_hex_string()
    }
}

/// A single coin looked up by outpoint, with its funding transaction's ancestry
#[derive(Debug, Clone, PartialEq)]
pub struct SingleCoinInfo {
    pub coin: Coin,
    pub ancestor: Option<AncestorInfo>,
}
