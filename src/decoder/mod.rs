//! Payload decoder
//!
//! Inverse of the build pipeline: pick the data outputs out of an assembled
//! transaction, rebuild the frame, undo the ARC4 layer (multisig only) and
//! split the framed content back into prefix and body.
//!
//! Accepts PSBTs (hex or base64) as well as raw transaction hex so a build can
//! be checked before and after signing.

use crate::config::AppConfig;
use crate::crypto::arc4;
use crate::encoding::{compression, multisig, unframe, witness_hash, EmbeddingStrategy};
use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::psbt::Psbt;
use bitcoin::{consensus, Transaction};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// PSBTs start with these magic bytes
const PSBT_MAGIC: &[u8] = b"psbt\xff";

/// Payload recovered from a transaction
#[derive(Debug, Clone, Serialize)]
pub struct DecodedPayload {
    pub strategy: EmbeddingStrategy,
    pub data_output_count: usize,
    /// Protocol prefix, empty for file payloads
    #[serde(serialize_with = "serialize_lossy")]
    pub prefix: Vec<u8>,
    #[serde(serialize_with = "serialize_hex")]
    pub body: Vec<u8>,
    /// Operation body when it is JSON or compressed MessagePack
    pub json: Option<Value>,
}

impl DecodedPayload {
    pub fn summary(&self) -> String {
        let content = match &self.json {
            Some(json) => json.to_string(),
            None => format!("{} bytes of binary data", self.body.len()),
        };
        format!(
            "{} payload in {} data outputs, prefix '{}': {}",
            self.strategy.as_str(),
            self.data_output_count,
            String::from_utf8_lossy(&self.prefix),
            content
        )
    }
}

fn serialize_lossy<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

/// Recovers payloads using the same protocol constants the builder embeds with
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    prefix: Vec<u8>,
    filler: [u8; multisig::PUBKEY_LEN],
    witness_value_base: u64,
}

impl PayloadDecoder {
    pub fn new(prefix: &str, filler: [u8; multisig::PUBKEY_LEN], witness_value_base: u64) -> Self {
        Self {
            prefix: prefix.as_bytes().to_vec(),
            filler,
            witness_value_base,
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self::new(
            &config.protocol.prefix,
            multisig::parse_filler(&config.protocol.filler_pubkey)?,
            config.dust.witness_hash_base,
        ))
    }

    /// Decode the payload `tx` carries under `strategy`
    pub fn decode_transaction(
        &self,
        tx: &Transaction,
        strategy: EmbeddingStrategy,
    ) -> AppResult<DecodedPayload> {
        let (framed, data_output_count) = match strategy {
            EmbeddingStrategy::Multisig => self.multisig_frame(tx)?,
            EmbeddingStrategy::WitnessHash => self.witness_frame(tx),
        };
        if data_output_count == 0 {
            return Err(AppError::InvalidData(format!(
                "Transaction {} has no {} data outputs",
                tx.compute_txid(),
                strategy.as_str()
            )));
        }

        let content = unframe(&framed)?;
        let (prefix, body) = match content.strip_prefix(self.prefix.as_slice()) {
            Some(body) if !self.prefix.is_empty() => (self.prefix.clone(), body.to_vec()),
            _ => (Vec::new(), content),
        };

        let json = serde_json::from_slice::<Value>(&body)
            .ok()
            .or_else(|| compression::decompress(&body));

        debug!(
            "Decoded {} byte body from {} data outputs of {}",
            body.len(),
            data_output_count,
            tx.compute_txid()
        );

        Ok(DecodedPayload {
            strategy,
            data_output_count,
            prefix,
            body,
            json,
        })
    }

    /// De-obfuscated frame from every bare multisig data output, in output order
    fn multisig_frame(&self, tx: &Transaction) -> AppResult<(Vec<u8>, usize)> {
        let chunks: Vec<multisig::MultisigChunk> = tx
            .output
            .iter()
            .filter_map(|out| multisig::parse_script(&out.script_pubkey, &self.filler))
            .collect();
        if chunks.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let first_input = tx.input.first().ok_or_else(|| {
            AppError::InvalidData("Transaction has no inputs to derive the key from".to_string())
        })?;
        let key = arc4::obfuscation_key(&first_input.previous_output.txid);

        let obfuscated: Vec<u8> = chunks.iter().flat_map(|chunk| chunk.data()).collect();
        Ok((arc4::deobfuscate(&obfuscated, &key)?, chunks.len()))
    }

    /// Frame from P2WSH outputs valued `base`, `base + 1`, ... in output order
    fn witness_frame(&self, tx: &Transaction) -> (Vec<u8>, usize) {
        let mut framed = Vec::new();
        let mut count = 0;
        for out in &tx.output {
            if out.value.to_sat() != witness_hash::chunk_value(self.witness_value_base, count) {
                continue;
            }
            if let Some(program) = witness_hash::parse_script(&out.script_pubkey) {
                framed.extend_from_slice(&program);
                count += 1;
            }
        }
        (framed, count)
    }
}

/// Parse a PSBT (hex or base64) or raw transaction hex into its unsigned transaction
pub fn parse_transaction_input(input: &str) -> AppResult<Transaction> {
    let input = input.trim();

    if let Ok(bytes) = hex::decode(input) {
        if bytes.starts_with(PSBT_MAGIC) {
            return Ok(Psbt::deserialize(&bytes)?.unsigned_tx);
        }
        return consensus::deserialize(&bytes)
            .map_err(|e| AppError::InvalidData(format!("Not a raw transaction: {}", e)));
    }

    let bytes = STANDARD
        .decode(input)
        .map_err(|_| AppError::InvalidData("Input is neither hex nor base64".to_string()))?;
    if !bytes.starts_with(PSBT_MAGIC) {
        return Err(AppError::InvalidData(
            "Base64 input is not a PSBT".to_string(),
        ));
    }
    Ok(Psbt::deserialize(&bytes)?.unsigned_tx)
}
