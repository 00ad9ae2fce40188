//! Payload encoding for the Stamps protocol
//!
//! A payload is serialised to a body, framed with a big-endian length field
//! and padded to the strategy's chunk size, then lowered into data outputs by
//! one of two embedders:
//!
//! - `multisig`: 62-byte chunks as two pseudo public keys in a 1-of-3 bare multisig
//! - `witness_hash`: 32-byte chunks installed directly as P2WSH programs

pub mod compression;
pub mod frame;
pub mod multisig;
pub mod witness_hash;

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use frame::{frame, unframe, MAX_FRAME_CONTENT};

/// How data chunks are carried in transaction outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingStrategy {
    /// ARC4-obfuscated chunks as fake public keys in 1-of-3 bare multisig outputs
    Multisig,
    /// Plain chunks as P2WSH witness programs
    WitnessHash,
}

impl EmbeddingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStrategy::Multisig => "multisig",
            EmbeddingStrategy::WitnessHash => "witness-hash",
        }
    }

    /// Bytes carried by one data output
    pub fn chunk_size(&self) -> usize {
        match self {
            EmbeddingStrategy::Multisig => multisig::CHUNK_SIZE,
            EmbeddingStrategy::WitnessHash => witness_hash::CHUNK_SIZE,
        }
    }

    /// Serialised length of one data output's locking script
    pub fn script_len(&self) -> usize {
        match self {
            EmbeddingStrategy::Multisig => multisig::SCRIPT_LEN,
            EmbeddingStrategy::WitnessHash => witness_hash::SCRIPT_LEN,
        }
    }

    /// Whether the frame is ARC4-obfuscated before embedding
    pub fn obfuscates(&self) -> bool {
        matches!(self, EmbeddingStrategy::Multisig)
    }
}

/// Serialisation of JSON operation bodies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    /// UTF-8 JSON text
    #[default]
    Json,
    /// zlib-compressed MessagePack, used only when smaller than the JSON
    #[value(name = "compressed")]
    CompressedMsgpack,
}

/// Data the caller wants to embed
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Protocol operation (deploy, mint, transfer, registration)
    Json(Value),
    /// Arbitrary binary file, framed without a protocol prefix
    File(Vec<u8>),
}

impl Payload {
    /// Protocol prefix and body bytes for this payload
    pub fn to_parts(&self, prefix: &str, encoding: PayloadEncoding) -> AppResult<(Vec<u8>, Vec<u8>)> {
        match self {
            Payload::Json(value) => {
                let body = match encoding {
                    PayloadEncoding::Json => serde_json::to_vec(value)?,
                    PayloadEncoding::CompressedMsgpack => compression::smallest_body(value)?,
                };
                Ok((prefix.as_bytes().to_vec(), body))
            }
            Payload::File(bytes) => Ok((Vec::new(), bytes.clone())),
        }
    }

    /// Reject strategy/payload combinations the protocol does not define
    pub fn check_strategy(&self, strategy: EmbeddingStrategy) -> AppResult<()> {
        match (self, strategy) {
            (Payload::File(_), EmbeddingStrategy::Multisig) => Err(AppError::InvalidData(
                "File payloads can only be embedded with the witness-hash strategy".to_string(),
            )),
            (Payload::File(bytes), _) if bytes.is_empty() => {
                Err(AppError::InvalidData("File payload is empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}
