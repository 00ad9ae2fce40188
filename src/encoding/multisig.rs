//! Bare-multisig data embedding
//!
//! Each 62-byte chunk becomes two 33-byte pseudo public keys: a random parity
//! byte (`02`/`03`), a 31-byte half of the chunk and a random suffix byte. A
//! candidate is retried until it is a valid compressed secp256k1 point, then
//! placed in `OP_1 <A> <B> <filler> OP_3 OP_CHECKMULTISIG`. The filler key is
//! the only spendable one.

use crate::errors::{AppError, AppResult};
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHBYTES_33, OP_PUSHNUM_1, OP_PUSHNUM_3};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Script, ScriptBuf};
use rand::Rng;

/// Data bytes carried per pseudo public key
pub const HALF_CHUNK: usize = 31;

/// Data bytes carried per output
pub const CHUNK_SIZE: usize = HALF_CHUNK * 2;

pub const PUBKEY_LEN: usize = 33;

/// `OP_1` + 3 x (push + 33 bytes) + `OP_3` + `OP_CHECKMULTISIG`
pub const SCRIPT_LEN: usize = 1 + 3 * (1 + PUBKEY_LEN) + 2;

/// Two pseudo public keys carrying one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultisigChunk {
    pub pubkey_a: [u8; PUBKEY_LEN],
    pub pubkey_b: [u8; PUBKEY_LEN],
}

impl MultisigChunk {
    /// The 62 data bytes this chunk carries
    pub fn data(&self) -> [u8; CHUNK_SIZE] {
        let mut out = [0u8; CHUNK_SIZE];
        out[..HALF_CHUNK].copy_from_slice(&self.pubkey_a[1..1 + HALF_CHUNK]);
        out[HALF_CHUNK..].copy_from_slice(&self.pubkey_b[1..1 + HALF_CHUNK]);
        out
    }
}

/// Whether `candidate` parses as a compressed secp256k1 point
pub fn is_valid_point(candidate: &[u8]) -> bool {
    candidate.len() == PUBKEY_LEN && PublicKey::from_slice(candidate).is_ok()
}

/// Wrap a 31-byte half in random parity and suffix bytes until it is a valid point
pub fn embed_half<R: Rng + ?Sized>(
    half: &[u8],
    max_attempts: usize,
    rng: &mut R,
) -> AppResult<[u8; PUBKEY_LEN]> {
    if half.len() != HALF_CHUNK {
        return Err(AppError::InvalidData(format!(
            "Key half must be {} bytes, got {}",
            HALF_CHUNK,
            half.len()
        )));
    }

    let mut candidate = [0u8; PUBKEY_LEN];
    candidate[1..1 + HALF_CHUNK].copy_from_slice(half);

    for _ in 0..max_attempts {
        let parity: u8 = rng.gen();
        candidate[0] = if parity & 1 == 0 { 0x02 } else { 0x03 };
        candidate[PUBKEY_LEN - 1] = rng.gen();
        if is_valid_point(&candidate) {
            return Ok(candidate);
        }
    }

    Err(AppError::PointEmbeddingExhausted {
        attempts: max_attempts,
    })
}

/// Embed one 62-byte chunk as two pseudo public keys
pub fn embed_chunk<R: Rng + ?Sized>(
    chunk: &[u8],
    max_attempts: usize,
    rng: &mut R,
) -> AppResult<MultisigChunk> {
    if chunk.len() != CHUNK_SIZE {
        return Err(AppError::InvalidData(format!(
            "Multisig chunk must be {} bytes, got {}",
            CHUNK_SIZE,
            chunk.len()
        )));
    }

    Ok(MultisigChunk {
        pubkey_a: embed_half(&chunk[..HALF_CHUNK], max_attempts, rng)?,
        pubkey_b: embed_half(&chunk[HALF_CHUNK..], max_attempts, rng)?,
    })
}

/// `OP_1 <A> <B> <filler> OP_3 OP_CHECKMULTISIG`
pub fn multisig_script(chunk: &MultisigChunk, filler: &[u8; PUBKEY_LEN]) -> ScriptBuf {
    let mut bytes = Vec::with_capacity(SCRIPT_LEN);
    bytes.push(OP_PUSHNUM_1.to_u8());
    for key in [&chunk.pubkey_a, &chunk.pubkey_b, filler] {
        bytes.push(OP_PUSHBYTES_33.to_u8());
        bytes.extend_from_slice(key);
    }
    bytes.push(OP_PUSHNUM_3.to_u8());
    bytes.push(OP_CHECKMULTISIG.to_u8());
    ScriptBuf::from_bytes(bytes)
}

/// Lower chunk-aligned (already obfuscated) bytes into data scripts, in order
pub fn embed<R: Rng + ?Sized>(
    data: &[u8],
    filler: &[u8; PUBKEY_LEN],
    max_attempts: usize,
    rng: &mut R,
) -> AppResult<Vec<ScriptBuf>> {
    if data.len() % CHUNK_SIZE != 0 {
        return Err(AppError::InvalidData(format!(
            "Multisig payload of {} bytes is not a multiple of {}",
            data.len(),
            CHUNK_SIZE
        )));
    }

    data.chunks(CHUNK_SIZE)
        .map(|chunk| {
            embed_chunk(chunk, max_attempts, rng).map(|keys| multisig_script(&keys, filler))
        })
        .collect()
}

/// Parse a data script, `None` unless it is exactly our layout with `filler` third
pub fn parse_script(script: &Script, filler: &[u8; PUBKEY_LEN]) -> Option<MultisigChunk> {
    let bytes = script.as_bytes();
    if bytes.len() != SCRIPT_LEN
        || bytes[0] != OP_PUSHNUM_1.to_u8()
        || bytes[SCRIPT_LEN - 2] != OP_PUSHNUM_3.to_u8()
        || bytes[SCRIPT_LEN - 1] != OP_CHECKMULTISIG.to_u8()
    {
        return None;
    }

    let mut keys = [[0u8; PUBKEY_LEN]; 3];
    for (slot, key) in keys.iter_mut().enumerate() {
        let start = 1 + slot * (1 + PUBKEY_LEN);
        if bytes[start] != OP_PUSHBYTES_33.to_u8() {
            return None;
        }
        key.copy_from_slice(&bytes[start + 1..start + 1 + PUBKEY_LEN]);
    }

    if &keys[2] != filler {
        return None;
    }

    Some(MultisigChunk {
        pubkey_a: keys[0],
        pubkey_b: keys[1],
    })
}

/// Decode a 33-byte hex filler key
pub fn parse_filler(filler_hex: &str) -> AppResult<[u8; PUBKEY_LEN]> {
    let bytes = hex::decode(filler_hex)
        .map_err(|e| AppError::Config(format!("Filler key is not hex: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        AppError::Config(format!(
            "Filler key must be {} bytes, got {}",
            PUBKEY_LEN,
            b.len()
        ))
    })
}
