//! Witness-hash data embedding
//!
//! Each 32-byte chunk is installed directly as a version 0 witness program
//! (`OP_0 <32 bytes>`), giving a P2WSH-shaped output that nothing ever
//! redeems. Values step up by one satoshi per chunk so otherwise identical
//! dust outputs stay distinguishable.

use crate::errors::{AppError, AppResult};
use bitcoin::opcodes::all::OP_PUSHBYTES_32;
use bitcoin::opcodes::OP_0;
use bitcoin::{Script, ScriptBuf};

pub const CHUNK_SIZE: usize = 32;

/// `OP_0` + push + 32 bytes
pub const SCRIPT_LEN: usize = 2 + CHUNK_SIZE;

pub fn witness_script(chunk: &[u8; CHUNK_SIZE]) -> ScriptBuf {
    let mut bytes = Vec::with_capacity(SCRIPT_LEN);
    bytes.push(OP_0.to_u8());
    bytes.push(OP_PUSHBYTES_32.to_u8());
    bytes.extend_from_slice(chunk);
    ScriptBuf::from_bytes(bytes)
}

/// Lower chunk-aligned frame bytes into data scripts, in order
pub fn embed(data: &[u8]) -> AppResult<Vec<ScriptBuf>> {
    if data.len() % CHUNK_SIZE != 0 {
        return Err(AppError::InvalidData(format!(
            "Witness-hash payload of {} bytes is not a multiple of {}",
            data.len(),
            CHUNK_SIZE
        )));
    }

    Ok(data
        .chunks_exact(CHUNK_SIZE)
        .map(|chunk| {
            let mut program = [0u8; CHUNK_SIZE];
            program.copy_from_slice(chunk);
            witness_script(&program)
        })
        .collect())
}

/// Value of the data output at `index`
pub fn chunk_value(base: u64, index: usize) -> u64 {
    base + index as u64
}

/// The 32-byte program of a P2WSH script
pub fn parse_script(script: &Script) -> Option<[u8; CHUNK_SIZE]> {
    if !script.is_p2wsh() {
        return None;
    }
    let mut program = [0u8; CHUNK_SIZE];
    program.copy_from_slice(&script.as_bytes()[2..]);
    Some(program)
}
