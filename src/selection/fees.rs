//! Weight, vsize and dust arithmetic
//!
//! Input weights come from [`ScriptType::input_weight`]; everything else is
//! derived from serialised lengths so pending data outputs can be sized before
//! their scripts exist.

use crate::errors::{AppError, AppResult};
use crate::types::{OutputTarget, ScriptType};

/// Relay policy dust rate, sat/vB
pub const DUST_RELAY_RATE: u64 = 3;

/// vbytes to spend a witness program output later
const WITNESS_SPEND_VSIZE: u64 = 67;

/// vbytes to spend any other output later
const LEGACY_SPEND_VSIZE: u64 = 148;

/// Bitcoin CompactSize length
pub fn varint_len(n: usize) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Serialised size of an output with a `script_len` byte locking script
pub fn output_size(script_len: usize) -> u64 {
    (8 + varint_len(script_len) + script_len) as u64
}

pub fn output_weight(script_len: usize) -> u64 {
    output_size(script_len) * 4
}

/// Weight of a transaction spending `inputs` into outputs of the given script lengths
pub fn transaction_weight(inputs: &[ScriptType], output_script_lens: &[usize]) -> u64 {
    // version + locktime
    let mut weight = 4 * (8 + varint_len(inputs.len()) + varint_len(output_script_lens.len())) as u64;
    if inputs.iter().any(|t| t.spends_with_witness()) {
        // segwit marker and flag
        weight += 2;
    }
    weight += inputs.iter().map(|t| t.input_weight()).sum::<u64>();
    weight += output_script_lens
        .iter()
        .map(|len| output_weight(*len))
        .sum::<u64>();
    weight
}

pub fn vsize_from_weight(weight: u64) -> u64 {
    weight.div_ceil(4)
}

/// Fee for `weight` at `fee_rate` sat/vB, rounded up to the next satoshi
pub fn fee_for_weight(weight: u64, fee_rate: f64) -> u64 {
    (weight as f64 * fee_rate / 4.0).ceil() as u64
}

/// Cost of adding one input of `script_type` at `fee_rate`
pub fn input_fee(script_type: ScriptType, fee_rate: f64) -> u64 {
    fee_for_weight(script_type.input_weight(), fee_rate)
}

pub fn validate_fee_rate(fee_rate: f64) -> AppResult<()> {
    if !fee_rate.is_finite() || fee_rate <= 0.0 {
        return Err(AppError::InvalidFeeRate(fee_rate));
    }
    Ok(())
}

/// Relay dust floor for an output: 3 sat/vB x (output size + later spend size)
pub fn dust_floor(script_len: usize, is_witness_program: bool) -> u64 {
    let spend = if is_witness_program {
        WITNESS_SPEND_VSIZE
    } else {
        LEGACY_SPEND_VSIZE
    };
    DUST_RELAY_RATE * (output_size(script_len) + spend)
}

/// Dust floor for a planned output target; pending data is bare multisig
pub fn dust_floor_for(target: &OutputTarget) -> u64 {
    match target {
        OutputTarget::Address(address) => {
            let script = address.script_pubkey();
            dust_floor(script.len(), script.is_witness_program())
        }
        OutputTarget::Script(script) => dust_floor(script.len(), script.is_witness_program()),
        OutputTarget::PendingData { script_len } => dust_floor(*script_len, false),
    }
}
