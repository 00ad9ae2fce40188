//! Largest-first coin selection
//!
//! Coins are sorted by value (stable, so equal-value coins keep resolver order)
//! and taken as a growing prefix until the planned outputs plus the estimated
//! fee are covered. Change at or below the floor is folded into the fee, which
//! keeps `inputs == outputs + change + fee` exact for every result.

use crate::errors::{AppError, AppResult};
use crate::selection::fees::{
    fee_for_weight, input_fee, transaction_weight, validate_fee_rate, vsize_from_weight,
};
use crate::types::{Coin, PlannedOutput, ScriptType};
use bitcoin::{OutPoint, Txid};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SelectionParams {
    /// sat/vB
    pub fee_rate: f64,
    /// Outputs not in the planned list but present in the final transaction
    pub extra_output_count: usize,
    /// Multiplier applied to an unconfirmed coin's ancestor rate before comparing
    pub ancestor_multiplier: f64,
    pub use_ancestor_fees: bool,
    /// Outpoints that must never be spent (e.g. protocol-bearing coins)
    pub exclude: HashSet<OutPoint>,
    /// Locking script length of the change output
    pub change_script_len: usize,
    pub change_floor: u64,
}

impl SelectionParams {
    pub fn new(fee_rate: f64, change_script_len: usize, change_floor: u64) -> Self {
        Self {
            fee_rate,
            extra_output_count: 0,
            ancestor_multiplier: 1.0,
            use_ancestor_fees: true,
            exclude: HashSet::new(),
            change_script_len,
            change_floor,
        }
    }
}

/// Coins chosen for one build, with their change and fee
///
/// Only the selector constructs this, so anything that takes it (obfuscation,
/// assembly) cannot run before selection has fixed the input order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFunding {
    coins: Vec<Coin>,
    change: u64,
    fee: u64,
    output_total: u64,
    estimated_vsize: u64,
}

impl SelectedFunding {
    pub(crate) fn new(
        coins: Vec<Coin>,
        change: u64,
        fee: u64,
        output_total: u64,
        estimated_vsize: u64,
    ) -> Self {
        Self {
            coins,
            change,
            fee,
            output_total,
            estimated_vsize,
        }
    }

    /// Inputs in transaction order
    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    /// Txid of input 0, the obfuscation key source
    pub fn first_txid(&self) -> Option<Txid> {
        self.coins.first().map(|c| c.txid)
    }

    /// Change value, `0` when no change output is created
    pub fn change(&self) -> u64 {
        self.change
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn output_total(&self) -> u64 {
        self.output_total
    }

    pub fn input_total(&self) -> u64 {
        self.coins.iter().map(|c| c.value).sum()
    }

    pub fn estimated_vsize(&self) -> u64 {
        self.estimated_vsize
    }

    pub fn has_change(&self) -> bool {
        self.change > 0
    }
}

/// Whether `coin` may fund a transaction at `params.fee_rate`
fn is_spendable(coin: &Coin, params: &SelectionParams) -> bool {
    if params.exclude.contains(&coin.outpoint()) {
        return false;
    }
    if coin.value <= input_fee(coin.script_type, params.fee_rate) {
        return false;
    }
    if params.use_ancestor_fees && !coin.confirmed {
        if let Some(ancestor) = &coin.ancestor {
            if ancestor.effective_rate * params.ancestor_multiplier < params.fee_rate {
                return false;
            }
        }
    }
    true
}

/// Pick an ordered coin set covering `outputs` plus fee
pub fn select_coins(
    coins: &[Coin],
    outputs: &[PlannedOutput],
    params: &SelectionParams,
) -> AppResult<SelectedFunding> {
    validate_fee_rate(params.fee_rate)?;

    let output_total: u64 = outputs.iter().map(|o| o.value).sum();

    let mut output_lens: Vec<usize> = outputs.iter().map(|o| o.target.script_len()).collect();
    output_lens.extend(std::iter::repeat(params.change_script_len).take(params.extra_output_count));
    let mut output_lens_with_change = output_lens.clone();
    output_lens_with_change.push(params.change_script_len);

    let mut candidates: Vec<&Coin> = coins.iter().filter(|c| is_spendable(c, params)).collect();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    debug!(
        "Selecting from {} of {} coins for {} sats of outputs at {} sat/vB",
        candidates.len(),
        coins.len(),
        output_total,
        params.fee_rate
    );

    let mut input_types: Vec<ScriptType> = Vec::with_capacity(candidates.len());
    let mut input_total: u64 = 0;

    for (taken, coin) in candidates.iter().enumerate() {
        input_types.push(coin.script_type);
        input_total += coin.value;

        let weight_with_change = transaction_weight(&input_types, &output_lens_with_change);
        let fee_with_change = fee_for_weight(weight_with_change, params.fee_rate);
        if let Some(change) = input_total.checked_sub(output_total + fee_with_change) {
            if change > params.change_floor {
                debug!(
                    "Selected {} coins: {} in, {} change, {} fee",
                    taken + 1,
                    input_total,
                    change,
                    fee_with_change
                );
                return Ok(SelectedFunding::new(
                    collect_taken(&candidates, taken + 1),
                    change,
                    fee_with_change,
                    output_total,
                    vsize_from_weight(weight_with_change),
                ));
            }
        }

        let weight = transaction_weight(&input_types, &output_lens);
        let fee = fee_for_weight(weight, params.fee_rate);
        if input_total >= output_total + fee {
            // leftover is too small for a change output
            let fee = input_total - output_total;
            debug!(
                "Selected {} coins: {} in, no change, {} fee",
                taken + 1,
                input_total,
                fee
            );
            return Ok(SelectedFunding::new(
                collect_taken(&candidates, taken + 1),
                0,
                fee,
                output_total,
                vsize_from_weight(weight),
            ));
        }
    }

    let required = output_total + fee_for_weight(
        transaction_weight(&input_types, &output_lens),
        params.fee_rate,
    );
    Err(AppError::InsufficientFunds {
        available: input_total,
        required,
    })
}

fn collect_taken(candidates: &[&Coin], count: usize) -> Vec<Coin> {
    candidates.iter().take(count).map(|c| (*c).clone()).collect()
}
