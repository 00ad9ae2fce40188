//! Coin Selector & Fee Estimator
//!
//! - `fees`: per-script input weights, transaction weight/vsize, dust floors
//! - `selector`: largest-first selection producing [`SelectedFunding`]

pub mod fees;
pub mod selector;

pub use fees::{dust_floor, dust_floor_for, fee_for_weight, transaction_weight, vsize_from_weight};
pub use selector::{select_coins, SelectedFunding, SelectionParams};
