//! Stamp Transaction Engine - Type System
//!
//! - `coin`: Spendable coins as normalised by the resolver (Coin, ScriptType, AncestorInfo)
//! - `output`: Planned outputs handed to selection and assembly

pub mod coin;
pub mod output;

pub use coin::{AncestorInfo, Coin, ScriptType, SingleCoinInfo};
pub use output::{InputToSign, OutputRole, OutputTarget, PlannedOutput};
