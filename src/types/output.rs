//! Planned outputs
//!
//! Callers plan recipient and fee outputs up front; the embedder plans data
//! outputs. Multisig data scripts depend on the obfuscation key, so they are
//! planned as [`OutputTarget::PendingData`] with a known script length and
//! only lowered to real scripts after selection.

use bitcoin::{Address, ScriptBuf};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Address(Address),
    Script(ScriptBuf),
    /// Data output whose script is not yet known, only its serialised length
    PendingData { script_len: usize },
}

impl OutputTarget {
    /// Length of the locking script in bytes
    pub fn script_len(&self) -> usize {
        match self {
            OutputTarget::Address(address) => address.script_pubkey().len(),
            OutputTarget::Script(script) => script.len(),
            OutputTarget::PendingData { script_len } => *script_len,
        }
    }

    /// Locking script, `None` while still pending
    pub fn script_pubkey(&self) -> Option<ScriptBuf> {
        match self {
            OutputTarget::Address(address) => Some(address.script_pubkey()),
            OutputTarget::Script(script) => Some(script.clone()),
            OutputTarget::PendingData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRole {
    Recipient,
    Data,
    ServiceFee,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub target: OutputTarget,
    pub value: u64,
    pub role: OutputRole,
}

impl PlannedOutput {
    pub fn to_address(address: Address, value: u64, role: OutputRole) -> Self {
        Self {
            target: OutputTarget::Address(address),
            value,
            role,
        }
    }

    pub fn to_script(script: ScriptBuf, value: u64, role: OutputRole) -> Self {
        Self {
            target: OutputTarget::Script(script),
            value,
            role,
        }
    }

    pub fn pending_data(script_len: usize, value: u64) -> Self {
        Self {
            target: OutputTarget::PendingData { script_len },
            value,
            role: OutputRole::Data,
        }
    }
}

/// Input index the signer must sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputToSign {
    pub index: usize,
}
