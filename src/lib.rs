//! Bitcoin Stamps Transaction Engine
//!
//! Embeds protocol payloads in bare-multisig or P2WSH data outputs and
//! assembles unsigned, signer-ready PSBTs funded from an address's coins.

pub mod builder;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod decoder;
pub mod encoding;
pub mod errors;
pub mod resolver;
pub mod selection;
pub mod types;
