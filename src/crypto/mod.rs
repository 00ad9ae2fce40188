//! Cryptographic utilities for the Stamps data-carrying protocol
//!
//! ARC4 obfuscation of bare-multisig payloads, keyed by the first input's txid.
pub mod arc4;
