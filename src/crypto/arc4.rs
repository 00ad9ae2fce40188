//! ARC4 obfuscation wrapper around the `rc4` crate
//!
//! Bitcoin Stamps obfuscate the framed payload of bare-multisig data outputs with
//! ARC4, keyed by the raw bytes of the first input's transaction id. Decoders
//! recover the payload by applying the same keystream.
//!
//! # Usage
//!
//! ```rust
//! use stamp_tx_engine::crypto::arc4;
//!
//! let key = hex::decode("abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890").unwrap();
//! let data = b"hello world";
//!
//! let obfuscated = arc4::obfuscate(data, &key).unwrap();
//! let recovered = arc4::deobfuscate(&obfuscated, &key).unwrap();
//! assert_eq!(recovered, data);
//! ```

use crate::errors::{AppError, AppResult};
use bitcoin::Txid;
use rc4::{consts::U256, Key, KeyInit, Rc4, StreamCipher};

/// Longest key the ARC4 key schedule consumes
pub const MAX_KEY_LEN: usize = 256;

/// Apply the ARC4 keystream for `key` to `data`
///
/// Any non-empty key is accepted. The key schedule reads `key[i % len]` for
/// `i < 256`, so cycling or truncating the key to 256 bytes yields the same
/// keystream and lets a single fixed-size cipher type serve every length.
pub fn obfuscate(data: &[u8], key: &[u8]) -> AppResult<Vec<u8>> {
    if key.is_empty() {
        return Err(AppError::InvalidData("ARC4 key must not be empty".to_string()));
    }

    let expanded: Vec<u8> = key.iter().copied().cycle().take(MAX_KEY_LEN).collect();
    let mut cipher = Rc4::<U256>::new(Key::<U256>::from_slice(&expanded));
    let mut result = data.to_vec();
    cipher.apply_keystream(&mut result);

    Ok(result)
}

/// ARC4 is symmetric; provided so call sites read in the direction they work
pub fn deobfuscate(data: &[u8], key: &[u8]) -> AppResult<Vec<u8>> {
    obfuscate(data, key)
}

/// Obfuscation key for a transaction whose first input spends `txid`
///
/// Uses the txid as displayed (big-endian hex), not its internal byte order.
pub fn obfuscation_key(txid: &Txid) -> Vec<u8> {
    prepare_key_from_txid(&txid.to_string()).unwrap_or_default()
}

/// Decode a txid hex string into key bytes, `None` if it is not valid hex
pub fn prepare_key_from_txid(txid_hex: &str) -> Option<Vec<u8>> {
    hex::decode(txid_hex).ok()
}
