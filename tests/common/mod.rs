//! Common Test Utilities
//!
//! Stub HTTP transport, provider configuration pointing at it, and funding
//! transactions built with the `bitcoin` crate so every coin has a real,
//! verifiable previous transaction.

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, transaction, Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use serde_json::json;
use stamp_tx_engine::config::{AppConfig, ProviderEndpoint, ProviderKind};
use stamp_tx_engine::errors::ProviderResult;
use stamp_tx_engine::resolver::{HttpResponse, HttpTransport};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

pub const FUNDING_ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
pub const FUNDING_SCRIPT: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";
pub const RECIPIENT_ADDRESS: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
pub const COUNTERPARTY_NODE: &str = "http://xcp-node";

/// Transport answering from a fixed URL table and recording every request
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StubTransport {
    responses: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.responses.lock().unwrap().insert(
            url.into(),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, url: &str) -> ProviderResult<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(HttpResponse {
                status: 404,
                body: "not found".to_string(),
            }))
    }
}

pub fn provider_base(index: usize) -> String {
    format!("http://provider-{}", index)
}

/// Mainnet config with `provider_count` esplora providers at the stub and no back-off
pub fn test_config(provider_count: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.resolver.providers = (1..=provider_count)
        .map(|i| ProviderEndpoint {
            name: format!("provider-{}", i),
            kind: ProviderKind::Mempool,
            base_url: provider_base(i),
        })
        .collect();
    config.resolver.backoff_step_ms = 0;
    config.counterparty.nodes = vec![COUNTERPARTY_NODE.to_string()];
    config
}

pub fn funding_address() -> Address {
    Address::from_str(FUNDING_ADDRESS)
        .unwrap()
        .require_network(Network::Bitcoin)
        .unwrap()
}

pub fn utxos_url(provider: usize) -> String {
    format!("{}/address/{}/utxo", provider_base(provider), FUNDING_ADDRESS)
}

pub fn raw_tx_url(provider: usize, txid: &Txid) -> String {
    format!("{}/tx/{}/hex", provider_base(provider), txid)
}

pub fn balances_url() -> String {
    format!(
        "{}/addresses/{}/balances?limit=1000",
        COUNTERPARTY_NODE, FUNDING_ADDRESS
    )
}

/// Transaction paying `value` to the funding address at output 0
///
/// `nonce` varies the spent outpoint so each call yields a distinct txid.
pub fn funding_tx(value: u64, nonce: u8) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([nonce; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::from_bytes(hex::decode(FUNDING_SCRIPT).unwrap()),
        }],
    }
}

/// Esplora `/utxo` body listing output 0 of every transaction
pub fn esplora_utxos(txs: &[&Transaction]) -> String {
    let records: Vec<_> = txs
        .iter()
        .map(|tx| {
            json!({
                "txid": tx.compute_txid().to_string(),
                "vout": 0,
                "value": tx.output[0].value.to_sat(),
                "status": {"confirmed": true, "block_height": 850000}
            })
        })
        .collect();
    serde_json::to_string(&records).unwrap()
}

/// Stub with provider 1 serving `txs` as coins and their raw transactions
pub fn funded_stub(txs: &[&Transaction]) -> StubTransport {
    let stub = StubTransport::new();
    stub.respond(utxos_url(1), 200, esplora_utxos(txs));
    for tx in txs {
        stub.respond(raw_tx_url(1, &tx.compute_txid()), 200, serialize_hex(*tx));
    }
    stub.respond(balances_url(), 200, r#"{"result": [], "next_cursor": null}"#);
    stub
}
