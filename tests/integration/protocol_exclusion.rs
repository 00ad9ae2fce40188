use crate::common::{
    balances_url, funded_stub, funding_address, funding_tx, test_config, FUNDING_ADDRESS,
};
use serde_json::json;
use stamp_tx_engine::builder::{BuildOptions, BuildRequest, StampEngine};
use stamp_tx_engine::encoding::Payload;
use stamp_tx_engine::errors::AppError;
use std::sync::Arc;

fn request() -> BuildRequest {
    BuildRequest {
        funding_address: FUNDING_ADDRESS.to_string(),
        change_address: None,
        recipient_address: None,
        fee_rate: 5.0,
        payload: Payload::Json(json!({"p": "src-20", "op": "transfer", "tick": "kevin", "amt": "1"})),
    }
}

#[tokio::test]
async fn test_coins_with_protocol_balances_are_never_spent() {
    let asset_coin = funding_tx(300_000, 21);
    let plain_coin = funding_tx(100_000, 22);
    let stub = Arc::new(funded_stub(&[&asset_coin, &plain_coin]));
    stub.respond(
        balances_url(),
        200,
        json!({
            "result": [
                {"asset": "PEPECASH", "quantity": 100000000, "utxo": format!("{}:0", asset_coin.compute_txid())},
                {"asset": "XCP", "quantity": 5, "utxo": null},
            ],
            "next_cursor": null,
        })
        .to_string(),
    );
    let engine = StampEngine::new(test_config(1), stub).unwrap();

    let result = engine
        .build_protocol_transaction(&request(), &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(result.input_value, 100_000);
    let psbt = bitcoin::psbt::Psbt::deserialize(&hex::decode(result.psbt_hex.unwrap()).unwrap())
        .unwrap();
    assert_eq!(psbt.unsigned_tx.input.len(), 1);
    assert_eq!(
        psbt.unsigned_tx.input[0].previous_output.txid,
        plain_coin.compute_txid()
    );
}

#[tokio::test]
async fn test_exclusion_can_be_disabled() {
    let asset_coin = funding_tx(300_000, 23);
    let stub = Arc::new(funded_stub(&[&asset_coin]));
    let engine = StampEngine::new(test_config(1), stub.clone()).unwrap();

    let options = BuildOptions {
        exclude_protocol_coins: false,
        ..BuildOptions::default()
    };
    let result = engine
        .build_protocol_transaction(&request(), &options)
        .await
        .unwrap();

    assert_eq!(result.input_value, 300_000);
    assert_eq!(stub.call_count(&balances_url()), 0);
}

#[tokio::test]
async fn test_explicit_excludes_are_honoured() {
    let first = funding_tx(300_000, 24);
    let second = funding_tx(200_000, 25);
    let stub = Arc::new(funded_stub(&[&first, &second]));
    let engine = StampEngine::new(test_config(1), stub).unwrap();

    let options = BuildOptions {
        exclude_outpoints: vec![bitcoin::OutPoint::new(first.compute_txid(), 0)],
        ..BuildOptions::default()
    };
    let result = engine
        .build_protocol_transaction(&request(), &options)
        .await
        .unwrap();
    assert_eq!(result.input_value, 200_000);
}

#[tokio::test]
async fn test_unreachable_counterparty_fails_closed() {
    let coin = funding_tx(300_000, 26);
    let stub = Arc::new(funded_stub(&[&coin]));
    stub.respond(balances_url(), 503, "maintenance");
    let engine = StampEngine::new(test_config(1), stub).unwrap();

    let err = engine
        .build_protocol_transaction(&request(), &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResolutionFailure { .. }));
    assert_eq!(engine.counterparty().error_count(), 1);
}

#[tokio::test]
async fn test_balance_pages_are_followed() {
    let stub = Arc::new(funded_stub(&[]));
    stub.respond(
        balances_url(),
        200,
        json!({
            "result": [{"quantity": "1", "utxo": format!("{}:1", "ab".repeat(32))}],
            "next_cursor": 2,
        })
        .to_string(),
    );
    stub.respond(
        format!("{}&cursor=2", balances_url()),
        200,
        json!({
            "result": [{"quantity": 7, "utxo": format!("{}:0", "cd".repeat(32))}],
            "next_cursor": null,
        })
        .to_string(),
    );
    let engine = StampEngine::new(test_config(1), stub).unwrap();

    let outpoints = engine
        .counterparty()
        .protocol_outpoints(&funding_address())
        .await
        .unwrap();
    assert_eq!(outpoints.len(), 2);
}
