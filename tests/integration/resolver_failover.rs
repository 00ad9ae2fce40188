use crate::common::{
    esplora_utxos, funding_address, funding_tx, provider_base, raw_tx_url, test_config,
    utxos_url, StubTransport, FUNDING_SCRIPT,
};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Network, OutPoint};
use serde_json::json;
use stamp_tx_engine::errors::AppError;
use stamp_tx_engine::resolver::CoinResolver;
use std::sync::Arc;

fn resolver(stub: &Arc<StubTransport>, providers: usize) -> CoinResolver {
    let config = test_config(providers);
    CoinResolver::new(&config.resolver, Network::Bitcoin, stub.clone())
}

#[tokio::test]
async fn test_third_provider_answers_after_two_failures() {
    let tx = funding_tx(50_000, 1);
    let stub = Arc::new(StubTransport::new());
    stub.respond(utxos_url(1), 500, "internal error");
    stub.respond(utxos_url(2), 500, "internal error");
    stub.respond(utxos_url(3), 200, esplora_utxos(&[&tx]));

    let resolver = resolver(&stub, 3);
    let coins = resolver.get_spendable_coins(&funding_address()).await.unwrap();

    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].txid, tx.compute_txid());
    assert_eq!(coins[0].value, 50_000);
    assert!(coins[0].confirmed);
    assert_eq!(resolver.error_count(), 2);
    assert_eq!(stub.calls().len(), 3);
}

#[tokio::test]
async fn test_every_provider_failing_is_a_resolution_failure() {
    let stub = Arc::new(StubTransport::new());
    for provider in 1..=3 {
        stub.respond(utxos_url(provider), 502, "bad gateway");
    }

    let resolver = resolver(&stub, 3);
    let err = resolver
        .get_spendable_coins(&funding_address())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ResolutionFailure { .. }));
    assert!(err.is_retryable());
    // 3 providers on each of the 3 default passes
    assert_eq!(resolver.error_count(), 9);
    assert_eq!(stub.calls().len(), 9);
}

#[tokio::test]
async fn test_empty_answer_is_not_a_failure() {
    let stub = Arc::new(StubTransport::new());
    stub.respond(utxos_url(1), 200, "[]");
    stub.respond(utxos_url(2), 200, "[]");

    let resolver = resolver(&stub, 2);
    let coins = resolver.get_spendable_coins(&funding_address()).await.unwrap();

    assert!(coins.is_empty());
    assert_eq!(resolver.error_count(), 0);
    // the pass finishes but is not repeated
    assert_eq!(stub.calls().len(), 2);
}

#[tokio::test]
async fn test_malformed_body_fails_over() {
    let tx = funding_tx(12_345, 2);
    let stub = Arc::new(StubTransport::new());
    stub.respond(utxos_url(1), 200, "<html>rate limited</html>");
    stub.respond(utxos_url(2), 200, esplora_utxos(&[&tx]));

    let resolver = resolver(&stub, 2);
    let coins = resolver.get_spendable_coins(&funding_address()).await.unwrap();

    assert_eq!(coins[0].value, 12_345);
    assert_eq!(resolver.error_count(), 1);
}

#[tokio::test]
async fn test_raw_transactions_are_cached() {
    let tx = funding_tx(70_000, 3);
    let txid = tx.compute_txid();
    let stub = Arc::new(StubTransport::new());
    stub.respond(raw_tx_url(1, &txid), 200, serialize_hex(&tx));

    let resolver = resolver(&stub, 1);
    assert_eq!(resolver.get_raw_transaction(&txid).await.unwrap(), tx);
    assert_eq!(resolver.get_raw_transaction(&txid).await.unwrap(), tx);

    assert_eq!(stub.call_count(&raw_tx_url(1, &txid)), 1);
    assert_eq!(resolver.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_raw_transaction_with_wrong_txid_fails_over() {
    let wanted = funding_tx(1_000, 4);
    let other = funding_tx(2_000, 5);
    let txid = wanted.compute_txid();
    let stub = Arc::new(StubTransport::new());
    stub.respond(raw_tx_url(1, &txid), 200, serialize_hex(&other));
    stub.respond(raw_tx_url(2, &txid), 200, serialize_hex(&wanted));

    let resolver = resolver(&stub, 2);
    assert_eq!(resolver.get_raw_transaction(&txid).await.unwrap(), wanted);
    assert_eq!(resolver.error_count(), 1);
}

#[tokio::test]
async fn test_single_coin_with_ancestors() {
    let tx = funding_tx(40_000, 6);
    let txid = tx.compute_txid();
    let body = json!({
        "vin": [{"is_coinbase": false}],
        "vout": [{"scriptpubkey": FUNDING_SCRIPT, "value": 40_000}],
        "status": {"confirmed": false},
        "fee": 1_500,
        "weight": 600
    })
    .to_string();
    let stub = Arc::new(StubTransport::new());
    stub.respond(format!("{}/tx/{}", provider_base(1), txid), 500, "oops");
    stub.respond(format!("{}/tx/{}", provider_base(2), txid), 200, body);

    let resolver = resolver(&stub, 2);
    let outpoint = OutPoint::new(txid, 0);

    let info = resolver
        .get_coin(&funding_address(), outpoint, true)
        .await
        .unwrap();
    assert_eq!(info.coin.value, 40_000);
    assert!(!info.coin.confirmed);
    let ancestor = info.ancestor.unwrap();
    assert_eq!(ancestor.vsize, 150);
    assert_eq!(ancestor.effective_rate, 10.0);
    assert_eq!(info.coin.ancestor, Some(ancestor));

    let info = resolver
        .get_coin(&funding_address(), outpoint, false)
        .await
        .unwrap();
    assert!(info.ancestor.is_none());
    assert_eq!(resolver.error_count(), 2);
}
