use crate::common::{
    funded_stub, funding_tx, provider_base, raw_tx_url, test_config, utxos_url,
    StubTransport, FUNDING_ADDRESS, FUNDING_SCRIPT, RECIPIENT_ADDRESS,
};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::psbt::Psbt;
use bitcoin::{Sequence, Transaction, Txid};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use stamp_tx_engine::builder::{BuildOptions, BuildRequest, BuildResult, StampEngine};
use stamp_tx_engine::config::AppConfig;
use stamp_tx_engine::decoder::{parse_transaction_input, PayloadDecoder};
use stamp_tx_engine::encoding::{EmbeddingStrategy, Payload};
use stamp_tx_engine::errors::AppError;
use std::sync::Arc;

fn kilobyte_deploy() -> Value {
    let value = json!({
        "p": "src-20",
        "op": "deploy",
        "tick": "kevin",
        "max": "69000000",
        "lim": "69000",
        "dec": "8",
        "description": "k".repeat(920),
    });
    assert!(serde_json::to_vec(&value).unwrap().len() > 1000);
    value
}

fn request(payload: Payload, recipient: bool) -> BuildRequest {
    BuildRequest {
        funding_address: FUNDING_ADDRESS.to_string(),
        change_address: None,
        recipient_address: recipient.then(|| RECIPIENT_ADDRESS.to_string()),
        fee_rate: 10.0,
        payload,
    }
}

async fn build(
    engine: &StampEngine,
    request: &BuildRequest,
    options: &BuildOptions,
) -> Result<BuildResult, AppError> {
    let mut rng = StdRng::seed_from_u64(2024);
    engine
        .build_protocol_transaction_with_rng(request, options, &mut rng)
        .await
}

fn psbt_of(result: &BuildResult) -> Psbt {
    let bytes = hex::decode(result.psbt_hex.as_ref().unwrap()).unwrap();
    Psbt::deserialize(&bytes).unwrap()
}

fn output_total(tx: &Transaction) -> u64 {
    tx.output.iter().map(|o| o.value.to_sat()).sum()
}

#[tokio::test]
async fn test_kilobyte_json_multisig_build() {
    let big = funding_tx(200_000, 1);
    let small = funding_tx(150_000, 2);
    let stub = Arc::new(funded_stub(&[&small, &big]));
    let engine = StampEngine::new(test_config(1), stub.clone()).unwrap();

    let payload = kilobyte_deploy();
    let body_len = serde_json::to_vec(&payload).unwrap().len();
    let expected_chunks = (2 + "stamp:".len() + body_len).div_ceil(62);

    let result = build(&engine, &request(Payload::Json(payload), true), &BuildOptions::default())
        .await
        .unwrap();
    let psbt = psbt_of(&result);
    let tx = &psbt.unsigned_tx;
    assert_eq!(
        result.unsigned_tx_hex.as_deref(),
        Some(serialize_hex(tx).as_str())
    );

    assert_eq!(result.data_output_count, expected_chunks);
    assert_eq!(tx.output.len(), 1 + expected_chunks + 1);
    assert_eq!(tx.output[0].value.to_sat(), 789);
    for data in &tx.output[1..=expected_chunks] {
        assert_eq!(data.value.to_sat(), 809);
        assert_eq!(data.script_pubkey.len(), 105);
    }
    let change = tx.output.last().unwrap();
    assert_eq!(hex::encode(change.script_pubkey.as_bytes()), FUNDING_SCRIPT);
    assert_eq!(change.value.to_sat(), result.change);

    // largest coin first, and it alone covers the build
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output.txid, big.compute_txid());
    assert_eq!(tx.input[0].sequence, Sequence::ENABLE_RBF_NO_LOCKTIME);
    assert_eq!(psbt.inputs[0].witness_utxo.as_ref().unwrap(), &big.output[0]);

    assert_eq!(result.input_value, 200_000);
    assert_eq!(result.output_value, output_total(tx));
    assert_eq!(result.input_value, result.output_value + result.fee);
    assert_eq!(result.dust_total, 789 + 809 * expected_chunks as u64);
    assert!(result.fee >= result.estimated_vsize * 10 - 10);
}

#[tokio::test]
async fn test_build_then_decode_recovers_payload() {
    let coin = funding_tx(120_000, 7);
    let stub = Arc::new(funded_stub(&[&coin]));
    let config = test_config(1);
    let decoder = PayloadDecoder::from_config(&config).unwrap();
    let engine = StampEngine::new(config, stub).unwrap();

    let payload = json!({"p": "src-20", "op": "mint", "tick": "kevin", "amt": "69000"});
    let result = build(
        &engine,
        &request(Payload::Json(payload.clone()), true),
        &BuildOptions::default(),
    )
    .await
    .unwrap();

    let tx = parse_transaction_input(result.psbt_base64.as_ref().unwrap()).unwrap();
    let decoded = decoder
        .decode_transaction(&tx, EmbeddingStrategy::Multisig)
        .unwrap();
    assert_eq!(decoded.prefix, b"stamp:");
    assert_eq!(decoded.json, Some(payload));
}

#[tokio::test]
async fn test_witness_hash_file_build() {
    let coin = funding_tx(90_000, 8);
    let stub = Arc::new(funded_stub(&[&coin]));
    let config = test_config(1);
    let decoder = PayloadDecoder::from_config(&config).unwrap();
    let engine = StampEngine::new(config, stub).unwrap();

    let file: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    let options = BuildOptions {
        strategy: EmbeddingStrategy::WitnessHash,
        rbf: false,
        ..BuildOptions::default()
    };
    let result = build(&engine, &request(Payload::File(file.clone()), false), &options)
        .await
        .unwrap();
    let tx = psbt_of(&result).unsigned_tx;

    // 2 + 300 bytes in 32-byte programs
    assert_eq!(result.data_output_count, 10);
    for (i, out) in tx.output.iter().take(10).enumerate() {
        assert!(out.script_pubkey.is_p2wsh());
        assert_eq!(out.value.to_sat(), 420 + i as u64);
    }
    assert_eq!(tx.input[0].sequence, Sequence::MAX);

    let decoded = decoder
        .decode_transaction(&tx, EmbeddingStrategy::WitnessHash)
        .unwrap();
    assert!(decoded.prefix.is_empty());
    assert_eq!(decoded.body, file);
}

#[tokio::test]
async fn test_insufficient_funds_through_pipeline() {
    let coin = funding_tx(99_000, 9);
    let stub = Arc::new(funded_stub(&[&coin]));
    let mut config = test_config(1);
    config.service_fee.enabled = true;
    config.service_fee.address = RECIPIENT_ADDRESS.to_string();
    config.service_fee.amount_sats = 100_000;
    let engine = StampEngine::new(config, stub).unwrap();

    let err = build(
        &engine,
        &request(Payload::Json(json!({"p": "src-20"})), false),
        &BuildOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds { available: 99_000, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_service_fee_sits_between_data_and_change() {
    let coin = funding_tx(80_000, 10);
    let stub = Arc::new(funded_stub(&[&coin]));
    let mut config = test_config(1);
    config.service_fee.enabled = true;
    config.service_fee.address = RECIPIENT_ADDRESS.to_string();
    config.service_fee.amount_sats = 5_000;
    let engine = StampEngine::new(config, stub).unwrap();

    let result = build(
        &engine,
        &request(Payload::Json(json!({"p": "src-20", "op": "transfer"})), true),
        &BuildOptions::default(),
    )
    .await
    .unwrap();
    let tx = psbt_of(&result).unsigned_tx;

    let fee_index = 1 + result.data_output_count;
    assert_eq!(tx.output[fee_index].value.to_sat(), 5_000);
    assert_eq!(tx.output.len(), fee_index + 2);
    assert_eq!(result.dust_total, 789 + 809 * result.data_output_count as u64);
}

#[tokio::test]
async fn test_dry_run_skips_assembly() {
    let coin = funding_tx(60_000, 11);
    let stub = Arc::new(funded_stub(&[&coin]));
    let engine = StampEngine::new(test_config(1), stub.clone()).unwrap();

    let options = BuildOptions {
        dry_run: true,
        ..BuildOptions::default()
    };
    let result = build(
        &engine,
        &request(Payload::Json(json!({"p": "src-20", "op": "mint"})), true),
        &options,
    )
    .await
    .unwrap();

    assert!(result.unsigned_tx_hex.is_none());
    assert!(result.psbt_hex.is_none());
    assert!(result.psbt_base64.is_none());
    assert_eq!(result.inputs_to_sign.len(), 1);
    assert_eq!(result.input_value, result.output_value + result.fee);
    assert_eq!(stub.call_count(&raw_tx_url(1, &coin.compute_txid())), 0);
}

#[tokio::test]
async fn test_invalid_fee_rate_rejected_before_network() {
    let stub = Arc::new(funded_stub(&[]));
    let engine = StampEngine::new(AppConfig::default(), stub.clone()).unwrap();
    let mut request = request(Payload::Json(json!({"p": "src-20"})), false);
    request.fee_rate = 0.0;

    let err = build(&engine, &request, &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFeeRate(_)));
    assert!(stub.calls().is_empty());
}

fn tx_url(txid: &Txid) -> String {
    format!("{}/tx/{}", provider_base(1), txid)
}

/// Provider 1 serving a confirmed `fast` coin and an unconfirmed `slow` one
/// whose ancestor package pays 0.5 sat/vB
fn stub_with_slow_parent(slow: &Transaction, fast: &Transaction) -> Arc<StubTransport> {
    let stub = Arc::new(funded_stub(&[slow, fast]));
    stub.respond(
        utxos_url(1),
        200,
        json!([
            {"txid": slow.compute_txid().to_string(), "vout": 0, "value": 900_000,
             "status": {"confirmed": false}},
            {"txid": fast.compute_txid().to_string(), "vout": 0, "value": 100_000,
             "status": {"confirmed": true, "block_height": 850000}},
        ])
        .to_string(),
    );
    stub.respond(
        tx_url(&slow.compute_txid()),
        200,
        json!({
            "vin": [{"is_coinbase": false}],
            "vout": [{"scriptpubkey": FUNDING_SCRIPT, "value": 900_000}],
            "status": {"confirmed": false},
            "fee": 100,
            "weight": 800,
            "ancestor_fees": 100,
            "ancestor_size": 200,
            "effective_fee_rate": 0.5
        })
        .to_string(),
    );
    stub
}

#[tokio::test]
async fn test_low_rate_unconfirmed_coin_is_skipped() {
    let slow = funding_tx(900_000, 12);
    let fast = funding_tx(100_000, 13);
    let stub = stub_with_slow_parent(&slow, &fast);
    let engine = StampEngine::new(test_config(1), stub.clone()).unwrap();

    let result = build(
        &engine,
        &request(Payload::Json(json!({"p": "src-20", "op": "mint"})), true),
        &BuildOptions::default(),
    )
    .await
    .unwrap();
    let tx = psbt_of(&result).unsigned_tx;

    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output.txid, fast.compute_txid());
    assert_eq!(result.input_value, 100_000);
    assert_eq!(stub.call_count(&tx_url(&slow.compute_txid())), 1);
    assert_eq!(stub.call_count(&tx_url(&fast.compute_txid())), 0);
}

#[tokio::test]
async fn test_ancestor_lookup_skipped_when_disabled() {
    let slow = funding_tx(900_000, 14);
    let fast = funding_tx(100_000, 15);
    let stub = stub_with_slow_parent(&slow, &fast);
    let engine = StampEngine::new(test_config(1), stub.clone()).unwrap();

    let options = BuildOptions {
        use_ancestor_fees: false,
        ..BuildOptions::default()
    };
    let result = build(
        &engine,
        &request(Payload::Json(json!({"p": "src-20", "op": "mint"})), true),
        &options,
    )
    .await
    .unwrap();
    let tx = psbt_of(&result).unsigned_tx;

    assert_eq!(tx.input[0].previous_output.txid, slow.compute_txid());
    assert_eq!(stub.call_count(&tx_url(&slow.compute_txid())), 0);
}
