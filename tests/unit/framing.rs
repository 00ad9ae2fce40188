use bitcoin::hashes::Hash;
use bitcoin::Txid;
use serde_json::{json, Value};
use stamp_tx_engine::crypto::arc4;
use stamp_tx_engine::encoding::{
    compression, frame, unframe, EmbeddingStrategy, Payload, PayloadEncoding, MAX_FRAME_CONTENT,
};
use stamp_tx_engine::errors::AppError;

fn deploy(description_len: usize) -> Value {
    json!({
        "p": "src-20",
        "op": "deploy",
        "tick": "stamp",
        "max": "100000000",
        "lim": "1000",
        "description": "a".repeat(description_len),
    })
}

#[test]
fn test_payload_survives_frame_and_obfuscation() {
    let key = arc4::obfuscation_key(&Txid::from_byte_array([0xab; 32]));

    for description_len in [0usize, 10, 61, 62, 500, 4000] {
        for encoding in [PayloadEncoding::Json, PayloadEncoding::CompressedMsgpack] {
            let value = deploy(description_len);
            let (prefix, body) = Payload::Json(value.clone())
                .to_parts("stamp:", encoding)
                .unwrap();
            let framed = frame(&prefix, &body, EmbeddingStrategy::Multisig.chunk_size()).unwrap();
            assert_eq!(framed.len() % 62, 0);

            let obfuscated = arc4::obfuscate(&framed, &key).unwrap();
            let content = unframe(&arc4::deobfuscate(&obfuscated, &key).unwrap()).unwrap();
            let body = content.strip_prefix(b"stamp:".as_slice()).unwrap();

            let decoded = serde_json::from_slice::<Value>(body)
                .ok()
                .or_else(|| compression::decompress(body))
                .unwrap();
            assert_eq!(decoded, value, "encoding {:?} len {}", encoding, description_len);
        }
    }
}

#[test]
fn test_compressed_encoding_only_when_smaller() {
    let small = json!({"a": 1});
    let (_, body) = Payload::Json(small.clone())
        .to_parts("stamp:", PayloadEncoding::CompressedMsgpack)
        .unwrap();
    assert_eq!(body, serde_json::to_vec(&small).unwrap());

    let repetitive = deploy(4000);
    let (_, body) = Payload::Json(repetitive.clone())
        .to_parts("stamp:", PayloadEncoding::CompressedMsgpack)
        .unwrap();
    assert!(body.len() < serde_json::to_vec(&repetitive).unwrap().len());
    assert_eq!(compression::decompress(&body), Some(repetitive));
}

#[test]
fn test_largest_payload_fits_and_one_more_byte_does_not() {
    let body = vec![0x55u8; MAX_FRAME_CONTENT - 6];
    let framed = frame(b"stamp:", &body, 62).unwrap();
    assert_eq!(framed.len(), (MAX_FRAME_CONTENT + 2).div_ceil(62) * 62);

    let err = frame(b"stamp:", &[body, vec![0x55]].concat(), 62).unwrap_err();
    assert!(matches!(err, AppError::PayloadTooLarge { size: 65_536, .. }));
}

#[test]
fn test_file_payloads_need_witness_hash() {
    let file = Payload::File(vec![0x89, 0x50, 0x4e, 0x47]);
    assert!(file.check_strategy(EmbeddingStrategy::Multisig).is_err());
    assert!(file.check_strategy(EmbeddingStrategy::WitnessHash).is_ok());
    assert!(Payload::File(Vec::new())
        .check_strategy(EmbeddingStrategy::WitnessHash)
        .is_err());

    let (prefix, body) = file.to_parts("stamp:", PayloadEncoding::Json).unwrap();
    assert!(prefix.is_empty());
    assert_eq!(body, vec![0x89, 0x50, 0x4e, 0x47]);
}
