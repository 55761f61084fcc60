//! Record write/reopen/verify round-trip against the sled driver

use std::sync::Arc;

use serde_json::json;
use sigil_record_store::{
    config::EngineConfig, EncodeOptions, Ed25519Signer, ListOptions, ReadOptions, RecordContext,
    RecordEngine, RevokeOptions, SledDriver, StorageDriver,
};
use tempfile::TempDir;

fn engine_at(dir: &TempDir, key: Option<[u8; 32]>, signer: Arc<Ed25519Signer>) -> RecordEngine {
    let driver = SledDriver::open(dir.path(), key).expect("sled driver");
    RecordEngine::new(EngineConfig::default(), Arc::new(driver), signer).expect("engine")
}

#[tokio::test]
async fn sled_roundtrip_survives_reopen() {
    let tmp = TempDir::new().expect("tmp dir");
    let signer = Arc::new(Ed25519Signer::generate());
    let key = Some([42u8; 32]);

    let record = {
        let engine = engine_at(&tmp, key, signer.clone());
        engine
            .encode(json!({"msg": "hello"}), EncodeOptions::for_tenant("t1"))
            .await
            .expect("encode")
            .record
    };

    let engine = engine_at(&tmp, key, signer.clone());
    let decoded = engine
        .decode(&record.id, ReadOptions::for_tenant("t1"))
        .await
        .expect("decode after reopen");
    assert_eq!(decoded.payload, json!({"msg": "hello"}));

    let signed = serde_json::to_value(record.unsigned()).expect("unsigned");
    let verdict = engine
        .verify(&signed, Some(record.signature.as_str()), ReadOptions::for_tenant("t1"))
        .await
        .expect("verify");
    assert!(verdict.valid);
}

#[tokio::test]
async fn sled_delete_requires_matching_auth_hash() {
    let tmp = TempDir::new().expect("tmp dir");
    let driver = Arc::new(SledDriver::open(tmp.path(), None).expect("sled driver"));
    let engine = RecordEngine::new(
        EngineConfig::default(),
        driver.clone(),
        Arc::new(Ed25519Signer::generate()),
    )
    .expect("engine");

    let record = engine
        .encode(json!({"a": 1}), EncodeOptions::for_tenant("t1"))
        .await
        .expect("encode")
        .record;

    let err = driver
        .delete_record("t1", &record.id, "ffffffffffffffff")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(driver
        .get_record("t1", &record.id, &record.auth_hash)
        .await
        .expect("get")
        .is_some());

    engine
        .revoke(&record.id, RevokeOptions::for_tenant("t1"))
        .await
        .expect("revoke");
    assert!(engine
        .decode(&record.id, ReadOptions::for_tenant("t1"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn sled_tenants_are_isolated_and_paginated() {
    let tmp = TempDir::new().expect("tmp dir");
    let engine = engine_at(&tmp, None, Arc::new(Ed25519Signer::generate()));

    for i in 0..5 {
        engine
            .encode(json!({"i": i}), EncodeOptions::for_tenant("a"))
            .await
            .expect("encode");
    }
    let foreign = engine
        .encode(json!({"i": 99}), EncodeOptions::for_tenant("b"))
        .await
        .expect("encode")
        .record;

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = engine
            .list(ListOptions {
                tenant_id: Some("a".to_string()),
                limit: Some(2),
                cursor: cursor.clone(),
                filter: None,
            })
            .await
            .expect("list");
        assert_eq!(page.total, 5);
        seen.extend(page.records.into_iter().map(|r| r.id));
        if !page.pagination.has_more {
            break;
        }
        cursor = page.pagination.next_cursor;
    }

    assert_eq!(seen.len(), 5);
    assert!(!seen.contains(&foreign.id));
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
}

#[tokio::test]
async fn sled_health_is_healthy() {
    let tmp = TempDir::new().expect("tmp dir");
    let engine = engine_at(&tmp, None, Arc::new(Ed25519Signer::generate()));
    let report = engine.health().await;
    assert_eq!(report.storage.driver, "sled");
    let value = serde_json::to_value(&report).expect("serialize");
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["engine"], "unified");
}

#[tokio::test]
async fn sled_preserves_floats_exactly() {
    let tmp = TempDir::new().expect("tmp dir");
    let driver = Arc::new(SledDriver::open(tmp.path(), Some([3u8; 32])).expect("sled driver"));
    let engine = RecordEngine::new(
        EngineConfig::default(),
        driver.clone(),
        Arc::new(Ed25519Signer::generate()),
    )
    .expect("engine");

    for i in 1..=60u32 {
        let x = f64::from(i);
        let payload = json!({
            "third": x / 3.0,
            "root": x.sqrt(),
            "tiny": 1.0 / (x * 7919.0),
            "huge": x * 1.234_567_890_123e21,
            "series": [x * 0.1, x * 0.7, std::f64::consts::PI / x],
        });
        let context = RecordContext {
            field1: 1.0 + x / 7.0,
            field2: 0.1 * x.sin(),
            field3: 1.0 / 3.0,
        };
        let record = engine
            .encode(payload.clone(), EncodeOptions::for_tenant("floats").with_context(context))
            .await
            .expect("encode")
            .record;

        let decoded = engine
            .decode(&record.id, ReadOptions::for_tenant("floats"))
            .await
            .expect("decode");
        assert_eq!(decoded.payload, payload, "payload drifted for i={i}");
        assert_eq!(decoded.context, context);

        let stored = driver
            .find_record("floats", &record.id)
            .await
            .expect("find")
            .expect("stored record");
        assert_eq!(stored, record, "stored record drifted for i={i}");

        let signed = serde_json::to_value(stored.unsigned()).expect("unsigned");
        let verdict = engine
            .verify(&signed, Some(stored.signature.as_str()), ReadOptions::for_tenant("floats"))
            .await
            .expect("verify");
        assert!(verdict.valid, "stored record no longer verifies for i={i}");
    }
}
