//! Building an engine from layered configuration

use std::path::Path;

use serde_json::json;
use sigil_record_store::{
    config::{self, StorageBackend},
    EncodeOptions, ReadOptions, RecordEngine,
};
use tempfile::TempDir;

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("sigil_store.toml");
    std::fs::write(&path, body).expect("write config");
    path
}

#[tokio::test]
async fn sled_engine_with_persistent_signing_key() {
    let tmp = TempDir::new().expect("tmp dir");
    let kek = "KioqKioqKioqKioqKioqKioqKioqKioqKioqKioqKio=";
    let toml = format!(
        r#"
        [engine]
        default_tenant = "acme"

        [storage]
        backend = "sled"
        data_dir = "{data}"
        encryption_key_b64 = "{kek}"

        [signing]
        key_file = "{key}"
        key_encryption_key_b64 = "{kek}"
        "#,
        data = tmp.path().join("data").display(),
        key = tmp.path().join("signing_key.json").display(),
    );
    let path = write_config(tmp.path(), &toml);

    let cfg = config::load_config(Some(&path)).expect("config");
    assert_eq!(cfg.storage.backend, StorageBackend::Sled);
    assert_eq!(cfg.engine.default_tenant, "acme");

    let record = {
        let engine = RecordEngine::from_config(&cfg).expect("engine");
        engine
            .encode(json!({"msg": "persisted"}), EncodeOptions::default())
            .await
            .expect("encode")
            .record
    };
    assert!(tmp.path().join("signing_key.json").exists());

    // reopening picks up the same key and the same data
    let engine = RecordEngine::from_config(&cfg).expect("engine");
    let decoded = engine
        .decode(&record.id, ReadOptions::default())
        .await
        .expect("decode");
    assert_eq!(decoded.metadata.tenant_id, "acme");

    let signed = serde_json::to_value(record.unsigned()).expect("unsigned");
    let verdict = engine
        .verify(&signed, Some(record.signature.as_str()), ReadOptions::default())
        .await
        .expect("verify");
    assert!(verdict.valid);
}

#[test]
fn invalid_engine_config_fails_fast() {
    let tmp = TempDir::new().expect("tmp dir");
    let path = write_config(tmp.path(), "[engine]\nmax_record_size = 0\n");
    let err = config::load_config(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("max_record_size"));
}
