//! Layered configuration for the record store
//!
//! Defaults, then an optional TOML file, then `SIGIL_STORE_`-prefixed
//! environment variables (`__` separates nested keys, e.g.
//! `SIGIL_STORE_ENGINE__DEFAULT_TENANT`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{RecordError, RecordResult};
use crate::signer::{decode_key_b64, Ed25519Signer, Signer};
use crate::storage::{MemoryDriver, SledDriver, StorageDriver};

pub const DEFAULT_CONFIG_FILE: &str = "sigil_store.toml";
pub const ENV_PREFIX: &str = "SIGIL_STORE_";

/// Engine options, resolved once at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on the canonical payload size, in bytes
    pub max_record_size: usize,
    pub default_tenant: String,
    /// When false, records carry an empty fingerprint
    pub enable_fingerprint: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_record_size: 1_048_576,
            default_tenant: "public".to_string(),
            enable_fingerprint: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> RecordResult<()> {
        if self.max_record_size == 0 {
            return Err(RecordError::config("max_record_size must be greater than zero"));
        }
        if self.default_tenant.trim().is_empty() {
            return Err(RecordError::config("default_tenant cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    /// Base64 AES-256 key; sled values are encrypted when set
    pub encryption_key_b64: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("sigil_data"),
            encryption_key_b64: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Encrypted Ed25519 key file; created on first use
    pub key_file: Option<PathBuf>,
    pub key_encryption_key_b64: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub signing: SigningConfig,
}

/// The provider stack used by [`load_config`]
pub fn provider_stack(path: Option<&Path>) -> Figment {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(StoreConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

pub fn load_config(path: Option<&Path>) -> RecordResult<StoreConfig> {
    extract(provider_stack(path))
}

/// Extract and validate a config from any provider stack
pub fn extract(figment: Figment) -> RecordResult<StoreConfig> {
    let config: StoreConfig = figment
        .extract()
        .map_err(|e| RecordError::config(e.to_string()))?;
    config.engine.validate()?;
    Ok(config)
}

pub fn open_driver(config: &StorageConfig) -> RecordResult<Arc<dyn StorageDriver>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDriver::new())),
        StorageBackend::Sled => {
            let key = config
                .encryption_key_b64
                .as_deref()
                .map(decode_key_b64)
                .transpose()?;
            info!(
                data_dir = %config.data_dir.display(),
                encrypted = key.is_some(),
                "opening sled record store"
            );
            Ok(Arc::new(SledDriver::open(&config.data_dir, key)?))
        }
    }
}

pub fn load_signer(config: &SigningConfig) -> RecordResult<Arc<dyn Signer>> {
    let Some(path) = config.key_file.as_deref() else {
        warn!("no signing key file configured, using an ephemeral key");
        return Ok(Arc::new(Ed25519Signer::generate()));
    };
    let kek_b64 = config.key_encryption_key_b64.as_deref().ok_or_else(|| {
        RecordError::config("key_encryption_key_b64 is required when key_file is set")
    })?;
    let kek = decode_key_b64(kek_b64)?;

    if path.exists() {
        Ok(Arc::new(Ed25519Signer::load_encrypted(path, &kek)?))
    } else {
        let signer = Ed25519Signer::generate();
        signer.save_encrypted(path, &kek)?;
        info!(key_file = %path.display(), "generated new signing key");
        Ok(Arc::new(signer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.engine.max_record_size, 1_048_576);
        assert_eq!(config.engine.default_tenant, "public");
        assert!(config.engine.enable_fingerprint);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [engine]
            default_tenant = "acme"
            enable_fingerprint = false

            [storage]
            backend = "sled"
            data_dir = "/var/lib/sigil"
        "#;
        let config = extract(
            Figment::from(Serialized::defaults(StoreConfig::default())).merge(Toml::string(toml)),
        )
        .expect("config");

        assert_eq!(config.engine.default_tenant, "acme");
        assert!(!config.engine.enable_fingerprint);
        assert_eq!(config.engine.max_record_size, 1_048_576);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/sigil"));
    }

    #[test]
    fn test_empty_default_tenant_rejected() {
        let err = extract(
            Figment::from(Serialized::defaults(StoreConfig::default()))
                .merge(Serialized::default("engine.default_tenant", "  ")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_tenant"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let config = extract(
            Figment::from(Serialized::defaults(StoreConfig::default()))
                .merge(Toml::file(dir.path().join("absent.toml"))),
        )
        .expect("config");
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_key_file_requires_kek() {
        let config = SigningConfig {
            key_file: Some(PathBuf::from("/nonexistent/key.json")),
            key_encryption_key_b64: None,
        };
        assert!(matches!(load_signer(&config), Err(RecordError::Config { .. })));
    }
}
