//! Durable sled driver
//!
//! Each tenant owns one tree named `tenant/<id>`. Only inserts create a
//! tree; reads against a tenant that never stored anything see an empty
//! tenant and leave the database untouched.

use std::ops::Bound;
use std::path::Path;

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use sled::Db;
use tracing::debug;

use super::{HealthStatus, PageOptions, RecordPage, StorageDriver, StorageHealth};
use crate::errors::{RecordError, RecordResult, StorageErrorCode};
use crate::record::Record;

const TENANT_TREE_PREFIX: &str = "tenant/";
const NONCE_LEN: usize = 12;

/// A sled-backed driver with one tree per tenant and optional AES-256-GCM
/// encryption of stored values.
///
/// Keys are record ids, so iteration order is id order and the pagination
/// cursor is simply the last id returned. Every write is flushed before the
/// call returns.
pub struct SledDriver {
    db: Db,
    encryption_key: Option<[u8; 32]>,
}

impl SledDriver {
    pub fn open<P: AsRef<Path>>(path: P, encryption_key: Option<[u8; 32]>) -> RecordResult<Self> {
        if encryption_key.is_some_and(|k| k.iter().all(|&b| b == 0)) {
            return Err(RecordError::config("Encryption key cannot be all zeros"));
        }
        let db = sled::open(path.as_ref()).map_err(|e| {
            RecordError::storage(
                StorageErrorCode::Unavailable,
                format!("Failed to open sled database at {}: {e}", path.as_ref().display()),
            )
        })?;
        Ok(Self { db, encryption_key })
    }

    /// Open the tenant's tree, creating it if needed. Write paths only.
    fn tree(&self, tenant_id: &str) -> RecordResult<sled::Tree> {
        Ok(self.db.open_tree(tree_name(tenant_id))?)
    }

    /// The tenant's tree if it already exists
    fn existing_tree(&self, tenant_id: &str) -> RecordResult<Option<sled::Tree>> {
        let name = tree_name(tenant_id);
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes());
        if !exists {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(name)?))
    }

    fn encode_value(&self, record: &Record) -> RecordResult<Vec<u8>> {
        let data = serde_json::to_vec(record).map_err(|e| {
            RecordError::storage(StorageErrorCode::Serialization, e.to_string())
        })?;
        match self.encryption_key {
            Some(key) => encrypt(&key, &data),
            None => Ok(data),
        }
    }

    fn decode_value(&self, bytes: &[u8]) -> RecordResult<Record> {
        let data = match self.encryption_key {
            Some(key) => decrypt(&key, bytes)?,
            None => bytes.to_vec(),
        };
        serde_json::from_slice(&data)
            .map_err(|e| RecordError::storage(StorageErrorCode::Corrupt, e.to_string()))
    }
}

fn tree_name(tenant_id: &str) -> String {
    format!("{TENANT_TREE_PREFIX}{tenant_id}")
}

fn encrypt(key: &[u8; 32], data: &[u8]) -> RecordResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| RecordError::storage(StorageErrorCode::Encryption, e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let encrypted = cipher
        .encrypt(Nonce::from_slice(&nonce), data)
        .map_err(|e| RecordError::storage(StorageErrorCode::Encryption, e.to_string()))?;

    let mut out = nonce.to_vec();
    out.extend_from_slice(&encrypted);
    Ok(out)
}

fn decrypt(key: &[u8; 32], bytes: &[u8]) -> RecordResult<Vec<u8>> {
    if bytes.len() < NONCE_LEN {
        return Err(RecordError::storage(
            StorageErrorCode::Corrupt,
            "Invalid encrypted data format",
        ));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| RecordError::storage(StorageErrorCode::Encryption, e.to_string()))?;
    let (nonce, data) = bytes.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), data)
        .map_err(|e| RecordError::storage(StorageErrorCode::Encryption, format!("Decryption failed: {e}")))
}

#[async_trait]
impl StorageDriver for SledDriver {
    async fn set_record(
        &self,
        tenant_id: &str,
        id: &str,
        _auth_hash: &str,
        record: &Record,
    ) -> RecordResult<()> {
        let value = self.encode_value(record)?;
        let tree = self.tree(tenant_id)?;
        // insert-if-absent
        if tree
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Err(RecordError::conflict(id));
        }
        tree.flush_async().await?;
        debug!(tenant_id, id, "sled record written");
        Ok(())
    }

    async fn get_record(
        &self,
        tenant_id: &str,
        id: &str,
        auth_hash: &str,
    ) -> RecordResult<Option<Record>> {
        Ok(self
            .find_record(tenant_id, id)
            .await?
            .filter(|r| r.auth_hash == auth_hash))
    }

    async fn all_records(&self, tenant_id: &str, page: &PageOptions) -> RecordResult<RecordPage> {
        let Some(tree) = self.existing_tree(tenant_id)? else {
            return Ok(RecordPage::default());
        };
        let iter = match page.cursor.as_deref() {
            Some(cursor) => {
                tree.range::<&[u8], _>((Bound::Excluded(cursor.as_bytes()), Bound::Unbounded))
            }
            None => tree.iter(),
        };

        let records = iter
            .map(|item| {
                let (_, value) = item?;
                self.decode_value(&value)
            })
            .filter(|item| match (item, page.filter.as_ref()) {
                (Ok(record), Some(filter)) => filter.matches(record),
                _ => true,
            });

        RecordPage::collect_from(records, page.limit)
    }

    async fn delete_record(&self, tenant_id: &str, id: &str, auth_hash: &str) -> RecordResult<()> {
        let tree = self
            .existing_tree(tenant_id)?
            .ok_or_else(|| RecordError::record_not_found(tenant_id, id))?;
        let current = tree
            .get(id.as_bytes())?
            .ok_or_else(|| RecordError::record_not_found(tenant_id, id))?;
        if self.decode_value(&current)?.auth_hash != auth_hash {
            return Err(RecordError::record_not_found(tenant_id, id));
        }
        // remove only the exact value we checked
        if tree
            .compare_and_swap(id.as_bytes(), Some(&current[..]), None as Option<&[u8]>)?
            .is_err()
        {
            return Err(RecordError::record_not_found(tenant_id, id));
        }
        tree.flush_async().await?;
        Ok(())
    }

    async fn count_records(&self, tenant_id: &str) -> RecordResult<u64> {
        Ok(self
            .existing_tree(tenant_id)?
            .map_or(0, |tree| tree.len() as u64))
    }

    async fn health(&self) -> StorageHealth {
        let (status, detail) = match self.db.size_on_disk() {
            Ok(bytes) => (HealthStatus::Healthy, Some(format!("size_on_disk={bytes}"))),
            Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
        };
        StorageHealth {
            status,
            driver: "sled".to_string(),
            detail,
        }
    }

    async fn find_record(&self, tenant_id: &str, id: &str) -> RecordResult<Option<Record>> {
        let Some(tree) = self.existing_tree(tenant_id)? else {
            return Ok(None);
        };
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode_value(&bytes)?)),
            None => Ok(None),
        }
    }
}
