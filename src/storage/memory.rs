//! In-memory reference driver
//!
//! Single `RwLock` over a per-tenant ordered map. Writers are serialized by
//! the lock, so concurrent encodes cannot corrupt the map. Nothing survives
//! the process; use [`super::SledDriver`] for durability.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{HealthStatus, PageOptions, RecordPage, StorageDriver, StorageHealth};
use crate::errors::{RecordError, RecordResult, SafeReadLock, SafeWriteLock, StorageErrorCode};
use crate::record::Record;

type TenantMap = HashMap<String, BTreeMap<String, Record>>;

#[derive(Debug, Default)]
pub struct MemoryDriver {
    tenants: RwLock<TenantMap>,
    offline: AtomicBool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Storage{Unavailable}`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> RecordResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RecordError::storage(
                StorageErrorCode::Unavailable,
                "memory driver is offline",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn set_record(
        &self,
        tenant_id: &str,
        id: &str,
        _auth_hash: &str,
        record: &Record,
    ) -> RecordResult<()> {
        self.ensure_online()?;
        let mut tenants = self.tenants.safe_write()?;
        let records = tenants.entry(tenant_id.to_string()).or_default();
        if records.contains_key(id) {
            return Err(RecordError::conflict(id));
        }
        records.insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn get_record(
        &self,
        tenant_id: &str,
        id: &str,
        auth_hash: &str,
    ) -> RecordResult<Option<Record>> {
        self.ensure_online()?;
        let tenants = self.tenants.safe_read()?;
        Ok(tenants
            .get(tenant_id)
            .and_then(|records| records.get(id))
            .filter(|r| r.auth_hash == auth_hash)
            .cloned())
    }

    async fn all_records(&self, tenant_id: &str, page: &PageOptions) -> RecordResult<RecordPage> {
        self.ensure_online()?;
        let tenants = self.tenants.safe_read()?;
        let Some(records) = tenants.get(tenant_id) else {
            return Ok(RecordPage::default());
        };

        let lower = match page.cursor.as_deref() {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };
        let iter = records
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, r)| r)
            .filter(|r| page.filter.as_ref().map_or(true, |f| f.matches(r)))
            .map(|r| Ok(r.clone()));

        RecordPage::collect_from(iter, page.limit)
    }

    async fn delete_record(&self, tenant_id: &str, id: &str, auth_hash: &str) -> RecordResult<()> {
        self.ensure_online()?;
        let mut tenants = self.tenants.safe_write()?;
        let records = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| RecordError::record_not_found(tenant_id, id))?;
        if !records.get(id).is_some_and(|r| r.auth_hash == auth_hash) {
            return Err(RecordError::record_not_found(tenant_id, id));
        }
        records.remove(id);
        Ok(())
    }

    async fn count_records(&self, tenant_id: &str) -> RecordResult<u64> {
        self.ensure_online()?;
        let tenants = self.tenants.safe_read()?;
        Ok(tenants.get(tenant_id).map_or(0, |r| r.len() as u64))
    }

    async fn health(&self) -> StorageHealth {
        let (status, detail) = if self.offline.load(Ordering::SeqCst) {
            (HealthStatus::Unavailable, Some("offline".to_string()))
        } else if self.tenants.safe_read().is_err() {
            (HealthStatus::Degraded, Some("lock poisoned".to_string()))
        } else {
            (HealthStatus::Healthy, None)
        };
        StorageHealth {
            status,
            driver: "memory".to_string(),
            detail,
        }
    }

    async fn find_record(&self, tenant_id: &str, id: &str) -> RecordResult<Option<Record>> {
        self.ensure_online()?;
        let tenants = self.tenants.safe_read()?;
        Ok(tenants.get(tenant_id).and_then(|r| r.get(id)).cloned())
    }
}
