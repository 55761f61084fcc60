//! Tenant-aware persistence contract
//!
//! The engine holds no state of its own; every durable effect goes through a
//! [`StorageDriver`]. Drivers scope every call by tenant and must never let
//! one tenant observe another's records.

pub mod memory;
pub mod sled_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RecordResult;
use crate::record::Record;

pub use memory::MemoryDriver;
pub use sled_store::SledDriver;

/// Predicate applied by drivers while enumerating a tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Top-level payload fields that must equal the given values
    pub payload_equals: Option<serde_json::Map<String, Value>>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if self.created_after.is_some_and(|t| record.timestamp <= t) {
            return false;
        }
        if self.created_before.is_some_and(|t| record.timestamp >= t) {
            return false;
        }
        if let Some(expected) = &self.payload_equals {
            return expected
                .iter()
                .all(|(k, v)| record.payload.get(k) == Some(v));
        }
        true
    }
}

/// Pagination for [`StorageDriver::all_records`].
///
/// Records are returned in ascending id order; `cursor` is the last id of
/// the previous page and is exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOptions {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub filter: Option<RecordFilter>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<Record>,
    /// Id to pass as `cursor` for the next page, when one exists
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl RecordPage {
    /// Cut an id-ordered, already filtered iterator down to one page
    pub fn collect_from<I>(iter: I, limit: Option<usize>) -> RecordResult<Self>
    where
        I: Iterator<Item = RecordResult<Record>>,
    {
        let mut records = Vec::new();
        let mut has_more = false;
        for item in iter {
            let record = item?;
            if limit.is_some_and(|l| records.len() >= l) {
                has_more = true;
                break;
            }
            records.push(record);
        }
        let next_cursor = if has_more {
            records.last().map(|r| r.id.clone())
        } else {
            None
        };
        Ok(Self {
            records,
            next_cursor,
            has_more,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub status: HealthStatus,
    pub driver: String,
    pub detail: Option<String>,
}

/// Capability set every persistence backend provides
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Durably insert a new record. Fails with `Conflict` if the id exists.
    async fn set_record(
        &self,
        tenant_id: &str,
        id: &str,
        auth_hash: &str,
        record: &Record,
    ) -> RecordResult<()>;

    /// Point lookup requiring both keys; `None` when the pair does not match
    async fn get_record(
        &self,
        tenant_id: &str,
        id: &str,
        auth_hash: &str,
    ) -> RecordResult<Option<Record>>;

    async fn all_records(&self, tenant_id: &str, page: &PageOptions) -> RecordResult<RecordPage>;

    /// Remove the record only when both id and auth hash match, else `NotFound`
    async fn delete_record(&self, tenant_id: &str, id: &str, auth_hash: &str) -> RecordResult<()>;

    async fn count_records(&self, tenant_id: &str) -> RecordResult<u64>;

    async fn health(&self) -> StorageHealth;

    /// Lookup by id alone. The default scans the tenant; drivers with an
    /// index should override it.
    async fn find_record(&self, tenant_id: &str, id: &str) -> RecordResult<Option<Record>> {
        let page = self.all_records(tenant_id, &PageOptions::default()).await?;
        Ok(page.records.into_iter().find(|r| r.id == id))
    }
}
