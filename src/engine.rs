//! Record engine
//!
//! Orchestrates encode / decode / verify / revoke / list on top of an
//! injected [`StorageDriver`] and [`Signer`]. The engine keeps no mutable
//! state of its own, so it can be shared freely behind an `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditEvent, LogLevel};
use crate::canonicalize::canonicalize_json;
use crate::config::{self, EngineConfig, StoreConfig};
use crate::errors::{RecordError, RecordResult, StorageErrorCode};
use crate::fingerprint;
use crate::record::{
    generate_record_id, Record, RecordContext, RecordSummary, UnsignedRecord, RECORD_VERSION,
};
use crate::signer::Signer;
use crate::storage::{HealthStatus, PageOptions, RecordFilter, StorageDriver, StorageHealth};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const DEFAULT_REVOKE_REASON: &str = "Manual revocation";
pub const ENGINE_NAME: &str = "unified";

/// Id generation attempts before a `Conflict` is surfaced
const MAX_ID_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub tenant_id: Option<String>,
    pub context: Option<RecordContext>,
}

impl EncodeOptions {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: RecordContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Options for decode and verify
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub tenant_id: Option<String>,
}

impl ReadOptions {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevokeOptions {
    pub tenant_id: Option<String>,
    pub reason: Option<String>,
}

impl RevokeOptions {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub filter: Option<RecordFilter>,
}

impl ListOptions {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeMetadata {
    pub tenant_id: String,
    pub encoded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodeResult {
    pub success: bool,
    pub record: Record,
    pub metadata: EncodeMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeResult {
    pub success: bool,
    pub payload: Value,
    pub context: RecordContext,
    pub metadata: DecodeMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResult {
    pub success: bool,
    pub revoked_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: usize,
    /// Cursor the page was requested with
    pub cursor: Option<String>,
    pub next_cursor: Option<String>,
    /// Exact: true only when another record follows this page
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub records: Vec<RecordSummary>,
    pub total: u64,
    pub tenant_id: String,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledFeatures {
    pub fingerprint: bool,
    pub max_record_size: usize,
    pub default_tenant: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: EngineStatus,
    pub engine: &'static str,
    pub storage: StorageHealth,
    pub config: EnabledFeatures,
    pub timestamp: DateTime<Utc>,
}

pub struct RecordEngine {
    config: EngineConfig,
    storage: Arc<dyn StorageDriver>,
    signer: Arc<dyn Signer>,
}

impl RecordEngine {
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn StorageDriver>,
        signer: Arc<dyn Signer>,
    ) -> RecordResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            signer,
        })
    }

    /// Build the configured driver and signer, then the engine
    pub fn from_config(config: &StoreConfig) -> RecordResult<Self> {
        let storage = config::open_driver(&config.storage)?;
        let signer = config::load_signer(&config.signing)?;
        Self::new(config.engine.clone(), storage, signer)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create, sign and persist a new record
    pub async fn encode(&self, payload: Value, options: EncodeOptions) -> RecordResult<EncodeResult> {
        let tenant_id = self.resolve_tenant(options.tenant_id.as_deref())?;
        match &payload {
            Value::Object(map) if !map.is_empty() => {}
            _ => {
                return Err(RecordError::invalid_input(
                    "payload",
                    "must be a non-empty object",
                ))
            }
        }

        let canonical = canonicalize_json(&payload)?;
        if canonical.len() > self.config.max_record_size {
            return Err(RecordError::invalid_input(
                "payload",
                format!(
                    "serialized size {} exceeds max_record_size {}",
                    canonical.len(),
                    self.config.max_record_size
                ),
            ));
        }

        let context = options.context.unwrap_or_default();
        context.validate()?;
        let fingerprint = if self.config.enable_fingerprint {
            fingerprint::from_serialized(&canonical, &context)
        } else {
            Vec::new()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let timestamp = Utc::now();
            let unsigned = UnsignedRecord {
                id: generate_record_id(timestamp),
                payload: payload.clone(),
                context,
                fingerprint: fingerprint.clone(),
                timestamp,
                version: RECORD_VERSION.to_string(),
            };
            let signature = self.signer.sign(&unsigned)?;
            let record = unsigned.into_signed(signature);

            match self
                .storage
                .set_record(&tenant_id, &record.id, &record.auth_hash, &record)
                .await
            {
                Ok(()) => {
                    info!(tenant_id = %tenant_id, id = %record.id, "record encoded");
                    AuditEvent::new(&tenant_id, AuditAction::RecordEncoded, &record.id).emit();
                    return Ok(EncodeResult {
                        success: true,
                        metadata: EncodeMetadata {
                            tenant_id,
                            encoded_at: record.timestamp,
                        },
                        record,
                    });
                }
                Err(RecordError::Conflict { id }) if attempt < MAX_ID_ATTEMPTS => {
                    warn!(tenant_id = %tenant_id, id = %id, attempt, "record id collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch a record's payload and context by id
    pub async fn decode(&self, id: &str, options: ReadOptions) -> RecordResult<DecodeResult> {
        let tenant_id = self.resolve_tenant(options.tenant_id.as_deref())?;
        require_id(id)?;

        let record = self.load_verified(&tenant_id, id).await?;
        debug!(tenant_id = %tenant_id, id, "record decoded");
        Ok(DecodeResult {
            success: true,
            payload: record.payload,
            context: record.context,
            metadata: DecodeMetadata {
                id: record.id,
                timestamp: record.timestamp,
                tenant_id,
            },
        })
    }

    /// Check a signature through the signer.
    ///
    /// A record's signature covers its whole unsigned form (id, payload,
    /// context, fingerprint, timestamp, version), not the payload alone. To
    /// check a stored record, pass `serde_json::to_value(record.unsigned())`
    /// with `record.signature`; passing only `record.payload` yields
    /// `valid: false`.
    ///
    /// Only missing inputs are errors; a bad signature, or a signer that
    /// fails, yields `valid: false`.
    pub async fn verify(
        &self,
        payload: &Value,
        signature: Option<&str>,
        options: ReadOptions,
    ) -> RecordResult<VerifyResult> {
        let tenant_id = self.resolve_tenant(options.tenant_id.as_deref())?;
        if payload.is_null() {
            return Err(RecordError::invalid_input("payload", "is required"));
        }
        let signature =
            signature.ok_or_else(|| RecordError::invalid_input("signature", "is required"))?;

        let (valid, error) = match self.signer.verify(payload, signature) {
            Ok(valid) => (valid, None),
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "signer failed during verification");
                (false, Some(e.to_string()))
            }
        };
        Ok(VerifyResult {
            valid,
            error,
            timestamp: Utc::now(),
            tenant_id,
        })
    }

    /// Delete a record, keyed by its id and stored authHash
    pub async fn revoke(&self, id: &str, options: RevokeOptions) -> RecordResult<RevokeResult> {
        let tenant_id = self.resolve_tenant(options.tenant_id.as_deref())?;
        require_id(id)?;
        let reason = options
            .reason
            .unwrap_or_else(|| DEFAULT_REVOKE_REASON.to_string());

        let record = self.load_verified(&tenant_id, id).await?;
        self.storage
            .delete_record(&tenant_id, &record.id, &record.auth_hash)
            .await?;

        info!(tenant_id = %tenant_id, id, reason = %reason, "record revoked");
        AuditEvent::new(&tenant_id, AuditAction::RecordRevoked, id)
            .with_context(reason.clone())
            .emit();
        Ok(RevokeResult {
            success: true,
            revoked_id: id.to_string(),
            reason,
            timestamp: Utc::now(),
            tenant_id,
        })
    }

    /// Page through a tenant's records in id order
    pub async fn list(&self, options: ListOptions) -> RecordResult<ListResult> {
        let tenant_id = self.resolve_tenant(options.tenant_id.as_deref())?;
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if limit == 0 {
            return Err(RecordError::invalid_input("limit", "must be greater than zero"));
        }

        let page = self
            .storage
            .all_records(
                &tenant_id,
                &PageOptions {
                    limit: Some(limit),
                    cursor: options.cursor.clone(),
                    filter: options.filter,
                },
            )
            .await?;
        let total = self.storage.count_records(&tenant_id).await?;

        let records = page
            .records
            .iter()
            .map(|r| self.check_integrity(&tenant_id, r).map(|_| r.summary()))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(ListResult {
            records,
            total,
            tenant_id,
            pagination: Pagination {
                limit,
                cursor: options.cursor,
                next_cursor: page.next_cursor,
                has_more: page.has_more,
            },
        })
    }

    pub async fn health(&self) -> HealthReport {
        let storage = self.storage.health().await;
        let status = if storage.status == HealthStatus::Healthy {
            EngineStatus::Healthy
        } else {
            EngineStatus::Degraded
        };
        HealthReport {
            status,
            engine: ENGINE_NAME,
            storage,
            config: EnabledFeatures {
                fingerprint: self.config.enable_fingerprint,
                max_record_size: self.config.max_record_size,
                default_tenant: self.config.default_tenant.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    fn resolve_tenant(&self, tenant_id: Option<&str>) -> RecordResult<String> {
        match tenant_id {
            None => Ok(self.config.default_tenant.clone()),
            Some(t) if t.trim().is_empty() => {
                Err(RecordError::invalid_input("tenantId", "cannot be empty"))
            }
            Some(t) => Ok(t.to_string()),
        }
    }

    async fn load_verified(&self, tenant_id: &str, id: &str) -> RecordResult<Record> {
        let record = self
            .storage
            .find_record(tenant_id, id)
            .await?
            .ok_or_else(|| RecordError::record_not_found(tenant_id, id))?;
        self.check_integrity(tenant_id, &record)?;
        Ok(record)
    }

    fn check_integrity(&self, tenant_id: &str, record: &Record) -> RecordResult<()> {
        if record.has_valid_auth_hash() {
            return Ok(());
        }
        AuditEvent::new(tenant_id, AuditAction::CorruptRecordRejected, &record.id)
            .with_severity(LogLevel::Warn)
            .emit();
        Err(RecordError::storage(
            StorageErrorCode::Corrupt,
            format!("authHash mismatch for record {}", record.id),
        ))
    }
}

fn require_id(id: &str) -> RecordResult<()> {
    if id.trim().is_empty() {
        return Err(RecordError::invalid_input("id", "is required"));
    }
    Ok(())
}
