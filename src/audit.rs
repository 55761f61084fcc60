//! Audit trail for record lifecycle changes
//!
//! Events are emitted through tracing under the `sigil_record_store::audit`
//! target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "sigil_record_store::audit";

/// Severity levels for structured log classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RecordEncoded,
    RecordRevoked,
    CorruptRecordRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RecordEncoded => "record_encoded",
            AuditAction::RecordRevoked => "record_revoked",
            AuditAction::CorruptRecordRejected => "corrupt_record_rejected",
        }
    }
}

/// One audit line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub action: AuditAction,
    pub record_id: String,
    pub context: Option<String>,
    pub severity: LogLevel,
}

impl AuditEvent {
    pub fn new(tenant_id: &str, action: AuditAction, record_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            tenant_id: tenant_id.to_string(),
            action,
            record_id: record_id.to_string(),
            context: None,
            severity: LogLevel::Info,
        }
    }

    pub fn with_severity(mut self, level: LogLevel) -> Self {
        self.severity = level;
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    pub fn emit(&self) {
        let context = self.context.as_deref().unwrap_or("");
        match self.severity {
            LogLevel::Info => tracing::info!(
                target: AUDIT_TARGET,
                audit_id = %self.id,
                tenant_id = %self.tenant_id,
                action = self.action.as_str(),
                record_id = %self.record_id,
                context,
                "audit"
            ),
            LogLevel::Warn => tracing::warn!(
                target: AUDIT_TARGET,
                audit_id = %self.id,
                tenant_id = %self.tenant_id,
                action = self.action.as_str(),
                record_id = %self.record_id,
                context,
                "audit"
            ),
            LogLevel::Error => tracing::error!(
                target: AUDIT_TARGET,
                audit_id = %self.id,
                tenant_id = %self.tenant_id,
                action = self.action.as_str(),
                record_id = %self.record_id,
                context,
                "audit"
            ),
        }
    }
}
