//! Error handling for the record store
//!
//! Every engine operation returns [`RecordResult`]. Callers branch on the
//! variant: `InvalidInput` never reaches storage, `NotFound` means the record
//! is absent in the tenant, and `Storage` wraps whatever the driver surfaced.

use serde::Serialize;
use thiserror::Error;

/// Machine-readable classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorCode {
    Unavailable,
    Io,
    Corrupt,
    Constraint,
    Serialization,
    Encryption,
    LockPoisoned,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::Unavailable => "unavailable",
            StorageErrorCode::Io => "io",
            StorageErrorCode::Corrupt => "corrupt",
            StorageErrorCode::Constraint => "constraint",
            StorageErrorCode::Serialization => "serialization",
            StorageErrorCode::Encryption => "encryption",
            StorageErrorCode::LockPoisoned => "lock_poisoned",
        }
    }
}

impl std::fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the record store
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Resource not found: {resource} - {id}")]
    NotFound { resource: String, id: String },

    #[error("Record id already exists: {id}")]
    Conflict { id: String },

    #[error("Storage operation failed ({code}): {message}")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cryptographic operation failed: {message}")]
    Crypto { message: String },
}

pub type RecordResult<T> = Result<T, RecordError>;

impl RecordError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Shorthand for a missing record within a tenant
    pub fn record_not_found(tenant_id: &str, id: &str) -> Self {
        Self::not_found("record", format!("{tenant_id}/{id}"))
    }

    pub fn conflict(id: impl Into<String>) -> Self {
        Self::Conflict { id: id.into() }
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Storage code for `Storage` errors, `None` for every other variant
    pub fn code(&self) -> Option<StorageErrorCode> {
        match self {
            RecordError::Storage { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RecordError::NotFound { .. })
    }
}

/// Helper trait for safe RwLock read operations
pub trait SafeReadLock<T: ?Sized> {
    fn safe_read(&self) -> RecordResult<std::sync::RwLockReadGuard<'_, T>>;
}

impl<T: ?Sized> SafeReadLock<T> for std::sync::RwLock<T> {
    fn safe_read(&self) -> RecordResult<std::sync::RwLockReadGuard<'_, T>> {
        self.read().map_err(|_| {
            RecordError::storage(StorageErrorCode::LockPoisoned, "rwlock_read poisoned")
        })
    }
}

/// Helper trait for safe RwLock write operations
pub trait SafeWriteLock<T: ?Sized> {
    fn safe_write(&self) -> RecordResult<std::sync::RwLockWriteGuard<'_, T>>;
}

impl<T: ?Sized> SafeWriteLock<T> for std::sync::RwLock<T> {
    fn safe_write(&self) -> RecordResult<std::sync::RwLockWriteGuard<'_, T>> {
        self.write().map_err(|_| {
            RecordError::storage(StorageErrorCode::LockPoisoned, "rwlock_write poisoned")
        })
    }
}

/// Convert from sled errors
impl From<sled::Error> for RecordError {
    fn from(err: sled::Error) -> Self {
        let code = match err {
            sled::Error::Corruption { .. } => StorageErrorCode::Corrupt,
            sled::Error::Unsupported(_) => StorageErrorCode::Constraint,
            _ => StorageErrorCode::Io,
        };
        RecordError::storage(code, err.to_string())
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        RecordError::serialization("json_operation", err)
    }
}
