//! Library root for the `sigil_record_store` crate
//!
//! A tenant-scoped, signed record store: payloads are fingerprinted, signed
//! by a pluggable [`Signer`], bound to an `authHash`, and persisted through a
//! pluggable [`StorageDriver`].

// Core error handling
pub mod errors;

// Record model
pub mod canonicalize;
pub mod fingerprint;
pub mod record;

// Trust
pub mod signer;

// Persistence
pub mod storage;

// Orchestration
pub mod engine;

// Configuration & logging
pub mod audit;
pub mod config;
pub mod telemetry;

#[cfg(test)]
mod tests {
    pub mod engine_lifecycle_test;
    pub mod test_utils;
    pub mod tenant_isolation_test;
}

pub use engine::{
    DecodeResult, EncodeOptions, EncodeResult, HealthReport, ListOptions, ListResult,
    ReadOptions, RecordEngine, RevokeOptions, RevokeResult, VerifyResult,
};
pub use errors::{RecordError, RecordResult, StorageErrorCode};
pub use record::{Record, RecordContext, RecordSummary, UnsignedRecord};
pub use signer::{Ed25519Signer, Signer};
pub use storage::{MemoryDriver, PageOptions, RecordFilter, SledDriver, StorageDriver};
