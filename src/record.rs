//! Signed record representation
//!
//! A [`Record`] is what the engine persists: the caller's payload, the
//! context it was encoded under, a derived fingerprint, the signer's
//! signature over all of that, and a short `authHash` binding the id to the
//! signature. Records are immutable once created; revocation deletes them.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{RecordError, RecordResult};

/// Wire format version stamped on every record
pub const RECORD_VERSION: &str = "1.0.0";

/// Length of the hex-encoded authHash
pub const AUTH_HASH_LEN: usize = 16;

const ID_PREFIX: &str = "rec_";
const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Numeric metadata recorded alongside a payload.
///
/// `field1` scales the fingerprint angle, `field2` and `field3` weight its
/// sine and cosine components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordContext {
    pub field1: f64,
    pub field2: f64,
    pub field3: f64,
}

impl Default for RecordContext {
    fn default() -> Self {
        Self {
            field1: 1.618,
            field2: 0.5,
            field3: 0.5,
        }
    }
}

impl RecordContext {
    /// Every field must be finite: the context is signed and stored as JSON
    /// numbers, which cannot carry NaN or infinities.
    pub fn validate(&self) -> RecordResult<()> {
        let fields = [
            ("context.field1", self.field1),
            ("context.field2", self.field2),
            ("context.field3", self.field3),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(RecordError::invalid_input(name, "must be a finite number"));
            }
        }
        Ok(())
    }
}

/// The fields covered by a record's signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedRecord {
    pub id: String,
    pub payload: Value,
    pub context: RecordContext,
    pub fingerprint: Vec<f64>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl UnsignedRecord {
    /// Attach a signature, deriving the authHash from it
    pub fn into_signed(self, signature: String) -> Record {
        let auth_hash = compute_auth_hash(&self.id, &signature);
        Record {
            id: self.id,
            payload: self.payload,
            context: self.context,
            fingerprint: self.fingerprint,
            timestamp: self.timestamp,
            version: self.version,
            signature,
            auth_hash,
        }
    }
}

/// The persisted unit, stable JSON shape:
/// `{id, payload, context, fingerprint, timestamp, version, signature, authHash}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub payload: Value,
    pub context: RecordContext,
    pub fingerprint: Vec<f64>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub signature: String,
    pub auth_hash: String,
}

impl Record {
    /// The signed portion of this record, as it was handed to the signer
    pub fn unsigned(&self) -> UnsignedRecord {
        UnsignedRecord {
            id: self.id.clone(),
            payload: self.payload.clone(),
            context: self.context,
            fingerprint: self.fingerprint.clone(),
            timestamp: self.timestamp,
            version: self.version.clone(),
        }
    }

    /// True when `authHash` still matches `sha256(id ++ signature)`
    pub fn has_valid_auth_hash(&self) -> bool {
        self.auth_hash == compute_auth_hash(&self.id, &self.signature)
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            context: self.context,
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Listing view of a record; payload and signature are omitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub context: RecordContext,
    pub fingerprint: Vec<f64>,
}

/// `truncate(hex(sha256(id ++ signature)), 16)`
pub fn compute_auth_hash(id: &str, signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(signature.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(AUTH_HASH_LEN);
    digest
}

/// `rec_<unix millis>_<9 random base36 chars>`
pub fn generate_record_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{ID_PREFIX}{}_{suffix}", now.timestamp_millis())
}
