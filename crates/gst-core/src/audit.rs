//! # GST Transaction Audit Log
//!
//! One immutable entry per portal interaction: the full request and
//! response payloads, the derived outcome, and the endpoint called. This is
//! the compliance trail; entries are never updated or deleted.
//!
//! Entries are hash-chained. Each entry stores the previous entry's hash
//! and `SHA-256(previous_hash ‖ invoice_id ‖ type ‖ status ‖ error_code ‖
//! endpoint ‖ canonical(request) ‖ canonical(response))`. Payloads are
//! canonicalized (object keys sorted recursively) so the hash survives a
//! round trip through stores that reorder JSON keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::identity::InvoiceId;

/// Hash used as `previous_hash` by the first entry in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Error code recorded for failures that occurred before any authoritative
/// response was received.
pub const SYSTEM_ERROR_CODE: &str = "SYSTEM_ERROR";

/// Kind of portal interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// First IRN generation attempt.
    Generate,
    /// IRN cancellation.
    Cancel,
    /// Resubmission after a failed attempt.
    Retry,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Self::Generate),
            "cancel" => Ok(Self::Cancel),
            "retry" => Ok(Self::Retry),
            other => Err(ValidationError::UnknownTransactionField {
                kind: "type",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome category of a portal interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            other => Err(ValidationError::UnknownTransactionField {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// An audit entry before it is sealed into the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub invoice_id: InvoiceId,
    pub transaction_type: TransactionType,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub endpoint: String,
}

impl NewTransaction {
    /// Hash of this entry when chained after `previous_hash`.
    pub fn chain_hash(&self, previous_hash: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [
            previous_hash,
            &self.invoice_id.to_string(),
            self.transaction_type.as_str(),
            self.status.as_str(),
            self.error_code.as_deref().unwrap_or(""),
            &self.endpoint,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(canonical_json(&self.request_payload).as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(&self.response_payload).as_bytes());
        hex(&hasher.finalize())
    }

    /// Seal into an immutable entry chained after `previous_hash`.
    pub fn seal(self, previous_hash: &str, created_at: DateTime<Utc>) -> TransactionLogEntry {
        let entry_hash = self.chain_hash(previous_hash);
        TransactionLogEntry {
            id: Uuid::new_v4(),
            invoice_id: self.invoice_id,
            transaction_type: self.transaction_type,
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            status: self.status,
            error_code: self.error_code,
            error_message: self.error_message,
            endpoint: self.endpoint,
            previous_hash: previous_hash.to_string(),
            entry_hash,
            created_at,
        }
    }
}

/// Sealed, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub id: Uuid,
    pub invoice_id: InvoiceId,
    pub transaction_type: TransactionType,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub endpoint: String,
    pub previous_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    /// Recompute this entry's hash from its contents.
    pub fn recompute_hash(&self) -> String {
        NewTransaction {
            invoice_id: self.invoice_id,
            transaction_type: self.transaction_type,
            request_payload: self.request_payload.clone(),
            response_payload: self.response_payload.clone(),
            status: self.status,
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            endpoint: self.endpoint.clone(),
        }
        .chain_hash(&self.previous_hash)
    }
}

/// Result of walking a chain of entries in append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIntegrity {
    pub total_entries: usize,
    /// Entries whose `previous_hash` does not match their predecessor.
    pub broken_links: usize,
    /// Entries whose stored hash does not match their contents.
    pub tampered_entries: usize,
}

impl ChainIntegrity {
    pub fn is_valid(&self) -> bool {
        self.broken_links == 0 && self.tampered_entries == 0
    }
}

/// Verify a chain given in append order.
pub fn verify_chain(entries: &[TransactionLogEntry]) -> ChainIntegrity {
    let mut broken_links = 0;
    let mut tampered_entries = 0;
    let mut expected_prev = GENESIS_HASH;

    for entry in entries {
        if entry.previous_hash != expected_prev {
            broken_links += 1;
        }
        if entry.recompute_hash() != entry.entry_hash {
            tampered_entries += 1;
        }
        expected_prev = &entry.entry_hash;
    }

    ChainIntegrity {
        total_entries: entries.len(),
        broken_links,
        tampered_entries,
    }
}

/// Serialize with object keys sorted at every depth.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
