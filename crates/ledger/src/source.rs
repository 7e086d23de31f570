//! Read interface onto the append-only event ledger.

use async_trait::async_trait;
use filegrant_types::{EventPosition, Fingerprint, Principal, TxId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field names carried by decoded ledger logs.
pub const FIELD_OWNER: &str = "owner";
pub const FIELD_GRANTEE: &str = "grantee";
pub const FIELD_FINGERPRINT: &str = "fingerprint";
pub const FIELD_NAME: &str = "name";
pub const FIELD_REGISTERED_AT: &str = "registered_at";

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The event source cannot be reached or is not initialized. Retry
    /// policy belongs to the caller, not the core.
    #[error("event source unavailable: {0}")]
    Unavailable(String),

    #[error("registration index {index} out of range (count {count})")]
    OutOfRange { index: u64, count: u64 },
}

/// The three event kinds the ledger emits for this domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    FileRegistered,
    AccessGranted,
    AccessRevoked,
}

/// Exact-match predicate on one indexed event field.
///
/// Indexed address fields compare as bytes on the ledger, so matching is
/// case-insensitive with respect to the field's textual spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Owner(Principal),
    Grantee(Principal),
}

/// A decoded ledger log: emission position, originating transaction, and the
/// event's textual fields.
///
/// Field text is preserved exactly as emitted. For `AccessGranted` and
/// `AccessRevoked` the `fingerprint` field holds the indexing topic's hex
/// (indexed string fields are only recoverable as their hash); for
/// `FileRegistered` it holds the plaintext fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub position: EventPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxId>,
    pub fields: BTreeMap<String, String>,
}

impl RawLog {
    pub fn new(position: EventPosition, tx: Option<TxId>) -> Self {
        Self {
            position,
            tx,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// One row of an owner's registration table, as read back by pagination.
///
/// Rows do not carry the originating transaction; that has to be joined from
/// the `FileRegistered` event log by topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Seconds since epoch.
    pub registered_at: u64,
}

/// The only read primitives the core requires from the event source.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch all logs of `kind` matching `filter`, within the inclusive
    /// sequence range `[from_sequence, to_sequence]` (`None` meaning the
    /// latest). No delivery-order guarantee; callers must order by
    /// [`EventPosition`] themselves.
    async fn events_by_filter(
        &self,
        kind: LedgerEventKind,
        filter: &EventFilter,
        from_sequence: u64,
        to_sequence: Option<u64>,
    ) -> Result<Vec<RawLog>, LedgerError>;

    /// Number of files `owner` has registered.
    async fn registration_count(&self, owner: &Principal) -> Result<u64, LedgerError>;

    /// Read one registration row by index, `0 <= index < registration_count`.
    async fn registration_at(
        &self,
        owner: &Principal,
        index: u64,
    ) -> Result<RegistrationRow, LedgerError>;
}
