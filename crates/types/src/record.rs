//! Derived file metadata records.

use crate::event::TxId;
use crate::fingerprint::{FileTopic, Fingerprint};
use crate::principal::Principal;
use serde::{Deserialize, Serialize};

/// One file a principal has registered on the ledger.
///
/// Created exactly once per registration, immutable thereafter; the domain
/// has no unregister operation. `origin_tx` is joined from the registration
/// event log after the fact and is absent when the cross-reference finds
/// zero or conflicting candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub owner: Principal,
    /// Display name; not unique, may be empty.
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Seconds since epoch.
    pub registered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tx: Option<TxId>,
}

impl FileRecord {
    /// The indexing topic this record is keyed by.
    pub fn topic(&self) -> FileTopic {
        self.fingerprint.topic()
    }
}
