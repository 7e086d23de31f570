//! Event structures the reconciliation engine folds over.

use crate::fingerprint::FileTopic;
use crate::principal::Principal;
use serde::{Deserialize, Serialize};

/// Total order key for ledger events: a coarse sequence (block) number and a
/// fine within-sequence (log) index.
///
/// Emission order on the ledger is not guaranteed to match delivery order;
/// this tuple is the only legitimate ordering key. `Ord` compares sequence
/// first, then index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EventPosition {
    pub sequence: u64,
    pub index: u32,
}

impl EventPosition {
    pub fn new(sequence: u64, index: u32) -> Self {
        Self { sequence, index }
    }
}

/// Identifier of the ledger transaction that emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str.len() != 64 {
            return Err(format!(
                "TxId hex must be 64 characters, got {}",
                hex_str.len()
            ));
        }
        let bytes = hex::decode(hex_str).map_err(|e| format!("Invalid hex: {e}"))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Whether an access event grants or revokes access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantAction {
    Grant,
    Revoke,
}

/// Key identifying one authorization relationship. The reconciled state maps
/// each key to the last access event observed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessKey {
    pub owner: Principal,
    pub file_topic: FileTopic,
    pub grantee: Principal,
}

/// A grant or revoke action, decoded from a ledger log.
///
/// The file is identified by its indexing topic, not its plaintext
/// fingerprint: the ledger re-hashes indexed string fields, so the plaintext
/// is not recoverable from these events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub action: GrantAction,
    pub owner: Principal,
    pub grantee: Principal,
    pub file_topic: FileTopic,
    pub position: EventPosition,
    /// Present for grants; may be absent for revokes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tx: Option<TxId>,
}

impl AccessEvent {
    /// The reconciliation key for this event.
    pub fn key(&self) -> AccessKey {
        AccessKey {
            owner: self.owner,
            file_topic: self.file_topic,
            grantee: self.grantee,
        }
    }
}
