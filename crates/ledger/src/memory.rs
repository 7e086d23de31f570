//! In-memory append-only ledger for tests and local mode.

use crate::source::{
    EventFilter, EventSource, LedgerError, LedgerEventKind, RawLog, RegistrationRow,
    FIELD_FINGERPRINT, FIELD_GRANTEE, FIELD_NAME, FIELD_OWNER, FIELD_REGISTERED_AT,
};
use async_trait::async_trait;
use filegrant_types::{EventPosition, Fingerprint, Principal, TxId};
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::Arc;

/// Timestamp assigned to the first sequence; each closed sequence advances
/// the clock by one block interval.
const BASE_CLOCK_SECS: u64 = 1_700_000_000;
const BLOCK_INTERVAL_SECS: u64 = 12;

/// Append-only in-memory event ledger.
///
/// Mirrors the observable behavior of the real event source: logs carry
/// (sequence, index) positions and transaction ids, indexed string fields on
/// grant/revoke events are exposed as their Keccak topic rather than as
/// plaintext, and registration rows are readable only by per-owner
/// pagination, without transaction ids.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<MemoryLedgerInner>,
}

struct MemoryLedgerInner {
    log: RwLock<Vec<StoredLog>>,
    rows: RwLock<HashMap<Principal, Vec<RegistrationRow>>>,
    cursor: RwLock<Cursor>,
    online: RwLock<bool>,
}

struct StoredLog {
    kind: LedgerEventKind,
    log: RawLog,
}

struct Cursor {
    sequence: u64,
    index: u32,
    clock: u64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryLedgerInner {
                log: RwLock::new(Vec::new()),
                rows: RwLock::new(HashMap::new()),
                cursor: RwLock::new(Cursor {
                    sequence: 0,
                    index: 0,
                    clock: BASE_CLOCK_SECS,
                }),
                online: RwLock::new(true),
            }),
        }
    }

    /// Simulate the source becoming unreachable; all reads fail with
    /// [`LedgerError::Unavailable`] until switched back on.
    pub fn set_online(&self, online: bool) {
        *self.inner.online.write() = online;
    }

    /// Close the current sequence: later events get the next sequence number
    /// and a fresh within-sequence index.
    pub fn advance_block(&self) {
        let mut cursor = self.inner.cursor.write();
        cursor.sequence += 1;
        cursor.index = 0;
        cursor.clock += BLOCK_INTERVAL_SECS;
    }

    /// Register a file for `owner`: appends a `FileRegistered` log and a
    /// pagination row, returning the generated transaction id.
    pub fn register_file(&self, owner: &Principal, name: &str, fingerprint: &Fingerprint) -> TxId {
        let (position, clock) = self.next_position();
        let tx = derive_tx(
            "register",
            position,
            &[&owner.to_canonical(), name, fingerprint.as_str()],
        );

        let log = RawLog::new(position, Some(tx))
            .with_field(FIELD_OWNER, owner.to_canonical())
            .with_field(FIELD_NAME, name)
            .with_field(FIELD_FINGERPRINT, fingerprint.as_str())
            .with_field(FIELD_REGISTERED_AT, clock.to_string());
        self.inner.log.write().push(StoredLog {
            kind: LedgerEventKind::FileRegistered,
            log,
        });

        self.inner
            .rows
            .write()
            .entry(*owner)
            .or_default()
            .push(RegistrationRow {
                name: name.to_string(),
                fingerprint: fingerprint.clone(),
                registered_at: clock,
            });

        tx
    }

    /// Grant `grantee` access to the file identified by `fingerprint`. The
    /// emitted log carries the fingerprint's topic hex, as the real ledger
    /// does for indexed string fields.
    pub fn grant_access(
        &self,
        owner: &Principal,
        fingerprint: &Fingerprint,
        grantee: &Principal,
    ) -> TxId {
        self.append_access(LedgerEventKind::AccessGranted, owner, fingerprint, grantee)
    }

    /// Revoke a previously granted access. Appending is unconditional: the
    /// ledger records facts, reconciliation decides what is active.
    pub fn revoke_access(
        &self,
        owner: &Principal,
        fingerprint: &Fingerprint,
        grantee: &Principal,
    ) -> TxId {
        self.append_access(LedgerEventKind::AccessRevoked, owner, fingerprint, grantee)
    }

    /// Append a log with arbitrary field text at the next position. For
    /// tests and snapshot replay; field text is stored exactly as given.
    pub fn append_raw(
        &self,
        kind: LedgerEventKind,
        tx: Option<TxId>,
        fields: &[(&str, &str)],
    ) -> EventPosition {
        let (position, _) = self.next_position();
        let mut log = RawLog::new(position, tx);
        for (name, value) in fields {
            log = log.with_field(name, *value);
        }
        self.inner.log.write().push(StoredLog { kind, log });
        position
    }

    /// Insert a registration row without emitting a log. For tests that need
    /// the two channels (rows vs. event log) out of step.
    pub fn push_registration_row(&self, owner: &Principal, row: RegistrationRow) {
        self.inner.rows.write().entry(*owner).or_default().push(row);
    }

    fn append_access(
        &self,
        kind: LedgerEventKind,
        owner: &Principal,
        fingerprint: &Fingerprint,
        grantee: &Principal,
    ) -> TxId {
        let (position, _) = self.next_position();
        let tag = match kind {
            LedgerEventKind::AccessGranted => "grant",
            _ => "revoke",
        };
        let tx = derive_tx(
            tag,
            position,
            &[
                &owner.to_canonical(),
                &grantee.to_canonical(),
                fingerprint.as_str(),
            ],
        );

        let log = RawLog::new(position, Some(tx))
            .with_field(FIELD_OWNER, owner.to_canonical())
            .with_field(FIELD_GRANTEE, grantee.to_canonical())
            .with_field(FIELD_FINGERPRINT, fingerprint.topic().to_hex());
        self.inner.log.write().push(StoredLog { kind, log });

        tx
    }

    fn next_position(&self) -> (EventPosition, u64) {
        let mut cursor = self.inner.cursor.write();
        let position = EventPosition::new(cursor.sequence, cursor.index);
        cursor.index += 1;
        (position, cursor.clock)
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if *self.inner.online.read() {
            Ok(())
        } else {
            Err(LedgerError::Unavailable(
                "memory ledger is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Indexed address fields match as bytes: the filter hits whatever textual
/// spelling the log carries, as long as it decodes to the same principal.
fn filter_matches(filter: &EventFilter, log: &RawLog) -> bool {
    let (field, want) = match filter {
        EventFilter::Owner(principal) => (FIELD_OWNER, principal),
        EventFilter::Grantee(principal) => (FIELD_GRANTEE, principal),
    };
    match log.field(field).map(Principal::parse) {
        Some(Ok(found)) => found == *want,
        _ => false,
    }
}

fn derive_tx(tag: &str, position: EventPosition, fields: &[&str]) -> TxId {
    let mut hasher = Keccak256::new();
    hasher.update(tag.as_bytes());
    hasher.update(position.sequence.to_be_bytes());
    hasher.update(position.index.to_be_bytes());
    for field in fields {
        hasher.update([0u8]);
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    TxId(bytes)
}

#[async_trait]
impl EventSource for MemoryLedger {
    async fn events_by_filter(
        &self,
        kind: LedgerEventKind,
        filter: &EventFilter,
        from_sequence: u64,
        to_sequence: Option<u64>,
    ) -> Result<Vec<RawLog>, LedgerError> {
        self.ensure_online()?;
        let log = self.inner.log.read();
        let matches = log
            .iter()
            .filter(|stored| stored.kind == kind)
            .filter(|stored| stored.log.position.sequence >= from_sequence)
            .filter(|stored| match to_sequence {
                Some(to) => stored.log.position.sequence <= to,
                None => true,
            })
            .filter(|stored| filter_matches(filter, &stored.log))
            .map(|stored| stored.log.clone())
            .collect();
        Ok(matches)
    }

    async fn registration_count(&self, owner: &Principal) -> Result<u64, LedgerError> {
        self.ensure_online()?;
        let rows = self.inner.rows.read();
        Ok(rows.get(owner).map_or(0, |list| list.len() as u64))
    }

    async fn registration_at(
        &self,
        owner: &Principal,
        index: u64,
    ) -> Result<RegistrationRow, LedgerError> {
        self.ensure_online()?;
        let rows = self.inner.rows.read();
        let list = rows.get(owner);
        let count = list.map_or(0, |l| l.len() as u64);
        list.and_then(|l| l.get(index as usize))
            .cloned()
            .ok_or(LedgerError::OutOfRange { index, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(byte: u8) -> Principal {
        Principal([byte; 20])
    }

    #[tokio::test]
    async fn grant_log_exposes_topic_not_plaintext() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);
        let grantee = principal(2);
        let fingerprint = Fingerprint::new("QmSharedFile");

        ledger.grant_access(&owner, &fingerprint, &grantee);

        let logs = ledger
            .events_by_filter(
                LedgerEventKind::AccessGranted,
                &EventFilter::Owner(owner),
                0,
                None,
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].field(FIELD_FINGERPRINT),
            Some(fingerprint.topic().to_hex().as_str())
        );
        assert_ne!(logs[0].field(FIELD_FINGERPRINT), Some(fingerprint.as_str()));
    }

    #[tokio::test]
    async fn filter_matches_mixed_case_field_text() {
        let ledger = MemoryLedger::new();
        let owner = principal(0xAB);
        let upper = format!("0x{}", "AB".repeat(20));
        let grantee_text = principal(2).to_canonical();

        ledger.append_raw(
            LedgerEventKind::AccessGranted,
            None,
            &[
                (FIELD_OWNER, upper.as_str()),
                (FIELD_GRANTEE, grantee_text.as_str()),
                (FIELD_FINGERPRINT, "00"),
            ],
        );

        let logs = ledger
            .events_by_filter(
                LedgerEventKind::AccessGranted,
                &EventFilter::Owner(owner),
                0,
                None,
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn positions_advance_within_and_across_blocks() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);
        let fingerprint = Fingerprint::new("QmFile");

        ledger.grant_access(&owner, &fingerprint, &principal(2));
        ledger.grant_access(&owner, &fingerprint, &principal(3));
        ledger.advance_block();
        ledger.grant_access(&owner, &fingerprint, &principal(4));

        let logs = ledger
            .events_by_filter(
                LedgerEventKind::AccessGranted,
                &EventFilter::Owner(owner),
                0,
                None,
            )
            .await
            .unwrap();
        let positions: Vec<_> = logs.iter().map(|l| l.position).collect();
        assert_eq!(
            positions,
            vec![
                EventPosition::new(0, 0),
                EventPosition::new(0, 1),
                EventPosition::new(1, 0),
            ]
        );
    }

    #[tokio::test]
    async fn sequence_range_bounds_are_honored() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);
        let fingerprint = Fingerprint::new("QmFile");

        ledger.grant_access(&owner, &fingerprint, &principal(2));
        ledger.advance_block();
        ledger.grant_access(&owner, &fingerprint, &principal(3));
        ledger.advance_block();
        ledger.grant_access(&owner, &fingerprint, &principal(4));

        let middle = ledger
            .events_by_filter(
                LedgerEventKind::AccessGranted,
                &EventFilter::Owner(owner),
                1,
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(middle.len(), 1);
        assert_eq!(middle[0].position.sequence, 1);
    }

    #[tokio::test]
    async fn registration_rows_paginate() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);

        ledger.register_file(&owner, "a.pdf", &Fingerprint::new("QmA"));
        ledger.register_file(&owner, "b.pdf", &Fingerprint::new("QmB"));

        assert_eq!(ledger.registration_count(&owner).await.unwrap(), 2);
        let row = ledger.registration_at(&owner, 1).await.unwrap();
        assert_eq!(row.name, "b.pdf");

        let err = ledger.registration_at(&owner, 2).await.unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange { index: 2, count: 2 }));
    }

    #[tokio::test]
    async fn offline_ledger_reports_unavailable() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);
        ledger.set_online(false);

        let err = ledger.registration_count(&owner).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));

        ledger.set_online(true);
        assert_eq!(ledger.registration_count(&owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tx_ids_are_unique_per_position() {
        let ledger = MemoryLedger::new();
        let owner = principal(1);
        let fingerprint = Fingerprint::new("QmFile");

        let a = ledger.grant_access(&owner, &fingerprint, &principal(2));
        let b = ledger.grant_access(&owner, &fingerprint, &principal(2));
        assert_ne!(a, b);
    }
}
