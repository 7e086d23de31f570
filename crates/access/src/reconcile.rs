//! Event-sourced reconciliation: fold the raw event log into authoritative
//! derived state.

use crate::error::Result;
use filegrant_ledger::{
    EventFilter, EventSource, LedgerEventKind, RawLog, FIELD_FINGERPRINT, FIELD_GRANTEE,
    FIELD_OWNER,
};
use filegrant_types::{
    AccessEvent, AccessKey, FileRecord, FileTopic, Fingerprint, GrantAction, Principal,
    PrincipalError, TxId,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Why a raw log could not be decoded into an [`AccessEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid principal in `{field}`: {source}")]
    BadPrincipal {
        field: &'static str,
        #[source]
        source: PrincipalError,
    },
    #[error("invalid topic hex: {0}")]
    BadTopic(String),
}

fn decode_principal(log: &RawLog, field: &'static str) -> std::result::Result<Principal, DecodeError> {
    let text = log.field(field).ok_or(DecodeError::MissingField(field))?;
    Principal::parse(text).map_err(|source| DecodeError::BadPrincipal { field, source })
}

/// Decode a grant/revoke log. All identifier normalization happens here, at
/// the ingestion boundary: downstream code only ever compares the decoded
/// binary forms.
pub fn decode_access_event(
    action: GrantAction,
    log: &RawLog,
) -> std::result::Result<AccessEvent, DecodeError> {
    let owner = decode_principal(log, FIELD_OWNER)?;
    let grantee = decode_principal(log, FIELD_GRANTEE)?;
    let topic_hex = log
        .field(FIELD_FINGERPRINT)
        .ok_or(DecodeError::MissingField(FIELD_FINGERPRINT))?;
    let file_topic = FileTopic::from_hex(topic_hex).map_err(DecodeError::BadTopic)?;

    Ok(AccessEvent {
        action,
        owner,
        grantee,
        file_topic,
        position: log.position,
        origin_tx: log.tx,
    })
}

/// Derived authorization state: each (owner, file, grantee) key maps to the
/// last access event observed for it, in position order.
///
/// A pure function of the event set: replaying the same events, in any
/// delivery order, any number of times, yields the same state.
#[derive(Debug, Default)]
pub struct AuthorizationState {
    entries: HashMap<AccessKey, AccessEvent>,
    skipped: usize,
}

impl AuthorizationState {
    /// Fold tagged raw logs into current state.
    ///
    /// Delivery order is not emission order, so the input is sorted by
    /// [`EventPosition`](filegrant_types::EventPosition) before folding;
    /// each event then unconditionally overwrites any prior entry for its
    /// key. Malformed logs are skipped and counted, never fatal.
    pub fn build(logs: impl IntoIterator<Item = (GrantAction, RawLog)>) -> Self {
        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (action, log) in logs {
            match decode_access_event(action, &log) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(position = ?log.position, error = %err, "skipping malformed access event");
                    skipped += 1;
                }
            }
        }

        events.sort_by_key(|event| event.position);

        let mut entries = HashMap::new();
        for event in events {
            entries.insert(event.key(), event);
        }

        Self { entries, skipped }
    }

    /// The resolved entry per key.
    pub fn entries(&self) -> &HashMap<AccessKey, AccessEvent> {
        &self.entries
    }

    /// Entries whose last action is a grant. No output-order guarantee;
    /// callers needing stable display order must sort explicitly.
    pub fn active_grants(&self) -> impl Iterator<Item = &AccessEvent> {
        self.entries
            .values()
            .filter(|event| event.action == GrantAction::Grant)
    }

    /// Whether the key's last action is a grant.
    pub fn is_active(&self, key: &AccessKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|event| event.action == GrantAction::Grant)
    }

    /// Number of malformed logs dropped during the fold.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Cross-reference candidates for one topic's origin transaction.
enum TxJoin {
    Unique(TxId),
    Ambiguous,
}

/// An owner's registered files, keyed by indexing topic.
#[derive(Debug, Default)]
pub struct FileIndex {
    by_topic: HashMap<FileTopic, FileRecord>,
    order: Vec<FileTopic>,
    skipped: usize,
}

impl FileIndex {
    /// Build the index for one owner from the event source.
    ///
    /// Registration rows come from the paginated table; origin transactions
    /// come from the `FileRegistered` event log and are joined by deriving
    /// each row fingerprint's topic, because the log's indexed field is
    /// re-hashed by the ledger and cannot be compared as text. Zero or
    /// conflicting transaction candidates leave `origin_tx` absent. Two
    /// registrations sharing a topic resolve last-write-wins.
    pub async fn build(source: &dyn EventSource, owner: &Principal) -> Result<Self> {
        let logs = source
            .events_by_filter(
                LedgerEventKind::FileRegistered,
                &EventFilter::Owner(*owner),
                0,
                None,
            )
            .await?;

        let mut tx_by_topic: HashMap<FileTopic, TxJoin> = HashMap::new();
        for log in &logs {
            let Some(text) = log.field(FIELD_FINGERPRINT) else {
                warn!(position = ?log.position, "registration log without fingerprint");
                continue;
            };
            let fingerprint = Fingerprint::new(text);
            if fingerprint.is_empty() {
                warn!(position = ?log.position, "registration log with empty fingerprint");
                continue;
            }
            let Some(tx) = log.tx else {
                continue;
            };
            match tx_by_topic.entry(fingerprint.topic()) {
                Entry::Occupied(mut occupied) => {
                    if matches!(occupied.get(), TxJoin::Unique(existing) if *existing != tx) {
                        warn!(topic = %fingerprint.topic(), "conflicting origin transactions for topic");
                        occupied.insert(TxJoin::Ambiguous);
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(TxJoin::Unique(tx));
                }
            }
        }

        let count = source.registration_count(owner).await?;
        let mut index = Self::default();
        for row_index in 0..count {
            let row = source.registration_at(owner, row_index).await?;
            if row.fingerprint.is_empty() {
                warn!(row_index, "skipping registration row without fingerprint");
                index.skipped += 1;
                continue;
            }
            let topic = row.fingerprint.topic();
            let origin_tx = match tx_by_topic.get(&topic) {
                Some(TxJoin::Unique(tx)) => Some(*tx),
                Some(TxJoin::Ambiguous) | None => None,
            };
            if index
                .by_topic
                .insert(
                    topic,
                    FileRecord {
                        owner: *owner,
                        name: row.name,
                        fingerprint: row.fingerprint,
                        registered_at: row.registered_at,
                        origin_tx,
                    },
                )
                .is_none()
            {
                index.order.push(topic);
            }
        }

        debug!(owner = %owner, files = index.order.len(), "built file index");
        Ok(index)
    }

    /// Look up a record by topic.
    pub fn get(&self, topic: &FileTopic) -> Option<&FileRecord> {
        self.by_topic.get(topic)
    }

    /// Records in registration order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.order.iter().filter_map(|topic| self.by_topic.get(topic))
    }

    /// Consume the index, yielding records in registration order.
    pub fn into_records(mut self) -> Vec<FileRecord> {
        self.order
            .iter()
            .filter_map(|topic| self.by_topic.remove(topic))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of malformed rows dropped while building.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filegrant_types::EventPosition;

    fn principal(byte: u8) -> Principal {
        Principal([byte; 20])
    }

    fn access_log(
        owner: &str,
        grantee: &str,
        topic: &FileTopic,
        position: EventPosition,
        tx: Option<TxId>,
    ) -> RawLog {
        RawLog::new(position, tx)
            .with_field(FIELD_OWNER, owner)
            .with_field(FIELD_GRANTEE, grantee)
            .with_field(FIELD_FINGERPRINT, topic.to_hex())
    }

    fn owner_text() -> String {
        principal(1).to_canonical()
    }

    fn grantee_text() -> String {
        principal(2).to_canonical()
    }

    #[test]
    fn revoke_after_grant_deactivates_key() {
        let topic = Fingerprint::new("QmFileX").topic();
        let state = AuthorizationState::build(vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 0),
                    Some(TxId([1u8; 32])),
                ),
            ),
            (
                GrantAction::Revoke,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(2, 0),
                    None,
                ),
            ),
        ]);

        assert_eq!(state.active_grants().count(), 0);
        assert!(!state.is_active(&AccessKey {
            owner: principal(1),
            file_topic: topic,
            grantee: principal(2),
        }));
    }

    #[test]
    fn out_of_order_delivery_resolves_by_position() {
        let topic = Fingerprint::new("QmFileX").topic();
        // Grant at (2,0) delivered before the revoke at (1,0).
        let state = AuthorizationState::build(vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(2, 0),
                    Some(TxId([1u8; 32])),
                ),
            ),
            (
                GrantAction::Revoke,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 0),
                    None,
                ),
            ),
        ]);

        assert_eq!(state.active_grants().count(), 1);
    }

    #[test]
    fn within_sequence_index_breaks_ties() {
        let topic = Fingerprint::new("QmFileX").topic();
        let tx_early = TxId([1u8; 32]);
        let tx_late = TxId([2u8; 32]);
        let state = AuthorizationState::build(vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 1),
                    Some(tx_late),
                ),
            ),
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 0),
                    Some(tx_early),
                ),
            ),
        ]);

        let winner = state.active_grants().next().unwrap();
        assert_eq!(winner.origin_tx, Some(tx_late));
    }

    #[test]
    fn replaying_events_twice_is_idempotent() {
        let topic = Fingerprint::new("QmFileX").topic();
        let events = vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 0),
                    Some(TxId([1u8; 32])),
                ),
            ),
            (
                GrantAction::Revoke,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(2, 0),
                    None,
                ),
            ),
        ];

        let once = AuthorizationState::build(events.clone());
        let twice =
            AuthorizationState::build(events.clone().into_iter().chain(events));

        assert_eq!(once.entries(), twice.entries());
    }

    #[test]
    fn malformed_event_does_not_poison_fold() {
        let topic = Fingerprint::new("QmFileX").topic();
        let missing_grantee = RawLog::new(EventPosition::new(1, 1), None)
            .with_field(FIELD_OWNER, owner_text())
            .with_field(FIELD_FINGERPRINT, topic.to_hex());
        let bad_topic = RawLog::new(EventPosition::new(1, 2), None)
            .with_field(FIELD_OWNER, owner_text())
            .with_field(FIELD_GRANTEE, grantee_text())
            .with_field(FIELD_FINGERPRINT, "not-hex");

        let state = AuthorizationState::build(vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic,
                    EventPosition::new(1, 0),
                    Some(TxId([1u8; 32])),
                ),
            ),
            (GrantAction::Revoke, missing_grantee),
            (GrantAction::Revoke, bad_topic),
        ]);

        assert_eq!(state.skipped(), 2);
        assert_eq!(state.active_grants().count(), 1);
    }

    #[test]
    fn mixed_case_principals_share_a_key() {
        let topic = Fingerprint::new("QmFileX").topic();
        let lower = format!("0x{}", "ab".repeat(20));
        let upper = format!("0x{}", "AB".repeat(20));
        let grantee = grantee_text();

        let state = AuthorizationState::build(vec![
            (
                GrantAction::Grant,
                access_log(&lower, &grantee, &topic, EventPosition::new(1, 0), None),
            ),
            (
                GrantAction::Revoke,
                access_log(&upper, &grantee, &topic, EventPosition::new(2, 0), None),
            ),
        ]);

        // One key, last action revoke.
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.active_grants().count(), 0);
    }

    #[test]
    fn topic_hex_case_is_insignificant() {
        let topic = Fingerprint::new("QmFileX").topic();
        let grant = access_log(
            &owner_text(),
            &grantee_text(),
            &topic,
            EventPosition::new(1, 0),
            None,
        );
        let mut revoke = access_log(
            &owner_text(),
            &grantee_text(),
            &topic,
            EventPosition::new(2, 0),
            None,
        );
        revoke
            .fields
            .insert(FIELD_FINGERPRINT.to_string(), topic.to_hex().to_uppercase());

        let state =
            AuthorizationState::build(vec![(GrantAction::Grant, grant), (GrantAction::Revoke, revoke)]);
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.active_grants().count(), 0);
    }

    #[test]
    fn fold_is_deterministic_across_input_orderings() {
        let topic_a = Fingerprint::new("QmA").topic();
        let topic_b = Fingerprint::new("QmB").topic();
        let events = vec![
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic_a,
                    EventPosition::new(3, 0),
                    Some(TxId([3u8; 32])),
                ),
            ),
            (
                GrantAction::Revoke,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic_a,
                    EventPosition::new(4, 1),
                    None,
                ),
            ),
            (
                GrantAction::Grant,
                access_log(
                    &owner_text(),
                    &grantee_text(),
                    &topic_b,
                    EventPosition::new(4, 0),
                    Some(TxId([4u8; 32])),
                ),
            ),
        ];

        let forward = AuthorizationState::build(events.clone());
        let reversed = AuthorizationState::build(events.into_iter().rev().collect::<Vec<_>>());

        assert_eq!(forward.entries(), reversed.entries());
    }
}
