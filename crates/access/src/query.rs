//! Read queries over the reconciled authorization state.

use crate::error::Result;
use crate::reconcile::{AuthorizationState, FileIndex};
use filegrant_ledger::{EventFilter, EventSource, LedgerEventKind, RawLog};
use filegrant_types::{
    AccessEvent, AccessKey, FileRecord, FileTopic, Fingerprint, GrantAction, Principal, TxId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A file another principal has shared with the queried one.
///
/// When the owning principal's metadata is not indexed yet, `name` is empty,
/// `registered_at` is zero and `fingerprint` is empty; the grant itself is
/// still reported. `file_topic` always identifies the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    pub owner: Principal,
    pub file_topic: FileTopic,
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Seconds since epoch; zero when metadata is missing.
    pub registered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tx: Option<TxId>,
}

/// An active grant issued by the queried owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedGrant {
    pub grantee: Principal,
    pub file_topic: FileTopic,
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Seconds since epoch; zero when metadata is missing.
    pub registered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tx: Option<TxId>,
}

/// Authorization queries over one event source session.
///
/// The source handle is the only context: there is no ambient connection
/// state, and every call builds its index and authorization state from
/// scratch and discards it on return, so concurrent in-flight queries never
/// interfere. A superseded query's result simply arrives late; callers
/// needing strict supersession should track a generation counter and drop
/// stale responses.
pub struct AccessQueryService {
    source: Arc<dyn EventSource>,
}

impl AccessQueryService {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    /// Every file the owner has registered, in registration order, each
    /// carrying its origin transaction when the cross-reference join found
    /// exactly one candidate.
    pub async fn files_owned_by(&self, owner: &Principal) -> Result<Vec<FileRecord>> {
        let index = FileIndex::build(self.source.as_ref(), owner).await?;
        debug!(owner = %owner, files = index.len(), "files_owned_by");
        Ok(index.into_records())
    }

    /// Files currently shared with `principal`, across all owners, joined to
    /// each owner's metadata. Sorted by grant position for stable display.
    pub async fn files_shared_with(&self, principal: &Principal) -> Result<Vec<SharedFile>> {
        let state = self
            .authorization_state(&EventFilter::Grantee(*principal))
            .await?;
        let mut active: Vec<AccessEvent> = state.active_grants().cloned().collect();
        active.sort_by_key(|event| event.position);

        // Registration events are only efficiently queryable per owner, so
        // each distinct owner gets its own index build.
        let owners: BTreeSet<Principal> = active.iter().map(|event| event.owner).collect();
        let mut indexes: HashMap<Principal, FileIndex> = HashMap::new();
        for owner in owners {
            let index = FileIndex::build(self.source.as_ref(), &owner).await?;
            indexes.insert(owner, index);
        }

        let shared = active
            .into_iter()
            .map(|event| {
                let record = indexes
                    .get(&event.owner)
                    .and_then(|index| index.get(&event.file_topic));
                match record {
                    Some(record) => SharedFile {
                        owner: event.owner,
                        file_topic: event.file_topic,
                        name: record.name.clone(),
                        fingerprint: record.fingerprint.clone(),
                        registered_at: record.registered_at,
                        origin_tx: event.origin_tx.or(record.origin_tx),
                    },
                    None => {
                        debug!(owner = %event.owner, topic = %event.file_topic,
                            "shared file has no indexed metadata");
                        SharedFile {
                            owner: event.owner,
                            file_topic: event.file_topic,
                            name: String::new(),
                            fingerprint: Fingerprint::new(""),
                            registered_at: 0,
                            origin_tx: event.origin_tx,
                        }
                    }
                }
            })
            .collect();
        Ok(shared)
    }

    /// Active grants the owner has issued, joined to the owner's own file
    /// metadata. Sorted by grant position for stable display.
    pub async fn grants_issued_by(&self, owner: &Principal) -> Result<Vec<IssuedGrant>> {
        let state = self
            .authorization_state(&EventFilter::Owner(*owner))
            .await?;
        let mut active: Vec<AccessEvent> = state.active_grants().cloned().collect();
        active.sort_by_key(|event| event.position);

        let index = FileIndex::build(self.source.as_ref(), owner).await?;

        let issued = active
            .into_iter()
            .map(|event| match index.get(&event.file_topic) {
                Some(record) => IssuedGrant {
                    grantee: event.grantee,
                    file_topic: event.file_topic,
                    name: record.name.clone(),
                    fingerprint: record.fingerprint.clone(),
                    registered_at: record.registered_at,
                    origin_tx: event.origin_tx.or(record.origin_tx),
                },
                None => IssuedGrant {
                    grantee: event.grantee,
                    file_topic: event.file_topic,
                    name: String::new(),
                    fingerprint: Fingerprint::new(""),
                    registered_at: 0,
                    origin_tx: event.origin_tx,
                },
            })
            .collect();
        Ok(issued)
    }

    /// Whether `grantee` currently holds access to the owner's file.
    pub async fn has_access(
        &self,
        owner: &Principal,
        fingerprint: &Fingerprint,
        grantee: &Principal,
    ) -> Result<bool> {
        let state = self
            .authorization_state(&EventFilter::Owner(*owner))
            .await?;
        Ok(state.is_active(&AccessKey {
            owner: *owner,
            file_topic: fingerprint.topic(),
            grantee: *grantee,
        }))
    }

    async fn authorization_state(&self, filter: &EventFilter) -> Result<AuthorizationState> {
        let grants = self
            .source
            .events_by_filter(LedgerEventKind::AccessGranted, filter, 0, None)
            .await?;
        let revokes = self
            .source
            .events_by_filter(LedgerEventKind::AccessRevoked, filter, 0, None)
            .await?;

        let tagged: Vec<(GrantAction, RawLog)> = grants
            .into_iter()
            .map(|log| (GrantAction::Grant, log))
            .chain(revokes.into_iter().map(|log| (GrantAction::Revoke, log)))
            .collect();
        Ok(AuthorizationState::build(tagged))
    }
}
