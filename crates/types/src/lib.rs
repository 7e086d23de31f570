//! Shared data model for the filegrant access ledger.
//!
//! Provides canonical identifier types (principals, content fingerprints and
//! their ledger indexing topics) plus the event and record structures the
//! reconciliation engine folds over. All identifier normalization lives here:
//! code elsewhere compares `Principal` and `FileTopic` values, never raw
//! event text.

pub mod event;
pub mod fingerprint;
pub mod principal;
pub mod record;

pub use event::{AccessEvent, AccessKey, EventPosition, GrantAction, TxId};
pub use fingerprint::{FileTopic, Fingerprint};
pub use principal::{Principal, PrincipalError};
pub use record::FileRecord;
