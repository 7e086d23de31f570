//! Access-grant reconciliation for the filegrant ledger.
//!
//! Reconstructs, from the append-only log of grant/revoke events, the
//! current set of active access grants, and joins that derived state against
//! file metadata. State is derived, never stored: every query re-folds the
//! event set from the source, so there is no cache to invalidate and replay
//! is idempotent.

pub mod error;
pub mod query;
pub mod reconcile;

pub use error::AccessError;
pub use query::{AccessQueryService, IssuedGrant, SharedFile};
pub use reconcile::{AuthorizationState, FileIndex};
