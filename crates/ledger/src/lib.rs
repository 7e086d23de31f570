//! Event source boundary for the filegrant access ledger.
//!
//! The reconciliation engine reads events through the [`EventSource`] trait
//! and never depends on how they are transported. [`MemoryLedger`] is an
//! append-only in-memory implementation for tests and local mode that
//! reproduces the real ledger's indexed-field semantics: grant/revoke logs
//! expose the fingerprint's Keccak topic, not the plaintext.

pub mod memory;
pub mod source;

pub use memory::MemoryLedger;
pub use source::{
    EventFilter, EventSource, LedgerError, LedgerEventKind, RawLog, RegistrationRow,
    FIELD_FINGERPRINT, FIELD_GRANTEE, FIELD_NAME, FIELD_OWNER, FIELD_REGISTERED_AT,
};
