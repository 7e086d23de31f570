use filegrant_ledger::LedgerError;
use thiserror::Error;

/// Errors surfaced by reconciliation and queries.
///
/// Only event-source failures propagate. Malformed events are skipped and
/// counted, and ambiguous joins leave the affected field absent; neither
/// aborts a query, because partial results beat total failure in a
/// read-heavy reconciliation system.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("event source error: {0}")]
    Source(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, AccessError>;
