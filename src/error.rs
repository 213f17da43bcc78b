//! Error types for the ledger, its store and the kitchen backend client.

use thiserror::Error;

use crate::models::TableId;

/// Failures talking to the kitchen backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

impl ApiError {
    /// 401/403 mean the identity token is no longer accepted.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == 401 || *status == 403)
    }
}

/// Failures of a persistent store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("store lock poisoned")]
    Lock,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Caller-visible failures of ledger operations.
///
/// None of these leave the ledger partially mutated.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("no new items to send to the kitchen for table {table_id}")]
    EmptyOrder { table_id: TableId },

    #[error("no active table selected")]
    NoActiveTable,

    #[error("failed to submit order: {0}")]
    Submission(#[source] ApiError),

    #[error("failed to refresh placed items: {0}")]
    Reconciliation(#[source] ApiError),

    #[error("ledger persistence failed: {0}")]
    Persistence(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Persistence(format!("snapshot encoding: {e}"))
    }
}
