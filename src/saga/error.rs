//! Saga precondition and coordination errors (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account not active: {0}")]
    AccountNotActive(String),
    #[error("insufficient balance on account {account}: requested {requested}, available {available}")]
    InsufficientBalance { account: String, requested: i64, available: i64 },
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("compensation failed: original error '{original}', compensation error '{compensation}'")]
    CompensationFailed { original: String, compensation: String },
    #[error("optimistic lock conflict on account {0}")]
    VersionConflict(String),
    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}
