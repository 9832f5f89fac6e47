//! Store-level error taxonomy (§7: `SchemaVersionUnsupported`).

use crate::db::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("route not found: {0}")]
    NotFound(String),

    #[error("persisted schemaVersion {0} is newer than this runtime supports")]
    SchemaVersionUnsupported(u32),

    #[error("definition (de)serialization failed: {0}")]
    Serialization(String),
}
