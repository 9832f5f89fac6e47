//! Registry-level error taxonomy (§7: `RouteNotFound`, `RouteAlreadyDeployed`).

use crate::compiler::{CompileError, ValidationError};
use crate::db::DatabaseError;
use crate::executor::ExecutionError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("route already deployed: {0}")]
    RouteAlreadyDeployed(String),

    #[error("route is not deployed: {0}")]
    RouteNotDeployed(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
