//! Execution-time error taxonomy (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Wraps any node-level failure with `routeId`, `nodeId`, `nodeType`.
    #[error("node '{node_id}' ({node_type}) in route {route_id} failed: {cause}")]
    Node { route_id: String, node_id: String, node_type: String, cause: String },

    #[error("endpoint timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error calling endpoint: {0}")]
    Transport(String),

    #[error("no catch handler matched exception type {0}")]
    Uncaught(String),

    #[error(transparent)]
    Saga(#[from] crate::saga::SagaError),

    #[error("unresolvable endpoint: {0}")]
    UnresolvableEndpoint(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),
}

impl ExecutionError {
    /// The declared exception type name used for `tryCatch` matching
    /// (§9 "Exception type matching").
    pub fn exception_type(&self) -> String {
        match self {
            ExecutionError::Timeout(_) => "TimeoutError".to_string(),
            ExecutionError::Transport(_) => "TransportError".to_string(),
            ExecutionError::Saga(crate::saga::SagaError::InsufficientBalance { .. }) => "InsufficientBalanceException".to_string(),
            ExecutionError::Saga(crate::saga::SagaError::AccountNotActive(_)) => "AccountNotActiveException".to_string(),
            ExecutionError::Saga(crate::saga::SagaError::AccountNotFound(_)) => "AccountNotFoundException".to_string(),
            ExecutionError::Saga(crate::saga::SagaError::CompensationFailed { .. }) => "CompensationFailedException".to_string(),
            ExecutionError::Uncaught(t) => t.clone(),
            _ => "Exception".to_string(),
        }
    }
}
