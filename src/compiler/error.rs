//! Compile-time error taxonomy (§7).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ValidationError {
    #[error("route definition has no 'from' node")]
    MissingFrom,
    #[error("'from' node {0} has no uri")]
    FromMissingUri,
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("edge {edge} references unknown node {node}")]
    DanglingEdge { edge: String, node: String },
    #[error("graph contains a cycle at node {0}")]
    GraphCycle(String),
    #[error("nodes unreachable from 'from': {0:?}")]
    Unreachable(Vec<String>),
    #[error("choice node {0} has no 'when' or 'otherwise' outgoing edge")]
    ChoiceMissingBranch(String),
    #[error("tryCatch node {0} has no 'try' outgoing edge")]
    TryCatchMissingTry(String),
    #[error("uri scheme not permitted: {0}")]
    DisallowedScheme(String),
    #[error("http(s) host not permitted: {0}")]
    DisallowedHost(String),
    #[error("tenantId must not contain '::': {0}")]
    InvalidTenantId(String),
    #[error("route id must not contain '::': {0}")]
    InvalidRouteId(String),
}

#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unresolvable endpoint: {0}")]
    UnresolvableEndpoint(String),
}
