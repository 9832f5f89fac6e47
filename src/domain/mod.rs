//! Core data model: route graphs, exchanges, events, accounts and
//! transactions (§3).

pub mod account;
pub mod event;
pub mod exchange;
pub mod route;

pub use account::{Account, AccountStatus, SagaState, Transaction, TransactionStatus};
pub use event::{ExecutionEvent, ExecutionEventKind, ExecutionEventStatus};
pub use exchange::ExecutionExchange;
pub use route::{
    internal_key, split_internal_key, Edge, EdgeHandle, ExpressionLanguage, Node, NodeType,
    RouteDefinition, RouteStatus, INTERNAL_KEY_SEPARATOR, MAX_INTERNAL_KEY_LEN,
};
