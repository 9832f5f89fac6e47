//! HTTP handlers implementing the transport-agnostic wire protocol
//! (§6 "Wire protocol for route invocation").

pub mod health;
pub mod routes;
pub mod stream;

pub use health::health;
pub use routes::{deploy_route, delete_route, get_route, invoke_route, list_routes, start_route, stop_route};
pub use stream::events_stream;
