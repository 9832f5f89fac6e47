//! HTTP/SSE transport: exposes route deploy/list/invoke/start/stop/
//! delete and the event-bus stream over the wire protocol of §6.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use middleware::cors_layer;
pub use routes::{create_router, AppState};
