//! Router wiring: maps the wire protocol (§6) onto axum routes.

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::api::{handlers, middleware};
use crate::events::EventBus;
use crate::registry::RouteRegistry;

/// Shared application state: the compiled-route registry and the event
/// bus every SSE subscription attaches to.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouteRegistry>,
    pub events: Arc<EventBus>,
    pub default_tenant_id: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/routes", put(handlers::deploy_route).get(handlers::list_routes))
        .route("/routes/:tenant/:id/invoke", post(handlers::invoke_route))
        .route("/routes/:tenant/:id/start", post(handlers::start_route))
        .route("/routes/:tenant/:id/stop", post(handlers::stop_route))
        .route("/routes/:tenant/:id", get(handlers::get_route).delete(handlers::delete_route))
        .route("/events/stream", get(handlers::events_stream))
        .layer(middleware::logging_layer())
        .layer(middleware::cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerConfig, RouteCompiler};
    use crate::events::EventBusConfig;
    use crate::executor::{Executor, ExecutorConfig};
    use crate::saga::{AccountStore, SagaCoordinator};
    use crate::store::RouteStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_state() -> AppState {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = RouteStore::new(pool.clone(), 1);
        let events = EventBus::new(EventBusConfig::default());
        let saga = SagaCoordinator::new(AccountStore::new(pool));
        let executor = Arc::new(Executor::new(saga, events.clone(), ExecutorConfig::default()));
        let compiler = RouteCompiler::new(CompilerConfig::default());
        let registry = RouteRegistry::new(compiler, executor, store);
        AppState { registry, events, default_tenant_id: "default".to_string() }
    }

    #[tokio::test]
    async fn router_builds_without_panicking() {
        let state = test_state().await;
        let _router = create_router(state);
    }
}
