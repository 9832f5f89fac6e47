//! Route lifecycle endpoints: `PUT route(def)`, `GET routes(tenant)`,
//! `GET route(tenant,id)`, `POST invoke(tenant,id,body)`,
//! `POST start|stop(tenant,id)`, `DELETE route(tenant,id)` (§6 "Wire
//! protocol").

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::domain::{ExecutionExchange, RouteDefinition};
use crate::registry::RegistryError;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: Option<String>,
}

/// `PUT route(def)` -> `{ success, route }`.
pub async fn deploy_route(State(state): State<AppState>, Json(def): Json<RouteDefinition>) -> ApiResult<Json<Value>> {
    let deployed = state.registry.deploy(def).await?;
    Ok(Json(json!({ "success": true, "route": deployed })))
}

/// `GET routes(tenant)` -> list of definitions filtered by tenant.
pub async fn list_routes(State(state): State<AppState>, Query(query): Query<TenantQuery>) -> Json<Vec<RouteDefinition>> {
    let tenant = query.tenant.unwrap_or(state.default_tenant_id.clone());
    Json(state.registry.list_routes(&tenant))
}

/// `GET route(tenant,id)` -> the deployed `RouteDefinition`.
pub async fn get_route(State(state): State<AppState>, Path((tenant, id)): Path<(String, String)>) -> ApiResult<Json<RouteDefinition>> {
    state
        .registry
        .get_route(&tenant, &id)
        .map(Json)
        .ok_or_else(|| ApiError::Registry(RegistryError::RouteNotFound(crate::domain::internal_key(&tenant, &id))))
}

/// `POST invoke(tenant,id,body)` -> `{ success, routeId, input, output }`.
pub async fn invoke_route(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let input = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let key = crate::domain::internal_key(&tenant, &id);
    let exchange = ExecutionExchange::new(key, input.clone());
    let output = state.registry.invoke(&tenant, &id, exchange).await?;
    Ok(Json(json!({ "success": true, "routeId": id, "input": input, "output": output.body })))
}

/// `POST start(tenant,id)` -> `{ success, message }`.
pub async fn start_route(State(state): State<AppState>, Path((tenant, id)): Path<(String, String)>) -> ApiResult<Json<Value>> {
    state.registry.start_route(&tenant, &id).await?;
    Ok(Json(json!({ "success": true, "message": format!("route {id} started") })))
}

/// `POST stop(tenant,id)` -> `{ success, message }`.
pub async fn stop_route(State(state): State<AppState>, Path((tenant, id)): Path<(String, String)>) -> ApiResult<Json<Value>> {
    state.registry.stop_route(&tenant, &id).await?;
    Ok(Json(json!({ "success": true, "message": format!("route {id} stopped") })))
}

/// `DELETE route(tenant,id)` -> `{ success, message }`.
pub async fn delete_route(State(state): State<AppState>, Path((tenant, id)): Path<(String, String)>) -> ApiResult<Json<Value>> {
    state.registry.delete_route(&tenant, &id).await?;
    Ok(Json(json!({ "success": true, "message": format!("route {id} deleted") })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerConfig, RouteCompiler};
    use crate::events::{EventBus, EventBusConfig};
    use crate::executor::{Executor, ExecutorConfig};
    use crate::registry::RouteRegistry;
    use crate::saga::{AccountStore, SagaCoordinator};
    use crate::store::RouteStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn state() -> AppState {
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

    fn log_route(id: &str) -> RouteDefinition {
        serde_json::from_value(json!({
            "id": id,
            "tenant_id": "default",
            "nodes": [
                { "id": "from1", "type": "from", "uri": format!("direct:{id}") },
                { "id": "log1", "type": "log", "message": "hi" },
            ],
            "edges": [ { "id": "e1", "source": "from1", "target": "log1" } ],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn deploy_then_invoke_round_trips() {
        let state = state().await;
        deploy_route(State(state.clone()), Json(log_route("r1"))).await.unwrap();

        let resp = invoke_route(State(state), Path(("default".to_string(), "r1".to_string())), Some(Json(json!("hello")))).await.unwrap();
        assert_eq!(resp.0["success"], json!(true));
        assert_eq!(resp.0["routeId"], json!("r1"));
    }

    #[tokio::test]
    async fn list_routes_filters_by_tenant() {
        let state = state().await;
        deploy_route(State(state.clone()), Json(log_route("r1"))).await.unwrap();

        let resp = list_routes(State(state), Query(TenantQuery { tenant: Some("default".to_string()) })).await;
        assert_eq!(resp.0.len(), 1);
    }

    #[tokio::test]
    async fn get_route_returns_deployed_definition() {
        let state = state().await;
        deploy_route(State(state.clone()), Json(log_route("r1"))).await.unwrap();

        let resp = get_route(State(state), Path(("default".to_string(), "r1".to_string()))).await.unwrap();
        assert_eq!(resp.0.id, "r1");
    }

    #[tokio::test]
    async fn get_route_missing_is_not_found() {
        let state = state().await;
        let result = get_route(State(state), Path(("default".to_string(), "nope".to_string()))).await;
        assert!(matches!(result, Err(ApiError::Registry(RegistryError::RouteNotFound(_)))));
    }

    #[tokio::test]
    async fn stop_then_invoke_fails() {
        let state = state().await;
        deploy_route(State(state.clone()), Json(log_route("r1"))).await.unwrap();
        stop_route(State(state.clone()), Path(("default".to_string(), "r1".to_string()))).await.unwrap();

        let result = invoke_route(State(state), Path(("default".to_string(), "r1".to_string())), None).await;
        assert!(result.is_err());
    }
}
