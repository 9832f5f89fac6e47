//! In-memory compiled-route index and the deploy/start/stop/remove/delete
//! lifecycle (§4.1).
//!
//! Generalizes the teacher's whole-map `RwLock<HashMap<...>>` keyed
//! registry (`pattern/registry.rs`'s `PatternRegistry`) to a per-key
//! `tokio::sync::Mutex` guard table: the spec requires mutations on one
//! route key to serialize without blocking readers or mutations on other
//! keys, which a single whole-map lock cannot express.

pub mod error;

pub use error::RegistryError;

use crate::compiler::{Executable, RouteCompiler};
use crate::domain::{internal_key, ExecutionExchange, RouteDefinition, RouteStatus};
use crate::executor::{DirectRouteInvoker, ExecutionError, Executor};
use crate::store::RouteStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone)]
struct Installed {
    definition: RouteDefinition,
    executable: Option<Arc<Executable>>,
}

/// Owns the three pieces of process-wide state named in §5's
/// "locking discipline": the compiled-route map (`routes`), and the
/// per-route mutation-lock map (`locks`). The subscription/history map
/// lives in [`crate::events::EventBus`].
pub struct RouteRegistry {
    compiler: RouteCompiler,
    executor: Arc<Executor>,
    store: RouteStore,
    routes: parking_lot::RwLock<HashMap<String, Installed>>,
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RouteRegistry {
    pub fn new(compiler: RouteCompiler, executor: Arc<Executor>, store: RouteStore) -> Arc<Self> {
        Arc::new(Self {
            compiler,
            executor,
            store,
            routes: parking_lot::RwLock::new(HashMap::new()),
            locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    /// Startup reload (§4.1): read every row, install its definition into
    /// the in-memory index, and compile+activate every row whose
    /// persisted status is `DEPLOYED`. A row that fails to compile is
    /// installed inert (no executable) rather than aborting the reload.
    pub async fn reload(&self) -> Result<(), RegistryError> {
        let defs = self.store.list_all().await?;
        for def in defs {
            let key = def.internal_key();
            let executable = if def.status == RouteStatus::Deployed {
                match self.compiler.compile(&def) {
                    Ok(exe) => Some(Arc::new(exe)),
                    Err(e) => {
                        tracing::warn!(route = %key, error = %e, "route failed to compile during startup reload, leaving inert");
                        None
                    }
                }
            } else {
                None
            };
            self.routes.write().insert(key, Installed { definition: def, executable });
        }
        Ok(())
    }

    /// Validates, compiles, installs, and persists `def` under its
    /// internal key. The in-memory index is mutated only once compile
    /// and persist both succeed, so a failure at either step leaves
    /// whatever was previously installed (if anything) untouched —
    /// the "atomic redeploy" / "rollback on failure" properties (§8)
    /// without needing a separate remove-then-reinstall step.
    pub async fn deploy(&self, mut def: RouteDefinition) -> Result<RouteDefinition, RegistryError> {
        self.compiler.validate(&def)?;
        let key = def.internal_key();
        let lock = self.lock_for(&key);
        let _permit = lock.lock_owned().await;

        let compiled = self.compiler.compile(&def)?;
        def.status = RouteStatus::Deployed;
        self.store.upsert(&def).await?;

        self.routes.write().insert(key, Installed { definition: def.clone(), executable: Some(Arc::new(compiled)) });
        Ok(def)
    }

    /// Compiles the currently-installed definition and activates it.
    /// Persists the status change only after the in-memory transition
    /// succeeds, so a compile failure never touches persisted status
    /// (§4.1 "Start/stop failures leave the persisted status unchanged
    /// if the in-memory transition fails").
    pub async fn start_route(&self, tenant_id: &str, id: &str) -> Result<(), RegistryError> {
        let key = internal_key(tenant_id, id);
        let lock = self.lock_for(&key);
        let _permit = lock.lock_owned().await;

        let def = self
            .routes
            .read()
            .get(&key)
            .map(|installed| installed.definition.clone())
            .ok_or_else(|| RegistryError::RouteNotFound(key.clone()))?;

        let compiled = self.compiler.compile(&def)?;
        self.store.update_status(&key, RouteStatus::Deployed).await?;

        if let Some(installed) = self.routes.write().get_mut(&key) {
            installed.executable = Some(Arc::new(compiled));
            installed.definition.status = RouteStatus::Deployed;
        }
        Ok(())
    }

    /// Deactivates the route: new invocations are rejected (no
    /// executable installed), but running invocations are untouched —
    /// the executor holds its own `Arc<Executable>` snapshot per
    /// invocation (§5 "Cancellation").
    pub async fn stop_route(&self, tenant_id: &str, id: &str) -> Result<(), RegistryError> {
        let key = internal_key(tenant_id, id);
        let lock = self.lock_for(&key);
        let _permit = lock.lock_owned().await;

        if !self.routes.read().contains_key(&key) {
            return Err(RegistryError::RouteNotFound(key));
        }

        self.store.update_status(&key, RouteStatus::Stopped).await?;
        if let Some(installed) = self.routes.write().get_mut(&key) {
            installed.executable = None;
            installed.definition.status = RouteStatus::Stopped;
        }
        Ok(())
    }

    /// Forgets the route in-memory without touching the persisted
    /// catalog; a subsequent [`Self::reload`] (process restart) would
    /// reinstall it from storage. Used by [`Self::delete_route`]'s
    /// first phase and available standalone for tenant-scoped eviction.
    pub fn remove_route(&self, tenant_id: &str, id: &str) -> Result<(), RegistryError> {
        let key = internal_key(tenant_id, id);
        match self.routes.write().remove(&key) {
            Some(_) => Ok(()),
            None => Err(RegistryError::RouteNotFound(key)),
        }
    }

    /// Two-phase delete (§4.1): remove from memory first, then delete
    /// the persisted row. If the row delete fails the route is already
    /// gone from the runtime; callers retry the delete.
    pub async fn delete_route(&self, tenant_id: &str, id: &str) -> Result<(), RegistryError> {
        let key = internal_key(tenant_id, id);
        let lock = self.lock_for(&key);
        let _permit = lock.lock_owned().await;

        self.routes.write().remove(&key);
        self.store.delete(&key).await?;
        Ok(())
    }

    /// Readers never block: a plain read-lock over the index, no
    /// per-key mutation lock involved.
    /// Invokes a deployed route's `from` endpoint directly, the way an
    /// inbound HTTP `POST invoke(tenant,id,body)` call does (§6 "Wire
    /// protocol"). A route that exists but has no installed executable
    /// (stopped, or failed to compile at reload) reports
    /// `RouteNotDeployed` rather than `RouteNotFound`.
    pub async fn invoke(&self, tenant_id: &str, id: &str, exchange: ExecutionExchange) -> Result<ExecutionExchange, RegistryError> {
        let key = internal_key(tenant_id, id);
        let executable = {
            let routes = self.routes.read();
            let installed = routes.get(&key).ok_or_else(|| RegistryError::RouteNotFound(key.clone()))?;
            installed.executable.clone().ok_or_else(|| RegistryError::RouteNotDeployed(key.clone()))?
        };
        Ok(self.executor.invoke(executable.as_ref(), &key, exchange, self).await?)
    }

    pub fn get_route(&self, tenant_id: &str, id: &str) -> Option<RouteDefinition> {
        let key = internal_key(tenant_id, id);
        self.routes.read().get(&key).map(|installed| installed.definition.clone())
    }

    pub fn list_routes(&self, tenant_id: &str) -> Vec<RouteDefinition> {
        self.routes
            .read()
            .values()
            .filter(|installed| installed.definition.tenant_id == tenant_id)
            .map(|installed| installed.definition.clone())
            .collect()
    }

    /// Explicit teardown (§5 "Global state"): stop every active
    /// executable so no new direct invocation resolves.
    pub fn shutdown(&self) {
        for installed in self.routes.write().values_mut() {
            installed.executable = None;
        }
    }
}

#[async_trait]
impl DirectRouteInvoker for RouteRegistry {
    async fn invoke_direct(&self, internal_key: &str, exchange: ExecutionExchange) -> Result<ExecutionExchange, ExecutionError> {
        let executable = self
            .routes
            .read()
            .get(internal_key)
            .and_then(|installed| installed.executable.clone())
            .ok_or_else(|| ExecutionError::RouteNotFound(internal_key.to_string()))?;
        self.executor.invoke(executable.as_ref(), internal_key, exchange, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerConfig;
    use crate::domain::{Node, NodeType, RouteDefinition, RouteStatus};
    use crate::events::EventBus;
    use crate::executor::{Executor, ExecutorConfig};
    use crate::saga::{AccountStore, SagaCoordinator};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn in_memory_pool() -> sqlx::SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn registry() -> Arc<RouteRegistry> {
        let pool = in_memory_pool().await;
        let store = RouteStore::new(pool.clone(), 1);
        let saga = SagaCoordinator::new(AccountStore::new(pool));
        let events = EventBus::new(Default::default());
        let executor = Arc::new(Executor::new(saga, events, ExecutorConfig::default()));
        let compiler = RouteCompiler::new(CompilerConfig::default());
        RouteRegistry::new(compiler, executor, store)
    }

    fn log_route(tenant: &str, id: &str) -> RouteDefinition {
        RouteDefinition {
            schema_version: 1,
            tenant_id: tenant.to_string(),
            id: id.to_string(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![
                Node {
                    id: "from1".to_string(),
                    node_type: NodeType::From,
                    uri: Some(format!("direct:{id}")),
                    message: None,
                    expression: None,
                    expression_language: Default::default(),
                    properties: Default::default(),
                    position_x: 0.0,
                    position_y: 0.0,
                },
                Node {
                    id: "log1".to_string(),
                    node_type: NodeType::Log,
                    uri: None,
                    message: Some("hi".to_string()),
                    expression: None,
                    expression_language: Default::default(),
                    properties: Default::default(),
                    position_x: 0.0,
                    position_y: 0.0,
                },
            ],
            edges: vec![crate::domain::Edge {
                id: "e1".to_string(),
                source: "from1".to_string(),
                target: "log1".to_string(),
                source_handle: None,
                condition: None,
                exception_type: None,
            }],
        }
    }

    #[tokio::test]
    async fn deploy_then_get_route_reflects_deployed_status() {
        let registry = registry().await;
        let deployed = registry.deploy(log_route("t1", "r1")).await.unwrap();
        assert_eq!(deployed.status, RouteStatus::Deployed);

        let fetched = registry.get_route("t1", "r1").unwrap();
        assert_eq!(fetched.status, RouteStatus::Deployed);
    }

    #[tokio::test]
    async fn stop_then_direct_invoke_fails_with_route_not_found() {
        let registry = registry().await;
        registry.deploy(log_route("t1", "r1")).await.unwrap();
        registry.stop_route("t1", "r1").await.unwrap();

        let result = registry.invoke_direct("t1::r1", ExecutionExchange::new("t1::r1", serde_json::json!("hi"))).await;
        assert!(matches!(result, Err(ExecutionError::RouteNotFound(_))));
    }

    #[tokio::test]
    async fn delete_route_removes_from_store_and_memory() {
        let registry = registry().await;
        registry.deploy(log_route("t1", "r1")).await.unwrap();
        registry.delete_route("t1", "r1").await.unwrap();

        assert!(registry.get_route("t1", "r1").is_none());
        assert!(registry.store.get("t1::r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redeploy_failure_leaves_prior_route_installed() {
        let registry = registry().await;
        registry.deploy(log_route("t1", "r1")).await.unwrap();

        let mut broken = log_route("t1", "r1");
        broken.nodes.push(Node {
            id: "from1".to_string(),
            node_type: NodeType::From,
            uri: Some("direct:dup".to_string()),
            message: None,
            expression: None,
            expression_language: Default::default(),
            properties: Default::default(),
            position_x: 0.0,
            position_y: 0.0,
        });

        let result = registry.deploy(broken).await;
        assert!(result.is_err());

        let still_there = registry.get_route("t1", "r1").unwrap();
        assert_eq!(still_there.status, RouteStatus::Deployed);
    }
}
