//! Durable route catalog persistence (§4.6, §6 `routes` table).
//!
//! Grounded on the teacher's repository idiom of a thin struct wrapping a
//! pool with plain `sqlx::query` calls (see `db::repositories::workflow_repo`),
//! extended with the schema-version normalization and legacy-key rewrite
//! `RouteStore` needs that a plain CRUD repository does not.

pub mod error;
mod migration;

pub use error::StoreError;

use crate::domain::{internal_key, split_internal_key, RouteDefinition, RouteStatus};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

fn status_str(status: RouteStatus) -> &'static str {
    match status {
        RouteStatus::Draft => "DRAFT",
        RouteStatus::Deployed => "DEPLOYED",
        RouteStatus::Stopped => "STOPPED",
    }
}

fn parse_status(s: &str) -> RouteStatus {
    match s {
        "DEPLOYED" => RouteStatus::Deployed,
        "STOPPED" => RouteStatus::Stopped,
        _ => RouteStatus::Draft,
    }
}

/// Persists and loads route definitions keyed by their internal key.
/// Normalizes each loaded row's `schemaVersion` forward through
/// [`migration::migrate_forward`] and rewrites legacy (non-tenant-scoped)
/// primary keys on first load, best-effort (§4.6).
pub struct RouteStore {
    pool: SqlitePool,
    current_schema_version: u32,
}

impl RouteStore {
    pub fn new(pool: SqlitePool, current_schema_version: u32) -> Self {
        Self { pool, current_schema_version }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts or overwrites the row for `def.internal_key()`.
    pub async fn upsert(&self, def: &RouteDefinition) -> Result<(), StoreError> {
        let key = def.internal_key();
        let definition_json = serde_json::to_string(def).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO routes (id, name, tenant_id, description, definition_json, status, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, description = excluded.description, \
             definition_json = excluded.definition_json, status = excluded.status, version = excluded.version, updated_at = excluded.updated_at",
        )
        .bind(&key)
        .bind(&def.name)
        .bind(&def.tenant_id)
        .bind(&def.description)
        .bind(&definition_json)
        .bind(status_str(def.status))
        .bind(def.schema_version as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn update_status(&self, internal_key: &str, status: RouteStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE routes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status_str(status))
            .bind(Utc::now())
            .bind(internal_key)
            .execute(&self.pool)
            .await
            .map_err(crate::db::DatabaseError::from)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(internal_key.to_string()));
        }
        Ok(())
    }

    /// Two-phase delete per §4.1: callers remove the route from the
    /// in-memory index first, then call this. If this fails the route is
    /// already gone from the runtime and callers are expected to retry.
    pub async fn delete(&self, internal_key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM routes WHERE id = ?")
            .bind(internal_key)
            .execute(&self.pool)
            .await
            .map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn get(&self, internal_key: &str) -> Result<Option<RouteDefinition>, StoreError> {
        let row = sqlx::query("SELECT id, definition_json, status, version FROM routes WHERE id = ?")
            .bind(internal_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(crate::db::DatabaseError::from)?;
        match row {
            Some(row) => Ok(Some(self.load_row(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<RouteDefinition>, StoreError> {
        let rows = sqlx::query("SELECT id, definition_json, status, version FROM routes WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(crate::db::DatabaseError::from)?;
        let mut defs = Vec::with_capacity(rows.len());
        for row in rows {
            defs.push(self.load_row(row).await?);
        }
        Ok(defs)
    }

    /// Every row, for startup reload (§4.1 "startup reload").
    pub async fn list_all(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        let rows = sqlx::query("SELECT id, definition_json, status, version FROM routes")
            .fetch_all(&self.pool)
            .await
            .map_err(crate::db::DatabaseError::from)?;
        let mut defs = Vec::with_capacity(rows.len());
        for row in rows {
            defs.push(self.load_row(row).await?);
        }
        Ok(defs)
    }

    /// Deserializes one row, migrates its `schemaVersion` forward, and
    /// rewrites a legacy (non-`::`) key to its tenant-scoped form.
    async fn load_row(&self, row: sqlx::sqlite::SqliteRow) -> Result<RouteDefinition, StoreError> {
        let key: String = row.try_get("id").map_err(crate::db::DatabaseError::from)?;
        let definition_json: String = row.try_get("definition_json").map_err(crate::db::DatabaseError::from)?;
        let status: String = row.try_get("status").map_err(crate::db::DatabaseError::from)?;

        let mut value: serde_json::Value =
            serde_json::from_str(&definition_json).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let source_version = value.get("schemaVersion").and_then(serde_json::Value::as_u64).unwrap_or(1) as u32;
        if source_version > self.current_schema_version {
            return Err(StoreError::SchemaVersionUnsupported(source_version));
        }
        value = migration::migrate_forward(value, source_version, self.current_schema_version);

        let mut def: RouteDefinition =
            serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        def.status = parse_status(&status);

        if split_internal_key(&key).is_none() {
            self.migrate_legacy_key(&key, &def).await;
        }

        Ok(def)
    }

    /// Best-effort: a legacy row (primary key without `::`) is rewritten
    /// to the tenant-scoped key. Failure leaves the row untouched but
    /// still usable under its legacy key (§4.6).
    async fn migrate_legacy_key(&self, legacy_key: &str, def: &RouteDefinition) {
        let new_key = internal_key(&def.tenant_id, &def.id);
        if new_key == legacy_key {
            return;
        }
        let result = sqlx::query("UPDATE routes SET id = ? WHERE id = ?")
            .bind(&new_key)
            .bind(legacy_key)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::warn!(legacy_key, new_key, error = %e, "failed to migrate legacy route key, leaving row as-is");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeType, RouteDefinition};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> RouteStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.expect("in-memory sqlite");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations apply");
        RouteStore::new(pool, 1)
    }

    fn sample(tenant: &str, id: &str) -> RouteDefinition {
        RouteDefinition {
            schema_version: 1,
            tenant_id: tenant.to_string(),
            id: id.to_string(),
            name: Some("sample".to_string()),
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![crate::domain::Node {
                id: "from1".to_string(),
                node_type: NodeType::From,
                uri: Some("direct:r1".to_string()),
                message: None,
                expression: None,
                expression_language: Default::default(),
                properties: Default::default(),
                position_x: 0.0,
                position_y: 0.0,
            }],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = store().await;
        let def = sample("t1", "r1");
        store.upsert(&def).await.unwrap();

        let loaded = store.get(&internal_key("t1", "r1")).await.unwrap().unwrap();
        assert_eq!(loaded.id, "r1");
        assert_eq!(loaded.tenant_id, "t1");
        assert_eq!(loaded.status, RouteStatus::Draft);
    }

    #[tokio::test]
    async fn update_status_persists() {
        let store = store().await;
        let def = sample("t1", "r1");
        store.upsert(&def).await.unwrap();
        store.update_status(&internal_key("t1", "r1"), RouteStatus::Deployed).await.unwrap();

        let loaded = store.get(&internal_key("t1", "r1")).await.unwrap().unwrap();
        assert_eq!(loaded.status, RouteStatus::Deployed);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = store().await;
        let def = sample("t1", "r1");
        store.upsert(&def).await.unwrap();
        store.delete(&internal_key("t1", "r1")).await.unwrap();

        assert!(store.get(&internal_key("t1", "r1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_tenant_filters() {
        let store = store().await;
        store.upsert(&sample("t1", "r1")).await.unwrap();
        store.upsert(&sample("t2", "r2")).await.unwrap();

        let t1_routes = store.list_by_tenant("t1").await.unwrap();
        assert_eq!(t1_routes.len(), 1);
        assert_eq!(t1_routes[0].id, "r1");
    }

    #[tokio::test]
    async fn legacy_key_is_migrated_on_load() {
        let store = store().await;
        let def = sample("t1", "r1");
        let definition_json = serde_json::to_string(&def).unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO routes (id, name, tenant_id, description, definition_json, status, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind("legacy-r1")
        .bind(&def.name)
        .bind(&def.tenant_id)
        .bind(&def.description)
        .bind(&definition_json)
        .bind("DRAFT")
        .bind(1_i64)
        .bind(now)
        .bind(now)
        .execute(store.pool())
        .await
        .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(store.get(&internal_key("t1", "r1")).await.unwrap().is_some());
        assert!(store.get("legacy-r1").await.unwrap().is_none());
    }
}
