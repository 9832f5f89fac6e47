//! Liveness probe; no database or registry round-trip.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::version::VERSION }))
}
