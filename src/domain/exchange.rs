//! The mutable per-invocation state flowing through a route.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ephemeral per-invocation state: headers, a JSON-addressable body, and
/// cached derived properties. Lives for the duration of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionExchange {
    pub headers: HashMap<String, serde_json::Value>,
    pub body: serde_json::Value,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub from_route_id: String,
}

impl ExecutionExchange {
    pub fn new(from_route_id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            headers: HashMap::new(),
            body,
            properties: HashMap::new(),
            from_route_id: from_route_id.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.as_str())
    }
}
