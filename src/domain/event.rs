//! Per-node execution telemetry fanned out by the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the event originates from a route node executed by this core,
/// or from the surrounding process engine (treated only as an activity
/// source; see crate docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionEventKind {
    #[serde(rename = "CAMEL_NODE")]
    RouteNode,
    #[serde(rename = "CAMUNDA_TASK")]
    ProcessTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionEventStatus {
    Started,
    Completed,
    Failed,
}

/// `(taskId, type, nodeType, routeId, status, message, result, error,
/// durationMs, timestamp, processInstanceId?, activityId?)` from §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: ExecutionEventKind,
    pub node_type: String,
    pub route_id: String,
    pub status: ExecutionEventStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub process_instance_id: Option<String>,
    #[serde(default)]
    pub activity_id: Option<String>,
}

impl ExecutionEvent {
    pub fn started(route_id: impl Into<String>, node_type: impl Into<String>, node_id: &str) -> Self {
        Self {
            task_id: node_id.to_string(),
            kind: ExecutionEventKind::RouteNode,
            node_type: node_type.into(),
            route_id: route_id.into(),
            status: ExecutionEventStatus::Started,
            message: None,
            result: None,
            error: None,
            duration_ms: None,
            timestamp: Utc::now(),
            process_instance_id: None,
            activity_id: None,
        }
    }

    pub fn completed(mut self, message: Option<String>, result: Option<serde_json::Value>, duration_ms: u64) -> Self {
        self.status = ExecutionEventStatus::Completed;
        self.message = message;
        self.result = result;
        self.duration_ms = Some(duration_ms);
        self.timestamp = Utc::now();
        self
    }

    pub fn failed(mut self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.status = ExecutionEventStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = Some(duration_ms);
        self.timestamp = Utc::now();
        self
    }

    /// The target id under which the event bus rings/keys history: the
    /// process instance id when the event was raised by the surrounding
    /// process engine, otherwise the route id.
    pub fn target_id(&self) -> &str {
        self.process_instance_id.as_deref().unwrap_or(&self.route_id)
    }
}
