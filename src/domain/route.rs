//! Route definitions: the persisted, versioned graph artifact.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a persisted route definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteStatus {
    Draft,
    Deployed,
    Stopped,
}

/// Expression language used to evaluate a node's `expression`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionLanguage {
    Simple,
    Constant,
    Jsonpath,
}

impl Default for ExpressionLanguage {
    fn default() -> Self {
        ExpressionLanguage::Simple
    }
}

/// The canonical node type token set (§6). Case-insensitive on input,
/// normalized lower-case for storage and compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    From,
    To,
    Log,
    SetBody,
    Transform,
    Filter,
    Choice,
    Delay,
    Split,
    Aggregate,
    Multicast,
    Enrich,
    TryCatch,
    Loop,
    Throttle,
    WireTap,
    ConvertBodyTo,
    Debit,
    Credit,
    SagaTransfer,
    Compensate,
}

impl NodeType {
    /// Parse a node type token case-insensitively.
    pub fn parse(token: &str) -> Option<NodeType> {
        let normalized = token.to_ascii_lowercase();
        Some(match normalized.as_str() {
            "from" => NodeType::From,
            "to" => NodeType::To,
            "log" => NodeType::Log,
            "setbody" => NodeType::SetBody,
            "transform" => NodeType::Transform,
            "filter" => NodeType::Filter,
            "choice" => NodeType::Choice,
            "delay" => NodeType::Delay,
            "split" => NodeType::Split,
            "aggregate" => NodeType::Aggregate,
            "multicast" => NodeType::Multicast,
            "enrich" => NodeType::Enrich,
            "trycatch" => NodeType::TryCatch,
            "loop" => NodeType::Loop,
            "throttle" => NodeType::Throttle,
            "wiretap" => NodeType::WireTap,
            "convertbodyto" => NodeType::ConvertBodyTo,
            "debit" => NodeType::Debit,
            "credit" => NodeType::Credit,
            "sagatransfer" => NodeType::SagaTransfer,
            "compensate" => NodeType::Compensate,
            _ => return None,
        })
    }

    /// Scoped node types create a child region whose outgoing edges are
    /// children, not successors. Everything else is inline: its outgoing
    /// edges are sequential successors. Centralized here as the single
    /// table the compiler consults (kept off the compiler itself so every
    /// caller agrees on the split).
    pub fn is_scoped(self) -> bool {
        matches!(
            self,
            NodeType::Filter
                | NodeType::Split
                | NodeType::Loop
                | NodeType::Choice
                | NodeType::TryCatch
                | NodeType::Multicast
        )
    }

    pub fn is_saga(self) -> bool {
        matches!(
            self,
            NodeType::Debit | NodeType::Credit | NodeType::SagaTransfer | NodeType::Compensate
        )
    }

    /// The canonical wire token for this type (§6 "Node type set").
    pub fn canonical_token(self) -> &'static str {
        match self {
            NodeType::From => "from",
            NodeType::To => "to",
            NodeType::Log => "log",
            NodeType::SetBody => "setBody",
            NodeType::Transform => "transform",
            NodeType::Filter => "filter",
            NodeType::Choice => "choice",
            NodeType::Delay => "delay",
            NodeType::Split => "split",
            NodeType::Aggregate => "aggregate",
            NodeType::Multicast => "multicast",
            NodeType::Enrich => "enrich",
            NodeType::TryCatch => "tryCatch",
            NodeType::Loop => "loop",
            NodeType::Throttle => "throttle",
            NodeType::WireTap => "wireTap",
            NodeType::ConvertBodyTo => "convertBodyTo",
            NodeType::Debit => "debit",
            NodeType::Credit => "credit",
            NodeType::SagaTransfer => "sagaTransfer",
            NodeType::Compensate => "compensate",
        }
    }
}

/// A graph vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub expression_language: ExpressionLanguage,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
}

/// Semantic handle distinguishing a branching node's outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeHandle {
    When,
    Otherwise,
    Try,
    Catch,
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<EdgeHandle>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub exception_type: Option<String>,
}

/// The persisted, versioned artifact a client deploys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: RouteStatus,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_tenant_id() -> String {
    "default".to_string()
}

fn default_status() -> RouteStatus {
    RouteStatus::Draft
}

/// Separator joining `tenantId` and `id` into the runtime route handle.
pub const INTERNAL_KEY_SEPARATOR: &str = "::";
/// Maximum length of a derived internal key.
pub const MAX_INTERNAL_KEY_LEN: usize = 128;

impl RouteDefinition {
    /// `tenantId::id` — the runtime route handle used by the registry,
    /// executor, and event bus.
    pub fn internal_key(&self) -> String {
        internal_key(&self.tenant_id, &self.id)
    }

    pub fn from_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type == NodeType::From)
    }
}

pub fn internal_key(tenant_id: &str, id: &str) -> String {
    format!("{tenant_id}{INTERNAL_KEY_SEPARATOR}{id}")
}

/// Splits an internal key back into `(tenantId, id)`. Returns `None` for
/// legacy keys that predate tenant scoping (no separator present).
pub fn split_internal_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(INTERNAL_KEY_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_parse_is_case_insensitive() {
        assert_eq!(NodeType::parse("SagaTransfer"), Some(NodeType::SagaTransfer));
        assert_eq!(NodeType::parse("FROM"), Some(NodeType::From));
        assert_eq!(NodeType::parse("bogus"), None);
    }

    #[test]
    fn scoped_table_matches_spec() {
        assert!(NodeType::Choice.is_scoped());
        assert!(NodeType::TryCatch.is_scoped());
        assert!(NodeType::Split.is_scoped());
        assert!(NodeType::Loop.is_scoped());
        assert!(NodeType::Filter.is_scoped());
        assert!(NodeType::Multicast.is_scoped());
        assert!(!NodeType::Log.is_scoped());
        assert!(!NodeType::To.is_scoped());
    }

    #[test]
    fn internal_key_joins_tenant_and_id() {
        assert_eq!(internal_key("acme", "r1"), "acme::r1");
        assert_eq!(split_internal_key("acme::r1"), Some(("acme", "r1")));
        assert_eq!(split_internal_key("legacy-key"), None);
    }
}
