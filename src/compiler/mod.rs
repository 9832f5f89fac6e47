//! Graph -> executable compiler (§4.2): converts a flat node/edge graph
//! into a scoped execution tree, validating structure along the way.

pub mod error;
mod exceptions;
mod graph;
mod tree;
pub mod uri;

pub use error::{CompileError, ValidationError};
pub use exceptions::{is_assignable as exception_is_assignable, ROOT_EXCEPTION_TYPE};
pub use tree::{CatchHandler, ChoiceBranch, CompiledBody, CompiledNode, Executable};

use crate::domain::{internal_key, Edge, EdgeHandle, Node, NodeType, RouteDefinition};
use std::collections::HashMap;

/// Scheme/host allowlists consulted by [`RouteCompiler::validate`].
/// Empty vectors permit everything (§3: "empty allowlist = permit-all").
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    pub allowed_uri_schemes: Vec<String>,
    pub allowed_http_hosts: Vec<String>,
}

#[derive(Clone)]
pub struct RouteCompiler {
    config: CompilerConfig,
}

impl RouteCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Runs every compile-time invariant from §3 without building a
    /// tree. `deploy` calls this first; `compile` also calls it so the
    /// two never drift apart.
    pub fn validate(&self, def: &RouteDefinition) -> Result<(), ValidationError> {
        if def.tenant_id.contains(crate::domain::INTERNAL_KEY_SEPARATOR) {
            return Err(ValidationError::InvalidTenantId(def.tenant_id.clone()));
        }
        if def.id.contains(crate::domain::INTERNAL_KEY_SEPARATOR) {
            return Err(ValidationError::InvalidRouteId(def.id.clone()));
        }

        let from_nodes: Vec<&Node> = def.nodes.iter().filter(|n| n.node_type == NodeType::From).collect();
        let from = match from_nodes.as_slice() {
            [] => return Err(ValidationError::MissingFrom),
            [single] => *single,
            _ => return Err(ValidationError::MissingFrom),
        };
        if from.uri.as_deref().unwrap_or("").is_empty() {
            return Err(ValidationError::FromMissingUri);
        }

        let mut seen_ids = std::collections::HashSet::new();
        for node in &def.nodes {
            if node.id.is_empty() || !seen_ids.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        let nodes_by_id: HashMap<&str, &Node> = def.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for edge in &def.edges {
            if !nodes_by_id.contains_key(edge.source.as_str()) {
                return Err(ValidationError::DanglingEdge { edge: edge.id.clone(), node: edge.source.clone() });
            }
            if !nodes_by_id.contains_key(edge.target.as_str()) {
                return Err(ValidationError::DanglingEdge { edge: edge.id.clone(), node: edge.target.clone() });
            }
        }

        let adjacency = graph::build_adjacency(&def.edges);
        let reachable = graph::detect_cycle_and_collect_reachable(&from.id, &adjacency)?;

        let unreachable: Vec<String> = def
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| !reachable.contains(id.as_str()))
            .collect();
        if !unreachable.is_empty() {
            return Err(ValidationError::Unreachable(unreachable));
        }

        for node in &def.nodes {
            let out_edges: Vec<&Edge> = def.edges.iter().filter(|e| e.source == node.id).collect();
            match node.node_type {
                NodeType::Choice => {
                    if !out_edges.iter().any(|e| matches!(e.source_handle, Some(EdgeHandle::When) | Some(EdgeHandle::Otherwise))) {
                        return Err(ValidationError::ChoiceMissingBranch(node.id.clone()));
                    }
                }
                NodeType::TryCatch => {
                    if !out_edges.iter().any(|e| matches!(e.source_handle, Some(EdgeHandle::Try))) {
                        return Err(ValidationError::TryCatchMissingTry(node.id.clone()));
                    }
                }
                NodeType::From | NodeType::To => {
                    if let Some(uri) = &node.uri {
                        if !uri.is_empty() {
                            uri::check_uri_allowed(uri, &self.config.allowed_uri_schemes, &self.config.allowed_http_hosts)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// `compile(def) -> Executable`. Runs [`Self::validate`] first.
    pub fn compile(&self, def: &RouteDefinition) -> Result<Executable, CompileError> {
        self.validate(def)?;

        let nodes_by_id: HashMap<&str, &Node> = def.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let adjacency = graph::build_adjacency(&def.edges);
        let from = def.from_node().expect("validate() already guaranteed exactly one from node");

        let root = self.compile_node(&from.id, &nodes_by_id, &adjacency)?;
        Ok(Executable { internal_key: internal_key(&def.tenant_id, &def.id), root })
    }

    fn compile_node(
        &self,
        node_id: &str,
        nodes_by_id: &HashMap<&str, &Node>,
        adjacency: &HashMap<&str, Vec<&Edge>>,
    ) -> Result<CompiledNode, CompileError> {
        let node = (*nodes_by_id
            .get(node_id)
            .ok_or_else(|| CompileError::UnresolvableEndpoint(node_id.to_string()))?)
        .clone();
        let out_edges = adjacency.get(node_id).cloned().unwrap_or_default();

        let body = match node.node_type {
            NodeType::Choice => self.compile_choice(&out_edges, nodes_by_id, adjacency)?,
            NodeType::TryCatch => self.compile_try_catch(&out_edges, nodes_by_id, adjacency)?,
            NodeType::Split | NodeType::Loop | NodeType::Filter | NodeType::Multicast => {
                CompiledBody::Scope { body: self.compile_targets(&out_edges, nodes_by_id, adjacency)? }
            }
            _ => CompiledBody::Inline { next: self.compile_targets(&out_edges, nodes_by_id, adjacency)? },
        };

        Ok(CompiledNode { node, body })
    }

    fn compile_targets(
        &self,
        edges: &[&Edge],
        nodes_by_id: &HashMap<&str, &Node>,
        adjacency: &HashMap<&str, Vec<&Edge>>,
    ) -> Result<Vec<CompiledNode>, CompileError> {
        edges.iter().map(|e| self.compile_node(&e.target, nodes_by_id, adjacency)).collect()
    }

    /// Build one region per `when` edge plus a single merged `otherwise`
    /// region, in declaration order (§4.2 "choice").
    fn compile_choice(
        &self,
        out_edges: &[&Edge],
        nodes_by_id: &HashMap<&str, &Node>,
        adjacency: &HashMap<&str, Vec<&Edge>>,
    ) -> Result<CompiledBody, CompileError> {
        let mut branches = Vec::new();
        let mut otherwise_edges = Vec::new();

        for edge in out_edges {
            match edge.source_handle {
                Some(EdgeHandle::When) => {
                    let region = vec![self.compile_node(&edge.target, nodes_by_id, adjacency)?];
                    branches.push(ChoiceBranch { condition: edge.condition.clone(), region });
                }
                Some(EdgeHandle::Otherwise) => otherwise_edges.push(*edge),
                _ => {}
            }
        }

        let otherwise = self.compile_targets(&otherwise_edges, nodes_by_id, adjacency)?;
        Ok(CompiledBody::Choice { branches, otherwise })
    }

    /// Concatenate `try` edges' subtrees; group `catch` edges by
    /// `exceptionType` (default [`ROOT_EXCEPTION_TYPE`]) into one
    /// handler per group (§4.2 "tryCatch").
    fn compile_try_catch(
        &self,
        out_edges: &[&Edge],
        nodes_by_id: &HashMap<&str, &Node>,
        adjacency: &HashMap<&str, Vec<&Edge>>,
    ) -> Result<CompiledBody, CompileError> {
        let try_edges: Vec<&Edge> = out_edges.iter().filter(|e| matches!(e.source_handle, Some(EdgeHandle::Try))).copied().collect();
        let try_body = self.compile_targets(&try_edges, nodes_by_id, adjacency)?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&Edge>> = HashMap::new();
        for edge in out_edges.iter().filter(|e| matches!(e.source_handle, Some(EdgeHandle::Catch))) {
            let exception_type = edge.exception_type.clone().unwrap_or_else(|| ROOT_EXCEPTION_TYPE.to_string());
            if !groups.contains_key(&exception_type) {
                order.push(exception_type.clone());
            }
            groups.entry(exception_type).or_default().push(edge);
        }

        let mut catches = Vec::new();
        for exception_type in order {
            let edges = groups.remove(&exception_type).unwrap_or_default();
            let region = self.compile_targets(&edges, nodes_by_id, adjacency)?;
            catches.push(CatchHandler { exception_type, region });
        }

        Ok(CompiledBody::TryCatch { try_body, catches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Edge, EdgeHandle, ExpressionLanguage, Node, NodeType, RouteDefinition, RouteStatus};
    use std::collections::HashMap;

    fn node(id: &str, node_type: NodeType, uri: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            node_type,
            uri: uri.map(|s| s.to_string()),
            message: None,
            expression: None,
            expression_language: ExpressionLanguage::Simple,
            properties: HashMap::new(),
            position_x: 0.0,
            position_y: 0.0,
        }
    }

    fn edge(id: &str, source: &str, target: &str, handle: Option<EdgeHandle>) -> Edge {
        Edge { id: id.to_string(), source: source.to_string(), target: target.to_string(), source_handle: handle, condition: None, exception_type: None }
    }

    fn compiler() -> RouteCompiler {
        RouteCompiler::new(CompilerConfig::default())
    }

    #[test]
    fn simple_log_route_compiles() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("from1", NodeType::From, Some("direct:r1")), node("log1", NodeType::Log, None)],
            edges: vec![edge("e1", "from1", "log1", None)],
        };
        let exe = compiler().compile(&def).unwrap();
        assert_eq!(exe.internal_key, "t1::r1");
        match &exe.root.body {
            CompiledBody::Inline { next } => assert_eq!(next.len(), 1),
            _ => panic!("expected inline body"),
        }
    }

    #[test]
    fn missing_from_node_rejected() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("log1", NodeType::Log, None)],
            edges: vec![],
        };
        assert!(matches!(compiler().validate(&def), Err(ValidationError::MissingFrom)));
    }

    #[test]
    fn choice_without_branch_handle_rejected() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("from1", NodeType::From, Some("direct:r1")), node("choice1", NodeType::Choice, None), node("log1", NodeType::Log, None)],
            edges: vec![edge("e1", "from1", "choice1", None), edge("e2", "choice1", "log1", None)],
        };
        assert!(matches!(compiler().validate(&def), Err(ValidationError::ChoiceMissingBranch(_))));
    }

    #[test]
    fn choice_branches_compile_in_declared_order() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![
                node("from1", NodeType::From, Some("direct:r1")),
                node("choice1", NodeType::Choice, None),
                node("high", NodeType::Log, None),
                node("low", NodeType::Log, None),
            ],
            edges: vec![
                edge("e1", "from1", "choice1", None),
                edge("e2", "choice1", "high", Some(EdgeHandle::When)),
                edge("e3", "choice1", "low", Some(EdgeHandle::Otherwise)),
            ],
        };
        let exe = compiler().compile(&def).unwrap();
        let CompiledBody::Inline { next } = &exe.root.body else { panic!("expected inline") };
        let CompiledBody::Choice { branches, otherwise } = &next[0].body else { panic!("expected choice") };
        assert_eq!(branches.len(), 1);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn cycle_is_rejected() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("from1", NodeType::From, Some("direct:r1")), node("a", NodeType::Log, None), node("b", NodeType::Log, None)],
            edges: vec![edge("e1", "from1", "a", None), edge("e2", "a", "b", None), edge("e3", "b", "a", None)],
        };
        assert!(matches!(compiler().validate(&def), Err(ValidationError::GraphCycle(_))));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("from1", NodeType::From, Some("direct:r1")), node("orphan", NodeType::Log, None)],
            edges: vec![],
        };
        assert!(matches!(compiler().validate(&def), Err(ValidationError::Unreachable(_))));
    }

    #[test]
    fn disallowed_scheme_blocks_compile() {
        let def = RouteDefinition {
            schema_version: 1,
            tenant_id: "t1".into(),
            id: "r1".into(),
            name: None,
            description: None,
            status: RouteStatus::Draft,
            nodes: vec![node("from1", NodeType::From, Some("ftp:forbidden"))],
            edges: vec![],
        };
        let c = RouteCompiler::new(CompilerConfig { allowed_uri_schemes: vec!["direct".to_string()], allowed_http_hosts: vec![] });
        assert!(matches!(c.validate(&def), Err(ValidationError::DisallowedScheme(_))));
    }
}
