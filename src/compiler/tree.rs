//! The scoped execution tree a [`super::RouteCompiler`] produces from a
//! flat graph (§4.2).

use crate::domain::{Node, NodeType};

/// One `when` branch of a compiled `choice` node.
#[derive(Debug, Clone)]
pub struct ChoiceBranch {
    pub condition: Option<String>,
    pub region: Vec<CompiledNode>,
}

/// One exception-typed handler of a compiled `tryCatch` node. `catch`
/// edges sharing an `exceptionType` (default `Exception`) are grouped
/// into a single handler whose region is their subtrees' union.
#[derive(Debug, Clone)]
pub struct CatchHandler {
    pub exception_type: String,
    pub region: Vec<CompiledNode>,
}

/// A single compiled vertex plus, for scoped types, the child region(s)
/// built from its outgoing edges (§4.2's scoped/inline split).
#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub node: Node,
    pub body: CompiledBody,
}

#[derive(Debug, Clone)]
pub enum CompiledBody {
    /// Inline node: all outgoing edges become sequential successors,
    /// executed one after another.
    Inline { next: Vec<CompiledNode> },
    /// `choice`: one region per `when` edge plus at most one merged
    /// `otherwise` region.
    Choice {
        branches: Vec<ChoiceBranch>,
        otherwise: Vec<CompiledNode>,
    },
    /// `tryCatch`: one try region, N typed catch handlers.
    TryCatch {
        try_body: Vec<CompiledNode>,
        catches: Vec<CatchHandler>,
    },
    /// `split` / `loop` / `filter` / `multicast`: a single region
    /// composed of all outgoing edges' subtrees, interpreted per the
    /// node type's runtime policy.
    Scope { body: Vec<CompiledNode> },
}

impl CompiledNode {
    pub fn node_type(&self) -> NodeType {
        self.node.node_type
    }
}

/// A fully compiled, installable route.
#[derive(Debug, Clone)]
pub struct Executable {
    pub internal_key: String,
    pub root: CompiledNode,
}
