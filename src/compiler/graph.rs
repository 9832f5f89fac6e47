//! Cycle detection and forward reachability over the flat edge list
//! (§4.2 "Cycle detection", "Reachability").

use super::error::ValidationError;
use crate::domain::Edge;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Visiting,
    Visited,
}

/// Builds an adjacency map preserving each node's outgoing edges in
/// declaration order.
pub fn build_adjacency<'a>(edges: &'a [Edge]) -> HashMap<&'a str, Vec<&'a Edge>> {
    let mut adjacency: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.source.as_str()).or_default().push(edge);
    }
    adjacency
}

/// Depth-first walk from `from_id` coloring nodes `visiting`/`visited`;
/// a back-edge into a `visiting` node aborts with `GraphCycle`. On
/// success, returns the set of nodes reachable from `from_id` (the same
/// walk serves both the cycle check and reachability collection).
pub fn detect_cycle_and_collect_reachable(
    from_id: &str,
    adjacency: &HashMap<&str, Vec<&Edge>>,
) -> Result<HashSet<String>, ValidationError> {
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut reachable: HashSet<String> = HashSet::new();
    visit(from_id, adjacency, &mut colors, &mut reachable)?;
    Ok(reachable)
}

fn visit<'a>(
    node_id: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a Edge>>,
    colors: &mut HashMap<String, Color>,
    reachable: &mut HashSet<String>,
) -> Result<(), ValidationError> {
    colors.insert(node_id.to_string(), Color::Visiting);
    reachable.insert(node_id.to_string());

    if let Some(out_edges) = adjacency.get(node_id) {
        for edge in out_edges {
            match colors.get(edge.target.as_str()) {
                Some(Color::Visiting) => {
                    return Err(ValidationError::GraphCycle(edge.target.clone()));
                }
                Some(Color::Visited) => continue,
                None => visit(&edge.target, adjacency, colors, reachable)?,
            }
        }
    }

    colors.insert(node_id.to_string(), Color::Visited);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EdgeHandle;

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None::<EdgeHandle>,
            condition: None,
            exception_type: None,
        }
    }

    #[test]
    fn linear_chain_has_no_cycle() {
        let edges = vec![edge("e1", "a", "b"), edge("e2", "b", "c")];
        let adjacency = build_adjacency(&edges);
        let reachable = detect_cycle_and_collect_reachable("a", &adjacency).unwrap();
        assert_eq!(reachable.len(), 3);
    }

    #[test]
    fn back_edge_is_rejected() {
        let edges = vec![edge("e1", "a", "b"), edge("e2", "b", "c"), edge("e3", "c", "a")];
        let adjacency = build_adjacency(&edges);
        let err = detect_cycle_and_collect_reachable("a", &adjacency).unwrap_err();
        assert!(matches!(err, ValidationError::GraphCycle(_)));
    }

    #[test]
    fn unreachable_nodes_are_simply_absent_from_the_set() {
        let edges = vec![edge("e1", "a", "b")];
        let adjacency = build_adjacency(&edges);
        let reachable = detect_cycle_and_collect_reachable("a", &adjacency).unwrap();
        assert!(!reachable.contains("z"));
    }
}
