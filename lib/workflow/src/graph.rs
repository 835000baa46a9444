//! Dependency view of a workflow's connections.
//!
//! The engine needs two things from the connection map: each node's
//! predecessors in connection order, and, when a run stops making progress,
//! the cycles among the stuck nodes. The latter uses petgraph's strongly
//! connected components.

use crate::definition::{NodeId, Workflow};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

/// Predecessor index over a workflow snapshot.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    /// Builds the index.
    ///
    /// Predecessors are ordered by source declaration order, then by the
    /// position of the connection in the source's target list. Each source
    /// appears once per target. Connections touching unknown nodes are
    /// ignored.
    #[must_use]
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), 0);
        let mut index = HashMap::with_capacity(workflow.nodes.len());
        for node in &workflow.nodes {
            index.insert(node.id.clone(), graph.add_node(node.id.clone()));
        }

        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in &workflow.nodes {
            let Some(targets) = workflow.connections.get(&node.id) else {
                continue;
            };
            for target in targets {
                let Some(&to) = index.get(&target.node) else {
                    continue;
                };
                let sources = predecessors.entry(target.node.clone()).or_default();
                if !sources.contains(&node.id) {
                    sources.push(node.id.clone());
                    if let Some(&from) = index.get(&node.id) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        Self {
            graph,
            predecessors,
        }
    }

    /// Returns the distinct sources feeding `node`, in connection order.
    #[must_use]
    pub fn predecessors(&self, node: &NodeId) -> &[NodeId] {
        self.predecessors
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if any connection targets `node`.
    #[must_use]
    pub fn has_incoming(&self, node: &NodeId) -> bool {
        !self.predecessors(node).is_empty()
    }

    /// Returns the cycles that lie entirely within `among`.
    ///
    /// Each cycle is a strongly connected component with more than one node,
    /// or a single node with a self-loop.
    #[must_use]
    pub fn cycles_among(&self, among: &[NodeId]) -> Vec<Vec<NodeId>> {
        let allowed: HashSet<&NodeId> = among.iter().collect();
        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|component| {
                let mut ids: Vec<NodeId> =
                    component.into_iter().map(|n| self.graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .filter(|ids| ids.iter().all(|id| allowed.contains(id)))
            .collect();
        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Node, WorkflowDefinition};
    use aura_core::WorkflowId;

    fn workflow(definition: WorkflowDefinition) -> Workflow {
        Workflow::from_definition(WorkflowId::new(), definition)
    }

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn predecessors_follow_declaration_then_connection_order() {
        let wf = workflow(
            WorkflowDefinition::new("merge")
                .with_node(Node::new("b", "B", "t"))
                .with_node(Node::new("a", "A", "t"))
                .with_node(Node::new("join", "Join", "t"))
                .connect("a", "join")
                .connect("b", "join")
                .connect("b", "join"),
        );
        let graph = DependencyGraph::build(&wf);

        assert_eq!(graph.predecessors(&NodeId::from("join")), ids(&["b", "a"]).as_slice());
        assert!(!graph.has_incoming(&NodeId::from("a")));
    }

    #[test]
    fn finds_cycles_and_self_loops() {
        let wf = workflow(
            WorkflowDefinition::new("loops")
                .with_node(Node::new("start", "Start", "t"))
                .with_node(Node::new("x", "X", "t"))
                .with_node(Node::new("y", "Y", "t"))
                .with_node(Node::new("z", "Z", "t"))
                .connect("start", "x")
                .connect("x", "y")
                .connect("y", "x")
                .connect("z", "z"),
        );
        let graph = DependencyGraph::build(&wf);

        let cycles = graph.cycles_among(&ids(&["x", "y", "z"]));
        assert_eq!(cycles, vec![ids(&["x", "y"]), ids(&["z"])]);
        assert!(graph.cycles_among(&ids(&["x"])).is_empty());
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let wf = workflow(
            WorkflowDefinition::new("line")
                .with_node(Node::new("a", "A", "t"))
                .with_node(Node::new("b", "B", "t"))
                .connect("a", "b"),
        );
        let graph = DependencyGraph::build(&wf);
        assert!(graph.cycles_among(&ids(&["a", "b"])).is_empty());
    }
}
