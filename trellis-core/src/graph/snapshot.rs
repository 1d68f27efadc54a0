//! Point-in-time view of the graph for debugging and tooling.

use serde::{Deserialize, Serialize};

use super::{GraphState, NodeId, NodeStatus};

/// One node as seen by [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// `"<name>"` or `"<name>(<key>)"`.
    pub label: String,
    pub status: NodeStatus,
    /// Whether the node is recomputed eagerly.
    pub hot: bool,
    /// Labels of the nodes read during the last computation.
    pub dependencies: Vec<String>,
    /// Labels of the nodes that read this one.
    pub listeners: Vec<String>,
    /// Number of attached subscription callbacks and autosubscribe bindings.
    pub callbacks: usize,
}

/// Every node of the current thread's graph, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &GraphState) -> Self {
        let label = |id: NodeId| graph.node(id).label().to_string();
        let nodes = graph
            .iter()
            .map(|(_, node)| NodeSnapshot {
                label: node.label().to_string(),
                status: node.status(),
                hot: node.is_hot(),
                dependencies: node.dependencies().iter().copied().map(label).collect(),
                listeners: node.listeners().iter().copied().map(label).collect(),
                callbacks: node.callbacks().len(),
            })
            .collect();
        Self { nodes }
    }

    /// First node with the given label.
    pub fn node(&self, label: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.label == label)
    }

    /// Number of nodes that are not clean.
    pub fn stale_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| !node.status.is_clean())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::error::Result;
    use crate::graph::NodeSlot;

    struct Constant;

    impl NodeSlot for Constant {
        fn evaluate(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn capture_resolves_edge_labels() {
        let mut graph = GraphState::default();
        let a = graph.insert("a", Rc::new(Constant));
        let b = graph.insert("b(1)", Rc::new(Constant));
        graph.commit_dependencies(b, [a].into_iter().collect());
        graph.node_mut(a).set_status(NodeStatus::Clean);

        let snapshot = GraphSnapshot::capture(&graph);
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.stale_count(), 1);

        let b = snapshot.node("b(1)").unwrap();
        assert_eq!(b.dependencies, vec!["a".to_string()]);
        assert_eq!(b.status, NodeStatus::Dirty);
        assert_eq!(snapshot.node("a").unwrap().listeners, vec!["b(1)".to_string()]);
        assert!(snapshot.node("c").is_none());
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snapshot = GraphSnapshot {
            nodes: vec![NodeSnapshot {
                label: "a".into(),
                status: NodeStatus::Check,
                hot: true,
                dependencies: vec![],
                listeners: vec!["b".into()],
                callbacks: 1,
            }],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["nodes"][0]["status"], "Check");
        assert_eq!(json["nodes"][0]["listeners"][0], "b");

        let back: GraphSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
