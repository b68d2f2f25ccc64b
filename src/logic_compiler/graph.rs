//! Generic rooted directed graphs
//!
//! Nodes are addressed by dense arena indices (`NodeId`), so algorithms over a
//! graph keep their per-node state in plain vectors instead of identity-keyed
//! maps. Each node also has a string identity used for lookups, error messages
//! and Graphviz export.

use std::fmt::Write;

use crate::logic_compiler::error::LogicError;

/// Index of a node in its graph's arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A rooted directed graph whose nodes are `NodeId(0)..NodeId(node_count())`
pub trait Graph {
    fn root(&self) -> NodeId;

    fn node_count(&self) -> usize;

    /// Outward edges, in a stable order
    fn successors(&self, node: NodeId) -> Vec<NodeId>;

    /// Inward edges, in a stable order
    fn predecessors(&self, node: NodeId) -> Vec<NodeId>;

    /// Unique string identity of a node
    fn identity(&self, node: NodeId) -> String;

    /// Human readable label for Graphviz output
    fn display_label(&self, node: NodeId) -> String {
        self.identity(node)
    }

    /// Label of the edge `from -> to` for Graphviz output
    fn edge_label(&self, _from: NodeId, _to: NodeId) -> Option<String> {
        None
    }

    fn contains(&self, node: NodeId) -> bool {
        node.0 < self.node_count()
    }

    /// Find a node by its identity
    fn lookup(&self, identity: &str) -> Result<NodeId, LogicError> {
        (0..self.node_count())
            .map(NodeId)
            .find(|node| self.identity(*node) == identity)
            .ok_or_else(|| LogicError::UnknownNode(identity.to_string()))
    }

    /// Nodes without outward edges
    fn exits(&self) -> Vec<NodeId> {
        (0..self.node_count())
            .map(NodeId)
            .filter(|node| self.successors(*node).is_empty())
            .collect()
    }

    /// Preorder depth-first walk from the root. Reports every reachable node once
    /// together with its DFS-tree parent (`None` for the root). Edges to nodes
    /// already visited are skipped.
    fn depth_first<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, Option<NodeId>),
        Self: Sized,
    {
        let mut visited = vec![false; self.node_count()];
        let mut stack = vec![(self.root(), None)];

        while let Some((node, parent)) = stack.pop() {
            if !self.contains(node) || visited[node.0] {
                continue;
            }
            visited[node.0] = true;
            visit(node, parent);

            // Reversed so that the first successor is explored first
            for successor in self.successors(node).into_iter().rev() {
                if self.contains(successor) && !visited[successor.0] {
                    stack.push((successor, Some(node)));
                }
            }
        }
    }

    /// Nodes reachable from the root, in DFS preorder
    fn preorder(&self) -> Vec<NodeId>
    where
        Self: Sized,
    {
        let mut order = Vec::with_capacity(self.node_count());
        self.depth_first(|node, _| order.push(node));
        order
    }
}

/// A graph with every edge reversed.
///
/// Post-dominance is dominance on this graph. When the original graph has
/// several exits, a virtual exit node (index `node_count()` of the original)
/// becomes the root and every original exit is one of its successors.
pub struct ReverseGraph<'a, G: Graph> {
    graph: &'a G,
    root: NodeId,
    virtual_exit: Option<(NodeId, Vec<NodeId>)>,
}

impl<'a, G: Graph> ReverseGraph<'a, G> {
    /// Reverse `graph`, rooted at one of its own nodes
    pub fn rooted_at(graph: &'a G, root: NodeId) -> Self {
        ReverseGraph {
            graph,
            root,
            virtual_exit: None,
        }
    }

    /// Reverse `graph`, rooted at a new node that flows into every exit of `graph`
    pub fn with_virtual_exit(graph: &'a G) -> Self {
        let exit = NodeId(graph.node_count());
        ReverseGraph {
            graph,
            root: exit,
            virtual_exit: Some((exit, graph.exits())),
        }
    }

    /// The virtual exit node, if there is one
    pub fn virtual_exit(&self) -> Option<NodeId> {
        self.virtual_exit.as_ref().map(|(exit, _)| *exit)
    }

    fn is_virtual_exit(&self, node: NodeId) -> bool {
        self.virtual_exit() == Some(node)
    }
}

impl<G: Graph> Graph for ReverseGraph<'_, G> {
    fn root(&self) -> NodeId {
        self.root
    }

    fn node_count(&self) -> usize {
        self.graph.node_count() + usize::from(self.virtual_exit.is_some())
    }

    fn successors(&self, node: NodeId) -> Vec<NodeId> {
        match &self.virtual_exit {
            Some((exit, exits)) if *exit == node => exits.clone(),
            _ => self.graph.predecessors(node),
        }
    }

    fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        if self.is_virtual_exit(node) {
            return Vec::new();
        }
        let mut predecessors = self.graph.successors(node);
        if let Some((exit, exits)) = &self.virtual_exit {
            if exits.contains(&node) {
                predecessors.push(*exit);
            }
        }
        predecessors
    }

    fn identity(&self, node: NodeId) -> String {
        if self.is_virtual_exit(node) {
            "exit".to_string()
        } else {
            self.graph.identity(node)
        }
    }

    fn display_label(&self, node: NodeId) -> String {
        if self.is_virtual_exit(node) {
            "exit".to_string()
        } else {
            self.graph.display_label(node)
        }
    }

    fn edge_label(&self, from: NodeId, to: NodeId) -> Option<String> {
        if self.is_virtual_exit(from) || self.is_virtual_exit(to) {
            return None;
        }
        self.graph.edge_label(to, from)
    }
}

/// Escape a string for use inside a double-quoted DOT attribute
pub fn escape_dot(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\l")
}

/// Render every node reachable from the root, and the edges between them, as DOT
pub fn to_graphviz<G: Graph>(graph: &G, name: &str) -> String {
    let mut output = String::new();
    let reachable = graph.preorder();

    let _ = writeln!(output, "digraph \"{}\" {{", escape_dot(name));
    let _ = writeln!(output, "  node [shape=box, fontname=monospace];");
    for node in &reachable {
        let _ = writeln!(
            output,
            "  n{} [label=\"{}\"];",
            node.0,
            escape_dot(&graph.display_label(*node))
        );
    }
    for node in &reachable {
        for successor in graph.successors(*node) {
            match graph.edge_label(*node, successor) {
                Some(label) => {
                    let _ = writeln!(
                        output,
                        "  n{} -> n{} [label=\"{}\"];",
                        node.0,
                        successor.0,
                        escape_dot(&label)
                    );
                }
                None => {
                    let _ = writeln!(output, "  n{} -> n{};", node.0, successor.0);
                }
            }
        }
    }
    output.push_str("}\n");
    output
}
