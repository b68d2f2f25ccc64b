/// dominance.rs - Dominator and post-dominator trees
///
/// Immediate dominators are computed with the Semi-NCA algorithm:
///
/// 1. A depth-first walk numbers the reachable nodes in preorder and records
///    each node's DFS-tree parent.
/// 2. In reverse preorder, each node's semidominator is the smallest-numbered
///    candidate among its DFS parent, its predecessors numbered below it, and
///    the semidominators found by evaluating its other predecessors through a
///    link/eval spanning forest with path compression.
/// 3. In preorder, each node's immediate dominator starts at its DFS parent and
///    climbs the already-final dominator chain until it is numbered no higher
///    than the node's semidominator.
///
/// Post-dominators are dominators of the reversed graph (`ReverseGraph`).
///
/// Path compression walks an explicit stack, so deep forests cannot overflow
/// the call stack.
use std::fmt::Write;

use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::graph::{escape_dot, Graph, NodeId, ReverseGraph};

/// One node of a dominator tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTreeNode {
    pub node: NodeId,
    /// `None` only for the root
    pub immediate_dominator: Option<NodeId>,
    /// Nodes immediately dominated by this one
    pub dominates: Vec<NodeId>,
    // Entry/exit numbers of a walk over the dominator tree
    enter: usize,
    exit: usize,
}

#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeId,
    nodes: Vec<Option<DominatorTreeNode>>,
    identities: Vec<String>,
}

/// Semidominator state, indexed by preorder number
struct SemiNca {
    semi: Vec<usize>,
    label: Vec<usize>,
    ancestor: Vec<Option<usize>>,
}

impl SemiNca {
    fn new(count: usize) -> Self {
        SemiNca {
            semi: (0..count).collect(),
            label: (0..count).collect(),
            ancestor: vec![None; count],
        }
    }

    fn link(&mut self, parent: usize, node: usize) {
        self.ancestor[node] = Some(parent);
    }

    /// Node with the smallest semidominator on the forest path above `v`
    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v].is_none() {
            return v;
        }
        self.compress(v);
        self.label[v]
    }

    fn compress(&mut self, v: usize) {
        // Collect the path up to the node just below the forest root, then
        // compress it top-down.
        let mut path = Vec::new();
        let mut current = v;
        while let Some(ancestor) = self.ancestor[current] {
            if self.ancestor[ancestor].is_none() {
                break;
            }
            path.push(current);
            current = ancestor;
        }

        while let Some(node) = path.pop() {
            if let Some(ancestor) = self.ancestor[node] {
                if self.semi[self.label[ancestor]] < self.semi[self.label[node]] {
                    self.label[node] = self.label[ancestor];
                }
                self.ancestor[node] = self.ancestor[ancestor];
            }
        }
    }
}

impl DominatorTree {
    /// Build the dominator tree of `graph` rooted at `graph.root()`.
    /// Nodes unreachable from the root are left out of the tree.
    pub fn build<G: Graph>(graph: &G) -> Self {
        let node_count = graph.node_count();

        // Step 1: DFS numbering
        let mut vertex: Vec<NodeId> = Vec::with_capacity(node_count);
        let mut number: Vec<Option<usize>> = vec![None; node_count];
        let mut parent: Vec<usize> = Vec::with_capacity(node_count);
        graph.depth_first(|node, dfs_parent| {
            let parent_number = dfs_parent.and_then(|p| number[p.0]).unwrap_or(0);
            number[node.0] = Some(vertex.len());
            parent.push(parent_number);
            vertex.push(node);
        });
        let count = vertex.len();
        log::trace!(
            "dominators: {} of {} nodes reachable from {}",
            count,
            node_count,
            graph.identity(graph.root())
        );

        // Step 2: semidominators, reverse preorder
        let mut state = SemiNca::new(count);
        for w in (1..count).rev() {
            let mut semi = parent[w];
            for predecessor in graph.predecessors(vertex[w]) {
                let Some(v) = number.get(predecessor.0).copied().flatten() else {
                    continue;
                };
                let candidate = if v < w {
                    v
                } else {
                    let u = state.eval(v);
                    state.semi[u]
                };
                semi = semi.min(candidate);
            }
            state.semi[w] = semi;
            state.link(parent[w], w);
        }

        // Step 3: immediate dominators, preorder
        let mut idom = parent;
        for w in 1..count {
            while idom[w] > state.semi[w] {
                idom[w] = idom[idom[w]];
            }
        }

        // Step 4: materialize
        let mut nodes: Vec<Option<DominatorTreeNode>> = vec![None; node_count];
        for (w, node) in vertex.iter().enumerate() {
            nodes[node.0] = Some(DominatorTreeNode {
                node: *node,
                immediate_dominator: if w == 0 { None } else { Some(vertex[idom[w]]) },
                dominates: Vec::new(),
                enter: 0,
                exit: 0,
            });
        }
        for (w, node) in vertex.iter().enumerate().skip(1) {
            if let Some(dominator) = nodes[vertex[idom[w]].0].as_mut() {
                dominator.dominates.push(*node);
            }
        }

        let identities = (0..node_count)
            .map(|i| graph.identity(NodeId(i)))
            .collect();
        let mut tree = DominatorTree {
            root: graph.root(),
            nodes,
            identities,
        };
        if count > 0 {
            tree.number_tree();
        }
        tree
    }

    /// Build the post-dominator tree of `graph`: the dominator tree of the
    /// reversed graph, rooted at a virtual exit joining every exit node. The
    /// virtual exit is `NodeId(graph.node_count())`.
    pub fn post_dominators<G: Graph>(graph: &G) -> Self {
        DominatorTree::build(&ReverseGraph::with_virtual_exit(graph))
    }

    /// Number the tree with entry/exit counters so that ancestry is an
    /// interval check.
    fn number_tree(&mut self) {
        let mut counter = 0;
        let mut stack = vec![(self.root, false)];
        while let Some((node, finished)) = stack.pop() {
            let Some(entry) = self.nodes[node.0].as_mut() else {
                continue;
            };
            if finished {
                entry.exit = counter;
                counter += 1;
                continue;
            }
            entry.enter = counter;
            counter += 1;
            stack.push((node, true));
            for child in entry.dominates.iter().rev() {
                stack.push((*child, false));
            }
        }
    }

    fn unknown(&self, node: NodeId) -> LogicError {
        let identity = self
            .identities
            .get(node.0)
            .cloned()
            .unwrap_or_else(|| format!("#{}", node.0));
        LogicError::UnknownNode(identity)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0), Some(Some(_)))
    }

    pub fn node(&self, node: NodeId) -> Result<&DominatorTreeNode, LogicError> {
        self.nodes
            .get(node.0)
            .and_then(|entry| entry.as_ref())
            .ok_or_else(|| self.unknown(node))
    }

    /// Find a tree node by the identity it had in the graph
    pub fn lookup(&self, identity: &str) -> Result<NodeId, LogicError> {
        self.identities
            .iter()
            .position(|candidate| candidate == identity)
            .map(NodeId)
            .filter(|node| self.contains(*node))
            .ok_or_else(|| LogicError::UnknownNode(identity.to_string()))
    }

    pub fn immediate_dominator(&self, node: NodeId) -> Result<Option<NodeId>, LogicError> {
        Ok(self.node(node)?.immediate_dominator)
    }

    /// Children of `node` in the tree
    pub fn dominated(&self, node: NodeId) -> Result<&[NodeId], LogicError> {
        Ok(&self.node(node)?.dominates)
    }

    /// Every path from the root to `b` passes through `a` (reflexive)
    pub fn dominates(&self, a: NodeId, b: NodeId) -> Result<bool, LogicError> {
        let a = self.node(a)?;
        let b = self.node(b)?;
        Ok(a.enter <= b.enter && b.exit <= a.exit)
    }

    pub fn immediately_dominates(&self, a: NodeId, b: NodeId) -> Result<bool, LogicError> {
        self.node(a)?;
        Ok(self.node(b)?.immediate_dominator == Some(a))
    }

    /// Reachable nodes, by node index
    pub fn nodes(&self) -> impl Iterator<Item = &DominatorTreeNode> {
        self.nodes.iter().flatten()
    }

    /// DOT rendering with one edge per immediate-dominator relation
    pub fn to_graphviz(&self, name: &str) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "digraph \"{}\" {{", escape_dot(name));
        let _ = writeln!(output, "  node [shape=box, fontname=monospace];");
        for entry in self.nodes() {
            let _ = writeln!(
                output,
                "  n{} [label=\"{}\"];",
                entry.node.0,
                escape_dot(&self.identities[entry.node.0])
            );
        }
        for entry in self.nodes() {
            for child in &entry.dominates {
                let _ = writeln!(
                    output,
                    "  n{} -> n{} [label=\"idom\"];",
                    entry.node.0, child.0
                );
            }
        }
        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
#[path = "dominance_tests.rs"]
mod tests;
