//! The graph arena.
//!
//! [`Graph`] owns all nodes and edges in two dense vectors. Node identity
//! is the index into the node vector, so lookups are array indexing and a
//! whole graph clones with `Clone`. All mutations go through `Graph`
//! methods so the paired-edge invariant cannot be violated from outside:
//! every relation except scope edges exists as a forward/backward pair,
//! inserted atomically by [`Graph::add_relation`].
//!
//! Misuse of the mutation API (out-of-range IDs, scope edges from
//! non-scope nodes) is a programming error and panics rather than
//! returning an error.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::edge::{Edge, EdgeKind};
use crate::id::NodeId;
use crate::node::{Attributes, NodeKind};

/// One node in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub attrs: Attributes,
    /// Neighbors reachable by following any stored edge out of this node.
    /// Because relations are paired, this makes traversal effectively
    /// undirected everywhere except scope edges.
    outgoing: IndexSet<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, attrs: Attributes) -> Self {
        Node {
            kind,
            attrs,
            outgoing: IndexSet::new(),
        }
    }

    /// Neighbors in insertion order.
    pub fn outgoing(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing.iter().copied()
    }
}

/// Dense arena of nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node for `id`. Panics if `id` is out of range.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Mutable attributes of `id`. Panics if `id` is out of range.
    pub fn attrs_mut(&mut self, id: NodeId) -> &mut Attributes {
        &mut self.nodes[id.index()].attrs
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// IDs of all nodes with the given kind, ascending.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| n.kind == kind)
            .map(|(id, _)| id)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Appends a node and returns its ID.
    pub fn add_node(&mut self, kind: NodeKind, attrs: Attributes) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, attrs));
        id
    }

    /// Inserts the forward/backward pair for one relation.
    ///
    /// Panics if either endpoint is out of range, if `from == to`, or if
    /// `kind` is [`EdgeKind::ScopeEdge`] (scope edges are single-direction
    /// and go through [`Graph::add_scope_edge`]).
    pub fn add_relation(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        assert!(kind != EdgeKind::ScopeEdge, "scope edges are not paired");
        assert!(from != to, "self edge {from} ({kind})");
        assert!(from.index() < self.nodes.len(), "edge from missing node {from}");
        assert!(to.index() < self.nodes.len(), "edge to missing node {to}");

        let fwd = Edge {
            from,
            to,
            kind,
            forward: true,
        };
        self.edges.push(fwd);
        self.edges.push(fwd.reversed());
        self.nodes[from.index()].outgoing.insert(to);
        self.nodes[to.index()].outgoing.insert(from);
    }

    /// Inserts a single-direction scope edge from a reference node to the
    /// scope node standing for its variable.
    ///
    /// Panics if `scope` is not a [`NodeKind::Scope`] node or either
    /// endpoint is out of range.
    pub fn add_scope_edge(&mut self, from: NodeId, scope: NodeId) {
        assert!(from.index() < self.nodes.len(), "edge from missing node {from}");
        assert!(
            self.nodes[scope.index()].kind == NodeKind::Scope,
            "scope edge to non-scope node {scope}"
        );
        self.edges.push(Edge {
            from,
            to: scope,
            kind: EdgeKind::ScopeEdge,
            forward: true,
        });
        self.nodes[from.index()].outgoing.insert(scope);
    }

    // -----------------------------------------------------------------------
    // Pruning
    // -----------------------------------------------------------------------

    /// Nodes reachable from `seeds` in at most `hops` neighbor steps.
    ///
    /// Traversal follows the stored outgoing sets, so paired relations are
    /// walked in both directions while scope edges are walked only toward
    /// the scope node. Seeds are included at distance zero.
    pub fn reachable(&self, seeds: &[NodeId], hops: usize) -> IndexSet<NodeId> {
        let mut seen: IndexSet<NodeId> = seeds.iter().copied().collect();
        let mut frontier: Vec<NodeId> = seeds.to_vec();
        for _ in 0..hops {
            let mut next = Vec::new();
            for id in frontier {
                for nb in self.nodes[id.index()].outgoing() {
                    if seen.insert(nb) {
                        next.push(nb);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        seen
    }

    /// Drops every node not in `keep`, renumbering survivors densely in
    /// ascending old-ID order. Edges with a dropped endpoint are removed
    /// and neighbor sets rebuilt. Returns the old-to-new mapping.
    pub fn restrict_to(&mut self, keep: &IndexSet<NodeId>) -> Vec<Option<NodeId>> {
        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let mut kept = Vec::with_capacity(keep.len());
        for (i, node) in self.nodes.drain(..).enumerate() {
            let old = NodeId(i as u32);
            if keep.contains(&old) {
                remap[i] = Some(NodeId(kept.len() as u32));
                kept.push(node);
            }
        }
        for node in &mut kept {
            node.outgoing = node
                .outgoing
                .iter()
                .filter_map(|nb| remap[nb.index()])
                .collect();
        }
        self.nodes = kept;
        self.edges.retain_mut(|edge| {
            match (remap[edge.from.index()], remap[edge.to.index()]) {
                (Some(from), Some(to)) => {
                    edge.from = from;
                    edge.to = to;
                    true
                }
                _ => false,
            }
        });
        remap
    }

    /// [`Graph::reachable`] followed by [`Graph::restrict_to`].
    pub fn prune(&mut self, seeds: &[NodeId], hops: usize) -> Vec<Option<NodeId>> {
        let keep = self.reachable(seeds, hops);
        self.restrict_to(&keep)
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Verifies the paired-edge invariant and endpoint validity.
    #[cfg(debug_assertions)]
    pub fn assert_consistency(&self) {
        use std::collections::HashSet;
        let stored: HashSet<Edge> = self.edges.iter().copied().collect();
        for edge in &self.edges {
            assert!(edge.from.index() < self.nodes.len());
            assert!(edge.to.index() < self.nodes.len());
            if edge.kind == EdgeKind::ScopeEdge {
                assert!(edge.forward, "backward scope edge {edge:?}");
                continue;
            }
            assert!(
                stored.contains(&edge.reversed()),
                "unpaired edge {edge:?}"
            );
        }
    }
}
