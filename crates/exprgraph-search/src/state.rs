//! Copy-on-write expansion over a frozen context graph.
//!
//! Once the context graph is encoded it is never touched again. All
//! speculative structure the decoder grows lives in an overlay: extra
//! nodes, extra edges, per-node embedding rows, and per-branch variable
//! bookkeeping. Branching the search is then a clone of the overlay
//! while the encoded context stays behind one `Arc`.
//!
//! Node ids share one space: ids below the context node count address
//! context nodes, ids at or above it address overlay nodes. Mutating a
//! context node through the overlay is a programming error and panics.

use std::collections::HashMap;
use std::sync::Arc;

use exprgraph_build::ContextGraph;
use exprgraph_core::{Attributes, EdgeKind, NodeId, NodeKind, ParentField, VarId};

/// The encoded context plus kind-aware adjacency, shared by every branch.
#[derive(Debug)]
pub struct SharedContext {
    pub cg: ContextGraph,
    incoming: Vec<Vec<(NodeId, EdgeKind)>>,
    outgoing: Vec<Vec<(NodeId, EdgeKind)>>,
}

impl SharedContext {
    pub fn new(cg: ContextGraph) -> Self {
        let mut incoming = vec![Vec::new(); cg.node_count()];
        let mut outgoing = vec![Vec::new(); cg.node_count()];
        for edge in cg.graph.edges() {
            if edge.forward {
                outgoing[edge.from.index()].push((edge.to, edge.kind));
                incoming[edge.to.index()].push((edge.from, edge.kind));
            }
        }
        SharedContext {
            cg,
            incoming,
            outgoing,
        }
    }
}

/// One node grown during expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct EgNode {
    pub kind: NodeKind,
    pub attrs: Attributes,
}

/// One forward edge grown during expansion.
///
/// Navigation-only edges let the decoder walk from new structure back
/// into the context but are never fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub nav_only: bool,
}

/// A variable as one search branch sees it: the context occurrences plus
/// any expansion nodes the branch has already bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgVariable {
    pub var: VarId,
    pub refs: Vec<NodeId>,
    pub latest: NodeId,
}

/// The overlay for one search branch.
#[derive(Debug, Clone)]
pub struct ExpansionState {
    shared: Arc<SharedContext>,
    nodes: Vec<EgNode>,
    edges: Vec<EgEdge>,
    node_states: HashMap<NodeId, Vec<f32>>,
    variables: Vec<EgVariable>,
}

impl ExpansionState {
    pub fn new(shared: Arc<SharedContext>) -> Self {
        let variables = shared
            .cg
            .variables
            .iter()
            .map(|v| EgVariable {
                var: v.var,
                refs: v.refs.iter().map(|(node, _)| *node).collect(),
                latest: v.latest,
            })
            .collect();
        ExpansionState {
            shared,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_states: HashMap::new(),
            variables,
        }
    }

    pub fn context(&self) -> &ContextGraph {
        &self.shared.cg
    }

    fn context_len(&self) -> usize {
        self.shared.cg.node_count()
    }

    pub fn is_eg(&self, id: NodeId) -> bool {
        id.index() >= self.context_len()
    }

    fn embedding_dim(&self) -> usize {
        self.shared
            .cg
            .node_states
            .first()
            .map_or(0, Vec::len)
    }

    // ---- nodes ----

    pub fn kind(&self, id: NodeId) -> NodeKind {
        if self.is_eg(id) {
            self.nodes[id.index() - self.context_len()].kind
        } else {
            self.shared.cg.graph.node(id).kind
        }
    }

    pub fn attrs(&self, id: NodeId) -> &Attributes {
        if self.is_eg(id) {
            &self.nodes[id.index() - self.context_len()].attrs
        } else {
            &self.shared.cg.graph.node(id).attrs
        }
    }

    /// Mutable attributes of an overlay node. Panics on a context node,
    /// which the expansion must never modify.
    pub fn attrs_mut(&mut self, id: NodeId) -> &mut Attributes {
        assert!(self.is_eg(id), "mutating context node {id}");
        let base = self.context_len();
        &mut self.nodes[id.index() - base].attrs
    }

    /// Appends an overlay node. Without an initial embedding the node
    /// starts at the zero state.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        attrs: Attributes,
        init_state: Option<Vec<f32>>,
    ) -> NodeId {
        let id = NodeId((self.context_len() + self.nodes.len()) as u32);
        self.nodes.push(EgNode { kind, attrs });
        let row = init_state.unwrap_or_else(|| vec![0.0; self.embedding_dim()]);
        self.node_states.insert(id, row);
        id
    }

    // ---- edges ----

    /// Adds a forward edge the model will see. The destination must be
    /// an overlay node: context nodes have frozen incoming structure.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        assert!(self.is_eg(to), "expansion edge into context node {to}");
        self.edges.push(EgEdge {
            from,
            to,
            kind,
            nav_only: false,
        });
    }

    /// Adds an edge used only for graph navigation, never fed.
    pub fn add_nav_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        self.edges.push(EgEdge {
            from,
            to,
            kind,
            nav_only: true,
        });
    }

    /// Removes the first overlay edge matching the triple. Edges inside
    /// the context cannot be removed; asking to is a decoder bug.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> bool {
        match self
            .edges
            .iter()
            .position(|e| e.from == from && e.to == to && e.kind == kind)
        {
            Some(pos) => {
                self.edges.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Forward edges the model is allowed to see.
    pub fn fed_edges(&self) -> impl Iterator<Item = &EgEdge> {
        self.edges.iter().filter(|e| !e.nav_only)
    }

    /// Sources of forward edges into `id`, context and overlay combined.
    pub fn incoming(&self, id: NodeId) -> Vec<(NodeId, EdgeKind)> {
        let mut out = if self.is_eg(id) {
            Vec::new()
        } else {
            self.shared.incoming[id.index()].clone()
        };
        out.extend(
            self.edges
                .iter()
                .filter(|e| e.to == id)
                .map(|e| (e.from, e.kind)),
        );
        out
    }

    /// Destinations of forward edges out of `id`.
    pub fn outgoing(&self, id: NodeId) -> Vec<(NodeId, EdgeKind)> {
        let mut out = if self.is_eg(id) {
            Vec::new()
        } else {
            self.shared.outgoing[id.index()].clone()
        };
        out.extend(
            self.edges
                .iter()
                .filter(|e| e.from == id)
                .map(|e| (e.to, e.kind)),
        );
        out
    }

    // ---- embeddings ----

    /// The embedding row of `id`: the overlay row when one exists, the
    /// encoder's row otherwise.
    pub fn state_row(&self, id: NodeId) -> &[f32] {
        if let Some(row) = self.node_states.get(&id) {
            return row;
        }
        &self.shared.cg.node_states[id.index()]
    }

    /// Replaces the embedding row of an overlay node.
    pub fn set_state(&mut self, id: NodeId, row: Vec<f32>) {
        assert!(self.is_eg(id), "writing state of context node {id}");
        self.node_states.insert(id, row);
    }

    // ---- variables ----

    pub fn variables(&self) -> &[EgVariable] {
        &self.variables
    }

    /// Binds `site` to the variable at `idx`: the site joins the
    /// variable's reference chain and becomes its latest occurrence.
    pub fn bind_variable(&mut self, idx: usize, site: NodeId) {
        let latest = self.variables[idx].latest;
        let latest_attrs = self.attrs(latest).clone();
        let latest_row = self.state_row(latest).to_vec();

        let site_attrs = self.attrs_mut(site);
        let data = site_attrs.data.clone();
        *site_attrs = latest_attrs;
        site_attrs.data = data;

        self.add_edge(latest, site, EdgeKind::DataFlow);
        self.set_state(site, latest_row);
        let var = &mut self.variables[idx];
        var.refs.push(site);
        var.latest = site;
    }

    // ---- syntax navigation ----

    /// The child of `id` hanging off `field`, preferring a context node
    /// over a speculative one when both exist.
    pub fn ast_child_for_field(&self, id: NodeId, field: ParentField) -> Option<NodeId> {
        let mut eg_candidate = None;
        for (child, kind) in self.outgoing(id) {
            if kind != EdgeKind::AstChild {
                continue;
            }
            if self.attrs(child).data.parent_field != Some(field) {
                continue;
            }
            if !self.is_eg(child) {
                return Some(child);
            }
            eg_candidate = Some(child);
        }
        eg_candidate
    }

    /// The child at a specific position within a list-valued field.
    pub fn ast_child_at(&self, id: NodeId, field: ParentField, pos: u32) -> Option<NodeId> {
        self.outgoing(id).into_iter().find_map(|(child, kind)| {
            let data = &self.attrs(child).data;
            (kind == EdgeKind::AstChild
                && data.parent_field == Some(field)
                && data.parent_pos == pos)
                .then_some(child)
        })
    }

    /// The syntax parent of `id`. Panics when there is none: the decoder
    /// only asks for parents of nodes it attached itself.
    pub fn ast_parent(&self, id: NodeId) -> NodeId {
        self.incoming(id)
            .into_iter()
            .find_map(|(parent, kind)| (kind == EdgeKind::AstChild).then_some(parent))
            .unwrap_or_else(|| panic!("no syntax parent for {id}"))
    }

    /// The nearest ancestor within `steps` AST hops whose label matches.
    pub fn ast_ancestor_with_label(
        &self,
        id: NodeId,
        steps: usize,
        label: &str,
    ) -> Option<NodeId> {
        self.recur_label(id, steps, label, |s, n| {
            s.incoming(n)
                .into_iter()
                .filter(|(_, k)| *k == EdgeKind::AstChild)
                .map(|(n, _)| n)
                .collect()
        })
    }

    /// The nearest descendant within `steps` AST hops whose label matches.
    pub fn ast_descendant_with_label(
        &self,
        id: NodeId,
        steps: usize,
        label: &str,
    ) -> Option<NodeId> {
        self.recur_label(id, steps, label, |s, n| {
            s.outgoing(n)
                .into_iter()
                .filter(|(_, k)| *k == EdgeKind::AstChild)
                .map(|(n, _)| n)
                .collect()
        })
    }

    fn recur_label(
        &self,
        start: NodeId,
        steps: usize,
        label: &str,
        neighbors: impl Fn(&Self, NodeId) -> Vec<NodeId>,
    ) -> Option<NodeId> {
        let mut frontier = vec![start];
        for _ in 0..steps {
            let mut next = Vec::new();
            for id in frontier {
                for nb in neighbors(self, id) {
                    if self.attrs(nb).label == label {
                        return Some(nb);
                    }
                    next.push(nb);
                }
            }
            frontier = next;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fixtures::{attr_site_context, name_site_context};
    use exprgraph_core::NodeKind;
    use exprgraph_model::marker;

    fn fresh_state() -> ExpansionState {
        ExpansionState::new(Arc::new(SharedContext::new(name_site_context())))
    }

    #[test]
    fn overlay_nodes_extend_the_id_space() {
        let mut st = fresh_state();
        let base = st.context().node_count();
        let id = st.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        assert_eq!(id.index(), base);
        assert!(st.is_eg(id));
        assert!(!st.is_eg(st.context().site));
        assert_eq!(st.attrs(id).label, "NameExpr");
    }

    #[test]
    fn forks_do_not_share_overlay_mutations() {
        let mut a = fresh_state();
        let id = a.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        let b = a.clone();
        a.attrs_mut(id).literal = marker::INFER_NAME_MARKER.to_owned();
        assert_eq!(b.attrs(id).literal, "");
        assert_eq!(a.attrs(id).literal, marker::INFER_NAME_MARKER);
    }

    #[test]
    fn navigation_merges_context_and_overlay() {
        let mut st = fresh_state();
        let site = st.context().site;
        let parents_before = st.incoming(site).len();
        let id = st.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        st.add_edge(site, id, EdgeKind::AstChild);
        assert!(st
            .outgoing(site)
            .iter()
            .any(|&(n, k)| n == id && k == EdgeKind::AstChild));
        assert_eq!(st.incoming(site).len(), parents_before);
        assert_eq!(st.ast_parent(id), site);
    }

    #[test]
    #[should_panic(expected = "expansion edge into context node")]
    fn fed_edges_cannot_point_into_the_context() {
        let mut st = fresh_state();
        let site = st.context().site;
        let id = st.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        st.add_edge(id, site, EdgeKind::AstChild);
    }

    #[test]
    fn nav_edges_are_walkable_but_not_fed() {
        let mut st = fresh_state();
        let site = st.context().site;
        let id = st.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        st.add_nav_edge(id, site, EdgeKind::AstChild);
        assert!(st.outgoing(id).iter().any(|&(n, _)| n == site));
        assert_eq!(st.fed_edges().count(), 0);
    }

    #[test]
    fn bind_variable_moves_the_reference_chain_forward() {
        let mut st = fresh_state();
        let latest = st.variables()[0].latest;
        let reflen = st.variables()[0].refs.len();
        let site = st.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        st.bind_variable(0, site);
        let v = &st.variables()[0];
        assert_eq!(v.latest, site);
        assert_eq!(v.refs.len(), reflen + 1);
        assert_eq!(st.attrs(site).literal, st.attrs(latest).literal);
        assert!(st
            .fed_edges()
            .any(|e| e.from == latest && e.to == site && e.kind == EdgeKind::DataFlow));
        assert_eq!(st.state_row(site), st.state_row(latest));
    }

    #[test]
    fn child_lookup_prefers_context_nodes() {
        let st = ExpansionState::new(Arc::new(SharedContext::new(attr_site_context())));
        let site = st.context().site;
        // the attribute access hangs off a real value child in the buffer
        let value = st.ast_child_for_field(site, ParentField::Value);
        assert!(value.is_some());
        assert!(!st.is_eg(value.unwrap()));
    }
}
