//! Graph construction from a resolved buffer.
//!
//! The builder materializes one node per syntax-tree node, one node per
//! surviving source token not absorbed by a terminal, and a start-of-file
//! marker, then lays the requested relation families over them. Callers
//! keep working through the builder until they are done mutating, then
//! take the graph with [`GraphBuilder::finish`].

use std::collections::HashMap;

use tracing::debug;

use exprgraph_analysis::ast::{Expr, NameExpr, Stmt};
use exprgraph_analysis::walk::{walk, walk_edges, NodeRef};
use exprgraph_analysis::{forward_flow, Analysis, NameUsage, ScopeTree, Span, VariableManager};
use exprgraph_core::{
    AstId, Attributes, EdgeKind, EdgeSet, Graph, NodeId, NodeKind, ParentField, TokenKind, VarId,
};
use exprgraph_model::feed::MAX_CONTEXT_TOKENS;
use exprgraph_model::marker;

use crate::error::BuildError;

/// Builds the relation graph of one analyzed buffer.
pub struct GraphBuilder<'a> {
    analysis: &'a Analysis,
    graph: Graph,
    vm: VariableManager,
    scopes: ScopeTree,
    module_node: NodeId,
    sof_node: NodeId,
    ast_nodes: HashMap<AstId, NodeId>,
    /// Word-node attachments deferred until edge construction.
    word_children: Vec<(NodeId, NodeId)>,
    /// Graph node carrying each surviving token, in source order. A
    /// multi-word terminal appears once per word it absorbed.
    token_chain: Vec<NodeId>,
    usage_kinds: HashMap<AstId, NameUsage>,
    name_spans: HashMap<AstId, Span>,
}

impl<'a> GraphBuilder<'a> {
    /// Creates all nodes for the buffer. Relations other than the ones
    /// implied by node creation are added by [`GraphBuilder::build_edges`].
    pub fn new(analysis: &'a Analysis, include_unresolved: bool) -> Self {
        let vm = VariableManager::build(analysis, include_unresolved);
        let scopes = ScopeTree::build(&analysis.module, &vm);

        let mut graph = Graph::new();
        let mut ast_nodes = HashMap::new();
        let mut usage_kinds = HashMap::new();
        let mut name_spans = HashMap::new();

        let root = NodeRef::Module(&analysis.module);
        let mut attrs = Attributes::internal(root.label());
        attrs.types.push(marker::NA_TYPE.to_owned());
        attrs.data.ast = Some(root.id());
        attrs.data.parent_field = Some(ParentField::Root);
        let module_node = graph.add_node(NodeKind::AstInternal, attrs);
        ast_nodes.insert(root.id(), module_node);

        walk_edges(root, &mut |_, child, field, pos| {
            let mut attrs = if child.is_terminal() {
                let mut a = Attributes::internal(child.label());
                a.literal = child.literal().to_owned();
                a
            } else {
                Attributes::internal(child.label())
            };
            match child {
                NodeRef::Expr(_) | NodeRef::Name(_) => {
                    let values = analysis.resolve_to_values(child.id());
                    if values.is_empty() {
                        attrs.types.push(marker::UNKNOWN_TYPE.to_owned());
                    } else {
                        attrs.set_values(values.to_vec());
                    }
                }
                _ => attrs.types.push(marker::NA_TYPE.to_owned()),
            }
            attrs.data.ast = Some(child.id());
            attrs.data.parent_field = Some(field);
            attrs.data.parent_pos = pos;

            let kind = if child.is_terminal() {
                NodeKind::AstTerminal
            } else {
                NodeKind::AstInternal
            };
            let node = graph.add_node(kind, attrs);
            ast_nodes.insert(child.id(), node);

            match child {
                NodeRef::Name(n) | NodeRef::Expr(Expr::Name(n)) => {
                    usage_kinds.insert(n.id, n.usage);
                    name_spans.insert(n.id, n.span);
                }
                _ => {}
            }
        });

        let mut sof_attrs = Attributes::internal("Marker");
        sof_attrs.literal = marker::SOF_MARKER.to_owned();
        sof_attrs.types.push(marker::NA_TYPE.to_owned());
        let sof_node = graph.add_node(NodeKind::AstTerminal, sof_attrs);

        let mut builder = GraphBuilder {
            analysis,
            graph,
            vm,
            scopes,
            module_node,
            sof_node,
            ast_nodes,
            word_children: Vec::new(),
            token_chain: vec![sof_node],
            usage_kinds,
            name_spans,
        };
        builder.add_word_nodes();
        builder
    }

    /// Assigns every surviving token to a graph node: terminals absorb
    /// the words they cover, everything else gets a word node hanging
    /// off the deepest covering syntax node.
    fn add_word_nodes(&mut self) {
        for word in &self.analysis.words {
            if word.kind.is_skipped() {
                continue;
            }
            let covering = deepest_covering(&self.analysis.module, word.span);
            let parent = self.ast_nodes[&covering.id()];
            if covering.is_terminal() {
                self.push_token(parent);
                continue;
            }
            let mut attrs = Attributes::word(word.kind, word.render());
            attrs.types.push(marker::NA_TYPE.to_owned());
            attrs.data.parent_field = call_punctuation_field(&covering, word.kind);
            let node = self.graph.add_node(NodeKind::AstTerminal, attrs);
            self.word_children.push((parent, node));
            self.push_token(node);
        }
    }

    fn push_token(&mut self, node: NodeId) {
        if self.token_chain.last() != Some(&node) {
            self.token_chain.push(node);
        }
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Adds the requested relation families over the created nodes.
    pub fn build_edges(&mut self, set: &EdgeSet) {
        if set.contains(EdgeKind::AstChild) {
            self.add_ast_child_edges();
        }
        if set.contains(EdgeKind::NextToken) {
            for pair in self.token_chain.clone().windows(2) {
                self.graph.add_relation(pair[0], pair[1], EdgeKind::NextToken);
            }
        }
        if set.contains(EdgeKind::LastLexicalUse) {
            self.add_last_lexical_use_edges();
        }
        if set.contains(EdgeKind::ComputedFrom) || set.contains(EdgeKind::ReturnValueOf) {
            self.add_assignment_edges(set);
        }
        if set.contains(EdgeKind::DataFlow)
            || set.contains(EdgeKind::LastRead)
            || set.contains(EdgeKind::LastWrite)
        {
            self.add_flow_edges(set);
        }
    }

    fn add_ast_child_edges(&mut self) {
        let root = NodeRef::Module(&self.analysis.module);
        let mut pairs = Vec::new();
        walk_edges(root, &mut |parent, child, _, _| {
            pairs.push((self.ast_nodes[&parent.id()], self.ast_nodes[&child.id()]));
        });
        for (parent, child) in pairs {
            self.graph.add_relation(parent, child, EdgeKind::AstChild);
        }
        for (parent, child) in self.word_children.clone() {
            self.graph.add_relation(parent, child, EdgeKind::AstChild);
        }
        self.graph
            .add_relation(self.module_node, self.sof_node, EdgeKind::AstChild);
    }

    fn add_last_lexical_use_edges(&mut self) {
        let mut names = Vec::new();
        exprgraph_analysis::names_in(NodeRef::Module(&self.analysis.module), &mut names);
        names.sort_by_key(|n| (n.span.begin, n.id));
        let mut prev: HashMap<&str, NodeId> = HashMap::new();
        for name in names {
            let node = self.ast_nodes[&name.id];
            if let Some(&last) = prev.get(name.literal.as_str()) {
                self.graph.add_relation(node, last, EdgeKind::LastLexicalUse);
            }
            prev.insert(&name.literal, node);
        }
    }

    /// `ComputedFrom` connects assignment targets to the names the value
    /// reads; `ReturnValueOf` connects them to a called function when
    /// the value is a call.
    fn add_assignment_edges(&mut self, set: &EdgeSet) {
        let mut edges = Vec::new();
        walk(NodeRef::Module(&self.analysis.module), &mut |n| {
            let (targets, value): (Vec<&Expr>, &Expr) = match n {
                NodeRef::Stmt(Stmt::Assign(s)) => (s.targets.iter().collect(), &s.value),
                NodeRef::Stmt(Stmt::AugAssign(s)) => (vec![&s.target], &s.value),
                _ => return true,
            };
            let mut lhs = Vec::new();
            for target in targets {
                shallow_names(target, &mut lhs);
            }
            if set.contains(EdgeKind::ComputedFrom) {
                let mut rhs = Vec::new();
                shallow_names(value, &mut rhs);
                for l in &lhs {
                    for r in &rhs {
                        edges.push((l.id, r.id, EdgeKind::ComputedFrom));
                    }
                }
            }
            if set.contains(EdgeKind::ReturnValueOf) {
                if let Expr::Call(call) = value {
                    for l in &lhs {
                        edges.push((l.id, call.func.id(), EdgeKind::ReturnValueOf));
                    }
                }
            }
            true
        });
        for (from, to, kind) in edges {
            self.graph
                .add_relation(self.ast_nodes[&from], self.ast_nodes[&to], kind);
        }
    }

    /// Flow edges connect occurrences of one variable. `DataFlow` keeps
    /// the forward direction; `LastRead` and `LastWrite` point back at
    /// the earlier occurrence, split by how it used the variable.
    fn add_flow_edges(&mut self, set: &EdgeSet) {
        for var in self.vm.variables() {
            let flow = forward_flow(&self.analysis.module, &var.refs);
            for (src, dsts) in &flow {
                let src_node = self.ast_nodes[src];
                for dst in dsts.names() {
                    let dst_node = self.ast_nodes[&dst];
                    if set.contains(EdgeKind::DataFlow) {
                        self.graph.add_relation(src_node, dst_node, EdgeKind::DataFlow);
                    }
                    let back = match self.usage_kinds[src] {
                        NameUsage::Evaluate => EdgeKind::LastRead,
                        NameUsage::Delete => continue,
                        _ => EdgeKind::LastWrite,
                    };
                    if set.contains(back) {
                        self.graph.add_relation(dst_node, src_node, back);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scope nodes and usages
    // -----------------------------------------------------------------------

    /// Adds one scope node per variable, carrying the origin occurrence's
    /// attributes, with a scope edge from every occurrence. Returns the
    /// scope nodes aligned with `vars`.
    pub fn add_scope_nodes(&mut self, vars: &[VarId]) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(vars.len());
        for &var in vars {
            let v = self.vm.variable(var);
            let origin = self.ast_nodes[&v.origin];
            let mut attrs = self.graph.node(origin).attrs.clone();
            attrs.label = "Scope".to_owned();
            attrs.data = Default::default();
            let scope = self.graph.add_node(NodeKind::Scope, attrs);
            for name in v.refs.names() {
                let node = self.ast_nodes[&name];
                self.graph.add_scope_edge(node, scope);
            }
            out.push(scope);
        }
        out
    }

    /// Adds a usage node for `var` summarizing its latest occurrence
    /// ending before `before`, with a flow edge from every earlier
    /// occurrence. Returns `None` when no occurrence precedes `before`.
    pub fn add_usage_node(&mut self, var: VarId, before: Span) -> Option<NodeId> {
        let v = self.vm.variable(var);
        let mut earlier: Vec<AstId> = v
            .refs
            .names()
            .into_iter()
            .filter(|name| self.name_spans[name].end <= before.begin)
            .collect();
        earlier.sort_by_key(|name| self.name_spans[name].begin);
        let latest = *earlier.last()?;
        let latest_node = self.ast_nodes[&latest];
        let latest_attrs = &self.graph.node(latest_node).attrs;
        let mut attrs = Attributes::usage(latest_attrs.literal.clone(), latest_attrs.values.clone());
        if attrs.types.is_empty() {
            attrs.types.push(marker::UNKNOWN_TYPE.to_owned());
        }
        let usage = self.graph.add_node(NodeKind::VariableUsage, attrs);
        for name in earlier {
            self.graph
                .add_relation(self.ast_nodes[&name], usage, EdgeKind::DataFlow);
        }
        Some(usage)
    }

    /// Rewrites a prediction site to the hole the name decoder fills in.
    pub fn mark_infer_site(&mut self, site: NodeId) {
        let attrs = self.graph.attrs_mut(site);
        attrs.literal = marker::INFER_NAME_MARKER.to_owned();
        attrs.types.clear();
        attrs.types.push(marker::NA_TYPE.to_owned());
        attrs.values.clear();
        attrs.data.symbol = None;
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn site_node(&self, ast: AstId) -> Result<NodeId, BuildError> {
        self.ast_nodes
            .get(&ast)
            .copied()
            .ok_or(BuildError::SiteNotFound { ast })
    }

    pub fn name_span(&self, name: AstId) -> Option<Span> {
        self.name_spans.get(&name).copied()
    }

    /// Variables visible at `at`, in origin order.
    pub fn scope_at(&self, at: Span, stop_at_func: bool) -> Vec<VarId> {
        self.scopes.in_scope(at, stop_at_func)
    }

    pub fn variables(&self) -> &VariableManager {
        &self.vm
    }

    /// Graph nodes of a variable's occurrences with their spans, in
    /// source order.
    pub fn ref_nodes(&self, var: VarId) -> Vec<(NodeId, Span)> {
        let v = self.vm.variable(var);
        let mut refs: Vec<(NodeId, Span)> = v
            .refs
            .names()
            .into_iter()
            .map(|name| (self.ast_nodes[&name], self.name_spans[&name]))
            .collect();
        refs.sort_by_key(|(_, span)| span.begin);
        refs
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn module_node(&self) -> NodeId {
        self.module_node
    }

    pub fn sof_node(&self) -> NodeId {
        self.sof_node
    }

    /// Takes the graph. Node ids handed out by the lookup methods stay
    /// valid until the caller prunes.
    pub fn finish(self) -> Graph {
        debug!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "graph built"
        );
        self.graph
    }

    // -----------------------------------------------------------------------
    // Context tokens
    // -----------------------------------------------------------------------

    /// Terminal tokens nearest the site in graph distance, capped. The
    /// start-of-file marker is always a candidate; punctuation that only
    /// delimits structure is not.
    pub fn context_tokens(&self, site: NodeId) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut seen = vec![false; self.graph.node_count()];
        seen[site.index()] = true;
        let mut frontier = vec![site];
        while !frontier.is_empty() && tokens.len() < MAX_CONTEXT_TOKENS {
            let mut next = Vec::new();
            for id in frontier {
                for nb in self.graph.node(id).outgoing() {
                    if seen[nb.index()] {
                        continue;
                    }
                    seen[nb.index()] = true;
                    let node = self.graph.node(nb);
                    if is_context_token(node.kind, &node.attrs.literal, node.attrs.token) {
                        tokens.push(node.attrs.literal.clone());
                        if tokens.len() == MAX_CONTEXT_TOKENS {
                            return tokens;
                        }
                    }
                    next.push(nb);
                }
            }
            frontier = next;
        }
        tokens
    }
}

/// Names reachable without crossing an attribute selection.
fn shallow_names<'m>(expr: &'m Expr, out: &mut Vec<&'m NameExpr>) {
    walk(NodeRef::Expr(expr), &mut |n| match n {
        NodeRef::Expr(Expr::Attribute(_)) => false,
        NodeRef::Expr(Expr::Name(name)) | NodeRef::Name(name) => {
            out.push(name);
            true
        }
        _ => true,
    });
}

/// Deepest syntax node whose span covers `span`.
fn deepest_covering(module: &exprgraph_analysis::Module, span: Span) -> NodeRef<'_> {
    let mut cur = NodeRef::Module(module);
    loop {
        let mut descended = false;
        for (_, _, child) in cur.child_edges() {
            if child.span().contains(span) {
                cur = child;
                descended = true;
                break;
            }
        }
        if !descended {
            return cur;
        }
    }
}

/// Field a punctuation word occupies when hanging off a call.
fn call_punctuation_field(covering: &NodeRef<'_>, kind: TokenKind) -> Option<ParentField> {
    if !matches!(covering, NodeRef::Expr(Expr::Call(_))) {
        return None;
    }
    match kind {
        TokenKind::Lparen => Some(ParentField::LeftParen),
        TokenKind::Rparen => Some(ParentField::RightParen),
        TokenKind::Comma => Some(ParentField::Commas),
        _ => None,
    }
}

fn is_context_token(kind: NodeKind, literal: &str, token: Option<TokenKind>) -> bool {
    if kind != NodeKind::AstTerminal || literal.is_empty() {
        return false;
    }
    if literal == marker::SOF_MARKER {
        return true;
    }
    match token {
        Some(k) => !matches!(
            k,
            TokenKind::Lparen
                | TokenKind::Rparen
                | TokenKind::Lbrack
                | TokenKind::Rbrack
                | TokenKind::Lbrace
                | TokenKind::Rbrace
                | TokenKind::Comma
                | TokenKind::Period
                | TokenKind::Colon
                | TokenKind::Semicolon
        ),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fixtures::two_assign_buffer;
    use exprgraph_core::Edge;

    fn forward_edges(graph: &Graph, kind: EdgeKind) -> Vec<Edge> {
        graph
            .edges()
            .iter()
            .filter(|e| e.kind == kind && e.forward)
            .copied()
            .collect()
    }

    fn node_by_literal(graph: &Graph, literal: &str, label: &str) -> NodeId {
        graph
            .nodes()
            .find(|(_, n)| n.attrs.literal == literal && n.attrs.label == label)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn creates_ast_word_and_marker_nodes() {
        let a = two_assign_buffer();
        let b = GraphBuilder::new(&a, true);
        // module + 2 assigns + 4 terminals, 2 "=" words, 1 marker
        assert_eq!(b.graph().node_count(), 10);
        assert_eq!(b.graph().nodes_of_kind(NodeKind::AstInternal).len(), 3);
        assert_eq!(b.graph().nodes_of_kind(NodeKind::AstTerminal).len(), 7);
    }

    #[test]
    fn next_token_chain_starts_at_marker() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::new([EdgeKind::NextToken]));
        let next = forward_edges(b.graph(), EdgeKind::NextToken);
        assert_eq!(next.len(), 6);
        assert_eq!(next[0].from, b.sof_node());
        // every chained edge has its backward pair
        assert_eq!(b.graph().edge_count(), 12);
    }

    #[test]
    fn unresolved_expressions_get_unknown_type() {
        let a = two_assign_buffer();
        let b = GraphBuilder::new(&a, true);
        let x = node_by_literal(b.graph(), "x", "NameExpr");
        assert_eq!(b.graph().node(x).attrs.types.as_slice(), [marker::UNKNOWN_TYPE]);
        let module = b.graph().node(b.module_node());
        assert_eq!(module.attrs.types.as_slice(), [marker::NA_TYPE]);
    }

    #[test]
    fn flow_edges_follow_usage_kinds() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::new([
            EdgeKind::DataFlow,
            EdgeKind::LastRead,
            EdgeKind::LastWrite,
        ]));
        let flow = forward_edges(b.graph(), EdgeKind::DataFlow);
        assert_eq!(flow.len(), 1);
        // x's write flows to its read, and the read points back at the write
        let write = forward_edges(b.graph(), EdgeKind::LastWrite);
        assert_eq!(write.len(), 1);
        assert_eq!(write[0].from, flow[0].to);
        assert_eq!(write[0].to, flow[0].from);
        assert!(forward_edges(b.graph(), EdgeKind::LastRead).is_empty());
    }

    #[test]
    fn computed_from_connects_target_to_value_names() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::new([EdgeKind::ComputedFrom]));
        let edges = forward_edges(b.graph(), EdgeKind::ComputedFrom);
        assert_eq!(edges.len(), 1);
        let y = node_by_literal(b.graph(), "y", "NameExpr");
        assert_eq!(edges[0].from, y);
    }

    #[test]
    fn last_lexical_use_links_same_lexeme() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::new([EdgeKind::LastLexicalUse]));
        let edges = forward_edges(b.graph(), EdgeKind::LastLexicalUse);
        // second x points back at the first; y has no predecessor
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn scope_nodes_carry_origin_attributes() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::all());
        let vars: Vec<VarId> = b.variables().variables().iter().map(|v| v.id).collect();
        let scopes = b.add_scope_nodes(&vars);
        assert_eq!(scopes.len(), 2);
        let scope = b.graph().node(scopes[0]);
        assert_eq!(scope.kind, NodeKind::Scope);
        assert_eq!(scope.attrs.label, "Scope");
        assert_eq!(scope.attrs.literal, "x");
        // scope edges go from the occurrences to the scope node only
        let scope_edges: Vec<Edge> = b
            .graph()
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::ScopeEdge)
            .copied()
            .collect();
        assert!(scope_edges.iter().all(|e| e.forward));
        assert_eq!(scope_edges.iter().filter(|e| e.to == scopes[0]).count(), 2);
    }

    #[test]
    fn usage_node_summarizes_latest_occurrence() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::all());
        let x = b.variables().variables()[0].id;
        // before the second statement only the first x is visible
        let usage = b.add_usage_node(x, Span::new(6, 7)).unwrap();
        let node = b.graph().node(usage);
        assert_eq!(node.kind, NodeKind::VariableUsage);
        assert_eq!(node.attrs.literal, "x");
        // nothing precedes offset zero
        assert!(b.add_usage_node(x, Span::new(0, 0)).is_none());
    }

    #[test]
    fn context_tokens_stay_near_the_site() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        b.build_edges(&EdgeSet::all());
        let y = node_by_literal(b.graph(), "y", "NameExpr");
        let tokens = b.context_tokens(y);
        assert!(!tokens.is_empty());
        assert!(tokens.len() <= MAX_CONTEXT_TOKENS);
        assert!(tokens.iter().any(|t| t == "x" || t == "=" || t == "1"));
    }

    #[test]
    fn mark_infer_site_scrubs_identity() {
        let a = two_assign_buffer();
        let mut b = GraphBuilder::new(&a, true);
        let site = node_by_literal(b.graph(), "y", "NameExpr");
        b.mark_infer_site(site);
        let attrs = &b.graph().node(site).attrs;
        assert_eq!(attrs.literal, marker::INFER_NAME_MARKER);
        assert_eq!(attrs.types.as_slice(), [marker::NA_TYPE]);
        assert!(attrs.values.is_empty());
    }
}
