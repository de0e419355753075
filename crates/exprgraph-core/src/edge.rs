//! Edge kinds and the edge record.
//!
//! There is a fixed, closed set of relation kinds ([`EdgeKind`]). Every
//! relation except [`EdgeKind::ScopeEdge`] is stored as a symmetric pair:
//! a forward edge and a mirror-image backward edge with `forward = false`.
//! The pair is created atomically by
//! [`Graph::add_relation`](crate::graph::Graph::add_relation); callers
//! never insert half a pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Relation kinds between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Syntax-tree parent to child.
    AstChild,
    /// Token to the lexically following token.
    NextToken,
    /// Name occurrence to the previous occurrence of the same lexeme.
    LastLexicalUse,
    /// Assignment target to the names its right-hand side reads.
    ComputedFrom,
    /// Name occurrence to the most recent read of the same variable.
    LastRead,
    /// Name occurrence to the most recent write of the same variable.
    LastWrite,
    /// Variable usage to the set of usages that may flow into it.
    DataFlow,
    /// Call expression to the function being called.
    ReturnValueOf,
    /// Reference of a variable to the scope node standing for it.
    ScopeEdge,
}

impl EdgeKind {
    /// All relation kinds, in feed order.
    pub const ALL: [EdgeKind; 9] = [
        EdgeKind::AstChild,
        EdgeKind::NextToken,
        EdgeKind::LastLexicalUse,
        EdgeKind::ComputedFrom,
        EdgeKind::LastRead,
        EdgeKind::LastWrite,
        EdgeKind::DataFlow,
        EdgeKind::ReturnValueOf,
        EdgeKind::ScopeEdge,
    ];

    /// Stable name used in feed keys.
    pub fn name(self) -> &'static str {
        match self {
            EdgeKind::AstChild => "ast_child",
            EdgeKind::NextToken => "next_token",
            EdgeKind::LastLexicalUse => "last_lexical_use",
            EdgeKind::ComputedFrom => "computed_from",
            EdgeKind::LastRead => "last_read",
            EdgeKind::LastWrite => "last_write",
            EdgeKind::DataFlow => "data_flow",
            EdgeKind::ReturnValueOf => "return_value_of",
            EdgeKind::ScopeEdge => "scope_edge",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selection of relation kinds a builder should emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSet(Vec<EdgeKind>);

impl EdgeSet {
    pub fn new(kinds: impl IntoIterator<Item = EdgeKind>) -> Self {
        let mut kinds: Vec<EdgeKind> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        EdgeSet(kinds)
    }

    /// Every relation kind.
    pub fn all() -> Self {
        EdgeSet::new(EdgeKind::ALL)
    }

    pub fn contains(&self, kind: EdgeKind) -> bool {
        self.0.binary_search(&kind).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = EdgeKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for EdgeSet {
    fn default() -> Self {
        EdgeSet::all()
    }
}

/// One directed edge in the arena.
///
/// For paired relations the backward half has `from`/`to` swapped and
/// `forward = false`; both halves share the same [`EdgeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub forward: bool,
}

impl Edge {
    /// The mirror-image backward half of a forward edge.
    pub fn reversed(self) -> Edge {
        Edge {
            from: self.to,
            to: self.from,
            kind: self.kind,
            forward: !self.forward,
        }
    }

    /// Feed key for the direction bucket this edge belongs to.
    pub fn feed_key(&self) -> String {
        let dir = if self.forward { "forward" } else { "backward" };
        format!("{}_{dir}", self.kind.name())
    }
}
