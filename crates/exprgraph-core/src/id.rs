//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `NodeId` cannot be accidentally used where a `VarId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node in a [`Graph`](crate::graph::Graph) arena.
///
/// Node IDs are dense: a graph with `n` nodes uses IDs `0..n`. After a
/// restriction ([`Graph::restrict_to`](crate::graph::Graph::restrict_to))
/// surviving nodes are renumbered so the property holds again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of a source-level variable (a group of name occurrences that
/// resolve to the same binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Identity of a syntax-tree node, assigned by the parser front end.
///
/// `AstId`s are opaque to the graph layer; they only need to be unique
/// within one analyzed buffer so graph nodes can be joined back to syntax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AstId(pub u32);

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NodeId {
    /// Index into a dense per-node vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl VarId {
    /// Index into a dense per-variable vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
