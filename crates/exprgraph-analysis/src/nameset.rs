//! Ordered sets of name occurrences.
//!
//! A [`NameSet`] maps name-expression IDs to their evaluation order in
//! the buffer. The order is what makes `names()` deterministic, which in
//! turn keeps edge construction and feed layout deterministic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use exprgraph_core::AstId;

/// Set of name occurrences with evaluation orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSet {
    inner: IndexMap<AstId, u32>,
}

impl NameSet {
    pub fn new() -> Self {
        NameSet::default()
    }

    /// Inserts `name` with its order. Returns `true` if it was new.
    pub fn add(&mut self, name: AstId, order: u32) -> bool {
        self.inner.insert(name, order).is_none()
    }

    pub fn contains(&self, name: AstId) -> bool {
        self.inner.contains_key(&name)
    }

    pub fn order(&self, name: AstId) -> Option<u32> {
        self.inner.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AstId, u32)> + '_ {
        self.inner.iter().map(|(id, ord)| (*id, *ord))
    }

    /// Members sorted by evaluation order.
    pub fn names(&self) -> Vec<AstId> {
        let mut entries: Vec<(AstId, u32)> = self.iter().collect();
        entries.sort_by_key(|&(id, ord)| (ord, id));
        entries.into_iter().map(|(id, _)| id).collect()
    }

    /// Adds every member of `other`.
    pub fn extend_from(&mut self, other: &NameSet) {
        for (id, ord) in other.iter() {
            self.add(id, ord);
        }
    }

    /// True if both sets contain exactly the same names.
    pub fn same_names(&self, other: &NameSet) -> bool {
        self.len() == other.len() && self.inner.keys().all(|id| other.contains(*id))
    }
}

impl FromIterator<(AstId, u32)> for NameSet {
    fn from_iter<T: IntoIterator<Item = (AstId, u32)>>(iter: T) -> Self {
        NameSet {
            inner: iter.into_iter().collect(),
        }
    }
}
