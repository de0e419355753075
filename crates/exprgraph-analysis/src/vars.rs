//! Source-level variables.
//!
//! A variable is the set of name occurrences that resolve to the same
//! local binding. The manager groups occurrences, assigns each tracked
//! occurrence a global evaluation order, and numbers variables by first
//! occurrence so `VarId` order is origin order.

use std::collections::HashMap;

use indexmap::IndexMap;

use exprgraph_core::{AstId, VarId};

use crate::analysis::{Analysis, BindingId};
use crate::ast::{Expr, NameExpr};
use crate::nameset::NameSet;
use crate::walk::{walk_edges, NodeRef};
use exprgraph_core::ParentField;

/// One variable and its occurrences.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VarId,
    /// First occurrence in evaluation order.
    pub origin: AstId,
    pub refs: NameSet,
}

/// Groups name occurrences into variables.
#[derive(Debug, Clone, Default)]
pub struct VariableManager {
    variables: Vec<Variable>,
    name_to_var: HashMap<AstId, VarId>,
}

impl VariableManager {
    /// Builds the manager from a resolved buffer.
    ///
    /// Occurrences with no binding are dropped unless
    /// `include_unresolved` is set, in which case occurrences sharing a
    /// lexeme are grouped into one variable. Keyword-argument names are
    /// never variable references.
    pub fn build(analysis: &Analysis, include_unresolved: bool) -> Self {
        // Collect candidate occurrences in source order, skipping
        // keyword-argument names.
        if analysis.module.body.is_empty() {
            return VariableManager::default();
        }
        let mut names: Vec<&NameExpr> = Vec::new();
        let root = NodeRef::Module(&analysis.module);
        walk_edges(root, &mut |parent, child, field, _| {
            if matches!(parent, NodeRef::Argument(_)) && field == ParentField::Name {
                return;
            }
            match child {
                NodeRef::Name(n) | NodeRef::Expr(Expr::Name(n)) => names.push(n),
                _ => {}
            }
        });
        names.sort_by_key(|n| (n.span.begin, n.id));

        #[derive(PartialEq, Eq, Hash)]
        enum GroupKey {
            Binding(BindingId),
            Lexeme(String),
        }

        let mut groups: IndexMap<GroupKey, NameSet> = IndexMap::new();
        let mut order = 0u32;
        for name in names {
            let key = match analysis.resolutions.binding(name.id) {
                Some(binding) => GroupKey::Binding(binding),
                None if include_unresolved => GroupKey::Lexeme(name.literal.clone()),
                None => continue,
            };
            groups.entry(key).or_default().add(name.id, order);
            order += 1;
        }

        // First insertion into `groups` follows source order, so the
        // entry order is already origin order.
        let mut variables = Vec::with_capacity(groups.len());
        let mut name_to_var = HashMap::new();
        for (i, (_, refs)) in groups.into_iter().enumerate() {
            let id = VarId(i as u32);
            let origin = refs.names()[0];
            for name in refs.names() {
                name_to_var.insert(name, id);
            }
            variables.push(Variable { id, origin, refs });
        }

        VariableManager {
            variables,
            name_to_var,
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn variable_for_name(&self, name: AstId) -> Option<VarId> {
        self.name_to_var.get(&name).copied()
    }

    /// True if `name` is the origin occurrence of its variable.
    pub fn is_origin(&self, name: AstId) -> bool {
        self.variable_for_name(name)
            .map(|v| self.variable(v).origin == name)
            .unwrap_or(false)
    }

    /// All tracked occurrences with their evaluation orders.
    pub fn watched(&self) -> NameSet {
        let mut set = NameSet::new();
        for v in &self.variables {
            set.extend_from(&v.refs);
        }
        set
    }
}
