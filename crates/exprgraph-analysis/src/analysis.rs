//! Resolved buffer handed to graph construction.
//!
//! The front end supplies the syntax tree, the word stream, and a
//! [`Resolutions`] table mapping expression IDs to resolved values and
//! name occurrences to local binding groups. Everything downstream
//! (variables, scope, flow, the graph itself) is derived from this.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use exprgraph_core::{AstId, GlobalValue, Symbol};

use crate::ast::Module;
use crate::word::Word;

/// Identity of a local binding group. Name occurrences that resolve to
/// the same binding share one `BindingId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(pub u32);

/// Resolution results for one buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resolutions {
    values: HashMap<AstId, Vec<GlobalValue>>,
    bindings: HashMap<AstId, BindingId>,
}

impl Resolutions {
    pub fn new() -> Self {
        Resolutions::default()
    }

    pub fn set_values(&mut self, expr: AstId, values: Vec<GlobalValue>) {
        self.values.insert(expr, values);
    }

    pub fn set_binding(&mut self, name: AstId, binding: BindingId) {
        self.bindings.insert(name, binding);
    }

    pub fn values(&self, expr: AstId) -> &[GlobalValue] {
        self.values.get(&expr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn binding(&self, name: AstId) -> Option<BindingId> {
        self.bindings.get(&name).copied()
    }
}

/// A parsed, resolved buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub module: Module,
    /// Token stream in source order.
    pub words: Vec<Word>,
    pub resolutions: Resolutions,
}

impl Analysis {
    pub fn new(module: Module, mut words: Vec<Word>, resolutions: Resolutions) -> Self {
        words.sort_by_key(|w| (w.span.begin, w.span.end));
        Analysis {
            module,
            words,
            resolutions,
        }
    }

    /// Resolved values of an expression, empty if resolution failed.
    pub fn resolve_to_values(&self, expr: AstId) -> &[GlobalValue] {
        self.resolutions.values(expr)
    }

    /// Symbols of the resolved values, deduplicated in resolution order.
    pub fn resolve_to_symbols(&self, expr: AstId) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = Vec::new();
        for value in self.resolve_to_values(expr) {
            let sym = value.symbol().clone();
            if !symbols.contains(&sym) {
                symbols.push(sym);
            }
        }
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstFactory, Span};

    #[test]
    fn words_sorted_on_construction() {
        let mut f = AstFactory::new();
        let module = f.module(vec![], Span::new(0, 10));
        let words = vec![
            Word::new(exprgraph_core::TokenKind::Ident, "b", Span::new(4, 5)),
            Word::new(exprgraph_core::TokenKind::Ident, "a", Span::new(0, 1)),
        ];
        let a = Analysis::new(module, words, Resolutions::new());
        assert_eq!(a.words[0].literal, "a");
        assert_eq!(a.words[1].literal, "b");
    }

    #[test]
    fn resolve_to_symbols_dedupes() {
        let mut f = AstFactory::new();
        let module = f.module(vec![], Span::new(0, 0));
        let id = f.fresh();
        let mut res = Resolutions::new();
        res.set_values(
            id,
            vec![
                GlobalValue::External(Symbol::new("json")),
                GlobalValue::ExternalInstance(Symbol::new("json")),
            ],
        );
        let a = Analysis::new(module, vec![], res);
        assert_eq!(a.resolve_to_symbols(id).len(), 1);
        assert!(a.resolve_to_values(AstId(999)).is_empty());
    }
}
