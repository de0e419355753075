//! Per-symbol knowledge injected by the caller.
//!
//! The decoder needs two things it cannot compute from the buffer: which
//! attributes a symbol exposes, and how a function is usually called.
//! Both come through [`SymbolInfoSource`], so the search layer stays
//! independent of wherever that data is mined from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use exprgraph_core::Symbol;

/// Kind of the next argument at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArgClass {
    Stop,
    Positional,
    Keyword,
}

/// One argument slot of a call pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgPattern {
    pub name: String,
    /// Type labels commonly passed for this slot, most frequent first.
    pub types: Vec<String>,
    /// Value subtokens commonly passed for this slot.
    pub subtokens: Vec<String>,
}

/// How a function is usually called, mined from usage data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPatterns {
    pub max_args: usize,
    /// Slots in positional order.
    pub positional: Vec<ArgPattern>,
    /// Slots addressable by keyword.
    pub by_name: BTreeMap<String, ArgPattern>,
}

impl CallPatterns {
    /// Whether a positional argument is plausible at `idx`.
    pub fn positional_ok(&self, idx: usize) -> bool {
        idx < self.positional.len()
    }

    /// The slot the next argument would fill: the keyword's slot when
    /// one was chosen, the positional slot at `idx` otherwise.
    pub fn slot(&self, kw: &str, idx: usize) -> Option<&ArgPattern> {
        if !kw.is_empty() {
            return self.by_name.get(kw);
        }
        self.positional.get(idx)
    }

    /// Name-decoder embedding inputs for the slot, falling back to the
    /// slot name when no mined data is available.
    pub fn decoder_feed(&self, kw: &str, idx: usize) -> (Vec<String>, Vec<String>) {
        match self.slot(kw, idx) {
            Some(pat) => {
                let types = if pat.types.is_empty() {
                    vec![pat.name.clone()]
                } else {
                    pat.types.clone()
                };
                let toks = if pat.subtokens.is_empty() {
                    vec![pat.name.clone()]
                } else {
                    pat.subtokens.clone()
                };
                (types, toks)
            }
            None => (Vec::new(), Vec::new()),
        }
    }
}

/// Everything the decoder knows about one callable symbol. The id fields
/// index the production vocabulary the model was trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncInfo {
    pub symbol: Symbol,
    pub patterns: CallPatterns,
    /// Production ids for the stop/positional/keyword decision.
    pub arg_type_ids: BTreeMap<ArgClass, i64>,
    /// Keyword names with their production ids, preference order.
    pub kwarg_name_ids: Vec<(String, i64)>,
    /// Per arg name, production ids for `[no placeholder, placeholder]`.
    pub arg_placeholder_ids: BTreeMap<String, [i64; 2]>,
}

/// Caller-supplied symbol knowledge.
pub trait SymbolInfoSource {
    /// Call information for `sym`, or `None` when the symbol is not a
    /// supported callable.
    fn func_info(&self, sym: &Symbol) -> Option<FuncInfo>;

    /// Attribute completions of `base`, best first.
    fn attr_candidates(&self, base: &Symbol) -> Vec<Symbol>;

    /// Production id scoring an attribute candidate against the model.
    fn attr_production(&self, sym: &Symbol) -> Option<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> CallPatterns {
        CallPatterns {
            max_args: 2,
            positional: vec![ArgPattern {
                name: "obj".to_owned(),
                types: vec!["builtins.dict".to_owned()],
                subtokens: vec!["obj".to_owned()],
            }],
            by_name: [(
                "indent".to_owned(),
                ArgPattern {
                    name: "indent".to_owned(),
                    types: Vec::new(),
                    subtokens: Vec::new(),
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn slot_prefers_keyword() {
        let p = patterns();
        assert_eq!(p.slot("indent", 0).unwrap().name, "indent");
        assert_eq!(p.slot("", 0).unwrap().name, "obj");
        assert!(p.slot("", 5).is_none());
    }

    #[test]
    fn decoder_feed_falls_back_to_slot_name() {
        let p = patterns();
        let (types, toks) = p.decoder_feed("indent", 0);
        assert_eq!(types, vec!["indent"]);
        assert_eq!(toks, vec!["indent"]);
        let (types, _) = p.decoder_feed("", 0);
        assert_eq!(types, vec!["builtins.dict"]);
    }
}
