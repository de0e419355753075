//! Node payloads for the expression graph.
//!
//! Every node carries a [`NodeKind`] discriminant plus [`Attributes`]
//! describing what the model sees (label, literal, type labels) and what
//! later phases need (resolved values, structured [`NodeData`]).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::AstId;
use crate::symbol::{GlobalValue, Symbol};
use crate::token::TokenKind;

/// Discriminant for graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Interior syntax-tree node (statement, call, attribute, ...).
    AstInternal,
    /// Leaf syntax-tree node or surviving source token.
    AstTerminal,
    /// One occurrence of a source-level variable.
    VariableUsage,
    /// Synthetic node representing one variable visible in scope.
    Scope,
}

/// Syntax-tree field through which a node hangs off its parent.
///
/// Mirrors the named struct fields of the syntax tree; `parent_pos`
/// disambiguates positions within list-valued fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentField {
    Root,
    Body,
    Targets,
    Target,
    Value,
    Condition,
    Iterable,
    OrElse,
    Branches,
    Items,
    Func,
    Args,
    Name,
    Attribute,
    Params,
    Default,
    Annotation,
    Decorators,
    Handlers,
    Final,
    Type,
    Names,
    Alias,
    Left,
    Right,
    Elts,
    LeftParen,
    RightParen,
    Commas,
}

/// Structured payload joining a graph node back to syntax and resolution.
///
/// Word nodes have no parent field set; `ast` is absent for nodes the
/// expansion phase synthesizes before they correspond to real syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Syntax-tree node this graph node was built from, if any.
    pub ast: Option<AstId>,
    /// Resolved symbol for name and attribute nodes.
    pub symbol: Option<Symbol>,
    /// Field of the parent syntax node this node occupies.
    pub parent_field: Option<ParentField>,
    /// Position within a list-valued parent field.
    pub parent_pos: u32,
}

/// Attributes of a graph node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Node-kind label fed to the model ("Call", "Name", "Ident", ...).
    pub label: String,
    /// Source text for terminals and usages, empty for internal nodes.
    pub literal: String,
    /// Deduplicated, sorted type labels of the node's resolved values.
    pub types: SmallVec<[String; 4]>,
    /// Resolved values, kept for symbol matching after graph construction.
    pub values: Vec<GlobalValue>,
    /// Token kind for word nodes.
    pub token: Option<TokenKind>,
    /// Structured payload.
    pub data: NodeData,
}

impl Attributes {
    /// Attributes for an interior syntax node.
    pub fn internal(label: impl Into<String>) -> Self {
        Attributes {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Attributes for a word node. The literal is the token's rendered text.
    pub fn word(token: TokenKind, literal: impl Into<String>) -> Self {
        let literal = literal.into();
        Attributes {
            label: format!("{token:?}"),
            literal,
            token: Some(token),
            ..Default::default()
        }
    }

    /// Attributes for a variable-usage node.
    pub fn usage(literal: impl Into<String>, values: Vec<GlobalValue>) -> Self {
        let mut types: SmallVec<[String; 4]> =
            values.iter().map(GlobalValue::type_label).collect();
        types.sort_unstable();
        types.dedup();
        Attributes {
            label: "Usage".to_owned(),
            literal: literal.into(),
            types,
            values,
            ..Default::default()
        }
    }

    /// Attributes for a scope node.
    pub fn scope() -> Self {
        Attributes {
            label: "Scope".to_owned(),
            ..Default::default()
        }
    }

    /// Replaces the resolved values and recomputes the type labels.
    pub fn set_values(&mut self, values: Vec<GlobalValue>) {
        let mut types: SmallVec<[String; 4]> =
            values.iter().map(GlobalValue::type_label).collect();
        types.sort_unstable();
        types.dedup();
        self.types = types;
        self.values = values;
    }

    /// Matched symbol of the node, preferring the structured payload.
    pub fn symbol(&self) -> Option<&Symbol> {
        self.data
            .symbol
            .as_ref()
            .or_else(|| self.values.first().map(GlobalValue::symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_attributes_dedupe_and_sort_types() {
        let sym = Symbol::new("os.path");
        let attrs = Attributes::usage(
            "p",
            vec![
                GlobalValue::ExternalInstance(sym.clone()),
                GlobalValue::ExternalInstance(sym.clone()),
                GlobalValue::External(Symbol::new("abc")),
            ],
        );
        assert_eq!(attrs.types.as_slice(), ["abc", "os.path"]);
        assert_eq!(attrs.values.len(), 3);
    }

    #[test]
    fn word_attributes_carry_token_kind() {
        let attrs = Attributes::word(TokenKind::Lparen, "(");
        assert_eq!(attrs.token, Some(TokenKind::Lparen));
        assert_eq!(attrs.literal, "(");
    }

    #[test]
    fn symbol_prefers_structured_payload() {
        let mut attrs = Attributes::usage(
            "x",
            vec![GlobalValue::External(Symbol::new("json"))],
        );
        assert_eq!(attrs.symbol().unwrap().path(), "json");
        attrs.data.symbol = Some(Symbol::new("pickle"));
        assert_eq!(attrs.symbol().unwrap().path(), "pickle");
    }
}
