//! Lexical words of the analyzed buffer.
//!
//! The front end hands over the token stream alongside the syntax tree;
//! graph construction turns surviving words into terminal nodes and
//! threads next-token edges through them.

use serde::{Deserialize, Serialize};

use exprgraph_core::TokenKind;

use crate::ast::Span;

/// One lexical token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word {
    pub kind: TokenKind,
    pub literal: String,
    pub span: Span,
}

impl Word {
    pub fn new(kind: TokenKind, literal: impl Into<String>, span: Span) -> Self {
        Word {
            kind,
            literal: literal.into(),
            span,
        }
    }

    /// Text fed to the model for this word. Punctuation renders as its
    /// fixed spelling regardless of the stored literal.
    pub fn render(&self) -> &str {
        self.kind.fixed_literal().unwrap_or(&self.literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prefers_fixed_spelling() {
        let w = Word::new(TokenKind::Comma, "", Span::new(3, 4));
        assert_eq!(w.render(), ",");
        let w = Word::new(TokenKind::Ident, "foo", Span::new(0, 3));
        assert_eq!(w.render(), "foo");
    }
}
