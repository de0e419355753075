//! Lexical token kinds carried by word nodes.
//!
//! The graph stores one node per surviving source token, and several
//! consumers (edge construction, context-token selection, word rendering)
//! branch on the token kind, so the vocabulary lives here rather than in
//! the analysis layer.

use serde::{Deserialize, Serialize};

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Str,
    Keyword,
    Operator,
    Assign,
    Lparen,
    Rparen,
    Lbrack,
    Rbrack,
    Lbrace,
    Rbrace,
    Comma,
    Period,
    Colon,
    Semicolon,
    Newline,
    Indent,
    Dedent,
    Whitespace,
    Comment,
    Cursor,
    Eof,
}

impl TokenKind {
    /// Tokens that never become graph nodes.
    pub fn is_skipped(self) -> bool {
        matches!(
            self,
            TokenKind::Newline
                | TokenKind::Indent
                | TokenKind::Dedent
                | TokenKind::Whitespace
                | TokenKind::Comment
                | TokenKind::Cursor
                | TokenKind::Eof
        )
    }

    /// Fixed spelling for tokens whose text is determined by the kind.
    /// Returns `None` for kinds whose literal varies (idents, numbers,
    /// strings, keywords, operators).
    pub fn fixed_literal(self) -> Option<&'static str> {
        match self {
            TokenKind::Lparen => Some("("),
            TokenKind::Rparen => Some(")"),
            TokenKind::Lbrack => Some("["),
            TokenKind::Rbrack => Some("]"),
            TokenKind::Lbrace => Some("{"),
            TokenKind::Rbrace => Some("}"),
            TokenKind::Comma => Some(","),
            TokenKind::Period => Some("."),
            TokenKind::Colon => Some(":"),
            TokenKind::Semicolon => Some(";"),
            TokenKind::Assign => Some("="),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_tokens_are_skipped() {
        assert!(TokenKind::Newline.is_skipped());
        assert!(TokenKind::Comment.is_skipped());
        assert!(TokenKind::Eof.is_skipped());
        assert!(!TokenKind::Ident.is_skipped());
        assert!(!TokenKind::Lparen.is_skipped());
    }

    #[test]
    fn fixed_literals() {
        assert_eq!(TokenKind::Comma.fixed_literal(), Some(","));
        assert_eq!(TokenKind::Ident.fixed_literal(), None);
    }
}
