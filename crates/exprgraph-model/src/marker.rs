//! Special vocabulary markers.
//!
//! Markers stand in for literals and type labels that carry structural
//! meaning rather than source text: the start-of-file token, inference
//! sites awaiting a prediction, and the unknown fallbacks. They are
//! delimited with `%` so the feed layer can recognize them and skip
//! subtoken splitting.

/// Literal of the synthetic token heading the `NextToken` chain.
pub const SOF_MARKER: &str = "%SOF%";

/// Type label of nodes that carry no useful type (tokens, statements).
pub const NA_TYPE: &str = "%NA_TYPE%";

/// Type label of expressions whose resolution produced nothing.
pub const UNKNOWN_TYPE: &str = "%UNKNOWN_TYPE%";

/// Subtoken fallback for words outside the trained vocabulary.
pub const UNKNOWN_TOKEN: &str = "%UNKNOWN_TOKEN%";

/// Literal of a site awaiting a name prediction.
pub const INFER_NAME_MARKER: &str = "%INFER_NAME%";

/// Literal of a site awaiting an attribute prediction.
pub const INFER_ATTR_MARKER: &str = "%INFER_ATTR%";

/// Literal and label of the speculative parent spliced in while
/// deciding whether an expression stops, becomes an attribute access,
/// or becomes a call.
pub const INFER_EXPR_TYPE_MARKER: &str = "%INFER_EXPR_TYPE%";

/// Literal and type of a fresh argument node before its kind is chosen.
pub const INFER_ARG_TYPE_MARKER: &str = "%INFER_ARG_TYPE%";

/// Literal of a site awaiting a keyword-argument name.
pub const INFER_KWARG_NAME_MARKER: &str = "%INFER_KWARG_NAME%";

/// Literal of a site deciding between a value and a placeholder.
pub const INFER_ARG_PLACEHOLDER_MARKER: &str = "%INFER_ARG_PLACEHOLDER%";

/// Name-decoder embedding used for names outside call arguments, where
/// no per-function pattern is available.
pub const GENERIC_NAME_DECODER: &str = "%GENERIC_NAME_DECODER%";

/// True for marker strings, which must never be subtoken-split.
pub fn is_special_token(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('%') && s.ends_with('%')
}

// Production labels used as decoder targets. These index into the
// production vocabulary, not the subtoken vocabularies.

pub const STOP: &str = "stop";
pub const CALL: &str = "call";
pub const ATTR: &str = "attr";
pub const POSITIONAL: &str = "positional";
pub const KEYWORD: &str = "keyword";
pub const PLACEHOLDER: &str = "placeholder";
pub const NO_PLACEHOLDER: &str = "no_placeholder";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_special_tokens() {
        for m in [
            SOF_MARKER,
            NA_TYPE,
            UNKNOWN_TYPE,
            UNKNOWN_TOKEN,
            INFER_NAME_MARKER,
            INFER_ATTR_MARKER,
            INFER_EXPR_TYPE_MARKER,
            INFER_ARG_TYPE_MARKER,
            INFER_KWARG_NAME_MARKER,
            INFER_ARG_PLACEHOLDER_MARKER,
            GENERIC_NAME_DECODER,
        ] {
            assert!(is_special_token(m), "{m} should be special");
        }
    }

    #[test]
    fn identifiers_are_not_special() {
        assert!(!is_special_token("json"));
        assert!(!is_special_token("os.path"));
        assert!(!is_special_token("%"));
        assert!(!is_special_token(STOP));
    }
}
