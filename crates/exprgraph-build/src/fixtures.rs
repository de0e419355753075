//! Hand-built analyzed buffers and model stand-ins shared by the tests
//! in this crate.

use exprgraph_analysis::analysis::{BindingId, Resolutions};
use exprgraph_analysis::ast::{AstFactory, Expr, Span, Stmt};
use exprgraph_analysis::word::Word;
use exprgraph_analysis::{Analysis, NameUsage};
use exprgraph_core::{GlobalValue, Symbol, TokenKind};
use exprgraph_model::marker;
use exprgraph_model::vocab::{ProductionIndex, SubtokenIndex};
use exprgraph_model::{FeedDict, FetchResults, ModelError, ModelMeta, ScoringModel, TensorValue};

/// Returns zero state rows sized off the node-type sample ids in the
/// feed, for any requested fetch op.
pub(crate) struct ZeroModel {
    pub dim: usize,
}

impl ScoringModel for ZeroModel {
    fn run(&self, feed: &FeedDict, fetches: &[&str]) -> Result<FetchResults, ModelError> {
        let key = feed
            .keys()
            .find(|k| k.ends_with("nodes/types/sample_ids"))
            .ok_or(ModelError::NoNodes)?;
        let samples = match &feed[key] {
            TensorValue::Ints(ids) => ids.iter().copied().max().map_or(0, |m| m + 1),
            _ => 0,
        };
        let mut out = FetchResults::new();
        for op in fetches {
            out.insert(
                (*op).to_owned(),
                TensorValue::FloatMatrix(vec![vec![0.0; self.dim]; samples as usize]),
            );
        }
        Ok(out)
    }
}

pub(crate) fn test_meta() -> ModelMeta {
    ModelMeta {
        name_subtokens: SubtokenIndex::new(
            [
                "x",
                "y",
                "z",
                "=",
                "1",
                "2",
                marker::SOF_MARKER,
                marker::INFER_NAME_MARKER,
            ]
            .map(str::to_owned),
        ),
        type_subtokens: SubtokenIndex::new(
            [marker::NA_TYPE, marker::UNKNOWN_TYPE, "int"].map(str::to_owned),
        ),
        productions: ProductionIndex::new(
            [marker::STOP, marker::CALL, marker::ATTR].map(str::to_owned),
        ),
    }
}

/// ```text
/// x = 1
/// y = x
/// ```
pub(crate) fn two_assign_buffer() -> Analysis {
    let mut f = AstFactory::new();
    let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let y = f.name("y", Span::new(6, 7), NameUsage::Assign);
    let x2 = f.name("x", Span::new(10, 11), NameUsage::Evaluate);

    let mut res = Resolutions::new();
    res.set_binding(x1.id, BindingId(0));
    res.set_binding(x2.id, BindingId(0));
    res.set_binding(y.id, BindingId(1));

    let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
    let s2 = f.assign(vec![Expr::Name(y)], Expr::Name(x2), Span::new(6, 11));
    let module = f.module(vec![Stmt::Assign(s1), Stmt::Assign(s2)], Span::new(0, 11));

    let words = vec![
        Word::new(TokenKind::Ident, "x", Span::new(0, 1)),
        Word::new(TokenKind::Assign, "=", Span::new(2, 3)),
        Word::new(TokenKind::Int, "1", Span::new(4, 5)),
        Word::new(TokenKind::Newline, "\n", Span::new(5, 6)),
        Word::new(TokenKind::Ident, "y", Span::new(6, 7)),
        Word::new(TokenKind::Assign, "=", Span::new(8, 9)),
        Word::new(TokenKind::Ident, "x", Span::new(10, 11)),
    ];
    Analysis::new(module, words, res)
}

/// ```text
/// x = 1
/// y = 2
/// z = x
/// ```
///
/// Three variables are in scope at the trailing `x`, which makes it a
/// usable held-out site for name-prediction samples.
pub(crate) fn three_var_buffer() -> Analysis {
    let mut f = AstFactory::new();
    let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let y1 = f.name("y", Span::new(6, 7), NameUsage::Assign);
    let two = f.number("2", Span::new(10, 11), );
    let z1 = f.name("z", Span::new(12, 13), NameUsage::Assign);
    let x2 = f.name("x", Span::new(16, 17), NameUsage::Evaluate);

    let mut res = Resolutions::new();
    res.set_binding(x1.id, BindingId(0));
    res.set_binding(x2.id, BindingId(0));
    res.set_binding(y1.id, BindingId(1));
    res.set_binding(z1.id, BindingId(2));
    res.set_values(
        x1.id,
        vec![GlobalValue::External(Symbol::new("builtins.int"))],
    );
    res.set_values(
        x2.id,
        vec![GlobalValue::External(Symbol::new("builtins.int"))],
    );

    let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
    let s2 = f.assign(vec![Expr::Name(y1)], Expr::Literal(two), Span::new(6, 11));
    let s3 = f.assign(vec![Expr::Name(z1)], Expr::Name(x2), Span::new(12, 17));
    let module = f.module(
        vec![Stmt::Assign(s1), Stmt::Assign(s2), Stmt::Assign(s3)],
        Span::new(0, 17),
    );

    let words = vec![
        Word::new(TokenKind::Ident, "x", Span::new(0, 1)),
        Word::new(TokenKind::Assign, "=", Span::new(2, 3)),
        Word::new(TokenKind::Int, "1", Span::new(4, 5)),
        Word::new(TokenKind::Newline, "\n", Span::new(5, 6)),
        Word::new(TokenKind::Ident, "y", Span::new(6, 7)),
        Word::new(TokenKind::Assign, "=", Span::new(8, 9)),
        Word::new(TokenKind::Int, "2", Span::new(10, 11)),
        Word::new(TokenKind::Newline, "\n", Span::new(11, 12)),
        Word::new(TokenKind::Ident, "z", Span::new(12, 13)),
        Word::new(TokenKind::Assign, "=", Span::new(14, 15)),
        Word::new(TokenKind::Ident, "x", Span::new(16, 17)),
    ];
    Analysis::new(module, words, res)
}

/// The id of the trailing `x` occurrence in [`three_var_buffer`].
pub(crate) fn three_var_site(analysis: &Analysis) -> exprgraph_core::AstId {
    match &analysis.module.body[2] {
        Stmt::Assign(s) => match &s.value {
            Expr::Name(n) => n.id,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}
