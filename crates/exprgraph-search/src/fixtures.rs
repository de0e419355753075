//! Analyzed buffers, encoded context graphs, and model stand-ins shared
//! by the tests in this crate.

use std::collections::BTreeMap;

use exprgraph_analysis::analysis::{BindingId, Resolutions};
use exprgraph_analysis::ast::{Argument, AstFactory, Expr, Span, Stmt};
use exprgraph_analysis::word::Word;
use exprgraph_analysis::{Analysis, NameUsage};
use exprgraph_build::{ContextGraph, ContextGraphConfig};
use exprgraph_core::{AbortToken, AstId, GlobalValue, Symbol, TokenKind};
use exprgraph_model::marker;
use exprgraph_model::vocab::{ProductionIndex, SubtokenIndex};
use exprgraph_model::{FeedDict, FetchResults, ModelError, ModelMeta, ScoringModel, TensorValue};

use crate::info::{ArgClass, ArgPattern, CallPatterns, FuncInfo, SymbolInfoSource};

pub(crate) const STATE_DIM: usize = 4;

/// Serves constant state rows and a scripted score vector.
///
/// State-row counts are recovered from whichever sample-id feed is
/// present, so the same stand-in backs the context-graph encoder and the
/// expansion passes. Every `*/prediction/pred` fetch gets `scores`.
pub(crate) struct ScriptedModel {
    pub dim: usize,
    pub fill: f32,
    pub scores: Vec<f32>,
}

impl ScriptedModel {
    pub(crate) fn constant_states(fill: f32, dim: usize) -> Self {
        ScriptedModel {
            dim,
            fill,
            scores: Vec::new(),
        }
    }

    pub(crate) fn scored(scores: Vec<f32>) -> Self {
        ScriptedModel {
            dim: STATE_DIM,
            fill: 0.25,
            scores,
        }
    }
}

impl ScoringModel for ScriptedModel {
    fn run(&self, feed: &FeedDict, fetches: &[&str]) -> Result<FetchResults, ModelError> {
        let mut rows = 0usize;
        for (key, value) in feed.iter() {
            let counts = key.ends_with("context_to_expansion")
                || key.ends_with("lookup_to_expansion")
                || key.ends_with("nodes/types/sample_ids");
            if !counts {
                continue;
            }
            if let TensorValue::Ints(ids) = value {
                let max = ids.iter().map(|&i| i as usize + 1).max().unwrap_or(0);
                rows = rows.max(max);
            }
        }
        // candidate count of the prediction pass in this feed, if any
        let mut candidates = 0usize;
        for (key, value) in feed.iter() {
            let counts = key.ends_with("name_encoder/usages/indices")
                || key.ends_with("decoder_targets/indices");
            if !counts {
                continue;
            }
            if let TensorValue::Ints(ids) = value {
                candidates = ids.len();
            }
        }

        let mut out = FetchResults::new();
        for op in fetches {
            let value = if op.ends_with("node_states") {
                TensorValue::FloatMatrix(vec![vec![self.fill; self.dim]; rows])
            } else if op.ends_with("/pred") {
                let scores: Vec<f32> = if self.scores.len() >= candidates {
                    self.scores[..candidates].to_vec()
                } else {
                    // descending filler keeps orderings deterministic
                    (0..candidates)
                        .map(|i| (candidates - i) as f32 / candidates as f32)
                        .collect()
                };
                out.insert((*op).to_owned(), TensorValue::Floats(scores));
                continue;
            } else {
                return Err(ModelError::MissingFetch {
                    op: (*op).to_owned(),
                });
            };
            out.insert((*op).to_owned(), value);
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
                "f",
                "m",
                "foo",
                "obj",
                "count",
                "indent",
                "1",
                "2",
                "=",
                "(",
                ")",
                marker::SOF_MARKER,
                marker::INFER_NAME_MARKER,
                marker::GENERIC_NAME_DECODER,
            ]
            .map(str::to_owned),
        ),
        type_subtokens: SubtokenIndex::new(
            [
                marker::NA_TYPE,
                marker::UNKNOWN_TYPE,
                "builtins",
                "int",
                "mod",
                "f",
                marker::GENERIC_NAME_DECODER,
            ]
            .map(str::to_owned),
        ),
        productions: ProductionIndex::new(
            [
                marker::STOP,
                marker::CALL,
                marker::ATTR,
                marker::POSITIONAL,
                marker::KEYWORD,
                marker::PLACEHOLDER,
                marker::NO_PLACEHOLDER,
                "mod.foo",
                "mod.foobar",
                "mod.f:indent",
            ]
            .map(str::to_owned),
        ),
    }
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

/// ```text
/// x = 1
/// y = 2
/// z = x
/// ```
///
/// The returned site is the trailing `x`: a name site with three
/// variables in scope.
pub(crate) fn name_buffer() -> (Analysis, AstId) {
    let mut f = AstFactory::new();
    let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let y1 = f.name("y", Span::new(6, 7), NameUsage::Assign);
    let two = f.number("2", Span::new(10, 11));
    let z1 = f.name("z", Span::new(12, 13), NameUsage::Assign);
    let x2 = f.name("x", Span::new(16, 17), NameUsage::Evaluate);
    let site = x2.id;

    let mut res = Resolutions::new();
    res.set_binding(x1.id, BindingId(0));
    res.set_binding(x2.id, BindingId(0));
    res.set_binding(y1.id, BindingId(1));
    res.set_binding(z1.id, BindingId(2));

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
    (Analysis::new(module, words, res), site)
}

/// ```text
/// x = 1
/// m.foo
/// ```
///
/// The site is the attribute access. `m` resolves to the external
/// symbol `mod`, and `foo` is the attribute text being replaced.
pub(crate) fn attr_buffer() -> (Analysis, AstId) {
    let mut f = AstFactory::new();
    let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let m = f.name("m", Span::new(6, 7), NameUsage::Evaluate);
    let m_id = m.id;
    let attr = f.attribute(Expr::Name(m), "foo", Span::new(8, 11));
    let site = attr.id;

    let mut res = Resolutions::new();
    res.set_binding(x1.id, BindingId(0));
    res.set_values(m_id, vec![GlobalValue::External(Symbol::new("mod"))]);

    let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
    let s2 = f.expr_stmt(Expr::Attribute(attr));
    let module = f.module(vec![Stmt::Assign(s1), Stmt::Expr(s2)], Span::new(0, 11));

    let words = vec![
        Word::new(TokenKind::Ident, "x", Span::new(0, 1)),
        Word::new(TokenKind::Assign, "=", Span::new(2, 3)),
        Word::new(TokenKind::Int, "1", Span::new(4, 5)),
        Word::new(TokenKind::Newline, "\n", Span::new(5, 6)),
        Word::new(TokenKind::Ident, "m", Span::new(6, 7)),
        Word::new(TokenKind::Period, ".", Span::new(7, 8)),
        Word::new(TokenKind::Ident, "foo", Span::new(8, 11)),
    ];
    (Analysis::new(module, words, res), site)
}

/// ```text
/// x = 1
/// f(x)
/// ```
///
/// The site is the call. `f` resolves to the external callable `mod.f`,
/// which [`StubInfo`] knows call patterns for.
pub(crate) fn call_buffer() -> (Analysis, AstId) {
    let mut f = AstFactory::new();
    let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let fname = f.name("f", Span::new(6, 7), NameUsage::Evaluate);
    let fname_id = fname.id;
    let x2 = f.name("x", Span::new(8, 9), NameUsage::Evaluate);
    let x2_id = x2.id;
    let arg = Argument {
        id: f.fresh(),
        span: Span::new(8, 9),
        name: None,
        value: Expr::Name(x2),
    };
    let call = f.call(Expr::Name(fname), vec![arg], Span::new(6, 10));
    let site = call.id;

    let mut res = Resolutions::new();
    res.set_binding(x1.id, BindingId(0));
    res.set_binding(x2_id, BindingId(0));
    res.set_values(fname_id, vec![GlobalValue::External(Symbol::new("mod.f"))]);
    res.set_values(
        x2_id,
        vec![GlobalValue::External(Symbol::new("builtins.int"))],
    );

    let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
    let s2 = f.expr_stmt(Expr::Call(call));
    let module = f.module(vec![Stmt::Assign(s1), Stmt::Expr(s2)], Span::new(0, 10));

    let words = vec![
        Word::new(TokenKind::Ident, "x", Span::new(0, 1)),
        Word::new(TokenKind::Assign, "=", Span::new(2, 3)),
        Word::new(TokenKind::Int, "1", Span::new(4, 5)),
        Word::new(TokenKind::Newline, "\n", Span::new(5, 6)),
        Word::new(TokenKind::Ident, "f", Span::new(6, 7)),
        Word::new(TokenKind::Lparen, "(", Span::new(7, 8)),
        Word::new(TokenKind::Ident, "x", Span::new(8, 9)),
        Word::new(TokenKind::Rparen, ")", Span::new(9, 10)),
    ];
    (Analysis::new(module, words, res), site)
}

// ---------------------------------------------------------------------------
// Encoded context graphs
// ---------------------------------------------------------------------------

fn encode(analysis: &Analysis, site: AstId) -> ContextGraph {
    let model = ScriptedModel::constant_states(0.25, STATE_DIM);
    ContextGraph::build(
        analysis,
        site,
        &ContextGraphConfig::default(),
        &test_meta(),
        &model,
        &AbortToken::new(),
    )
    .unwrap()
}

pub(crate) fn name_site_context() -> ContextGraph {
    let (analysis, site) = name_buffer();
    encode(&analysis, site)
}

pub(crate) fn attr_site_context() -> ContextGraph {
    let (analysis, site) = attr_buffer();
    encode(&analysis, site)
}

pub(crate) fn call_site_context() -> ContextGraph {
    let (analysis, site) = call_buffer();
    encode(&analysis, site)
}

// ---------------------------------------------------------------------------
// Symbol knowledge
// ---------------------------------------------------------------------------

/// Knows the callable `mod.f` and the attributes of `mod`, with
/// production ids drawn from [`test_meta`].
pub(crate) struct StubInfo {
    productions: ProductionIndex,
}

impl StubInfo {
    pub(crate) fn new() -> Self {
        StubInfo {
            productions: test_meta().productions,
        }
    }

    fn id(&self, label: &str) -> i64 {
        self.productions.index(label).unwrap()
    }
}

impl SymbolInfoSource for StubInfo {
    fn func_info(&self, sym: &Symbol) -> Option<FuncInfo> {
        if !sym.path().starts_with("mod.") {
            return None;
        }
        let positional = vec![
            ArgPattern {
                name: "obj".to_owned(),
                types: vec!["builtins.int".to_owned()],
                subtokens: vec!["x".to_owned()],
            },
            ArgPattern {
                name: "count".to_owned(),
                types: Vec::new(),
                subtokens: Vec::new(),
            },
        ];
        let by_name: BTreeMap<String, ArgPattern> = [(
            "indent".to_owned(),
            ArgPattern {
                name: "indent".to_owned(),
                types: Vec::new(),
                subtokens: Vec::new(),
            },
        )]
        .into_iter()
        .collect();
        Some(FuncInfo {
            symbol: sym.clone(),
            patterns: CallPatterns {
                max_args: 3,
                positional,
                by_name,
            },
            arg_type_ids: [
                (ArgClass::Stop, self.id(marker::STOP)),
                (ArgClass::Positional, self.id(marker::POSITIONAL)),
                (ArgClass::Keyword, self.id(marker::KEYWORD)),
            ]
            .into_iter()
            .collect(),
            kwarg_name_ids: vec![("indent".to_owned(), self.id("mod.f:indent"))],
            arg_placeholder_ids: [(
                "obj".to_owned(),
                [self.id(marker::NO_PLACEHOLDER), self.id(marker::PLACEHOLDER)],
            )]
            .into_iter()
            .collect(),
        })
    }

    fn attr_candidates(&self, base: &Symbol) -> Vec<Symbol> {
        if base.path() == "mod" {
            vec![
                Symbol::new("mod.foo"),
                Symbol::new("mod.foobar"),
                Symbol::new("mod.f"),
            ]
        } else {
            Vec::new()
        }
    }

    fn attr_production(&self, sym: &Symbol) -> Option<i64> {
        self.productions.index(sym.path()).ok()
    }
}
