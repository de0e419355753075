//! Integration tests for the build pipeline over the public API.
//!
//! Each test assembles a resolved buffer with the analysis factory and
//! drives it through graph construction, context-graph encoding with a
//! stand-in model, and training-sample assembly.

use exprgraph_analysis::analysis::{BindingId, Resolutions};
use exprgraph_analysis::ast::{AstFactory, Expr, Span, Stmt};
use exprgraph_analysis::word::Word;
use exprgraph_analysis::{Analysis, NameUsage};
use exprgraph_build::{build_infer_name_sample, ContextGraph, ContextGraphConfig, GraphBuilder, TrainConfig};
use exprgraph_core::{AbortToken, AstId, EdgeSet, NodeKind, TokenKind};
use exprgraph_model::marker;
use exprgraph_model::vocab::{ProductionIndex, SubtokenIndex};
use exprgraph_model::{FeedDict, FetchResults, ModelError, ModelMeta, ScoringModel, TensorValue};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Returns a constant embedding row per node for every state fetch.
struct FlatModel;

impl ScoringModel for FlatModel {
    fn run(&self, feed: &FeedDict, fetches: &[&str]) -> Result<FetchResults, ModelError> {
        let mut rows = 0usize;
        for (key, value) in feed.iter() {
            if !key.ends_with("nodes/types/sample_ids") {
                continue;
            }
            if let TensorValue::Ints(ids) = value {
                rows = ids.len();
            }
        }
        let mut out = FetchResults::new();
        for op in fetches {
            if op.ends_with("node_states") {
                out.insert(
                    (*op).to_owned(),
                    TensorValue::FloatMatrix(vec![vec![1.0; 3]; rows]),
                );
            } else {
                return Err(ModelError::MissingFetch {
                    op: (*op).to_owned(),
                });
            }
        }
        Ok(out)
    }
}

fn meta() -> ModelMeta {
    ModelMeta {
        name_subtokens: SubtokenIndex::new(
            ["a", "b", "1", "=", marker::SOF_MARKER, marker::INFER_NAME_MARKER]
                .map(str::to_owned),
        ),
        type_subtokens: SubtokenIndex::new([marker::NA_TYPE].map(str::to_owned)),
        productions: ProductionIndex::new([marker::STOP].map(str::to_owned)),
    }
}

/// ```text
/// a = 1
/// b = a
/// ```
///
/// The trailing `a` is the site.
fn buffer() -> (Analysis, AstId) {
    let mut f = AstFactory::new();
    let a1 = f.name("a", Span::new(0, 1), NameUsage::Assign);
    let one = f.number("1", Span::new(4, 5));
    let b1 = f.name("b", Span::new(6, 7), NameUsage::Assign);
    let a2 = f.name("a", Span::new(10, 11), NameUsage::Evaluate);
    let site = a2.id;

    let mut res = Resolutions::new();
    res.set_binding(a1.id, BindingId(0));
    res.set_binding(a2.id, BindingId(0));
    res.set_binding(b1.id, BindingId(1));

    let s1 = f.assign(vec![Expr::Name(a1)], Expr::Literal(one), Span::new(0, 5));
    let s2 = f.assign(vec![Expr::Name(b1)], Expr::Name(a2), Span::new(6, 11));
    let module = f.module(vec![Stmt::Assign(s1), Stmt::Assign(s2)], Span::new(0, 11));

    let words = vec![
        Word::new(TokenKind::Ident, "a", Span::new(0, 1)),
        Word::new(TokenKind::Assign, "=", Span::new(2, 3)),
        Word::new(TokenKind::Int, "1", Span::new(4, 5)),
        Word::new(TokenKind::Newline, "\n", Span::new(5, 6)),
        Word::new(TokenKind::Ident, "b", Span::new(6, 7)),
        Word::new(TokenKind::Assign, "=", Span::new(8, 9)),
        Word::new(TokenKind::Ident, "a", Span::new(10, 11)),
    ];
    (Analysis::new(module, words, res), site)
}

#[test]
fn builder_produces_terminals_for_every_kept_word() {
    let (analysis, _) = buffer();
    let mut builder = GraphBuilder::new(&analysis, true);
    builder.build_edges(&EdgeSet::all());
    let graph = builder.finish();

    // 6 kept words (newline skipped) plus the start-of-file token, all
    // reachable as terminals.
    let terminals = graph.nodes_of_kind(NodeKind::AstTerminal);
    assert!(terminals.len() >= 7);
}

#[test]
fn context_graph_keeps_site_and_scope() {
    let (analysis, site) = buffer();
    let cg = ContextGraph::build(
        &analysis,
        site,
        &ContextGraphConfig::default(),
        &meta(),
        &FlatModel,
        &AbortToken::new(),
    )
    .unwrap();

    assert_eq!(cg.node_states.len(), cg.node_count());
    // Both bindings have an occurrence before the site.
    assert_eq!(cg.variables.len(), 2);
    assert_eq!(cg.scope_nodes.len(), 2);
    assert!(cg.site.index() < cg.node_count());
}

#[test]
fn infer_name_sample_labels_the_true_variable() {
    let (analysis, site) = buffer();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let sample = build_infer_name_sample(
        &analysis,
        site,
        &TrainConfig::default(),
        &meta(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(sample.num_samples(), 1);
    assert_eq!(sample.name.labels.len(), 1);
    assert!(sample.context_graph.num_nodes() > 0);
}
