//! Beam search over expansion branches.
//!
//! [`Predictor`] anchors the search at one placement site: it encodes the
//! context graph, seeds the task stack, and records the syntax facts the
//! emitter needs (argument count, trailing punctuation, the attribute
//! text being replaced). [`Predictor::expand`] then grows a bounded tree
//! of [`EgUpdate`] branches, rendering each surviving branch into a
//! [`Prediction`]: the completion tokens, the branch score, the partially
//! or fully predicted call, and a follow-up predictor for branches that
//! stopped at a natural boundary.

use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use tracing::debug;

use exprgraph_analysis::ast::Expr;
use exprgraph_analysis::walk::{walk, NodeRef};
use exprgraph_analysis::Analysis;
use exprgraph_build::{ContextGraph, ContextGraphConfig};
use exprgraph_core::{AstId, Symbol, TokenKind};

use crate::decoder::PLACEHOLDER_LITERAL;
use crate::error::SearchError;
use crate::state::{ExpansionState, SharedContext};
use crate::task::{DecoderStep, EgTask, ProdChoice, TaskKind};
use crate::update::{EgUpdate, SearchEnv};

/// Branches kept per inference step.
pub const BEAM_SIZE: usize = 3;

/// Inference budget for one [`Predictor::expand`] call. Transition tasks
/// do not count against it.
pub const DEFAULT_SEARCH_STEPS: usize = 15;

fn is_stopping(step: DecoderStep) -> bool {
    matches!(
        step,
        DecoderStep::CallDone
            | DecoderStep::AttrDone
            | DecoderStep::ExprDone
            | DecoderStep::NameDone
            | DecoderStep::Placeholder
    )
}

// ---------------------------------------------------------------------------
// Rendered output
// ---------------------------------------------------------------------------

/// One token of a completion, rendered lazily so punctuation keeps its
/// token kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompToken {
    pub kind: TokenKind,
    pub literal: String,
}

impl CompToken {
    fn ident(literal: impl Into<String>) -> Self {
        CompToken {
            kind: TokenKind::Ident,
            literal: literal.into(),
        }
    }

    fn fixed(kind: TokenKind) -> Self {
        CompToken {
            kind,
            literal: String::new(),
        }
    }

    pub fn render(&self) -> &str {
        if self.literal.is_empty() {
            self.kind.fixed_literal().unwrap_or("")
        } else {
            &self.literal
        }
    }
}

/// Argument of a predicted call. `stop` marks the synthetic final entry
/// of a fully closed call.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedCallArg {
    pub name: String,
    pub value: String,
    pub prob: f32,
    pub stop: bool,
}

impl PredictedCallArg {
    fn open() -> Self {
        PredictedCallArg {
            name: String::new(),
            value: String::new(),
            prob: 1.0,
            stop: false,
        }
    }

    fn stop() -> Self {
        PredictedCallArg {
            name: String::new(),
            value: String::new(),
            prob: 1.0,
            stop: true,
        }
    }
}

/// A call assembled while walking one branch of the search tree.
/// `partial` means the branch ended before the closing paren.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedCall {
    pub symbol: Option<Symbol>,
    pub args: Vec<PredictedCallArg>,
    pub prob: f32,
    pub partial: bool,
    pub num_orig_args: usize,
    pub scope_size: usize,
}

/// One completion produced by [`Predictor::expand`].
pub struct Prediction {
    /// Rendered tokens, in order.
    pub tokens: Vec<String>,
    /// Tokens joined into the inserted text.
    pub value: String,
    /// Product of the branch probabilities.
    pub score: f64,
    /// Last attribute symbol chosen on the branch, if any.
    pub symbol: Option<Symbol>,
    /// Call assembled on the branch, if the branch passed through one.
    pub call: Option<PredictedCall>,
    /// Continuation for branches that stopped at a grammar boundary with
    /// work left on the stack.
    pub next: Option<Predictor>,
}

// ---------------------------------------------------------------------------
// Call assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CallBuilder {
    symbol: Option<Symbol>,
    args: Vec<PredictedCallArg>,
    next_arg: PredictedCallArg,
    prob: f32,
    num_orig_args: usize,
    scope_size: usize,
    /// A comma already sits in the buffer after the last original
    /// argument, so the first predicted argument does not emit one.
    comma_present: bool,
    /// The buffer already closes the call, so `CallDone` emits nothing.
    rparen_present: bool,
    /// The builder's `Call` step has been consumed. The builder seeded
    /// for the root call site exists before its `Call` step is walked.
    started: bool,
}

impl CallBuilder {
    fn finish_arg(&mut self, prob: f32) {
        let mut arg = mem::replace(&mut self.next_arg, PredictedCallArg::open());
        arg.prob *= prob;
        self.prob *= arg.prob;
        self.args.push(arg);
    }

    fn get_call(&self, partial: bool) -> PredictedCall {
        let mut args = self.args.clone();
        if !partial {
            args.push(PredictedCallArg::stop());
        }
        PredictedCall {
            symbol: self.symbol.clone(),
            args,
            prob: self.prob,
            partial,
            num_orig_args: self.num_orig_args,
            scope_size: self.scope_size,
        }
    }
}

fn root_builder(
    symbol: Option<Symbol>,
    num_orig_args: usize,
    scope_size: usize,
    comma_present: bool,
    rparen_present: bool,
) -> CallBuilder {
    CallBuilder {
        symbol,
        args: Vec::new(),
        next_arg: PredictedCallArg::open(),
        prob: 1.0,
        num_orig_args,
        scope_size,
        comma_present,
        rparen_present,
        started: false,
    }
}

// ---------------------------------------------------------------------------
// Search tree
// ---------------------------------------------------------------------------

struct SearchNode {
    update: EgUpdate,
    prob: f32,
    step: DecoderStep,
    head: Option<EgTask>,
    words: Vec<CompToken>,
    /// Attribute symbol chosen at this node, if the step chose one.
    symbol: Option<Symbol>,
    stopping: bool,
    discarded: bool,
    children: Vec<SearchNode>,
}

impl SearchNode {
    fn root(update: EgUpdate) -> Self {
        SearchNode {
            update,
            prob: 1.0,
            step: DecoderStep::Expr,
            head: None,
            words: Vec::new(),
            symbol: None,
            stopping: false,
            discarded: false,
            children: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// Beam search anchored at one placement site.
#[derive(Clone)]
pub struct Predictor {
    update: EgUpdate,
    steps: usize,
    scope_size: usize,
    num_orig_args: usize,
    func_symbol: Option<Symbol>,
    closing_paren_present: bool,
    next_comma_present: bool,
    /// Attribute text under the cursor. Re-predicting it verbatim is not
    /// a completion, so such branches keep expanding instead of stopping.
    text_replaced: String,
}

impl Predictor {
    pub fn new(
        analysis: &Analysis,
        site: AstId,
        config: &ContextGraphConfig,
        env: Arc<SearchEnv>,
    ) -> Result<Self, SearchError> {
        let cg = ContextGraph::build(
            analysis,
            site,
            config,
            &env.meta,
            env.model.as_ref(),
            &env.abort,
        )?;
        let scope_size = cg.variables.len();

        let mut num_orig_args = 0;
        let mut func_symbol = None;
        let mut closing_paren_present = false;
        let mut next_comma_present = false;
        let mut text_replaced = String::new();
        let mut site_node = None;
        walk(NodeRef::Module(&analysis.module), &mut |node| {
            if node.id() == site {
                site_node = Some(node);
                return false;
            }
            true
        });
        match site_node {
            Some(NodeRef::Expr(Expr::Call(call))) => {
                num_orig_args = call.args.len();
                func_symbol = analysis
                    .resolve_to_symbols(call.func.id())
                    .into_iter()
                    .next();
                closing_paren_present = analysis
                    .words
                    .iter()
                    .any(|w| w.kind == TokenKind::Rparen && call.span.contains(w.span));
                let commas = analysis
                    .words
                    .iter()
                    .filter(|w| w.kind == TokenKind::Comma && call.span.contains(w.span))
                    .count();
                next_comma_present = num_orig_args > 0 && commas >= num_orig_args;
            }
            Some(NodeRef::Expr(Expr::Attribute(attr))) => {
                text_replaced = attr.attribute.clone();
            }
            _ => {}
        }

        let mut state = ExpansionState::new(Arc::new(SharedContext::new(cg)));
        let stack = env.decoder().prepare_for_inference(&mut state)?;
        let update = EgUpdate::new(env, state, stack);

        Ok(Predictor {
            update,
            steps: DEFAULT_SEARCH_STEPS,
            scope_size,
            num_orig_args,
            func_symbol,
            closing_paren_present,
            next_comma_present,
            text_replaced,
        })
    }

    /// Run the search and render every surviving branch, best first.
    pub fn expand(&self) -> Result<Vec<Prediction>, SearchError> {
        let mut root = SearchNode::root(self.update.clone());
        self.decode(&mut root, self.steps, true)?;

        let seed = self.func_symbol.as_ref().map(|sym| {
            root_builder(
                Some(sym.clone()),
                self.num_orig_args,
                self.scope_size,
                self.next_comma_present,
                self.closing_paren_present,
            )
        });
        let mut walker = Walker {
            predictor: self,
            out: Vec::new(),
        };
        walker.emit(&root, 1.0, &[], seed, None, self.func_symbol.clone())?;

        let mut predictions = walker.out;
        predictions.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        debug!(count = predictions.len(), "search finished");
        Ok(predictions)
    }

    fn decode(
        &self,
        node: &mut SearchNode,
        remaining: usize,
        noop: bool,
    ) -> Result<(), SearchError> {
        if remaining == 0 {
            node.discarded = true;
            return Ok(());
        }
        let branches = node.update.expand()?;
        for update in branches.into_iter().take(BEAM_SIZE) {
            let head = update.peek().cloned();
            let (step, words, symbol) = self.classify(&update, head.as_ref());

            // Identifier text that differs from the replaced text makes
            // the branch a real completion. Fixed punctuation renders
            // without a literal and never breaks the noop state.
            let mut child_noop = noop;
            for word in &words {
                if !word.literal.is_empty() && word.literal != self.text_replaced {
                    child_noop = false;
                }
            }

            let spent = head.as_ref().map_or(true, |h| h.kind != TaskKind::NoInfer);
            let next_remaining = if spent { remaining - 1 } else { remaining };
            let stopping = is_stopping(step) && !child_noop;

            let mut child = SearchNode {
                prob: update.prob(),
                update,
                step,
                head,
                words,
                symbol,
                stopping,
                discarded: false,
                children: Vec::new(),
            };
            if !stopping {
                self.decode(&mut child, next_remaining, child_noop)?;
            }
            node.children.push(child);
        }
        Ok(())
    }

    /// Words emitted and the step reached when a branch lands on `head`.
    fn classify(
        &self,
        update: &EgUpdate,
        head: Option<&EgTask>,
    ) -> (DecoderStep, Vec<CompToken>, Option<Symbol>) {
        let Some(head) = head else {
            return (DecoderStep::Stop, Vec::new(), None);
        };
        let state = update.state();
        if head.kind == TaskKind::InferName && head.completed {
            let literal = state.attrs(head.site).literal.clone();
            return (DecoderStep::NameDone, vec![CompToken::ident(literal)], None);
        }
        match head.client {
            DecoderStep::KeywordDone => {
                let literal = state.attrs(head.site).literal.clone();
                (
                    DecoderStep::KeywordDone,
                    vec![CompToken::ident(literal), CompToken::fixed(TokenKind::Assign)],
                    None,
                )
            }
            DecoderStep::Attr => (
                DecoderStep::Attr,
                vec![CompToken::fixed(TokenKind::Period)],
                None,
            ),
            DecoderStep::InferAttr => match head.chosen_choice() {
                Some(ProdChoice::Attr(sym)) => {
                    let words = vec![CompToken::ident(sym.last())];
                    (DecoderStep::InferAttr, words, Some(sym.clone()))
                }
                _ => (DecoderStep::InferAttr, Vec::new(), None),
            },
            DecoderStep::Call => (
                DecoderStep::Call,
                vec![CompToken::fixed(TokenKind::Lparen)],
                None,
            ),
            DecoderStep::ChooseTerminalType
                if head.chosen_choice().and_then(ProdChoice::step)
                    == Some(DecoderStep::Placeholder) =>
            {
                (
                    DecoderStep::Placeholder,
                    vec![CompToken::ident(PLACEHOLDER_LITERAL)],
                    None,
                )
            }
            step => (step, Vec::new(), None),
        }
    }

    fn continuation(&self, update: &EgUpdate) -> Predictor {
        let mut next = self.clone();
        next.update = update.clone();
        next
    }
}

// ---------------------------------------------------------------------------
// Branch walker
// ---------------------------------------------------------------------------

struct Walker<'a> {
    predictor: &'a Predictor,
    out: Vec<Prediction>,
}

impl Walker<'_> {
    fn emit(
        &mut self,
        node: &SearchNode,
        score: f64,
        tokens: &[CompToken],
        builder: Option<CallBuilder>,
        call_done: Option<PredictedCall>,
        last_symbol: Option<Symbol>,
    ) -> Result<(), SearchError> {
        if node.discarded {
            return Ok(());
        }
        if node.children.is_empty() {
            if !tokens.is_empty() {
                let call = call_done
                    .clone()
                    .or_else(|| builder.as_ref().map(|b| b.get_call(true)));
                let rendered: Vec<String> =
                    tokens.iter().map(|t| t.render().to_owned()).collect();
                let value = rendered.concat();
                let next = if node.stopping {
                    Some(self.predictor.continuation(&node.update))
                } else {
                    None
                };
                self.out.push(Prediction {
                    tokens: rendered,
                    value,
                    score,
                    symbol: last_symbol,
                    call,
                    next,
                });
            }
            return Ok(());
        }

        for child in &node.children {
            let score = score * child.prob as f64;
            let mut builder = builder.clone();
            let mut call_done = call_done.clone();
            let mut last_symbol = last_symbol.clone();
            let mut emitted = child.words.clone();

            match child.step {
                DecoderStep::NameDone | DecoderStep::Placeholder => {
                    if let Some(b) = builder.as_mut() {
                        b.next_arg.value = emitted
                            .first()
                            .map(|t| t.render().to_owned())
                            .unwrap_or_default();
                        b.finish_arg(child.prob);
                    }
                }
                DecoderStep::InferName => {
                    if let Some(b) = builder.as_mut() {
                        b.next_arg.prob *= child.prob;
                    }
                }
                DecoderStep::KeywordDone => {
                    if let Some(b) = builder.as_mut() {
                        if !b.next_arg.name.is_empty() {
                            return Err(SearchError::Decode {
                                detail: "argument already has a keyword name".into(),
                            });
                        }
                        b.next_arg.name = emitted
                            .first()
                            .map(|t| t.render().to_owned())
                            .unwrap_or_default();
                    }
                }
                DecoderStep::ChooseArgType => {
                    let picked = child
                        .head
                        .as_ref()
                        .and_then(EgTask::chosen_choice)
                        .and_then(ProdChoice::step);
                    if picked != Some(DecoderStep::Stop) {
                        if let Some(b) = builder.as_mut() {
                            if b.args.len() + b.num_orig_args > 0 {
                                if b.comma_present {
                                    b.comma_present = false;
                                } else {
                                    emitted.push(CompToken::fixed(TokenKind::Comma));
                                }
                            }
                        }
                    }
                }
                DecoderStep::CallDone => {
                    if let Some(mut b) = builder.take() {
                        b.prob *= child.prob;
                        if !b.rparen_present {
                            emitted.push(CompToken::fixed(TokenKind::Rparen));
                        }
                        call_done = Some(b.get_call(false));
                    }
                }
                DecoderStep::Call => {
                    let seeded = matches!(builder.as_ref(), Some(b) if !b.started);
                    if seeded {
                        if let Some(b) = builder.as_mut() {
                            b.started = true;
                        }
                    } else {
                        let mut b = root_builder(
                            last_symbol.clone(),
                            0,
                            self.predictor.scope_size,
                            false,
                            false,
                        );
                        b.started = true;
                        builder = Some(b);
                    }
                }
                DecoderStep::InferAttr => {
                    if child.symbol.is_some() {
                        last_symbol = child.symbol.clone();
                    }
                }
                _ => {}
            }

            let mut tokens = tokens.to_vec();
            tokens.extend(emitted);
            self.emit(child, score, &tokens, builder, call_done, last_symbol)?;
        }
        Ok(())
    }
}
