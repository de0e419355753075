//! One branch of the expansion, and the round that advances it.
//!
//! An update owns a copy-on-write overlay and a task stack whose top is
//! either still pending or already carries the model's choice. Expanding
//! first lets the decoder consume a completed head, then performs the
//! head task: transition tasks fall through with probability one, model
//! tasks fan out into one child per scored candidate.

use std::cmp::Ordering;
use std::sync::Arc;

use exprgraph_core::{AbortToken, Attributes, EdgeKind, NodeKind};
use exprgraph_model::{
    fetch, marker, ModelError, ModelMeta, NameModelFeed, ProductionModelFeed, ScoringModel,
    SegmentedIndicesFeed, MAX_CONTEXT_TOKENS,
};
use tracing::trace;

use crate::decoder::LexicalDecoder;
use crate::error::SearchError;
use crate::feed::{
    build_subgraph, propagate, EXPANSION_FEED_PREFIX, EXPANSION_NODE_STATES_OP,
    INFER_NAME_FEED_PREFIX, INFER_NAME_PRED_OP, INFER_PRODUCTION_FEED_PREFIX,
    INFER_PRODUCTION_PRED_OP,
};
use crate::info::SymbolInfoSource;
use crate::state::ExpansionState;
use crate::task::{EgTask, EgTaskStack, TaskKind};

/// Everything a search shares across its branches.
pub struct SearchEnv {
    pub meta: ModelMeta,
    pub model: Arc<dyn ScoringModel>,
    pub info: Arc<dyn SymbolInfoSource>,
    pub abort: AbortToken,
}

impl SearchEnv {
    pub(crate) fn decoder(&self) -> LexicalDecoder<'_> {
        LexicalDecoder {
            meta: &self.meta,
            info: self.info.as_ref(),
        }
    }
}

/// One branch: its overlay, its stack, and the probability of the step
/// that produced it.
#[derive(Clone)]
pub struct EgUpdate {
    env: Arc<SearchEnv>,
    state: ExpansionState,
    stack: EgTaskStack,
    prob: f32,
}

impl EgUpdate {
    pub fn new(env: Arc<SearchEnv>, state: ExpansionState, stack: EgTaskStack) -> Self {
        EgUpdate {
            env,
            state,
            stack,
            prob: 1.0,
        }
    }

    pub fn prob(&self) -> f32 {
        self.prob
    }

    pub fn state(&self) -> &ExpansionState {
        &self.state
    }

    /// The task this branch just performed, when there is one.
    pub fn peek(&self) -> Option<&EgTask> {
        self.stack.peek()
    }

    /// Runs one round: consume the completed head, then perform the new
    /// head task. Returns one child per candidate the model kept, best
    /// first, or nothing when the branch has run out of work.
    pub fn expand(&self) -> Result<Vec<EgUpdate>, SearchError> {
        self.env.abort.check()?;
        if self.stack.is_empty() {
            return Ok(Vec::new());
        }

        let decoder = self.env.decoder();
        let mut state = self.state.clone();
        let mut stack = self.stack.clone();

        let head = stack.pop().expect("checked non-empty");
        if head.completed {
            decoder.task_completed(&mut state, head, &mut stack)?;
        } else {
            stack.push(head);
        }
        let task = match stack.pop() {
            Some(task) => task,
            None => return Ok(Vec::new()),
        };
        trace!(client = task.client.name(), kind = ?task.kind, "expanding");

        match task.kind {
            TaskKind::NoInfer => {
                let mut done = task;
                done.chosen = if done.targets.is_empty() { None } else { Some(0) };
                done.completed = true;
                stack.push(done);
                Ok(vec![EgUpdate {
                    env: self.env.clone(),
                    state,
                    stack,
                    prob: 1.0,
                }])
            }
            TaskKind::Propagate => {
                propagate(
                    &mut state,
                    &self.env.meta,
                    self.env.model.as_ref(),
                    &task.client_nodes,
                    &[],
                )?;
                let mut done = task;
                done.completed = true;
                stack.push(done);
                Ok(vec![EgUpdate {
                    env: self.env.clone(),
                    state,
                    stack,
                    prob: 1.0,
                }])
            }
            TaskKind::InferProduction => self.expand_production(state, stack, task),
            TaskKind::InferName => self.expand_name(&decoder, state, stack, task),
        }
    }

    /// Scores the task's production targets against each other and forks
    /// one child per target.
    fn expand_production(
        &self,
        mut state: ExpansionState,
        stack: EgTaskStack,
        task: EgTask,
    ) -> Result<Vec<EgUpdate>, SearchError> {
        let meta = &self.env.meta;
        let cg = self.state.context();
        let mut extra = task.client_nodes.clone();
        extra.extend(cg.scope_nodes.iter().copied());

        let sub = build_subgraph(&state, meta, &[task.site], &extra);
        let mut fd = sub.feed.feed_dict(EXPANSION_FEED_PREFIX);

        let site_id = sub.id_of(task.site).expect("site is a lookup");
        let mut pf = ProductionModelFeed {
            prediction_nodes: vec![site_id],
            decoder_targets: SegmentedIndicesFeed::from_ids(task.targets.clone()),
            ..Default::default()
        };
        for &scope in &cg.scope_nodes {
            if let Some(id) = sub.id_of(scope) {
                pf.scope_encoder.push(id, 0);
            }
        }
        for token in cg.context_tokens.iter().take(MAX_CONTEXT_TOKENS) {
            pf.context_tokens.push(meta.name_subtokens.index(token), 0);
        }
        fd.extend(pf.feed_dict(INFER_PRODUCTION_FEED_PREFIX));

        let results = self
            .env
            .model
            .run(&fd, &[INFER_PRODUCTION_PRED_OP, EXPANSION_NODE_STATES_OP])?;
        let scores = fetch(&results, INFER_PRODUCTION_PRED_OP)?.as_floats()?.to_vec();
        if scores.len() != task.targets.len() {
            return Err(ModelError::Invocation {
                message: format!(
                    "model scored {} of {} production targets",
                    scores.len(),
                    task.targets.len()
                ),
            }
            .into());
        }
        let rows = fetch(&results, EXPANSION_NODE_STATES_OP)?
            .as_float_matrix()?
            .to_vec();
        sub.apply_states(&mut state, &[task.site], &rows)?;

        let mut updates = Vec::with_capacity(scores.len());
        for i in ranked(&scores) {
            let mut done = task.clone();
            done.chosen = Some(i);
            done.completed = true;
            let mut child_stack = stack.clone();
            child_stack.push(done);
            updates.push(EgUpdate {
                env: self.env.clone(),
                state: state.clone(),
                stack: child_stack,
                prob: scores[i],
            });
        }
        Ok(updates)
    }

    /// Scores the variables in scope for the site and forks one child
    /// per variable, each child binding its candidate.
    fn expand_name(
        &self,
        decoder: &LexicalDecoder<'_>,
        state: ExpansionState,
        stack: EgTaskStack,
        task: EgTask,
    ) -> Result<Vec<EgUpdate>, SearchError> {
        let meta = &self.env.meta;
        let (types, subtokens) = decoder.infer_name_decoder_embeddings(&state, task.site)?;

        // candidates are scored through per-variable summary nodes that
        // live only in this scoring fork
        let mut scoring = state.clone();
        let vars = scoring.variables().to_vec();
        if vars.is_empty() {
            return Err(SearchError::NoCandidates {
                detail: "no variables in scope".to_owned(),
            });
        }
        let mut usages = Vec::with_capacity(vars.len());
        for var in &vars {
            let latest = scoring.attrs(var.latest).clone();
            let mut attrs = Attributes::usage(latest.literal, latest.values);
            if attrs.types.is_empty() {
                attrs.types.push(marker::UNKNOWN_TYPE.to_owned());
            }
            let usage = scoring.add_node(NodeKind::VariableUsage, attrs, None);
            for &r in &var.refs {
                scoring.add_edge(r, usage, EdgeKind::DataFlow);
            }
            usages.push(usage);
        }

        let mut lookups = usages.clone();
        lookups.push(task.site);
        let sub = build_subgraph(&scoring, meta, &lookups, &[]);
        let mut fd = sub.feed.feed_dict(EXPANSION_FEED_PREFIX);

        let mut nf = NameModelFeed {
            prediction_nodes: vec![sub.id_of(task.site).expect("site is a lookup")],
            ..Default::default()
        };
        for ty in &types {
            nf.types.push(meta.type_subtokens.index(ty), 0);
        }
        for tok in &subtokens {
            nf.subtokens.push(meta.name_subtokens.index(tok), 0);
        }
        for &usage in &usages {
            nf.names
                .usages
                .push(sub.id_of(usage).expect("usage is a lookup"), 0);
        }
        fd.extend(nf.feed_dict(INFER_NAME_FEED_PREFIX));

        let results = self.env.model.run(&fd, &[INFER_NAME_PRED_OP])?;
        let scores = fetch(&results, INFER_NAME_PRED_OP)?.as_floats()?.to_vec();
        if scores.len() != vars.len() {
            return Err(ModelError::Invocation {
                message: format!(
                    "model scored {} of {} name candidates",
                    scores.len(),
                    vars.len()
                ),
            }
            .into());
        }

        let mut updates = Vec::with_capacity(scores.len());
        for i in ranked(&scores) {
            // bind on a fork of the pre-scoring state: the summary nodes
            // were only ever model inputs
            let mut child_state = state.clone();
            child_state.bind_variable(i, task.site);
            let mut done = task.clone();
            done.chosen = Some(i);
            done.completed = true;
            let mut child_stack = stack.clone();
            child_stack.push(done);
            updates.push(EgUpdate {
                env: self.env.clone(),
                state: child_state,
                stack: child_stack,
                prob: scores[i],
            });
        }
        Ok(updates)
    }
}

/// Candidate indices ordered best first.
fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::decoder::PLACEHOLDER_LITERAL;
    use crate::fixtures::{attr_site_context, name_site_context, test_meta, ScriptedModel, StubInfo};
    use crate::state::SharedContext;
    use crate::task::DecoderStep;

    fn env_with(scores: Vec<f32>) -> Arc<SearchEnv> {
        Arc::new(SearchEnv {
            meta: test_meta(),
            model: Arc::new(ScriptedModel::scored(scores)),
            info: Arc::new(StubInfo::new()),
            abort: AbortToken::new(),
        })
    }

    fn prepared(
        cg: exprgraph_build::ContextGraph,
        env: &Arc<SearchEnv>,
    ) -> EgUpdate {
        let mut state = ExpansionState::new(Arc::new(SharedContext::new(cg)));
        let stack = env.decoder().prepare_for_inference(&mut state).unwrap();
        EgUpdate::new(env.clone(), state, stack)
    }

    #[test]
    fn transition_tasks_fall_through_with_probability_one() {
        let env = env_with(vec![]);
        let mut state = ExpansionState::new(Arc::new(SharedContext::new(name_site_context())));
        let node = state.add_node(
            exprgraph_core::NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        let mut stack = EgTaskStack::new();
        stack.push(EgTask::no_infer(DecoderStep::ExprDone, node));
        let update = EgUpdate::new(env, state, stack);

        let children = update.expand().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].prob(), 1.0);
        let head = children[0].peek().unwrap();
        assert!(head.completed);
        assert_eq!(head.client, DecoderStep::ExprDone);

        // the completed head is consumed and nothing remains
        assert!(children[0].expand().unwrap().is_empty());
    }

    #[test]
    fn name_inference_forks_one_branch_per_variable() {
        let env = env_with(vec![0.2, 0.5, 0.3]);
        let update = prepared(name_site_context(), &env);

        let children = update.expand().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].prob(), 0.5);
        assert_eq!(children[1].prob(), 0.3);
        assert_eq!(children[2].prob(), 0.2);

        for child in &children {
            let head = child.peek().unwrap();
            assert!(head.completed);
            let bound = child.state().attrs(head.site).literal.clone();
            let idx = head.chosen.unwrap();
            let latest = update.state().variables()[idx].latest;
            assert_eq!(bound, update.state().attrs(latest).literal);
        }
    }

    #[test]
    fn production_inference_orders_branches_by_score() {
        let env = env_with(vec![0.1, 0.9]);
        let update = prepared(attr_site_context(), &env);

        // the dot emitter falls through first
        let children = update.expand().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].peek().unwrap().client, DecoderStep::Attr);

        // then the attribute production pass forks per candidate
        let children = children[0].expand().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].prob(), 0.9);
        assert_eq!(children[0].peek().unwrap().chosen, Some(1));
        assert_eq!(children[1].prob(), 0.1);
        assert_eq!(children[1].peek().unwrap().chosen, Some(0));
    }

    #[test]
    fn aborted_searches_stop_expanding() {
        let env = env_with(vec![]);
        env.abort.abort();
        let update = prepared(name_site_context(), &env);
        assert!(matches!(
            update.expand(),
            Err(SearchError::Aborted(_))
        ));
    }

    #[test]
    fn placeholder_literal_is_a_valid_token() {
        assert!(!PLACEHOLDER_LITERAL.is_empty());
        assert!(!marker::is_special_token(PLACEHOLDER_LITERAL));
    }

    proptest! {
        #[test]
        fn ranked_is_a_descending_permutation(scores in proptest::collection::vec(0.0f32..1.0, 0..16)) {
            let order = ranked(&scores);
            let mut seen: Vec<usize> = order.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..scores.len()).collect::<Vec<_>>());
            for pair in order.windows(2) {
                prop_assert!(scores[pair[0]] >= scores[pair[1]]);
            }
        }
    }
}
