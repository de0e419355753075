//! The grammar that grows expression structure around the site.
//!
//! Every inference round ends with a completed task; the decoder then
//! rewrites the branch's stack for the next round. The rewrite rules
//! below are the whole grammar: which node gets spliced in where, which
//! production ids compete, and which transition tasks emit the tokens a
//! completion renders.

use exprgraph_core::{
    Attributes, EdgeKind, GlobalValue, NodeId, NodeKind, ParentField, Symbol, TokenKind,
};
use exprgraph_model::{marker, ModelMeta};
use tracing::trace;

use crate::error::SearchError;
use crate::info::{ArgClass, FuncInfo, SymbolInfoSource};
use crate::state::ExpansionState;
use crate::task::{DecoderStep, EgTask, EgTaskStack, ProdChoice};

/// Rendered text of a placeholder argument.
pub const PLACEHOLDER_LITERAL: &str = "___";

/// Call-site facts the grammar needs at an argument position.
pub(crate) struct FuncBundle {
    pub arg_idx: u32,
    /// Keyword chosen for this argument, empty for positional.
    pub kw: String,
    pub info: FuncInfo,
    /// Keyword names already present at the call.
    pub seen: Vec<String>,
    /// Argument count including the one being decoded.
    pub num_args: usize,
}

impl FuncBundle {
    pub fn positional_allowed(&self) -> bool {
        self.seen.is_empty()
            && self.num_args < self.info.patterns.max_args
            && self.info.patterns.positional_ok(self.arg_idx as usize)
    }

    pub fn keyword_allowed(&self) -> bool {
        self.info
            .kwarg_name_ids
            .iter()
            .any(|(name, _)| !self.seen.contains(name))
    }
}

pub struct LexicalDecoder<'a> {
    pub meta: &'a ModelMeta,
    pub info: &'a dyn SymbolInfoSource,
}

impl<'a> LexicalDecoder<'a> {
    // -----------------------------------------------------------------------
    // Entry
    // -----------------------------------------------------------------------

    /// Copies the context site into the overlay and seeds the stack for
    /// the site's kind. Name sites go straight to name inference, call
    /// and attribute sites replay the corresponding grammar transition.
    pub fn prepare_for_inference(
        &self,
        state: &mut ExpansionState,
    ) -> Result<EgTaskStack, SearchError> {
        let cg_site = state.context().site;
        let attrs = state.attrs(cg_site).clone();
        let kind = state.kind(cg_site);
        let row = state.state_row(cg_site).to_vec();
        let site = state.add_node(kind, attrs, Some(row));

        // the copy reads the context through fed edges but mutations to
        // its own structure stay in the overlay
        for (src, kind) in state.incoming(cg_site) {
            state.add_edge(src, site, kind);
        }
        for (dst, kind) in state.outgoing(cg_site) {
            state.add_nav_edge(site, dst, kind);
        }

        let mut stack = EgTaskStack::new();
        stack.push(EgTask::no_infer(DecoderStep::ExprDone, site));

        let label = state.attrs(site).label.clone();
        trace!(%label, "preparing site for expansion");
        match label.as_str() {
            "CallExpr" => {
                let func = state
                    .ast_child_for_field(site, ParentField::Func)
                    .ok_or_else(|| SearchError::Decode {
                        detail: "call site has no function child".to_owned(),
                    })?;
                let mut task = EgTask::infer_production(
                    DecoderStep::ChooseExprType,
                    site,
                    vec![self.meta.productions.index(marker::CALL)?],
                    vec![ProdChoice::Step(DecoderStep::Call)],
                    vec![func],
                );
                task.chosen = Some(0);
                task.completed = true;
                self.task_completed(state, task, &mut stack)?;
            }
            "AttributeExpr" => {
                let value = state
                    .ast_child_for_field(site, ParentField::Value)
                    .ok_or_else(|| SearchError::Decode {
                        detail: "attribute site has no value child".to_owned(),
                    })?;
                let mut task = EgTask::infer_production(
                    DecoderStep::ChooseExprType,
                    site,
                    vec![self.meta.productions.index(marker::ATTR)?],
                    vec![ProdChoice::Step(DecoderStep::Attr)],
                    vec![value],
                );
                task.chosen = Some(0);
                task.completed = true;
                self.task_completed(state, task, &mut stack)?;
            }
            "NameExpr" => {
                let mut task = EgTask::infer_production(
                    DecoderStep::ChooseTerminalType,
                    site,
                    vec![self.meta.productions.index(marker::NO_PLACEHOLDER)?],
                    vec![ProdChoice::Step(DecoderStep::NoPlaceholder)],
                    vec![],
                );
                task.chosen = Some(0);
                task.completed = true;
                self.task_completed(state, task, &mut stack)?;
            }
            _ => {
                return Err(SearchError::UnsupportedSite {
                    ast: state.attrs(site).data.ast.unwrap_or_default(),
                    detail: format!("cannot expand a {label} site"),
                })
            }
        }
        Ok(stack)
    }

    // -----------------------------------------------------------------------
    // Completion dispatch
    // -----------------------------------------------------------------------

    /// Advances the grammar after `task` finished. Transition tasks that
    /// only exist to emit tokens fall through without touching the stack.
    pub fn task_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        trace!(client = task.client.name(), "task completed");
        match task.client {
            DecoderStep::ChooseTerminalType => self.choose_terminal_type_completed(state, task, stack),
            DecoderStep::ChooseExprType => self.choose_expr_type_completed(state, task, stack),
            DecoderStep::ChooseArgType => self.choose_arg_type_completed(state, task, stack),
            DecoderStep::InferName => self.choose_expr_type_next(state, task.site, stack),
            DecoderStep::InferAttr => self.infer_attr_completed(state, task),
            DecoderStep::InferKeywordArgName => self.infer_kwarg_completed(state, task),
            DecoderStep::AttrDone => self.attr_done_completed(state, task, stack),
            DecoderStep::ArgDone => self.choose_arg_type_next(state, task.site, stack),
            DecoderStep::CallDone => self.choose_expr_type_next(state, task.site, stack),
            DecoderStep::Expr => self.expr_completed(state, task, stack),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Terminals
    // -----------------------------------------------------------------------

    /// Decides how a terminal slot gets filled. Inside a call argument
    /// with mined placeholder productions the model weighs a placeholder
    /// against a real expression; everywhere else the slot always gets a
    /// real expression.
    fn choose_terminal_type_next(
        &self,
        state: &mut ExpansionState,
        site: NodeId,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        if let Some(arg) = state.ast_ancestor_with_label(site, 1, "Argument") {
            let fi = self.func_info_bundle(state, arg)?;
            let slot_name = if fi.kw.is_empty() {
                fi.info
                    .patterns
                    .positional
                    .get(fi.arg_idx as usize)
                    .map(|p| p.name.clone())
                    .unwrap_or_default()
            } else {
                fi.kw.clone()
            };
            if let Some(&[no_ph, ph]) = fi.info.arg_placeholder_ids.get(&slot_name) {
                let attrs = state.attrs_mut(site);
                attrs.literal = marker::INFER_ARG_PLACEHOLDER_MARKER.to_owned();
                attrs.types.clear();
                let slot_type = fi
                    .info
                    .patterns
                    .slot(&fi.kw, fi.arg_idx as usize)
                    .and_then(|p| p.types.first())
                    .map(|t| t.rsplit('.').next().unwrap_or(t).to_owned());
                attrs
                    .types
                    .push(slot_type.unwrap_or_else(|| marker::NA_TYPE.to_owned()));
                stack.push(EgTask::infer_production(
                    DecoderStep::ChooseTerminalType,
                    site,
                    vec![no_ph, ph],
                    vec![
                        ProdChoice::Step(DecoderStep::NoPlaceholder),
                        ProdChoice::Step(DecoderStep::Placeholder),
                    ],
                    vec![],
                ));
                return Ok(());
            }
        }
        stack.push(EgTask::infer_production(
            DecoderStep::ChooseTerminalType,
            site,
            vec![self.meta.productions.index(marker::NO_PLACEHOLDER)?],
            vec![ProdChoice::Step(DecoderStep::GenericNoPlaceholder)],
            vec![],
        ));
        Ok(())
    }

    fn choose_terminal_type_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        if task.chosen_choice().and_then(ProdChoice::step) == Some(DecoderStep::Placeholder) {
            let attrs = state.attrs_mut(task.site);
            attrs.label = "NameExpr".to_owned();
            attrs.literal = PLACEHOLDER_LITERAL.to_owned();
            attrs.types.clear();
            attrs.types.push(marker::NA_TYPE.to_owned());
            attrs.values.clear();
            return Ok(());
        }
        self.infer_name_next(state, task.site, stack)
    }

    fn infer_name_next(
        &self,
        state: &mut ExpansionState,
        site: NodeId,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let attrs = state.attrs_mut(site);
        attrs.label = "NameExpr".to_owned();
        attrs.literal = marker::INFER_NAME_MARKER.to_owned();
        attrs.types.clear();
        attrs.types.push(marker::INFER_NAME_MARKER.to_owned());
        attrs.values.clear();
        stack.push(EgTask::infer_name(site));
        Ok(())
    }

    /// Type and subtoken inputs for the name decoder at `site`. Outside
    /// a call argument there is no mined pattern to condition on, so
    /// both sides collapse to the generic marker.
    pub fn infer_name_decoder_embeddings(
        &self,
        state: &ExpansionState,
        site: NodeId,
    ) -> Result<(Vec<String>, Vec<String>), SearchError> {
        let arg = match state.ast_ancestor_with_label(site, 1, "Argument") {
            Some(arg) => arg,
            None => {
                let generic = vec![marker::GENERIC_NAME_DECODER.to_owned()];
                return Ok((generic.clone(), generic));
            }
        };
        let fi = self.func_info_bundle(state, arg)?;
        let (types, subtokens) = fi
            .info
            .patterns
            .decoder_feed(&fi.kw, fi.arg_idx as usize);
        if types.is_empty() || subtokens.is_empty() {
            return Err(SearchError::Decode {
                detail: format!(
                    "no name decoder inputs for argument {} of {}",
                    fi.arg_idx,
                    fi.info.symbol.path()
                ),
            });
        }
        Ok((types, subtokens))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Splices a speculative parent above `last_site` and asks whether
    /// the expression keeps growing. A resolvable value can only grow
    /// into a call; everything else stops.
    fn choose_expr_type_next(
        &self,
        state: &mut ExpansionState,
        last_site: NodeId,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let parent = state.ast_parent(last_site);
        let last_attrs = state.attrs(last_site).clone();

        let mut attrs = Attributes::internal(marker::INFER_EXPR_TYPE_MARKER);
        attrs.literal = marker::INFER_EXPR_TYPE_MARKER.to_owned();
        attrs.types = last_attrs.types.clone();
        attrs.data.parent_field = last_attrs.data.parent_field;
        attrs.data.parent_pos = last_attrs.data.parent_pos;
        let splice = state.add_node(NodeKind::AstInternal, attrs, None);

        state.remove_edge(parent, last_site, EdgeKind::AstChild);
        state.add_edge(parent, splice, EdgeKind::AstChild);
        state.add_edge(splice, last_site, EdgeKind::AstChild);

        let callable = last_attrs
            .values
            .iter()
            .any(|v| matches!(v, GlobalValue::External(_)));
        let (targets, choices) = if callable {
            (
                vec![self.meta.productions.index(marker::CALL)?],
                vec![ProdChoice::Step(DecoderStep::Call)],
            )
        } else {
            (
                vec![self.meta.productions.index(marker::STOP)?],
                vec![ProdChoice::Step(DecoderStep::Stop)],
            )
        };
        stack.push(EgTask::infer_production(
            DecoderStep::ChooseExprType,
            splice,
            targets,
            choices,
            vec![last_site],
        ));
        Ok(())
    }

    fn choose_expr_type_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let splice = task.site;
        let child = *task.client_nodes.first().ok_or_else(|| SearchError::Decode {
            detail: "expression choice without a child".to_owned(),
        })?;
        let step = task
            .chosen_choice()
            .and_then(ProdChoice::step)
            .ok_or_else(|| SearchError::Decode {
                detail: "expression choice without a decision".to_owned(),
            })?;
        match step {
            DecoderStep::Stop => {
                // the expression is finished, take the splice back out
                let parent = state.ast_parent(splice);
                let splice_data = state.attrs(splice).data.clone();
                state.remove_edge(parent, splice, EdgeKind::AstChild);
                state.remove_edge(splice, child, EdgeKind::AstChild);
                state.add_edge(parent, child, EdgeKind::AstChild);
                let attrs = state.attrs_mut(child);
                attrs.data.parent_field = splice_data.parent_field;
                attrs.data.parent_pos = splice_data.parent_pos;
                Ok(())
            }
            DecoderStep::Attr => {
                let attrs = state.attrs_mut(splice);
                attrs.label = "AttributeExpr".to_owned();
                attrs.literal.clear();
                if state.is_eg(child) {
                    state.attrs_mut(child).data.parent_field = Some(ParentField::Value);
                }
                self.infer_attr_next(state, splice, stack)?;
                stack.push(EgTask::no_infer(DecoderStep::Attr, splice));
                Ok(())
            }
            DecoderStep::Call => {
                let attrs = state.attrs_mut(splice);
                attrs.label = "CallExpr".to_owned();
                attrs.literal.clear();
                if state.is_eg(child) {
                    state.attrs_mut(child).data.parent_field = Some(ParentField::Func);
                }
                let lparen = match state.ast_child_for_field(splice, ParentField::LeftParen) {
                    Some(existing) => existing,
                    None => {
                        let mut attrs = Attributes::word(TokenKind::Lparen, "(");
                        attrs.types.push(marker::NA_TYPE.to_owned());
                        attrs.data.parent_field = Some(ParentField::LeftParen);
                        let lparen = state.add_node(NodeKind::AstTerminal, attrs, None);
                        state.add_edge(splice, lparen, EdgeKind::AstChild);
                        lparen
                    }
                };
                stack.push(EgTask::no_infer(DecoderStep::CallDone, splice));
                self.choose_arg_type_next(state, splice, stack)?;
                if state.is_eg(lparen) {
                    stack.push(EgTask::propagate(vec![lparen]));
                }
                stack.push(EgTask::no_infer(DecoderStep::Call, splice));
                Ok(())
            }
            other => Err(SearchError::Decode {
                detail: format!("unexpected expression choice {}", other.name()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    /// Attaches an attribute-name slot under `last_site` and scores the
    /// base symbol's attributes. An attribute token already present in
    /// the buffer becomes a prefix filter.
    fn infer_attr_next(
        &self,
        state: &mut ExpansionState,
        last_site: NodeId,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let prefix = state
            .outgoing(last_site)
            .into_iter()
            .filter(|&(_, k)| k == EdgeKind::AstChild)
            .map(|(n, _)| n)
            .find_map(|n| {
                let attrs = state.attrs(n);
                let lit = &attrs.literal;
                (state.kind(n) == NodeKind::AstTerminal
                    && attrs.data.parent_field.is_none()
                    && !lit.is_empty()
                    && !lit.contains('.'))
                .then(|| lit.clone())
            })
            .unwrap_or_default();

        let mut attrs = Attributes::internal("NameExpr");
        attrs.literal = marker::INFER_ATTR_MARKER.to_owned();
        attrs.types = state.attrs(last_site).types.clone();
        attrs.data.parent_field = Some(ParentField::Attribute);
        let next_site = state.add_node(NodeKind::AstTerminal, attrs, None);
        state.add_edge(last_site, next_site, EdgeKind::AstChild);

        let base = state
            .ast_child_for_field(last_site, ParentField::Value)
            .ok_or_else(|| SearchError::Decode {
                detail: "attribute without a value child".to_owned(),
            })?;
        let syms = symbols_of(&state.attrs(base).values);
        if syms.is_empty() {
            return Err(SearchError::NoCandidates {
                detail: "attribute base resolves to nothing".to_owned(),
            });
        }

        let mut targets = Vec::new();
        let mut choices = Vec::new();
        for sym in &syms {
            for cand in self.info.attr_candidates(sym) {
                if !cand.last().starts_with(&prefix) {
                    continue;
                }
                if let Some(id) = self.info.attr_production(&cand) {
                    targets.push(id);
                    choices.push(ProdChoice::Attr(cand));
                }
            }
        }
        if targets.is_empty() {
            return Err(SearchError::NoCandidates {
                detail: format!("no attributes of {} match {prefix:?}", syms[0].path()),
            });
        }

        let mut done = EgTask::no_infer(DecoderStep::AttrDone, last_site);
        done.client_nodes = vec![next_site];
        stack.push(done);
        stack.push(EgTask::infer_production(
            DecoderStep::InferAttr,
            next_site,
            targets,
            choices,
            vec![],
        ));
        Ok(())
    }

    fn infer_attr_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
    ) -> Result<(), SearchError> {
        let sym = match task.chosen_choice() {
            Some(ProdChoice::Attr(sym)) => sym.clone(),
            _ => {
                return Err(SearchError::Decode {
                    detail: "attribute inference without a chosen symbol".to_owned(),
                })
            }
        };
        let attrs = state.attrs_mut(task.site);
        attrs.literal = sym.last().to_owned();
        attrs.types.clear();
        attrs.types.push(marker::NA_TYPE.to_owned());
        attrs.data.symbol = Some(sym);
        Ok(())
    }

    fn attr_done_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let name = *task.client_nodes.first().ok_or_else(|| SearchError::Decode {
            detail: "attribute finish without a name child".to_owned(),
        })?;
        let sym = state
            .attrs(name)
            .data
            .symbol
            .clone()
            .ok_or_else(|| SearchError::Decode {
                detail: "attribute finish before a symbol was chosen".to_owned(),
            })?;
        state
            .attrs_mut(task.site)
            .set_values(vec![GlobalValue::External(sym)]);
        self.choose_expr_type_next(state, task.site, stack)
    }

    // -----------------------------------------------------------------------
    // Arguments
    // -----------------------------------------------------------------------

    /// Opens the next argument slot of `call` and asks stop vs
    /// positional vs keyword.
    fn choose_arg_type_next(
        &self,
        state: &mut ExpansionState,
        call: NodeId,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        stack.push(EgTask::no_infer(DecoderStep::ArgDone, call));

        let existing = state
            .outgoing(call)
            .into_iter()
            .filter(|&(n, k)| {
                k == EdgeKind::AstChild
                    && state.attrs(n).data.parent_field == Some(ParentField::Args)
            })
            .count() as u32;

        let mut attrs = Attributes::internal("Argument");
        attrs.literal = marker::INFER_ARG_TYPE_MARKER.to_owned();
        attrs.types.push(marker::INFER_ARG_TYPE_MARKER.to_owned());
        attrs.data.parent_field = Some(ParentField::Args);
        attrs.data.parent_pos = existing;
        let arg = state.add_node(NodeKind::AstInternal, attrs, None);
        state.add_edge(call, arg, EdgeKind::AstChild);

        let fi = self.func_info_bundle(state, arg)?;

        let mut propagate = None;
        if existing == 0 {
            let lparen = state
                .ast_child_for_field(call, ParentField::LeftParen)
                .ok_or_else(|| SearchError::Decode {
                    detail: "call without an opening paren".to_owned(),
                })?;
            state.add_edge(lparen, arg, EdgeKind::NextToken);
        } else {
            let mut comma_attrs = Attributes::word(TokenKind::Comma, ",");
            comma_attrs.types.push(marker::NA_TYPE.to_owned());
            comma_attrs.data.parent_field = Some(ParentField::Commas);
            comma_attrs.data.parent_pos = existing - 1;
            let comma = state.add_node(NodeKind::AstTerminal, comma_attrs, None);
            state.add_edge(call, comma, EdgeKind::AstChild);
            state.add_edge(comma, arg, EdgeKind::NextToken);
            if let Some(prev) = state.ast_child_at(call, ParentField::Args, existing - 1) {
                for (token, kind) in state.outgoing(prev) {
                    if kind == EdgeKind::AstChild && state.kind(token) == NodeKind::AstTerminal {
                        state.add_edge(token, comma, EdgeKind::NextToken);
                    }
                }
            }
            propagate = Some(comma);
        }

        let stop = *fi
            .info
            .arg_type_ids
            .get(&ArgClass::Stop)
            .ok_or_else(|| SearchError::Decode {
                detail: format!("{} has no stop production", fi.info.symbol.path()),
            })?;
        let mut targets = vec![stop];
        let mut choices = vec![ProdChoice::Step(DecoderStep::Stop)];
        if fi.positional_allowed() {
            if let Some(&id) = fi.info.arg_type_ids.get(&ArgClass::Positional) {
                targets.push(id);
                choices.push(ProdChoice::Step(DecoderStep::Positional));
            }
        }
        if fi.keyword_allowed() {
            if let Some(&id) = fi.info.arg_type_ids.get(&ArgClass::Keyword) {
                targets.push(id);
                choices.push(ProdChoice::Step(DecoderStep::Keyword));
            }
        }
        stack.push(EgTask::infer_production(
            DecoderStep::ChooseArgType,
            arg,
            targets,
            choices,
            vec![],
        ));
        if let Some(comma) = propagate {
            stack.push(EgTask::propagate(vec![comma]));
        }
        Ok(())
    }

    fn choose_arg_type_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let arg = task.site;
        let step = task
            .chosen_choice()
            .and_then(ProdChoice::step)
            .ok_or_else(|| SearchError::Decode {
                detail: "argument choice without a decision".to_owned(),
            })?;
        if step == DecoderStep::Stop {
            let call = state.ast_parent(arg);
            state.remove_edge(call, arg, EdgeKind::AstChild);
            // the pending ArgDone would reopen the slot we just closed
            match stack.pop() {
                Some(done) if done.client == DecoderStep::ArgDone => Ok(()),
                other => Err(SearchError::Decode {
                    detail: format!(
                        "argument stop expected a pending arg_done, found {:?}",
                        other.map(|t| t.client.name())
                    ),
                }),
            }
        } else {
            let attrs = state.attrs_mut(arg);
            attrs.literal.clear();
            attrs.types.clear();
            attrs.types.push(marker::NA_TYPE.to_owned());
            let prev_token = state
                .incoming(arg)
                .into_iter()
                .find_map(|(n, k)| (k == EdgeKind::NextToken).then_some(n))
                .ok_or_else(|| SearchError::Decode {
                    detail: "argument slot has no preceding token".to_owned(),
                })?;
            state.remove_edge(prev_token, arg, EdgeKind::NextToken);
            self.arg_next(state, arg, prev_token, step, stack)
        }
    }

    /// Grows the value (and keyword name, when chosen) of a fresh
    /// argument.
    fn arg_next(
        &self,
        state: &mut ExpansionState,
        arg: NodeId,
        prev_token: NodeId,
        step: DecoderStep,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        let mut value_attrs = Attributes::internal("NameExpr");
        value_attrs.literal = marker::UNKNOWN_TOKEN.to_owned();
        value_attrs.types.push(marker::UNKNOWN_TYPE.to_owned());
        value_attrs.data.parent_field = Some(ParentField::Value);
        let value = state.add_node(NodeKind::AstTerminal, value_attrs, None);
        state.add_edge(arg, value, EdgeKind::AstChild);
        stack.push(EgTask::no_infer(DecoderStep::Expr, value));

        match step {
            DecoderStep::Positional => {
                state.add_edge(prev_token, value, EdgeKind::NextToken);
                Ok(())
            }
            DecoderStep::Keyword => {
                let mut kw_attrs = Attributes::internal("NameExpr");
                kw_attrs.literal = marker::INFER_KWARG_NAME_MARKER.to_owned();
                kw_attrs.types.push(marker::INFER_KWARG_NAME_MARKER.to_owned());
                kw_attrs.data.parent_field = Some(ParentField::Name);
                let kw = state.add_node(NodeKind::AstTerminal, kw_attrs, None);
                state.add_edge(arg, kw, EdgeKind::AstChild);
                state.add_edge(prev_token, kw, EdgeKind::NextToken);

                let fi = self.func_info_bundle(state, arg)?;
                let mut targets = Vec::new();
                let mut choices = Vec::new();
                for (name, id) in &fi.info.kwarg_name_ids {
                    if fi.seen.contains(name) {
                        continue;
                    }
                    targets.push(*id);
                    choices.push(ProdChoice::Keyword(name.clone()));
                }
                if targets.is_empty() {
                    return Err(SearchError::NoCandidates {
                        detail: format!("{} has no unseen keywords", fi.info.symbol.path()),
                    });
                }
                stack.push(EgTask::no_infer(DecoderStep::KeywordDone, kw));
                stack.push(EgTask::infer_production(
                    DecoderStep::InferKeywordArgName,
                    kw,
                    targets,
                    choices,
                    vec![],
                ));
                Ok(())
            }
            other => Err(SearchError::Decode {
                detail: format!("unexpected argument kind {}", other.name()),
            }),
        }
    }

    fn infer_kwarg_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
    ) -> Result<(), SearchError> {
        let name = match task.chosen_choice() {
            Some(ProdChoice::Keyword(name)) => name.clone(),
            _ => {
                return Err(SearchError::Decode {
                    detail: "keyword inference without a chosen name".to_owned(),
                })
            }
        };
        let attrs = state.attrs_mut(task.site);
        attrs.label = "NameExpr".to_owned();
        attrs.literal = name;
        attrs.types.clear();
        attrs.types.push(marker::NA_TYPE.to_owned());
        Ok(())
    }

    fn expr_completed(
        &self,
        state: &mut ExpansionState,
        task: EgTask,
        stack: &mut EgTaskStack,
    ) -> Result<(), SearchError> {
        stack.push(EgTask::no_infer(DecoderStep::ExprDone, task.site));
        self.choose_terminal_type_next(state, task.site, stack)
    }

    // -----------------------------------------------------------------------
    // Call-site facts
    // -----------------------------------------------------------------------

    /// Gathers what the grammar knows about the call surrounding an
    /// argument node: the resolved function, its mined patterns, the
    /// keywords already used, and where this argument sits.
    pub(crate) fn func_info_bundle(
        &self,
        state: &ExpansionState,
        arg: NodeId,
    ) -> Result<FuncBundle, SearchError> {
        let call = state
            .ast_ancestor_with_label(arg, 1, "CallExpr")
            .ok_or_else(|| SearchError::Decode {
                detail: "argument outside of a call".to_owned(),
            })?;
        let func = state
            .ast_child_for_field(call, ParentField::Func)
            .ok_or_else(|| SearchError::Decode {
                detail: "call without a function child".to_owned(),
            })?;
        let syms = symbols_of(&state.attrs(func).values);
        if syms.is_empty() {
            return Err(SearchError::UnresolvedFunction);
        }

        let mut num_args = 0usize;
        let mut seen = Vec::new();
        let mut kw = String::new();
        for (child, kind) in state.outgoing(call) {
            if kind != EdgeKind::AstChild
                || state.attrs(child).data.parent_field != Some(ParentField::Args)
            {
                continue;
            }
            num_args += 1;
            if let Some(name) = state.ast_child_for_field(child, ParentField::Name) {
                let lit = state.attrs(name).literal.clone();
                if lit.is_empty() || marker::is_special_token(&lit) {
                    continue;
                }
                if child == arg {
                    kw = lit;
                } else {
                    seen.push(lit);
                }
            }
        }

        let info = syms
            .iter()
            .find_map(|sym| self.info.func_info(sym))
            .ok_or_else(|| SearchError::MissingFuncInfo {
                path: syms[0].path().to_owned(),
            })?;
        Ok(FuncBundle {
            arg_idx: state.attrs(arg).data.parent_pos,
            kw,
            info,
            seen,
            num_args,
        })
    }
}

/// Symbols of the resolved values, deduplicated in order.
fn symbols_of(values: &[GlobalValue]) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = Vec::new();
    for value in values {
        let sym = value.symbol().clone();
        if !out.contains(&sym) {
            out.push(sym);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::fixtures::{
        attr_site_context, call_site_context, name_site_context, test_meta, StubInfo,
    };
    use crate::state::SharedContext;
    use crate::task::TaskKind;

    fn prepared(cg: exprgraph_build::ContextGraph) -> (ExpansionState, EgTaskStack, ModelMeta) {
        let meta = test_meta();
        let info = StubInfo::new();
        let mut state = ExpansionState::new(Arc::new(SharedContext::new(cg)));
        let stack = {
            let decoder = LexicalDecoder {
                meta: &meta,
                info: &info,
            };
            decoder.prepare_for_inference(&mut state).unwrap()
        };
        (state, stack, meta)
    }

    fn clients(stack: &EgTaskStack) -> Vec<DecoderStep> {
        let mut copy = stack.clone();
        let mut out = Vec::new();
        while let Some(task) = copy.pop() {
            out.push(task.client);
        }
        out
    }

    #[test]
    fn name_site_goes_straight_to_name_inference() {
        let (state, stack, _) = prepared(name_site_context());
        assert_eq!(
            clients(&stack),
            vec![DecoderStep::InferName, DecoderStep::ExprDone]
        );
        let site = stack.peek().unwrap().site;
        assert!(state.is_eg(site));
        assert_eq!(state.attrs(site).literal, marker::INFER_NAME_MARKER);
    }

    #[test]
    fn attr_site_scores_prefix_filtered_candidates() {
        let (state, stack, _) = prepared(attr_site_context());
        // top to bottom: the dot emitter, then the inference, then the
        // bookkeeping tasks
        assert_eq!(
            clients(&stack),
            vec![
                DecoderStep::Attr,
                DecoderStep::InferAttr,
                DecoderStep::AttrDone,
                DecoderStep::ExprDone,
            ]
        );
        let mut copy = stack.clone();
        copy.pop();
        let infer = copy.pop().unwrap();
        assert_eq!(infer.kind, TaskKind::InferProduction);
        // "mod.f" has no production entry, "foo" and "foobar" match the
        // existing attribute text
        let names: Vec<&str> = infer
            .choices
            .iter()
            .map(|c| match c {
                ProdChoice::Attr(sym) => sym.last(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["foo", "foobar"]);
        assert_eq!(state.attrs(infer.site).literal, marker::INFER_ATTR_MARKER);
    }

    #[test]
    fn call_site_opens_an_argument_slot() {
        let (state, stack, _) = prepared(call_site_context());
        assert_eq!(
            clients(&stack),
            vec![
                DecoderStep::Call,
                DecoderStep::Propagate,
                DecoderStep::ChooseArgType,
                DecoderStep::ArgDone,
                DecoderStep::CallDone,
                DecoderStep::ExprDone,
            ]
        );
        let mut copy = stack.clone();
        copy.pop();
        copy.pop();
        let choose = copy.pop().unwrap();
        // stop, positional (slot "count"), keyword (unseen "indent")
        assert_eq!(choose.targets.len(), 3);
        assert_eq!(choose.kind, TaskKind::InferProduction);
        // the new slot rides behind a synthesized comma
        let arg = choose.site;
        assert_eq!(state.attrs(arg).data.parent_pos, 1);
        let comma = state
            .incoming(arg)
            .into_iter()
            .find_map(|(n, k)| (k == EdgeKind::NextToken).then_some(n))
            .unwrap();
        assert_eq!(state.attrs(comma).literal, ",");
        assert!(state.is_eg(comma));
    }

    #[test]
    fn expression_stop_unsplices_the_speculative_parent() {
        let meta = test_meta();
        let info = StubInfo::new();
        let decoder = LexicalDecoder {
            meta: &meta,
            info: &info,
        };
        let (mut state, mut stack, _) = prepared(name_site_context());
        let site = stack.peek().unwrap().site;
        let parent = state.ast_parent(site);

        // a bound name with no resolvable value can only stop
        let mut name_task = stack.pop().unwrap();
        name_task.chosen = Some(0);
        name_task.completed = true;
        decoder.task_completed(&mut state, name_task, &mut stack).unwrap();

        let choose = stack.pop().unwrap();
        assert_eq!(choose.client, DecoderStep::ChooseExprType);
        let splice = choose.site;
        assert_eq!(state.ast_parent(site), splice);
        assert_eq!(state.ast_parent(splice), parent);

        let mut done = choose;
        done.chosen = Some(0);
        done.completed = true;
        decoder.task_completed(&mut state, done, &mut stack).unwrap();
        assert_eq!(state.ast_parent(site), parent);
    }

    #[test]
    fn placeholder_choice_rewrites_the_site() {
        let meta = test_meta();
        let info = StubInfo::new();
        let decoder = LexicalDecoder {
            meta: &meta,
            info: &info,
        };
        let (mut state, mut stack, _) = prepared(name_site_context());
        let site = stack.peek().unwrap().site;
        let mut task = EgTask::infer_production(
            DecoderStep::ChooseTerminalType,
            site,
            vec![0, 1],
            vec![
                ProdChoice::Step(DecoderStep::NoPlaceholder),
                ProdChoice::Step(DecoderStep::Placeholder),
            ],
            vec![],
        );
        task.chosen = Some(1);
        task.completed = true;
        decoder.task_completed(&mut state, task, &mut stack).unwrap();
        assert_eq!(state.attrs(site).literal, PLACEHOLDER_LITERAL);
        assert_eq!(state.attrs(site).types.as_slice(), [marker::NA_TYPE]);
    }

    #[test]
    fn keyword_name_choice_lands_on_the_site() {
        let meta = test_meta();
        let info = StubInfo::new();
        let decoder = LexicalDecoder {
            meta: &meta,
            info: &info,
        };
        let (mut state, mut stack, _) = prepared(call_site_context());
        let kw_site = state.add_node(
            NodeKind::AstTerminal,
            Attributes::internal("NameExpr"),
            None,
        );
        let mut task = EgTask::infer_production(
            DecoderStep::InferKeywordArgName,
            kw_site,
            vec![0, 1],
            vec![
                ProdChoice::Keyword("indent".to_owned()),
                ProdChoice::Keyword("sort".to_owned()),
            ],
            vec![],
        );
        task.chosen = Some(0);
        task.completed = true;
        decoder.task_completed(&mut state, task, &mut stack).unwrap();
        assert_eq!(state.attrs(kw_site).literal, "indent");
    }
}
