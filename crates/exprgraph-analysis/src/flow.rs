//! Forward data-flow approximation for one variable.
//!
//! For a set of name occurrences belonging to a single variable, the flow
//! graph maps each occurrence to the occurrences its value may flow to
//! next. The analysis is a deliberate over-approximation driven by what
//! is guaranteed to evaluate: an `if` guarantees only its first
//! condition, a `for` only its iterable, a `while` only its condition, a
//! `with` only its first item value. Statements that cannot be shown to
//! reference the variable let the previous exit set escape past them.
//!
//! Entry sets answer "where inside this statement could the variable
//! first be touched"; exit sets answer "where could it last be touched".
//! Flow between statements connects the previous exit set to the next
//! entry set.

use std::collections::HashMap;

use exprgraph_core::AstId;

use crate::ast::*;
use crate::nameset::NameSet;
use crate::walk::{walk, NodeRef};

/// Maps a name occurrence to the occurrences its value may flow to.
pub type NameFlowGraph = HashMap<AstId, NameSet>;

/// Builds the forward flow graph of one variable over a module.
pub fn forward_flow(module: &Module, names: &NameSet) -> NameFlowGraph {
    if module.body.is_empty() {
        return NameFlowGraph::new();
    }
    let mut b = FlowBuilder {
        graph: NameFlowGraph::new(),
        names,
    };
    b.flow_suite(&module.body);
    b.graph
}

struct FlowBuilder<'a> {
    graph: NameFlowGraph,
    names: &'a NameSet,
}

impl<'a> FlowBuilder<'a> {
    fn flows_to(&mut self, src: &NameSet, dest: &NameSet) {
        for (s, _) in src.iter() {
            let neighbors = self.graph.entry(s).or_default();
            for (d, order) in dest.iter() {
                neighbors.add(d, order);
            }
        }
    }

    fn flow_suite(&mut self, suite: &[Stmt]) {
        let mut last_exit = NameSet::new();
        for stmt in suite {
            if !self.contains_name(NodeRef::Stmt(stmt)) {
                continue;
            }

            let (entry, exit) = self.flow_stmt(stmt);

            // Everything from the previous exit set flows into the
            // current entry set.
            self.flows_to(&last_exit, &entry);

            if self.blocks_flow(stmt) {
                last_exit = exit;
            } else {
                // The variable can escape the statement, so the previous
                // exit set stays live alongside the current one.
                last_exit.extend_from(&exit);
            }
        }
    }

    // True if executing the statement is guaranteed to touch the
    // variable, which stops the previous exit set from escaping past it.
    fn blocks_flow(&mut self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::If(s) => self.contains_name(NodeRef::Expr(&s.branches[0].condition)),
            Stmt::For(s) => self.contains_name(NodeRef::Expr(&s.iterable)),
            Stmt::While(s) => self.contains_name(NodeRef::Expr(&s.condition)),
            Stmt::With(s) => self.contains_name(NodeRef::Expr(&s.items[0].value)),
            Stmt::Import(s) => s
                .clauses
                .iter()
                .filter_map(ImportClause::binding)
                .any(|n| self.names.contains(n.id)),
            Stmt::ClassDef(_) | Stmt::FunctionDef(_) => false,
            // Could do better for try statements.
            Stmt::Try(_) => false,
            _ => self.contains_name(NodeRef::Stmt(stmt)),
        }
    }

    fn flow_stmt(&mut self, stmt: &Stmt) -> (NameSet, NameSet) {
        let mut entry = NameSet::new();
        let mut exit = NameSet::new();
        self.add_entry_set(&mut entry, stmt);
        self.add_exit_set(&mut exit, stmt);

        match stmt {
            Stmt::Assign(_) | Stmt::AugAssign(_) => {
                // For `x = 1` the entry and exit sets coincide and the
                // value does not flow to itself.
                if !entry.same_names(&exit) {
                    self.flows_to(&entry, &exit);
                }
            }

            Stmt::If(s) => {
                // The last condition referencing the variable flows into
                // every later condition, every guarded body, and the else
                // suite. Branch bodies never flow into each other at this
                // level.
                let mut last_condition = NameSet::new();
                for branch in &s.branches {
                    let mut condition = NameSet::new();
                    self.add_expr_names(&mut condition, [&branch.condition]);

                    self.flows_to(&last_condition, &condition);
                    if !condition.is_empty() {
                        last_condition = condition;
                    }

                    let mut entry_body = NameSet::new();
                    self.add_suite_entry_set(&mut entry_body, &branch.body);
                    self.flows_to(&last_condition, &entry_body);

                    self.flow_suite(&branch.body);
                }

                let mut entry_else = NameSet::new();
                self.add_suite_entry_set(&mut entry_else, &s.orelse);
                self.flows_to(&last_condition, &entry_else);

                self.flow_suite(&s.orelse);
            }

            Stmt::For(s) => {
                let mut iters = NameSet::new();
                let mut targets = NameSet::new();
                self.add_expr_names(&mut iters, [&s.iterable]);
                self.add_expr_names(&mut targets, s.targets.iter());

                self.flows_to(&iters, &targets);

                let mut entry_body = NameSet::new();
                let mut exit_body = NameSet::new();
                self.add_suite_entry_set(&mut entry_body, &s.body);
                self.add_suite_exit_set(&mut exit_body, &s.body);

                if !targets.is_empty() {
                    self.flows_to(&targets, &entry_body);
                } else {
                    self.flows_to(&iters, &entry_body);
                }

                self.flow_suite(&s.body);

                // The iterable re-evaluates every iteration, so it flows
                // into the else suite; otherwise only the targets do,
                // since the body may never run.
                let mut entry_else = NameSet::new();
                self.add_suite_entry_set(&mut entry_else, &s.orelse);
                if !iters.is_empty() {
                    self.flows_to(&iters, &entry_else);
                } else {
                    self.flows_to(&targets, &entry_else);
                }
                self.flows_to(&exit_body, &entry_else);

                self.flow_suite(&s.orelse);

                // Close the loop.
                if exit_body.is_empty() {
                    if !iters.is_empty() {
                        let iters2 = iters.clone();
                        self.flows_to(&iters, &iters2);
                    } else {
                        let targets2 = targets.clone();
                        self.flows_to(&targets, &targets2);
                    }
                } else if !iters.is_empty() {
                    self.flows_to(&exit_body, &iters);
                } else if !targets.is_empty() {
                    self.flows_to(&exit_body, &targets);
                } else {
                    self.flows_to(&exit_body, &entry_body);
                }
            }

            Stmt::While(s) => {
                let mut condition = NameSet::new();
                self.add_expr_names(&mut condition, [&s.condition]);

                let mut entry_body = NameSet::new();
                let mut exit_body = NameSet::new();
                self.add_suite_entry_set(&mut entry_body, &s.body);
                self.add_suite_exit_set(&mut exit_body, &s.body);

                self.flows_to(&condition, &entry_body);

                self.flow_suite(&s.body);

                let mut entry_else = NameSet::new();
                self.add_suite_entry_set(&mut entry_else, &s.orelse);
                self.flows_to(&condition, &entry_else);
                self.flows_to(&exit_body, &entry_else);

                self.flow_suite(&s.orelse);

                // Close the loop.
                if exit_body.is_empty() {
                    let condition2 = condition.clone();
                    self.flows_to(&condition, &condition2);
                } else if !condition.is_empty() {
                    self.flows_to(&exit_body, &condition);
                } else {
                    self.flows_to(&exit_body, &entry_body);
                }
            }

            Stmt::FunctionDef(s) => {
                let mut params = NameSet::new();
                for p in &s.params {
                    self.maybe_add_name(&mut params, &p.name);
                }
                if let Some(p) = &s.vararg {
                    self.maybe_add_name(&mut params, &p.name);
                }
                if let Some(p) = &s.kwarg {
                    self.maybe_add_name(&mut params, &p.name);
                }

                if !params.is_empty() {
                    let mut entry_body = NameSet::new();
                    self.add_suite_entry_set(&mut entry_body, &s.body);
                    self.flows_to(&params, &entry_body);
                }

                self.flow_suite(&s.body);
            }

            Stmt::ClassDef(s) => {
                self.flow_suite(&s.body);
            }

            Stmt::With(s) => {
                let mut exit_items = NameSet::new();
                for item in &s.items {
                    let added = match &item.target {
                        Some(t) => self.add_expr_names(&mut exit_items, [t]),
                        None => 0,
                    };
                    if added == 0 {
                        self.add_expr_names(&mut exit_items, [&item.value]);
                    }
                }

                let mut entry_body = NameSet::new();
                self.add_suite_entry_set(&mut entry_body, &s.body);

                self.flows_to(&exit_items, &entry_body);
            }

            Stmt::Try(s) => {
                self.flow_suite(&s.body);

                let mut exit_body = NameSet::new();
                self.add_suite_exit_set(&mut exit_body, &s.body);

                let mut exit_handlers = NameSet::new();
                for handler in &s.handlers {
                    let mut entry_body = NameSet::new();
                    self.add_suite_entry_set(&mut entry_body, &handler.body);

                    let mut head = NameSet::new();
                    let added = self.add_expr_names(
                        &mut head,
                        handler.typ.iter().chain(handler.target.iter()),
                    );
                    if added > 0 {
                        self.flows_to(&exit_body, &head);
                        self.flows_to(&head, &entry_body);
                    } else {
                        self.flows_to(&exit_body, &entry_body);
                    }

                    self.flow_suite(&handler.body);

                    self.add_suite_exit_set(&mut exit_handlers, &handler.body);
                }

                // All handler exits flow into the finally suite; the body
                // exit always flows into the else suite.
                let mut entry_final = NameSet::new();
                self.add_suite_entry_set(&mut entry_final, &s.final_body);
                self.flows_to(&exit_handlers, &entry_final);

                let mut entry_else = NameSet::new();
                self.add_suite_entry_set(&mut entry_else, &s.orelse);
                self.flows_to(&exit_body, &entry_else);
            }

            _ => {}
        }
        (entry, exit)
    }

    // -----------------------------------------------------------------------
    // Entry and exit sets
    // -----------------------------------------------------------------------

    fn add_suite_entry_set(&mut self, ns: &mut NameSet, suite: &[Stmt]) -> usize {
        for stmt in suite {
            let n = self.add_entry_set(ns, stmt);
            if n > 0 {
                return n;
            }
        }
        0
    }

    fn add_entry_set(&mut self, ns: &mut NameSet, stmt: &Stmt) -> usize {
        let mut added = 0;
        match stmt {
            Stmt::Assign(s) => {
                let n = self.add_expr_names(ns, [&s.value]);
                if n > 0 {
                    return n;
                }
                // The variable is not read on the right-hand side, so its
                // first touch point can only be a target.
                added += self.add_expr_names(ns, s.targets.iter());
            }

            Stmt::AugAssign(s) => {
                let n = self.add_expr_names(ns, [&s.value]);
                if n > 0 {
                    return n;
                }
                added += self.add_expr_names(ns, [&s.target]);
            }

            Stmt::If(s) => {
                let mut found_condition = false;
                for branch in &s.branches {
                    let n = self.add_expr_names(ns, [&branch.condition]);
                    if n > 0 {
                        added += n;
                        found_condition = true;
                        break;
                    }
                    added += self.add_suite_entry_set(ns, &branch.body);
                }
                if !found_condition {
                    added += self.add_suite_entry_set(ns, &s.orelse);
                }
            }

            Stmt::For(s) => {
                // The iterable always evaluates at least once.
                let n = self.add_expr_names(ns, [&s.iterable]);
                if n > 0 {
                    return n;
                }
                added += self.add_suite_entry_set(ns, &s.orelse);
                let n = self.add_expr_names(ns, s.targets.iter());
                if n > 0 {
                    return added + n;
                }
                added += self.add_suite_entry_set(ns, &s.body);
            }

            Stmt::While(s) => {
                // The condition always evaluates at least once.
                let n = self.add_expr_names(ns, [&s.condition]);
                if n > 0 {
                    return n;
                }
                added += self.add_suite_entry_set(ns, &s.body);
                added += self.add_suite_entry_set(ns, &s.orelse);
            }

            Stmt::Import(s) => {
                for clause in &s.clauses {
                    if let Some(binding) = clause.binding() {
                        added += self.maybe_add_name(ns, binding);
                    }
                }
            }

            Stmt::With(s) => {
                // Only the first item value is guaranteed to evaluate.
                let n = self.add_expr_names(ns, [&s.items[0].value]);
                if n > 0 {
                    return n;
                }
                for item in &s.items {
                    // An item's value evaluates before its target.
                    let n = self.add_expr_names(ns, [&item.value]);
                    if n > 0 {
                        added += n;
                    } else if let Some(t) = &item.target {
                        added += self.add_expr_names(ns, [t]);
                    }
                }
                if added > 0 {
                    return added;
                }
                added += self.add_suite_entry_set(ns, &s.body);
            }

            Stmt::ClassDef(s) => {
                added += self.add_expr_names(ns, s.decorators.iter());
                added += self.add_expr_names(ns, s.bases.iter().map(|a| &a.value));
                added += self.maybe_add_name(ns, &s.name);
            }

            Stmt::FunctionDef(s) => {
                for p in &s.params {
                    added +=
                        self.add_expr_names(ns, p.default.iter().chain(p.annotation.iter()));
                }
                if let Some(p) = &s.kwarg {
                    added += self.add_expr_names(ns, p.annotation.iter());
                }
                if let Some(p) = &s.vararg {
                    added += self.add_expr_names(ns, p.annotation.iter());
                }
                added += self.add_expr_names(ns, s.decorators.iter());
                added += self.add_expr_names(ns, s.return_annotation.iter());
                added += self.maybe_add_name(ns, &s.name);
            }

            Stmt::Try(s) => {
                // Approximate: the reference in the body may not execute.
                let n = self.add_suite_entry_set(ns, &s.body);
                if n > 0 {
                    return n;
                }
                for handler in &s.handlers {
                    let n = self.add_expr_names(
                        ns,
                        handler.typ.iter().chain(handler.target.iter()),
                    );
                    if n > 0 {
                        added += n;
                    } else {
                        added += self.add_suite_entry_set(ns, &handler.body);
                    }
                }
                added += self.add_suite_entry_set(ns, &s.orelse);
                added += self.add_suite_entry_set(ns, &s.final_body);
            }

            _ => {
                added += self.add_stmt_names(ns, stmt);
            }
        }
        added
    }

    fn add_suite_exit_set(&mut self, ns: &mut NameSet, suite: &[Stmt]) -> usize {
        for stmt in suite.iter().rev() {
            let n = self.add_exit_set(ns, stmt);
            if n > 0 {
                return n;
            }
        }
        0
    }

    fn add_exit_set(&mut self, ns: &mut NameSet, stmt: &Stmt) -> usize {
        let mut added = 0;
        match stmt {
            Stmt::Assign(s) => {
                added += self.add_expr_names(ns, s.targets.iter());
                if added > 0 {
                    return added;
                }
                added += self.add_expr_names(ns, [&s.value]);
            }

            Stmt::AugAssign(s) => {
                let n = self.add_expr_names(ns, [&s.target]);
                if n > 0 {
                    return n;
                }
                added += self.add_expr_names(ns, [&s.value]);
            }

            Stmt::If(s) => {
                // Every branch may be the one taken, and a condition may
                // be the last touch even when a body references the
                // variable.
                for branch in &s.branches {
                    added += self.add_expr_names(ns, [&branch.condition]);
                    added += self.add_suite_exit_set(ns, &branch.body);
                }
                added += self.add_suite_exit_set(ns, &s.orelse);
            }

            Stmt::For(s) => {
                // Nothing below the iterable is guaranteed to run, and a
                // body reference may be followed by an immediate break,
                // so iterable, targets, body and else all exit.
                added += self.add_suite_exit_set(ns, &s.orelse);
                added += self.add_expr_names(ns, [&s.iterable]);
                added += self.add_suite_exit_set(ns, &s.body);
                added += self.add_expr_names(ns, s.targets.iter());
            }

            Stmt::While(s) => {
                added += self.add_suite_exit_set(ns, &s.orelse);
                added += self.add_expr_names(ns, [&s.condition]);
                added += self.add_suite_exit_set(ns, &s.body);
            }

            Stmt::Import(s) => {
                for clause in &s.clauses {
                    if let Some(binding) = clause.binding() {
                        added += self.maybe_add_name(ns, binding);
                    }
                }
            }

            Stmt::With(s) => {
                // Nothing after the first item is guaranteed to run.
                for item in &s.items {
                    if let Some(t) = &item.target {
                        added += self.add_expr_names(ns, [t]);
                    }
                    added += self.add_expr_names(ns, [&item.value]);
                }
                added += self.add_suite_exit_set(ns, &s.body);
            }

            Stmt::ClassDef(s) => {
                added += self.add_expr_names(ns, s.decorators.iter());
                added += self.add_expr_names(ns, s.bases.iter().map(|a| &a.value));
                added += self.maybe_add_name(ns, &s.name);
            }

            Stmt::FunctionDef(s) => {
                for p in &s.params {
                    added +=
                        self.add_expr_names(ns, p.default.iter().chain(p.annotation.iter()));
                }
                if let Some(p) = &s.kwarg {
                    added += self.add_expr_names(ns, p.annotation.iter());
                }
                if let Some(p) = &s.vararg {
                    added += self.add_expr_names(ns, p.annotation.iter());
                }
                added += self.add_expr_names(ns, s.decorators.iter());
                added += self.add_expr_names(ns, s.return_annotation.iter());
                added += self.maybe_add_name(ns, &s.name);
            }

            Stmt::Try(s) => {
                let n = self.add_suite_exit_set(ns, &s.final_body);
                if n > 0 {
                    return n;
                }
                added += self.add_suite_exit_set(ns, &s.orelse);
                added += self.add_suite_exit_set(ns, &s.body);
                for handler in &s.handlers {
                    let n = self.add_suite_exit_set(ns, &handler.body);
                    if n > 0 {
                        added += n;
                    } else {
                        added += self.add_expr_names(
                            ns,
                            handler.target.iter().chain(handler.typ.iter()),
                        );
                    }
                }
            }

            _ => {
                added += self.add_stmt_names(ns, stmt);
            }
        }
        added
    }

    // -----------------------------------------------------------------------
    // Name collection
    // -----------------------------------------------------------------------

    fn add_stmt_names(&mut self, ns: &mut NameSet, stmt: &Stmt) -> usize {
        let mut added = 0;
        let mut found = Vec::new();
        walk(NodeRef::Stmt(stmt), &mut |n| {
            match n {
                NodeRef::Name(name) | NodeRef::Expr(Expr::Name(name)) => found.push(name.id),
                _ => {}
            }
            true
        });
        for id in found {
            added += self.maybe_add_id(ns, id);
        }
        added
    }

    fn add_expr_names<'e>(
        &mut self,
        ns: &mut NameSet,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) -> usize {
        let mut added = 0;
        for expr in exprs {
            let mut found = Vec::new();
            walk(NodeRef::Expr(expr), &mut |n| {
                match n {
                    NodeRef::Name(name) | NodeRef::Expr(Expr::Name(name)) => {
                        found.push(name.id)
                    }
                    _ => {}
                }
                true
            });
            for id in found {
                added += self.maybe_add_id(ns, id);
            }
        }
        added
    }

    fn maybe_add_name(&mut self, ns: &mut NameSet, name: &NameExpr) -> usize {
        self.maybe_add_id(ns, name.id)
    }

    fn maybe_add_id(&mut self, ns: &mut NameSet, id: AstId) -> usize {
        match self.names.order(id) {
            Some(order) if ns.add(id, order) => 1,
            _ => 0,
        }
    }

    fn contains_name(&self, node: NodeRef<'_>) -> bool {
        let mut found = false;
        walk(node, &mut |n| {
            match n {
                NodeRef::Name(name) | NodeRef::Expr(Expr::Name(name)) => {
                    if self.names.contains(name.id) {
                        found = true;
                    }
                }
                _ => {}
            }
            !found
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstFactory;

    fn set(names: &[(AstId, u32)]) -> NameSet {
        names.iter().copied().collect()
    }

    fn neighbors(graph: &NameFlowGraph, from: AstId) -> Vec<AstId> {
        graph.get(&from).map(|ns| ns.names()).unwrap_or_default()
    }

    // x = 1
    // x = x + 1
    #[test]
    fn value_flows_read_then_write() {
        let mut f = AstFactory::new();
        let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
        let one = f.number("1", Span::new(4, 5));
        let x3 = f.name("x", Span::new(6, 7), NameUsage::Assign);
        let x2 = f.name("x", Span::new(10, 11), NameUsage::Evaluate);
        let one2 = f.number("1", Span::new(14, 15));
        let (i1, i2, i3) = (x1.id, x2.id, x3.id);

        let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
        let rhs = BinaryExpr {
            id: f.fresh(),
            span: Span::new(10, 15),
            left: Box::new(Expr::Name(x2)),
            op: "+".to_owned(),
            right: Box::new(Expr::Literal(one2)),
        };
        let s2 = f.assign(
            vec![Expr::Name(x3)],
            Expr::Binary(rhs),
            Span::new(6, 15),
        );
        let module = f.module(vec![Stmt::Assign(s1), Stmt::Assign(s2)], Span::new(0, 15));

        let names = set(&[(i1, 0), (i3, 1), (i2, 2)]);
        let graph = forward_flow(&module, &names);

        assert_eq!(neighbors(&graph, i1), vec![i2]);
        assert_eq!(neighbors(&graph, i2), vec![i3]);
        assert!(neighbors(&graph, i3).is_empty());
    }

    // x = 1
    // if x:
    //     y = x
    #[test]
    fn condition_flows_into_guarded_body() {
        let mut f = AstFactory::new();
        let x1 = f.name("x", Span::new(0, 1), NameUsage::Assign);
        let one = f.number("1", Span::new(4, 5));
        let x2 = f.name("x", Span::new(9, 10), NameUsage::Evaluate);
        let y = f.name("y", Span::new(16, 17), NameUsage::Assign);
        let x3 = f.name("x", Span::new(20, 21), NameUsage::Evaluate);
        let (i1, i2, i3) = (x1.id, x2.id, x3.id);

        let s1 = f.assign(vec![Expr::Name(x1)], Expr::Literal(one), Span::new(0, 5));
        let inner = f.assign(vec![Expr::Name(y)], Expr::Name(x3), Span::new(16, 21));
        let branch = Branch {
            id: f.fresh(),
            span: Span::new(6, 21),
            condition: Expr::Name(x2),
            body: vec![Stmt::Assign(inner)],
        };
        let if_stmt = IfStmt {
            id: f.fresh(),
            span: Span::new(6, 21),
            branches: vec![branch],
            orelse: vec![],
        };
        let module = f.module(vec![Stmt::Assign(s1), Stmt::If(if_stmt)], Span::new(0, 21));

        let names = set(&[(i1, 0), (i2, 1), (i3, 2)]);
        let graph = forward_flow(&module, &names);

        assert_eq!(neighbors(&graph, i1), vec![i2]);
        assert_eq!(neighbors(&graph, i2), vec![i3]);
    }

    // while x:
    //     x = f(x)
    #[test]
    fn loop_body_exit_flows_back_to_condition() {
        let mut f = AstFactory::new();
        let x1 = f.name("x", Span::new(6, 7), NameUsage::Evaluate);
        let x3 = f.name("x", Span::new(13, 14), NameUsage::Assign);
        let func = f.name("f", Span::new(17, 18), NameUsage::Evaluate);
        let x2 = f.name("x", Span::new(19, 20), NameUsage::Evaluate);
        let (i1, i2, i3) = (x1.id, x2.id, x3.id);

        let arg = Argument {
            id: f.fresh(),
            span: Span::new(19, 20),
            name: None,
            value: Expr::Name(x2),
        };
        let call = f.call(Expr::Name(func), vec![arg], Span::new(17, 21));
        let inner = f.assign(
            vec![Expr::Name(x3)],
            Expr::Call(call),
            Span::new(13, 21),
        );
        let while_stmt = WhileStmt {
            id: f.fresh(),
            span: Span::new(0, 21),
            condition: Expr::Name(x1),
            body: vec![Stmt::Assign(inner)],
            orelse: vec![],
        };
        let module = f.module(vec![Stmt::While(while_stmt)], Span::new(0, 21));

        let names = set(&[(i1, 0), (i3, 1), (i2, 2)]);
        let graph = forward_flow(&module, &names);

        // Condition flows into the body entry, the read flows to the
        // write, and the body exit closes the loop back to the condition.
        assert_eq!(neighbors(&graph, i1), vec![i2]);
        assert_eq!(neighbors(&graph, i2), vec![i3]);
        assert_eq!(neighbors(&graph, i3), vec![i1]);
    }

    // import json
    // json.dumps(x)
    #[test]
    fn import_binding_flows_to_use() {
        let mut f = AstFactory::new();
        let j1 = f.name("json", Span::new(7, 11), NameUsage::Import);
        let j2 = f.name("json", Span::new(12, 16), NameUsage::Evaluate);
        let (i1, i2) = (j1.id, j2.id);

        let clause = ImportClause {
            id: f.fresh(),
            span: Span::new(7, 11),
            path: vec![j1],
            alias: None,
        };
        let import = ImportStmt {
            id: f.fresh(),
            span: Span::new(0, 11),
            clauses: vec![clause],
        };
        let attr = f.attribute(Expr::Name(j2), "dumps", Span::new(17, 22));
        let call = f.call(Expr::Attribute(attr), vec![], Span::new(12, 24));
        let use_stmt = f.expr_stmt(Expr::Call(call));
        let module = f.module(
            vec![Stmt::Import(import), Stmt::Expr(use_stmt)],
            Span::new(0, 24),
        );

        let names = set(&[(i1, 0), (i2, 1)]);
        let graph = forward_flow(&module, &names);
        assert_eq!(neighbors(&graph, i1), vec![i2]);
    }
}
