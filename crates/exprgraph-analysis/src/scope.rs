//! Scope approximation.
//!
//! [`ScopeTree`] answers "which variables are visible at this position"
//! without real control-flow analysis. Each tree node holds a block (a
//! flat suite of statements plus the variables each statement brings into
//! scope once executed) and children for statements that open nested
//! blocks. The answer is an over-approximation: after any statement
//! executes, every variable defined anywhere in it is considered in
//! scope.
//!
//! A block also carries a header for variables bound by the construct
//! that owns the block but defined outside its statements, like the loop
//! target in `for x in xs:`.

use exprgraph_core::VarId;

use crate::ast::{Module, Span, Stmt};
use crate::vars::VariableManager;
use crate::walk::{names_in, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerKind {
    Module,
    Function,
    Class,
    Loop,
    With,
    /// If/elif/else arms; they have no header and no special scoping.
    Anonymous,
}

#[derive(Debug, Clone)]
struct StmtEntry {
    span: Span,
    /// Variables whose origin lies in this statement, in origin order.
    vars: Vec<VarId>,
}

#[derive(Debug, Clone, Default)]
struct Block {
    header: Vec<VarId>,
    stmts: Vec<StmtEntry>,
}

impl Block {
    /// True if `at` overlaps the source interval of this block.
    fn covers(&self, at: Span) -> bool {
        let (Some(first), Some(last)) = (self.stmts.first(), self.stmts.last()) else {
            return false;
        };
        at.end > first.span.begin && at.begin < last.span.end
    }

    /// Variables defined by statements strictly before `at`.
    fn variables_up_to(&self, at: Span, include_header: bool) -> Vec<VarId> {
        let mut vars = if include_header {
            self.header.clone()
        } else {
            Vec::new()
        };
        for entry in &self.stmts {
            // Stop at the statement containing `at` or the first one
            // past it.
            if (at.begin >= entry.span.begin && at.end <= entry.span.end)
                || entry.span.begin >= at.end
            {
                break;
            }
            vars.extend_from_slice(&entry.vars);
        }
        vars
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    owner: OwnerKind,
    block: Block,
    children: Vec<TreeNode>,
}

/// Tree of nested blocks answering scope queries.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    root: TreeNode,
}

// Variables whose origin occurrence lies within `stmt`. Definitions are
// only treated as introducing their own name for def/class statements;
// any other statement introduces every origin it mentions.
fn stmt_vars(stmt: &Stmt, vm: &VariableManager) -> Vec<VarId> {
    let origin_var = |name: &crate::ast::NameExpr| -> Option<VarId> {
        vm.variable_for_name(name.id)
            .filter(|v| vm.variable(*v).origin == name.id)
    };

    let mut vars: Vec<VarId> = match stmt {
        Stmt::FunctionDef(s) => origin_var(&s.name).into_iter().collect(),
        Stmt::ClassDef(s) => origin_var(&s.name).into_iter().collect(),
        _ => {
            let mut names = Vec::new();
            names_in(NodeRef::Stmt(stmt), &mut names);
            names.iter().filter_map(|n| origin_var(n)).collect()
        }
    };
    vars.sort_unstable();
    vars.dedup();
    vars
}

// Variables bound by the construct owning a block but not defined in the
// block's own statements.
fn header_vars(stmt: Option<&Stmt>, vm: &VariableManager) -> Vec<VarId> {
    let mut names = Vec::new();
    match stmt {
        Some(Stmt::For(s)) => {
            for t in &s.targets {
                names_in(NodeRef::Expr(t), &mut names);
            }
        }
        Some(Stmt::With(s)) => {
            for item in &s.items {
                if let Some(t) = &item.target {
                    names_in(NodeRef::Expr(t), &mut names);
                }
            }
        }
        Some(Stmt::FunctionDef(s)) => {
            for p in &s.params {
                names.push(&p.name);
            }
            if let Some(p) = &s.vararg {
                names.push(&p.name);
            }
            if let Some(p) = &s.kwarg {
                names.push(&p.name);
            }
        }
        _ => {}
    }
    let mut vars: Vec<VarId> = names
        .iter()
        .filter_map(|n| {
            vm.variable_for_name(n.id)
                .filter(|v| vm.variable(*v).origin == n.id)
        })
        .collect();
    vars.sort_unstable();
    vars.dedup();
    vars
}

fn new_node(
    owner: OwnerKind,
    owning_stmt: Option<&Stmt>,
    suite: &[&Stmt],
    vm: &VariableManager,
) -> TreeNode {
    let block = Block {
        header: header_vars(owning_stmt, vm),
        stmts: suite
            .iter()
            .map(|s| StmtEntry {
                span: s.span(),
                vars: stmt_vars(s, vm),
            })
            .collect(),
    };

    let mut children = Vec::new();
    for stmt in suite {
        match stmt {
            Stmt::FunctionDef(s) => {
                let body: Vec<&Stmt> = s.body.iter().collect();
                children.push(new_node(OwnerKind::Function, Some(stmt), &body, vm));
            }
            Stmt::ClassDef(s) => {
                let body: Vec<&Stmt> = s.body.iter().collect();
                children.push(new_node(OwnerKind::Class, Some(stmt), &body, vm));
            }
            Stmt::With(s) => {
                let body: Vec<&Stmt> = s.body.iter().collect();
                children.push(new_node(OwnerKind::With, Some(stmt), &body, vm));
            }
            Stmt::If(s) => {
                // Arms keep separate scopes until the statement has
                // executed, so each becomes its own anonymous child.
                for branch in &s.branches {
                    let body: Vec<&Stmt> = branch.body.iter().collect();
                    children.push(new_node(OwnerKind::Anonymous, None, &body, vm));
                }
                if !s.orelse.is_empty() {
                    let body: Vec<&Stmt> = s.orelse.iter().collect();
                    children.push(new_node(OwnerKind::Anonymous, None, &body, vm));
                }
            }
            Stmt::For(s) => {
                // Loop bodies share scope with their else suite.
                let body: Vec<&Stmt> = s.body.iter().chain(s.orelse.iter()).collect();
                children.push(new_node(OwnerKind::Loop, Some(stmt), &body, vm));
            }
            Stmt::While(s) => {
                let body: Vec<&Stmt> = s.body.iter().chain(s.orelse.iter()).collect();
                children.push(new_node(OwnerKind::Loop, Some(stmt), &body, vm));
            }
            _ => {}
        }
    }

    TreeNode {
        owner,
        block,
        children,
    }
}

impl TreeNode {
    fn covering_nodes<'a>(&'a self, at: Span, out: &mut Vec<&'a TreeNode>) {
        if !self.block.covers(at) {
            return;
        }
        out.push(self);
        for child in &self.children {
            child.covering_nodes(at, out);
        }
    }
}

impl ScopeTree {
    pub fn build(module: &Module, vm: &VariableManager) -> Self {
        let suite: Vec<&Stmt> = module.body.iter().collect();
        ScopeTree {
            root: new_node(OwnerKind::Module, None, &suite, vm),
        }
    }

    /// Variables visible at `at`, in origin order.
    ///
    /// Walks covering blocks from deepest to shallowest. Class blocks are
    /// skipped since their members are not exposed to child scopes; when
    /// `stop_at_func` is set the walk stops after the innermost enclosing
    /// function body.
    pub fn in_scope(&self, at: Span, stop_at_func: bool) -> Vec<VarId> {
        let mut nodes = Vec::new();
        self.root.covering_nodes(at, &mut nodes);

        let mut vars = Vec::new();
        for node in nodes.iter().rev() {
            if node.owner == OwnerKind::Class {
                continue;
            }
            vars.extend(node.block.variables_up_to(at, true));
            if stop_at_func && node.owner == OwnerKind::Function {
                break;
            }
        }
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analysis, BindingId, Resolutions};
    use crate::ast::*;

    // y = 1
    // for x in y:
    //     z = y
    // q = z
    fn loop_buffer() -> Analysis {
        let mut f = AstFactory::new();
        let y1 = f.name("y", Span::new(0, 1), NameUsage::Assign);
        let one = f.number("1", Span::new(4, 5));
        let x = f.name("x", Span::new(10, 11), NameUsage::Assign);
        let y2 = f.name("y", Span::new(15, 16), NameUsage::Evaluate);
        let z1 = f.name("z", Span::new(22, 23), NameUsage::Assign);
        let y3 = f.name("y", Span::new(26, 27), NameUsage::Evaluate);
        let q = f.name("q", Span::new(28, 29), NameUsage::Assign);
        let z2 = f.name("z", Span::new(32, 33), NameUsage::Evaluate);

        let mut res = Resolutions::new();
        for (n, b) in [
            (&y1, 0),
            (&y2, 0),
            (&y3, 0),
            (&x, 1),
            (&z1, 2),
            (&z2, 2),
            (&q, 3),
        ] {
            res.set_binding(n.id, BindingId(b));
        }

        let s1 = f.assign(vec![Expr::Name(y1)], Expr::Literal(one), Span::new(0, 5));
        let inner = f.assign(vec![Expr::Name(z1)], Expr::Name(y3), Span::new(22, 27));
        let for_stmt = ForStmt {
            id: f.fresh(),
            span: Span::new(6, 27),
            targets: vec![Expr::Name(x)],
            iterable: Expr::Name(y2),
            body: vec![Stmt::Assign(inner)],
            orelse: vec![],
        };
        let s3 = f.assign(vec![Expr::Name(q)], Expr::Name(z2), Span::new(28, 33));
        let module = f.module(
            vec![Stmt::Assign(s1), Stmt::For(for_stmt), Stmt::Assign(s3)],
            Span::new(0, 33),
        );
        Analysis::new(module, vec![], res)
    }

    #[test]
    fn scope_grows_with_statement_position() {
        let a = loop_buffer();
        let vm = VariableManager::build(&a, false);
        let tree = ScopeTree::build(&a.module, &vm);

        // Inside the first statement nothing is in scope yet.
        assert!(tree.in_scope(Span::new(4, 5), false).is_empty());

        // Inside the loop body: y from the module block, x from the loop
        // header.
        let in_body = tree.in_scope(Span::new(26, 27), false);
        let y = vm.variable_for_name(exprgraph_core::AstId(0)).unwrap();
        assert!(in_body.contains(&y));
        assert_eq!(in_body.len(), 2);

        // After the loop everything the loop defined is visible.
        let after = tree.in_scope(Span::new(32, 33), false);
        assert_eq!(after.len(), 3);
    }

    #[test]
    fn scope_is_monotone_along_the_buffer() {
        let a = loop_buffer();
        let vm = VariableManager::build(&a, false);
        let tree = ScopeTree::build(&a.module, &vm);

        // At top-level positions, moving the query point later in the
        // buffer never removes module-level variables.
        let mut prev = 0;
        for pos in [4u32, 28, 32] {
            let vars = tree.in_scope(Span::new(pos, pos + 1), false);
            assert!(vars.len() >= prev, "scope shrank at {pos}");
            prev = vars.len();
        }
    }

    #[test]
    fn function_scope_stops_lookup() {
        // g = 1
        // def f(p):
        //     h = p
        let mut f = AstFactory::new();
        let g = f.name("g", Span::new(0, 1), NameUsage::Assign);
        let one = f.number("1", Span::new(4, 5));
        let fname = f.name("f", Span::new(10, 11), NameUsage::Assign);
        let p1 = f.name("p", Span::new(12, 13), NameUsage::Assign);
        let h = f.name("h", Span::new(20, 21), NameUsage::Assign);
        let p2 = f.name("p", Span::new(24, 25), NameUsage::Evaluate);

        let mut res = Resolutions::new();
        for (n, b) in [(&g, 0), (&fname, 1), (&p1, 2), (&p2, 2), (&h, 3)] {
            res.set_binding(n.id, BindingId(b));
        }

        let s1 = f.assign(vec![Expr::Name(g)], Expr::Literal(one), Span::new(0, 5));
        let inner = f.assign(vec![Expr::Name(h)], Expr::Name(p2), Span::new(20, 25));
        let param = Parameter {
            id: f.fresh(),
            span: Span::new(12, 13),
            name: p1,
            default: None,
            annotation: None,
        };
        let def = FunctionDefStmt {
            id: f.fresh(),
            span: Span::new(6, 25),
            name: fname,
            params: vec![param],
            vararg: None,
            kwarg: None,
            return_annotation: None,
            decorators: vec![],
            body: vec![Stmt::Assign(inner)],
        };
        let module = f.module(vec![Stmt::Assign(s1), Stmt::FunctionDef(def)], Span::new(0, 25));
        let a = Analysis::new(module, vec![], res);
        let vm = VariableManager::build(&a, false);
        let tree = ScopeTree::build(&a.module, &vm);

        // Inside the function body, stopping at the function boundary
        // hides module-level g; the parameter is in scope via the header.
        let within = tree.in_scope(Span::new(24, 25), true);
        let g_var = vm.variable_for_name(exprgraph_core::AstId(0)).unwrap();
        let p_var = vm.variable_for_name(exprgraph_core::AstId(3)).unwrap();
        assert!(!within.contains(&g_var));
        assert!(within.contains(&p_var));

        // Without the stop, module variables shine through.
        let without = tree.in_scope(Span::new(24, 25), false);
        assert!(without.contains(&g_var));
    }
}
