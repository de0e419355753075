//! Uniform traversal over the syntax tree.
//!
//! [`NodeRef`] erases the concrete node type so graph construction and the
//! flow approximation can walk the tree generically. [`walk`] is a
//! pre-order visit with pruning; [`walk_edges`] additionally reports the
//! parent field and list position of every parent/child edge, which is
//! exactly the shape graph construction needs.

use exprgraph_core::{AstId, ParentField};

use crate::ast::*;

/// Borrowed reference to any syntax-tree node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Module(&'a Module),
    /// A name appearing as a bare struct field (function and class names,
    /// parameter names, import components) rather than behind an `Expr`.
    Name(&'a NameExpr),
    Stmt(&'a Stmt),
    Branch(&'a Branch),
    WithItem(&'a WithItem),
    Handler(&'a ExceptHandler),
    ImportClause(&'a ImportClause),
    Parameter(&'a Parameter),
    Argument(&'a Argument),
    Expr(&'a Expr),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> AstId {
        match self {
            NodeRef::Module(m) => m.id,
            NodeRef::Name(n) => n.id,
            NodeRef::Stmt(s) => s.id(),
            NodeRef::Branch(b) => b.id,
            NodeRef::WithItem(i) => i.id,
            NodeRef::Handler(h) => h.id,
            NodeRef::ImportClause(c) => c.id,
            NodeRef::Parameter(p) => p.id,
            NodeRef::Argument(a) => a.id,
            NodeRef::Expr(e) => e.id(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            NodeRef::Module(m) => m.span,
            NodeRef::Name(n) => n.span,
            NodeRef::Stmt(s) => s.span(),
            NodeRef::Branch(b) => b.span,
            NodeRef::WithItem(i) => i.span,
            NodeRef::Handler(h) => h.span,
            NodeRef::ImportClause(c) => c.span,
            NodeRef::Parameter(p) => p.span,
            NodeRef::Argument(a) => a.span,
            NodeRef::Expr(e) => e.span(),
        }
    }

    /// Node-kind label fed to the model.
    pub fn label(&self) -> &'static str {
        match self {
            NodeRef::Module(_) => "Module",
            NodeRef::Name(_) => "NameExpr",
            NodeRef::Stmt(s) => match s {
                Stmt::Expr(_) => "ExprStmt",
                Stmt::Assign(_) => "AssignStmt",
                Stmt::AugAssign(_) => "AugAssignStmt",
                Stmt::If(_) => "IfStmt",
                Stmt::For(_) => "ForStmt",
                Stmt::While(_) => "WhileStmt",
                Stmt::With(_) => "WithStmt",
                Stmt::Try(_) => "TryStmt",
                Stmt::Import(_) => "ImportStmt",
                Stmt::FunctionDef(_) => "FunctionDefStmt",
                Stmt::ClassDef(_) => "ClassDefStmt",
                Stmt::Return(_) => "ReturnStmt",
                Stmt::Pass(_) => "PassStmt",
            },
            NodeRef::Branch(_) => "Branch",
            NodeRef::WithItem(_) => "WithItem",
            NodeRef::Handler(_) => "ExceptHandler",
            NodeRef::ImportClause(_) => "ImportClause",
            NodeRef::Parameter(_) => "Parameter",
            NodeRef::Argument(_) => "Argument",
            NodeRef::Expr(e) => match e {
                Expr::Name(_) => "NameExpr",
                Expr::Attribute(_) => "AttributeExpr",
                Expr::Call(_) => "CallExpr",
                Expr::Tuple(_) => "TupleExpr",
                Expr::Binary(_) => "BinaryExpr",
                Expr::Literal(l) => match l.kind {
                    LiteralKind::Number => "NumberExpr",
                    LiteralKind::Str => "StringExpr",
                    LiteralKind::Bool => "BoolExpr",
                    LiteralKind::NoneLit => "NoneExpr",
                    LiteralKind::Ellipsis => "EllipsisExpr",
                },
            },
        }
    }

    /// Source text for terminal nodes, empty otherwise.
    pub fn literal(&self) -> &'a str {
        match self {
            NodeRef::Name(n) => &n.literal,
            NodeRef::Expr(Expr::Name(n)) => &n.literal,
            NodeRef::Expr(Expr::Literal(l)) => &l.literal,
            NodeRef::Expr(Expr::Attribute(a)) => &a.attribute,
            _ => "",
        }
    }

    /// True for leaves of the tree (names and literals).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeRef::Name(_) | NodeRef::Expr(Expr::Name(_)) | NodeRef::Expr(Expr::Literal(_))
        )
    }

    /// Parent/child edges of this node, in source order.
    pub fn child_edges(&self) -> Vec<(ParentField, u32, NodeRef<'a>)> {
        let mut out = Vec::new();
        let mut push = |field: ParentField, pos: u32, child: NodeRef<'a>| {
            out.push((field, pos, child));
        };
        match self {
            NodeRef::Module(m) => {
                for (i, s) in m.body.iter().enumerate() {
                    push(ParentField::Body, i as u32, NodeRef::Stmt(s));
                }
            }
            NodeRef::Stmt(stmt) => match stmt {
                Stmt::Expr(s) => push(ParentField::Value, 0, NodeRef::Expr(&s.value)),
                Stmt::Assign(s) => {
                    for (i, t) in s.targets.iter().enumerate() {
                        push(ParentField::Targets, i as u32, NodeRef::Expr(t));
                    }
                    push(ParentField::Value, 0, NodeRef::Expr(&s.value));
                }
                Stmt::AugAssign(s) => {
                    push(ParentField::Target, 0, NodeRef::Expr(&s.target));
                    push(ParentField::Value, 0, NodeRef::Expr(&s.value));
                }
                Stmt::If(s) => {
                    for (i, b) in s.branches.iter().enumerate() {
                        push(ParentField::Branches, i as u32, NodeRef::Branch(b));
                    }
                    for (i, st) in s.orelse.iter().enumerate() {
                        push(ParentField::OrElse, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::For(s) => {
                    for (i, t) in s.targets.iter().enumerate() {
                        push(ParentField::Targets, i as u32, NodeRef::Expr(t));
                    }
                    push(ParentField::Iterable, 0, NodeRef::Expr(&s.iterable));
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                    for (i, st) in s.orelse.iter().enumerate() {
                        push(ParentField::OrElse, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::While(s) => {
                    push(ParentField::Condition, 0, NodeRef::Expr(&s.condition));
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                    for (i, st) in s.orelse.iter().enumerate() {
                        push(ParentField::OrElse, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::With(s) => {
                    for (i, item) in s.items.iter().enumerate() {
                        push(ParentField::Items, i as u32, NodeRef::WithItem(item));
                    }
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::Try(s) => {
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                    for (i, h) in s.handlers.iter().enumerate() {
                        push(ParentField::Handlers, i as u32, NodeRef::Handler(h));
                    }
                    for (i, st) in s.orelse.iter().enumerate() {
                        push(ParentField::OrElse, i as u32, NodeRef::Stmt(st));
                    }
                    for (i, st) in s.final_body.iter().enumerate() {
                        push(ParentField::Final, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::Import(s) => {
                    for (i, c) in s.clauses.iter().enumerate() {
                        push(ParentField::Names, i as u32, NodeRef::ImportClause(c));
                    }
                }
                Stmt::FunctionDef(s) => {
                    for (i, d) in s.decorators.iter().enumerate() {
                        push(ParentField::Decorators, i as u32, NodeRef::Expr(d));
                    }
                    push(ParentField::Name, 0, NodeRef::Name(&s.name));
                    let mut pos = 0u32;
                    for p in &s.params {
                        push(ParentField::Params, pos, NodeRef::Parameter(p));
                        pos += 1;
                    }
                    if let Some(p) = &s.vararg {
                        push(ParentField::Params, pos, NodeRef::Parameter(p));
                        pos += 1;
                    }
                    if let Some(p) = &s.kwarg {
                        push(ParentField::Params, pos, NodeRef::Parameter(p));
                    }
                    if let Some(a) = &s.return_annotation {
                        push(ParentField::Annotation, 0, NodeRef::Expr(a));
                    }
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::ClassDef(s) => {
                    for (i, d) in s.decorators.iter().enumerate() {
                        push(ParentField::Decorators, i as u32, NodeRef::Expr(d));
                    }
                    push(ParentField::Name, 0, NodeRef::Name(&s.name));
                    for (i, a) in s.bases.iter().enumerate() {
                        push(ParentField::Args, i as u32, NodeRef::Argument(a));
                    }
                    for (i, st) in s.body.iter().enumerate() {
                        push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                    }
                }
                Stmt::Return(s) => {
                    if let Some(v) = &s.value {
                        push(ParentField::Value, 0, NodeRef::Expr(v));
                    }
                }
                Stmt::Pass(_) => {}
            },
            NodeRef::Branch(b) => {
                push(ParentField::Condition, 0, NodeRef::Expr(&b.condition));
                for (i, st) in b.body.iter().enumerate() {
                    push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                }
            }
            NodeRef::WithItem(i) => {
                push(ParentField::Value, 0, NodeRef::Expr(&i.value));
                if let Some(t) = &i.target {
                    push(ParentField::Target, 0, NodeRef::Expr(t));
                }
            }
            NodeRef::Handler(h) => {
                if let Some(t) = &h.typ {
                    push(ParentField::Type, 0, NodeRef::Expr(t));
                }
                if let Some(t) = &h.target {
                    push(ParentField::Target, 0, NodeRef::Expr(t));
                }
                for (i, st) in h.body.iter().enumerate() {
                    push(ParentField::Body, i as u32, NodeRef::Stmt(st));
                }
            }
            NodeRef::ImportClause(c) => {
                for (i, n) in c.path.iter().enumerate() {
                    push(ParentField::Names, i as u32, NodeRef::Name(n));
                }
                if let Some(a) = &c.alias {
                    push(ParentField::Alias, 0, NodeRef::Name(a));
                }
            }
            NodeRef::Parameter(p) => {
                push(ParentField::Name, 0, NodeRef::Name(&p.name));
                if let Some(d) = &p.default {
                    push(ParentField::Default, 0, NodeRef::Expr(d));
                }
                if let Some(a) = &p.annotation {
                    push(ParentField::Annotation, 0, NodeRef::Expr(a));
                }
            }
            NodeRef::Argument(a) => {
                if let Some(n) = &a.name {
                    push(ParentField::Name, 0, NodeRef::Name(n));
                }
                push(ParentField::Value, 0, NodeRef::Expr(&a.value));
            }
            NodeRef::Name(_) => {}
            NodeRef::Expr(expr) => match expr {
                Expr::Name(_) | Expr::Literal(_) => {}
                Expr::Attribute(a) => {
                    push(ParentField::Value, 0, NodeRef::Expr(&a.value));
                }
                Expr::Call(c) => {
                    push(ParentField::Func, 0, NodeRef::Expr(&c.func));
                    for (i, a) in c.args.iter().enumerate() {
                        push(ParentField::Args, i as u32, NodeRef::Argument(a));
                    }
                }
                Expr::Tuple(t) => {
                    for (i, e) in t.elts.iter().enumerate() {
                        push(ParentField::Elts, i as u32, NodeRef::Expr(e));
                    }
                }
                Expr::Binary(b) => {
                    push(ParentField::Left, 0, NodeRef::Expr(&b.left));
                    push(ParentField::Right, 0, NodeRef::Expr(&b.right));
                }
            },
        }
        out
    }
}

/// Pre-order traversal. `f` returns `false` to skip a node's children.
pub fn walk<'a>(node: NodeRef<'a>, f: &mut impl FnMut(NodeRef<'a>) -> bool) {
    if !f(node) {
        return;
    }
    for (_, _, child) in node.child_edges() {
        walk(child, f);
    }
}

/// Visits every parent/child edge below `node` in source order.
pub fn walk_edges<'a>(
    node: NodeRef<'a>,
    f: &mut impl FnMut(NodeRef<'a>, NodeRef<'a>, ParentField, u32),
) {
    for (field, pos, child) in node.child_edges() {
        f(node, child, field, pos);
        walk_edges(child, f);
    }
}

/// All name expressions below `node`, in source order.
pub fn names_in<'a>(node: NodeRef<'a>, out: &mut Vec<&'a NameExpr>) {
    walk(node, &mut |n| {
        match n {
            NodeRef::Name(name) | NodeRef::Expr(Expr::Name(name)) => out.push(name),
            _ => {}
        }
        true
    });
}
