//! Syntax tree consumed by graph construction.
//!
//! This is the contract with the parser front end: an owned tree in which
//! every node carries an [`AstId`] (unique within the buffer) and a byte
//! [`Span`]. The shape deliberately mirrors a statement-oriented scripting
//! language: suites of statements, name/attribute/call expressions, and
//! the handful of compound statements the flow approximation reasons
//! about.

use serde::{Deserialize, Serialize};

use exprgraph_core::AstId;

/// Half-open byte range `[begin, end)` in the analyzed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub begin: u32,
    pub end: u32,
}

impl Span {
    pub fn new(begin: u32, end: u32) -> Self {
        Span { begin, end }
    }

    /// True if `other` lies entirely within this span.
    pub fn contains(&self, other: Span) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a name occurrence uses its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameUsage {
    /// Written to (assignment target, loop target, parameter).
    Assign,
    /// Read from.
    Evaluate,
    /// Bound by an import.
    Import,
    /// Deleted.
    Delete,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Name(NameExpr),
    Attribute(AttributeExpr),
    Call(CallExpr),
    Literal(LiteralExpr),
    Tuple(TupleExpr),
    Binary(BinaryExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameExpr {
    pub id: AstId,
    pub span: Span,
    pub literal: String,
    pub usage: NameUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeExpr {
    pub id: AstId,
    pub span: Span,
    pub value: Box<Expr>,
    /// The selected attribute's text and the span of its token.
    pub attribute: String,
    pub attr_span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub id: AstId,
    pub span: Span,
    pub func: Box<Expr>,
    pub args: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub id: AstId,
    pub span: Span,
    /// Keyword name for `f(key=value)`, absent for positional arguments.
    pub name: Option<NameExpr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    Number,
    Str,
    Bool,
    NoneLit,
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralExpr {
    pub id: AstId,
    pub span: Span,
    pub kind: LiteralKind,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleExpr {
    pub id: AstId,
    pub span: Span,
    pub elts: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub id: AstId,
    pub span: Span,
    pub left: Box<Expr>,
    pub op: String,
    pub right: Box<Expr>,
}

impl Expr {
    pub fn id(&self) -> AstId {
        match self {
            Expr::Name(e) => e.id,
            Expr::Attribute(e) => e.id,
            Expr::Call(e) => e.id,
            Expr::Literal(e) => e.id,
            Expr::Tuple(e) => e.id,
            Expr::Binary(e) => e.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Name(e) => e.span,
            Expr::Attribute(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Literal(e) => e.span,
            Expr::Tuple(e) => e.span,
            Expr::Binary(e) => e.span,
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(ExprStmt),
    Assign(AssignStmt),
    AugAssign(AugAssignStmt),
    If(IfStmt),
    For(ForStmt),
    While(WhileStmt),
    With(WithStmt),
    Try(TryStmt),
    Import(ImportStmt),
    FunctionDef(FunctionDefStmt),
    ClassDef(ClassDefStmt),
    Return(ReturnStmt),
    Pass(PassStmt),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprStmt {
    pub id: AstId,
    pub span: Span,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignStmt {
    pub id: AstId,
    pub span: Span,
    pub targets: Vec<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugAssignStmt {
    pub id: AstId,
    pub span: Span,
    pub target: Expr,
    pub op: String,
    pub value: Expr,
}

/// One `if`/`elif` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: AstId,
    pub span: Span,
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub id: AstId,
    pub span: Span,
    pub branches: Vec<Branch>,
    pub orelse: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStmt {
    pub id: AstId,
    pub span: Span,
    pub targets: Vec<Expr>,
    pub iterable: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub id: AstId,
    pub span: Span,
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    pub id: AstId,
    pub span: Span,
    pub value: Expr,
    pub target: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithStmt {
    pub id: AstId,
    pub span: Span,
    pub items: Vec<WithItem>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub id: AstId,
    pub span: Span,
    pub typ: Option<Expr>,
    pub target: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStmt {
    pub id: AstId,
    pub span: Span,
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub final_body: Vec<Stmt>,
}

/// One bound name of an import statement.
///
/// `import a.b.c` has `path = [a, b, c]`; the root component is what enters
/// the local namespace. `from m import x as y` is represented with
/// `path = [x]` and `alias = y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportClause {
    pub id: AstId,
    pub span: Span,
    pub path: Vec<NameExpr>,
    pub alias: Option<NameExpr>,
}

impl ImportClause {
    /// The name the clause binds in the local namespace.
    pub fn binding(&self) -> Option<&NameExpr> {
        self.alias.as_ref().or_else(|| self.path.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStmt {
    pub id: AstId,
    pub span: Span,
    pub clauses: Vec<ImportClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: AstId,
    pub span: Span,
    pub name: NameExpr,
    pub default: Option<Expr>,
    pub annotation: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefStmt {
    pub id: AstId,
    pub span: Span,
    pub name: NameExpr,
    pub params: Vec<Parameter>,
    pub vararg: Option<Parameter>,
    pub kwarg: Option<Parameter>,
    pub return_annotation: Option<Expr>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefStmt {
    pub id: AstId,
    pub span: Span,
    pub name: NameExpr,
    pub bases: Vec<Argument>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub id: AstId,
    pub span: Span,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassStmt {
    pub id: AstId,
    pub span: Span,
}

impl Stmt {
    pub fn id(&self) -> AstId {
        match self {
            Stmt::Expr(s) => s.id,
            Stmt::Assign(s) => s.id,
            Stmt::AugAssign(s) => s.id,
            Stmt::If(s) => s.id,
            Stmt::For(s) => s.id,
            Stmt::While(s) => s.id,
            Stmt::With(s) => s.id,
            Stmt::Try(s) => s.id,
            Stmt::Import(s) => s.id,
            Stmt::FunctionDef(s) => s.id,
            Stmt::ClassDef(s) => s.id,
            Stmt::Return(s) => s.id,
            Stmt::Pass(s) => s.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::AugAssign(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::With(s) => s.span,
            Stmt::Try(s) => s.span,
            Stmt::Import(s) => s.span,
            Stmt::FunctionDef(s) => s.span,
            Stmt::ClassDef(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Pass(s) => s.span,
        }
    }
}

/// Root of the syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: AstId,
    pub span: Span,
    pub body: Vec<Stmt>,
}

// ---------------------------------------------------------------------------
// ID allocation
// ---------------------------------------------------------------------------

/// Allocates [`AstId`]s for a single buffer.
///
/// Front ends thread one factory through a parse; tests use the
/// convenience constructors for the most common node shapes.
#[derive(Debug, Default)]
pub struct AstFactory {
    next: u32,
}

impl AstFactory {
    pub fn new() -> Self {
        AstFactory::default()
    }

    pub fn fresh(&mut self) -> AstId {
        let id = AstId(self.next);
        self.next += 1;
        id
    }

    pub fn name(&mut self, literal: &str, span: Span, usage: NameUsage) -> NameExpr {
        NameExpr {
            id: self.fresh(),
            span,
            literal: literal.to_owned(),
            usage,
        }
    }

    pub fn attribute(&mut self, value: Expr, attribute: &str, attr_span: Span) -> AttributeExpr {
        let span = Span::new(value.span().begin, attr_span.end);
        AttributeExpr {
            id: self.fresh(),
            span,
            value: Box::new(value),
            attribute: attribute.to_owned(),
            attr_span,
        }
    }

    pub fn call(&mut self, func: Expr, args: Vec<Argument>, span: Span) -> CallExpr {
        CallExpr {
            id: self.fresh(),
            span,
            func: Box::new(func),
            args,
        }
    }

    pub fn number(&mut self, literal: &str, span: Span) -> LiteralExpr {
        LiteralExpr {
            id: self.fresh(),
            span,
            kind: LiteralKind::Number,
            literal: literal.to_owned(),
        }
    }

    pub fn string(&mut self, literal: &str, span: Span) -> LiteralExpr {
        LiteralExpr {
            id: self.fresh(),
            span,
            kind: LiteralKind::Str,
            literal: literal.to_owned(),
        }
    }

    pub fn assign(&mut self, targets: Vec<Expr>, value: Expr, span: Span) -> AssignStmt {
        AssignStmt {
            id: self.fresh(),
            span,
            targets,
            value,
        }
    }

    pub fn expr_stmt(&mut self, value: Expr) -> ExprStmt {
        ExprStmt {
            id: self.fresh(),
            span: value.span(),
            value,
        }
    }

    pub fn module(&mut self, body: Vec<Stmt>, span: Span) -> Module {
        Module {
            id: self.fresh(),
            span,
            body,
        }
    }
}
