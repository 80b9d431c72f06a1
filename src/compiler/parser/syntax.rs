//! Untyped parse tree produced by syntactic analysis.
//!
//! Identifiers are still plain spellings here; the AST builder resolves them
//! against the symbol table and folds this tree into the typed AST.

use crate::compiler::lexer::OperatorKind;
use crate::error::Position;

/// A complete Crux translation unit: the ordered top-level declarations.
#[derive(Debug, PartialEq)]
pub struct Program {
    /// Top-level declarations in source order.
    pub decls: Vec<Decl>,
}

/// Top-level declarations.
#[derive(Debug, PartialEq)]
pub enum Decl {
    /// `type Ident ';'`
    Var(VarDecl),
    /// `type Ident '[' Integer ']' ';'`
    Array(ArrayDecl),
    /// `'func' type Ident '(' paramList ')' stmtBlock`
    Func(FuncDefn),
}

/// A scalar variable declaration (global or statement-level).
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct VarDecl {
    pub ty: String,
    pub name: String,
    pub pos: Position,
}

/// A global array declaration.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct ArrayDecl {
    pub ty: String,
    pub name: String,
    pub extent: i64,
    pub pos: Position,
}

/// A function definition.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct FuncDefn {
    pub ret_ty: String,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

/// A function parameter (`type Ident`).
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Param {
    pub ty: String,
    pub name: String,
    pub pos: Position,
}

/// Statements.
#[derive(Debug, PartialEq)]
pub enum Stmt {
    /// Statement-level variable declaration.
    VarDecl(VarDecl),
    /// `designator '=' expr0 ';'`
    Assign(Assign),
    /// `Ident '(' exprList ')' ';'`
    Call(Call),
    /// `'if' expr0 stmtBlock ('else' stmtBlock)?`
    If(If),
    /// `'for' '(' assignStmt expr0 ';' designator '=' expr0 ')' stmtBlock`
    For(For),
    /// `'break' ';'`
    Break(Position),
    /// `'return' expr0? ';'`
    Return {
        /// The returned value, absent for a bare `return;`.
        value: Option<Expr>,
        /// Position of the `return` keyword.
        pos: Position,
    },
}

/// An assignment of a value to a designator.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Assign {
    pub target: Designator,
    pub value: Expr,
    pub pos: Position,
}

/// An lvalue: a bare identifier or an array element `a[e]`.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Designator {
    pub name: String,
    pub index: Option<Box<Expr>>,
    pub pos: Position,
}

/// An `if`/`else` branch.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct If {
    pub cond: Expr,
    pub then_block: Vec<Stmt>,
    pub else_block: Option<Vec<Stmt>>,
    pub pos: Position,
}

/// A `for` loop.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct For {
    pub init: Assign,
    pub cond: Expr,
    pub incr: Assign,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

/// A function call (statement or expression form).
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
    pub pos: Position,
}

/// Expressions.
#[derive(Debug, PartialEq)]
pub enum Expr {
    /// An integer literal.
    Integer {
        /// Literal value.
        value: i64,
        /// Source position.
        pos: Position,
    },
    /// A `true` or `false` literal.
    Bool {
        /// Literal value.
        value: bool,
        /// Source position.
        pos: Position,
    },
    /// A designator in value position.
    Designator(Designator),
    /// A call in value position.
    Call(Call),
    /// `'!' expr3`
    Unary {
        /// Always [`OperatorKind::LogNot`].
        op: OperatorKind,
        /// The negated operand.
        operand: Box<Expr>,
        /// Source position.
        pos: Position,
    },
    /// A binary operation at any precedence level.
    Binary {
        /// The operator.
        op: OperatorKind,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
        /// Source position.
        pos: Position,
    },
}

impl Expr {
    /// Returns the source position of the expression.
    #[must_use]
    pub fn pos(&self) -> Position {
        match self {
            Expr::Integer { pos, .. }
            | Expr::Bool { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. } => *pos,
            Expr::Designator(designator) => designator.pos,
            Expr::Call(call) => call.pos,
        }
    }
}
