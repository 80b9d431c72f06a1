//! AST Building & Scope Resolution
//!
//! Compiler pass that folds the parse tree into the typed AST, resolving
//! every identifier use against the lexically scoped symbol table.

pub mod symbols;

use crate::compiler::ast::{
    ArrayAccess, ArrayDeclaration, Assignment, Break, Call, Declaration, DeclarationList,
    Expression, For, FunctionDefinition, IfElseBranch, LiteralBool, LiteralInt, NodeId, OpExpr,
    Operation, Return, Statement, StatementList, VarAccess, VariableDeclaration,
};
use crate::compiler::lexer::OperatorKind;
use crate::compiler::parser::syntax;
use crate::compiler::types::Type;
use crate::error::{Diagnostic, Position};
use symbols::{SymbolTable, Symbols};

/// Folds the parse tree into an AST, returning the AST, the symbol arena, and
/// every declaration/resolution diagnostic collected along the way.
///
/// Building always runs to completion; a non-empty diagnostic list means the
/// driver must stop the pipeline before IR lowering.
#[must_use]
pub fn build_ast(program: &syntax::Program) -> (DeclarationList, Symbols, Vec<Diagnostic>) {
    let mut builder = AstBuilder {
        table: SymbolTable::new(),
        next_node: 0,
    };

    let mut decls = vec![];
    for decl in &program.decls {
        decls.push(builder.lower_decl(decl));
    }

    let (symbols, diagnostics) = builder.table.into_parts();

    (DeclarationList { decls }, symbols, diagnostics)
}

/// Recursive descent over the parse tree, carrying the symbol table and the
/// expression node counter.
struct AstBuilder {
    table: SymbolTable,
    next_node: u32,
}

impl AstBuilder {
    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Maps an identifier in type position to its type. Any spelling other
    /// than the three built-in type names is an error type.
    fn make_type(name: &str) -> Type {
        match name {
            "int" => Type::Int,
            "bool" => Type::Bool,
            "void" => Type::Void,
            _ => Type::Error(format!("Invalid Type: {name}")),
        }
    }

    fn lower_decl(&mut self, decl: &syntax::Decl) -> Declaration {
        match decl {
            syntax::Decl::Var(var) => Declaration::Variable(self.lower_var_decl(var)),
            syntax::Decl::Array(array) => {
                let base = Self::make_type(&array.ty);
                let ty = Type::Array {
                    base: Box::new(base),
                    extent: u64::try_from(array.extent).unwrap_or(0),
                };

                let symbol = self.table.add(array.pos, &array.name, ty);

                Declaration::Array(ArrayDeclaration {
                    pos: array.pos,
                    symbol,
                })
            }
            syntax::Decl::Func(func) => Declaration::Function(self.lower_func_defn(func)),
        }
    }

    fn lower_var_decl(&mut self, var: &syntax::VarDecl) -> VariableDeclaration {
        let ty = Self::make_type(&var.ty);
        let symbol = self.table.add(var.pos, &var.name, ty);

        VariableDeclaration {
            pos: var.pos,
            symbol,
        }
    }

    fn lower_func_defn(&mut self, func: &syntax::FuncDefn) -> FunctionDefinition {
        let ty = Type::Func {
            params: func.params.iter().map(|p| Self::make_type(&p.ty)).collect(),
            ret: Box::new(Self::make_type(&func.ret_ty)),
        };

        // The function symbol lands in the enclosing scope before the
        // parameters land in the new one, so a parameter sharing the
        // function's name shadows it inside the body.
        let symbol = self.table.add(func.pos, &func.name, ty);

        self.table.enter();

        let mut params = vec![];
        for param in &func.params {
            let ty = Self::make_type(&param.ty);
            params.push(self.table.add(param.pos, &param.name, ty));
        }

        let body = self.lower_stmt_list(&func.body, func.pos);

        self.table.exit();

        FunctionDefinition {
            pos: func.pos,
            symbol,
            params,
            body,
        }
    }

    fn lower_stmt_list(&mut self, stmts: &[syntax::Stmt], pos: Position) -> StatementList {
        let stmts = stmts.iter().map(|stmt| self.lower_stmt(stmt)).collect();
        StatementList { pos, stmts }
    }

    fn lower_stmt(&mut self, stmt: &syntax::Stmt) -> Statement {
        match stmt {
            syntax::Stmt::VarDecl(var) => Statement::Declaration(self.lower_var_decl(var)),
            syntax::Stmt::Assign(assign) => Statement::Assignment(self.lower_assign(assign)),
            syntax::Stmt::Call(call) => Statement::Call(self.lower_call(call)),
            syntax::Stmt::If(branch) => {
                let cond = self.lower_expr(&branch.cond);

                self.table.enter();
                let then_block = self.lower_stmt_list(&branch.then_block, branch.pos);
                self.table.exit();

                let else_block = match &branch.else_block {
                    Some(stmts) => {
                        self.table.enter();
                        let block = self.lower_stmt_list(stmts, branch.pos);
                        self.table.exit();
                        block
                    }
                    None => StatementList {
                        pos: branch.pos,
                        stmts: vec![],
                    },
                };

                Statement::IfElse(IfElseBranch {
                    pos: branch.pos,
                    cond,
                    then_block,
                    else_block,
                })
            }
            syntax::Stmt::For(lp) => {
                self.table.enter();

                let init = self.lower_assign(&lp.init);
                let cond = self.lower_expr(&lp.cond);
                let incr = self.lower_assign(&lp.incr);
                let body = self.lower_stmt_list(&lp.body, lp.pos);

                self.table.exit();

                Statement::For(Box::new(For {
                    pos: lp.pos,
                    init,
                    cond,
                    incr,
                    body,
                }))
            }
            syntax::Stmt::Break(pos) => Statement::Break(Break { pos: *pos }),
            syntax::Stmt::Return { value, pos } => Statement::Return(Return {
                pos: *pos,
                value: value.as_ref().map(|expr| self.lower_expr(expr)),
            }),
        }
    }

    fn lower_assign(&mut self, assign: &syntax::Assign) -> Assignment {
        Assignment {
            pos: assign.pos,
            location: self.lower_designator(&assign.target),
            value: self.lower_expr(&assign.value),
        }
    }

    fn lower_designator(&mut self, designator: &syntax::Designator) -> Expression {
        let symbol = self.table.lookup(designator.pos, &designator.name);

        match &designator.index {
            Some(index) => {
                let index = self.lower_expr(index);
                Expression::ArrayAccess(Box::new(ArrayAccess {
                    id: self.node_id(),
                    pos: designator.pos,
                    base: symbol,
                    index,
                }))
            }
            None => Expression::VarAccess(VarAccess {
                id: self.node_id(),
                pos: designator.pos,
                symbol,
            }),
        }
    }

    fn lower_call(&mut self, call: &syntax::Call) -> Call {
        let callee = self.table.lookup(call.pos, &call.callee);
        let args = call.args.iter().map(|arg| self.lower_expr(arg)).collect();

        Call {
            id: self.node_id(),
            pos: call.pos,
            callee,
            args,
        }
    }

    fn lower_expr(&mut self, expr: &syntax::Expr) -> Expression {
        match expr {
            syntax::Expr::Integer { value, pos } => Expression::LiteralInt(LiteralInt {
                id: self.node_id(),
                pos: *pos,
                value: *value,
            }),
            syntax::Expr::Bool { value, pos } => Expression::LiteralBool(LiteralBool {
                id: self.node_id(),
                pos: *pos,
                value: *value,
            }),
            syntax::Expr::Designator(designator) => self.lower_designator(designator),
            syntax::Expr::Call(call) => Expression::Call(Box::new(self.lower_call(call))),
            syntax::Expr::Unary { operand, pos, .. } => {
                let lhs = self.lower_expr(operand);
                Expression::OpExpr(Box::new(OpExpr {
                    id: self.node_id(),
                    pos: *pos,
                    op: Operation::LogicNot,
                    lhs,
                    rhs: None,
                }))
            }
            syntax::Expr::Binary { op, lhs, rhs, pos } => {
                let lhs = self.lower_expr(lhs);
                let rhs = self.lower_expr(rhs);

                Expression::OpExpr(Box::new(OpExpr {
                    id: self.node_id(),
                    pos: *pos,
                    op: Self::make_op(*op),
                    lhs,
                    rhs: Some(rhs),
                }))
            }
        }
    }

    fn make_op(op: OperatorKind) -> Operation {
        match op {
            OperatorKind::GreaterEqual => Operation::Ge,
            OperatorKind::LessEqual => Operation::Le,
            OperatorKind::NotEqual => Operation::Ne,
            OperatorKind::Equal => Operation::Eq,
            OperatorKind::Greater => Operation::Gt,
            OperatorKind::Less => Operation::Lt,
            OperatorKind::Add => Operation::Add,
            OperatorKind::Sub => Operation::Sub,
            OperatorKind::Mul => Operation::Mul,
            OperatorKind::Div => Operation::Div,
            OperatorKind::LogAnd => Operation::LogicAnd,
            OperatorKind::LogOr => Operation::LogicOr,
            OperatorKind::LogNot => Operation::LogicNot,
            OperatorKind::Assign => unreachable!("assignment is not an expression operator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lexer::Lexer, parser};

    fn build(src: &[u8]) -> (DeclarationList, Symbols, Vec<Diagnostic>) {
        let tokens = Lexer::new(src).lex().expect("source should tokenize");
        let program = parser::parse_program(tokens).expect("source should parse");
        build_ast(&program)
    }

    #[test]
    fn sema_resolves_global_use() {
        let (ast, symbols, diagnostics) = build(b"int g; func void main() { g = 1; }");
        assert!(diagnostics.is_empty());

        let Declaration::Variable(global) = &ast.decls[0] else {
            panic!("expected global variable");
        };
        let Declaration::Function(func) = &ast.decls[1] else {
            panic!("expected function definition");
        };
        let Statement::Assignment(assign) = &func.body.stmts[0] else {
            panic!("expected assignment");
        };
        let Expression::VarAccess(access) = &assign.location else {
            panic!("expected variable access");
        };

        // The use shares identity with the declaration.
        assert_eq!(access.symbol, global.symbol);
        assert_eq!(symbols.ty(access.symbol), &Type::Int);
    }

    #[test]
    fn sema_duplicate_declaration_error() {
        let (_, _, diagnostics) = build(b"func void main() { int x; int x; }");

        assert_eq!(
            diagnostics,
            vec![Diagnostic::Declaration {
                pos: Position::new(1),
                name: "x".into(),
            }]
        );
    }

    #[test]
    fn sema_undeclared_use_error() {
        let (_, _, diagnostics) = build(b"func void main() {\n  x = 1;\n}");

        assert_eq!(
            diagnostics,
            vec![Diagnostic::ResolveSymbol {
                pos: Position::new(2),
                name: "x".into(),
            }]
        );
    }

    #[test]
    fn sema_branch_scope_is_popped() {
        // `y` is declared inside the if-block and is not visible after it.
        let (_, _, diagnostics) =
            build(b"func void main() {\n  if true { int y; y = 1; }\n  y = 2;\n}");

        assert_eq!(
            diagnostics,
            vec![Diagnostic::ResolveSymbol {
                pos: Position::new(3),
                name: "y".into(),
            }]
        );
    }

    #[test]
    fn sema_shadowing_across_scopes() {
        let (_, _, diagnostics) =
            build(b"int x; func void main() { int x; if true { int x; x = 1; } }");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn sema_parameter_shadows_function_name() {
        // The parameter lands in the inner scope after the function symbol
        // lands in the global scope, so the body's `f` is the parameter.
        let (ast, symbols, diagnostics) = build(b"func int f(int f) { return f; }");
        assert!(diagnostics.is_empty());

        let Declaration::Function(func) = &ast.decls[0] else {
            panic!("expected function definition");
        };
        let Statement::Return(ret) = &func.body.stmts[0] else {
            panic!("expected return statement");
        };
        let Some(Expression::VarAccess(access)) = &ret.value else {
            panic!("expected variable access");
        };

        assert_eq!(access.symbol, func.params[0]);
        assert_eq!(symbols.ty(access.symbol), &Type::Int);
    }

    #[test]
    fn sema_invalid_type_name() {
        let (ast, symbols, _) = build(b"float x; func void main() { }");

        let Declaration::Variable(var) = &ast.decls[0] else {
            panic!("expected variable declaration");
        };
        assert_eq!(
            symbols.ty(var.symbol),
            &Type::Error("Invalid Type: float".into())
        );
    }

    #[test]
    fn sema_builtin_call_resolves() {
        let (ast, symbols, diagnostics) = build(b"func void main() { printInt(1); }");
        assert!(diagnostics.is_empty());

        let Declaration::Function(func) = &ast.decls[0] else {
            panic!("expected function definition");
        };
        let Statement::Call(call) = &func.body.stmts[0] else {
            panic!("expected call statement");
        };

        assert_eq!(symbols.name(call.callee), "printInt");
    }

    #[test]
    fn sema_collects_multiple_errors() {
        // Both the duplicate declaration and the unresolved use surface.
        let (_, _, diagnostics) = build(b"int g; int g; func void main() { h = 1; }");
        assert_eq!(diagnostics.len(), 2);
    }
}
