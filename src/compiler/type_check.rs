//! Type Checking
//!
//! Compiler pass that infers a type for every expression node and enforces
//! the semantic constraints of the language (break placement, return types,
//! `main` shape, parameter shapes).

use std::collections::HashMap;

use crate::compiler::ast::{
    Assignment, Call, Declaration, DeclarationList, Expression, FunctionDefinition, NodeId,
    Operation, Statement, StatementList,
};
use crate::compiler::sema::symbols::{Symbol, Symbols};
use crate::compiler::types::Type;
use crate::error::{Diagnostic, Position};

/// Inferred type of every expression node, keyed by node identity.
pub type TypeMap = HashMap<NodeId, Type>;

/// Type-checks the AST, returning the inferred-type map and every type
/// diagnostic collected.
///
/// Checking always runs to completion; for a program with an empty diagnostic
/// list, every expression node maps to a non-error type.
#[must_use]
pub fn check(ast: &DeclarationList, symbols: &Symbols) -> (TypeMap, Vec<Diagnostic>) {
    let mut checker = TypeChecker {
        symbols,
        types: TypeMap::new(),
        diagnostics: vec![],
        current_fn: None,
        loop_depth: 0,
    };

    for decl in &ast.decls {
        checker.check_decl(decl);
    }

    (checker.types, checker.diagnostics)
}

/// Inference pass state: the enclosing function for `return` checks and the
/// loop depth for `break` checks.
struct TypeChecker<'a> {
    symbols: &'a Symbols,
    types: TypeMap,
    diagnostics: Vec<Diagnostic>,
    current_fn: Option<Symbol>,
    loop_depth: usize,
}

impl TypeChecker<'_> {
    fn error(&mut self, pos: Position, msg: impl Into<String>) {
        self.diagnostics.push(Diagnostic::Type {
            pos,
            msg: msg.into(),
        });
    }

    /// Records the inferred type of a node, reporting error types as
    /// diagnostics.
    fn set_type(&mut self, id: NodeId, pos: Position, ty: Type) -> Type {
        if let Type::Error(msg) = &ty {
            let msg = msg.clone();
            self.error(pos, msg);
        }

        self.types.insert(id, ty.clone());
        ty
    }

    /// Records an error type that was already reported at its origin, without
    /// reporting it again.
    fn propagate(&mut self, id: NodeId, ty: Type) -> Type {
        self.types.insert(id, ty.clone());
        ty
    }

    fn check_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Variable(var) => {
                let ty = self.symbols.ty(var.symbol).clone();
                self.check_scalar_decl(var.pos, "Variable", var.symbol, &ty);
            }
            Declaration::Array(array) => {
                if let Type::Array { base, .. } = self.symbols.ty(array.symbol) {
                    let base = (**base).clone();
                    self.check_scalar_decl(array.pos, "Array", array.symbol, &base);
                }
            }
            Declaration::Function(func) => self.check_function(func),
        }
    }

    /// A declared variable (or array element) must be `int` or `bool`; in
    /// particular `void` is legal only as a function return type.
    fn check_scalar_decl(&mut self, pos: Position, what: &str, symbol: Symbol, ty: &Type) {
        match ty {
            Type::Int | Type::Bool => {}
            Type::Error(msg) => {
                let msg = msg.clone();
                self.error(pos, msg);
            }
            _ => {
                let msg = format!(
                    "{what} {} has invalid type {ty}",
                    self.symbols.name(symbol)
                );
                self.error(pos, msg);
            }
        }
    }

    fn check_function(&mut self, func: &FunctionDefinition) {
        let name = self.symbols.name(func.symbol).to_string();

        let ret = match self.symbols.ty(func.symbol) {
            Type::Func { ret, .. } => (**ret).clone(),
            // The function name collided with a non-function declaration;
            // the declaration error already covers it.
            _ => Type::Error(String::new()),
        };

        if let Type::Error(msg) = &ret {
            if !msg.is_empty() {
                let msg = msg.clone();
                self.error(func.pos, msg);
            }
        }

        if name == "main" {
            if ret != Type::Void {
                self.error(func.pos, "Main function must have type void");
            }
            if !func.params.is_empty() {
                self.error(func.pos, "Main function cannot have arguments");
            }
        }

        for (i, param) in func.params.iter().enumerate() {
            match self.symbols.ty(*param) {
                Type::Int | Type::Bool => {}
                _ => {
                    let msg = format!("Parameter {} in {name} has invalid type", i + 1);
                    self.error(func.pos, msg);
                }
            }
        }

        self.current_fn = Some(func.symbol);
        self.check_stmt_list(&func.body);
        self.current_fn = None;
    }

    fn check_stmt_list(&mut self, list: &StatementList) {
        for stmt in &list.stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Declaration(var) => {
                let ty = self.symbols.ty(var.symbol).clone();
                self.check_scalar_decl(var.pos, "Variable", var.symbol, &ty);
            }
            Statement::Assignment(assign) => self.check_assignment(assign),
            Statement::Call(call) => {
                let _ = self.check_call(call);
            }
            Statement::IfElse(branch) => {
                let cond = self.check_expr(&branch.cond);

                if !cond.is_error() && cond != Type::Bool {
                    self.error(
                        branch.cond.pos(),
                        "IfElse condition expression must evaluate to bool type",
                    );
                }

                self.check_stmt_list(&branch.then_block);
                self.check_stmt_list(&branch.else_block);
            }
            Statement::For(lp) => {
                self.loop_depth += 1;

                self.check_assignment(&lp.init);
                let cond = self.check_expr(&lp.cond);
                self.check_assignment(&lp.incr);

                if !cond.is_error() && cond != Type::Bool {
                    self.error(
                        lp.cond.pos(),
                        "For loop condition expression must evaluate to bool type",
                    );
                }

                self.check_stmt_list(&lp.body);
                self.loop_depth -= 1;
            }
            Statement::Break(brk) => {
                if self.loop_depth == 0 {
                    self.error(brk.pos, "Invalid use of break");
                }
            }
            Statement::Return(ret) => {
                let value_ty = ret.value.as_ref().map(|value| self.check_expr(value));

                let ret_ty = self.current_fn.map(|sym| match self.symbols.ty(sym) {
                    Type::Func { ret, .. } => (**ret).clone(),
                    _ => Type::Error(String::new()),
                });

                match ret_ty {
                    None | Some(Type::Void) => {
                        self.error(ret.pos, "Invalid use of return keyword");
                    }
                    Some(expected) => {
                        let matches = match &value_ty {
                            // A propagated error already carries a
                            // diagnostic.
                            Some(ty) if ty.is_error() => true,
                            Some(ty) => ty.equivalent(&expected),
                            None => false,
                        };

                        if !matches {
                            self.error(
                                ret.pos,
                                "Return expression type does not match function return type",
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_assignment(&mut self, assign: &Assignment) {
        let lhs = self.check_expr(&assign.location);
        let rhs = self.check_expr(&assign.value);

        if lhs.is_error() || rhs.is_error() {
            return;
        }

        if let Type::Error(msg) = lhs.assign(&rhs) {
            self.error(assign.pos, msg);
        }
    }

    fn check_call(&mut self, call: &Call) -> Type {
        let args: Vec<Type> = call.args.iter().map(|arg| self.check_expr(arg)).collect();

        let callee = self.symbols.ty(call.callee).clone();
        if callee.is_error() {
            return self.propagate(call.id, callee);
        }
        if let Some(err) = args.iter().find(|arg| arg.is_error()) {
            let err = err.clone();
            return self.propagate(call.id, err);
        }

        let result = callee.call(&args);
        self.set_type(call.id, call.pos, result)
    }

    fn check_expr(&mut self, expr: &Expression) -> Type {
        match expr {
            Expression::LiteralInt(lit) => self.set_type(lit.id, lit.pos, Type::Int),
            Expression::LiteralBool(lit) => self.set_type(lit.id, lit.pos, Type::Bool),
            Expression::VarAccess(access) => {
                let ty = self.symbols.ty(access.symbol).clone();
                if ty.is_error() {
                    // The resolution error was reported where the lookup
                    // failed.
                    self.propagate(access.id, ty)
                } else {
                    self.set_type(access.id, access.pos, ty)
                }
            }
            Expression::ArrayAccess(access) => {
                let index = self.check_expr(&access.index);
                let base = self.symbols.ty(access.base).clone();

                if base.is_error() {
                    return self.propagate(access.id, base);
                }
                if index.is_error() {
                    return self.propagate(access.id, index);
                }

                let ty = base.index(&index);
                self.set_type(access.id, access.pos, ty)
            }
            Expression::Call(call) => self.check_call(call),
            Expression::OpExpr(op) => {
                let lhs = self.check_expr(&op.lhs);
                let rhs = op.rhs.as_ref().map(|rhs| self.check_expr(rhs));

                if lhs.is_error() {
                    return self.propagate(op.id, lhs);
                }
                if let Some(rhs_ty) = &rhs {
                    if rhs_ty.is_error() {
                        let ty = rhs_ty.clone();
                        return self.propagate(op.id, ty);
                    }
                }

                let ty = Self::apply_op(op.op, &lhs, rhs.as_ref());
                self.set_type(op.id, op.pos, ty)
            }
        }
    }

    /// Dispatches an operator to the typed operation of its left operand.
    fn apply_op(op: Operation, lhs: &Type, rhs: Option<&Type>) -> Type {
        let rhs = match op {
            Operation::LogicNot => return lhs.not(),
            _ => rhs.expect("binary operator should have a right operand"),
        };

        match op {
            // The relational predicates only compare integers; equality
            // extends to both scalar types.
            Operation::Ge | Operation::Le | Operation::Gt | Operation::Lt => {
                if *lhs == Type::Int {
                    lhs.compare(rhs)
                } else {
                    Type::Error(format!("cannot compare {lhs} with {rhs}"))
                }
            }
            Operation::Eq | Operation::Ne => lhs.compare(rhs),
            Operation::Add => lhs.add(rhs),
            Operation::Sub => lhs.sub(rhs),
            Operation::Mul => lhs.mul(rhs),
            Operation::Div => lhs.div(rhs),
            Operation::LogicAnd => lhs.and(rhs),
            Operation::LogicOr => lhs.or(rhs),
            Operation::LogicNot => unreachable!("handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lexer::Lexer, parser, sema};

    fn check_src(src: &[u8]) -> (TypeMap, Vec<Diagnostic>) {
        let tokens = Lexer::new(src).lex().expect("source should tokenize");
        let program = parser::parse_program(tokens).expect("source should parse");
        let (ast, symbols, diagnostics) = sema::build_ast(&program);
        assert!(
            diagnostics.is_empty(),
            "unexpected sema diagnostics: {diagnostics:?}"
        );
        check(&ast, &symbols)
    }

    fn type_errors(src: &[u8]) -> Vec<String> {
        let (_, diagnostics) = check_src(src);
        diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::Type { msg, .. } => msg.clone(),
                other => panic!("expected type error, found {other}"),
            })
            .collect()
    }

    #[test]
    fn typeck_valid_program_types_every_expression() {
        let (types, diagnostics) = check_src(
            b"int g;
              func int f(int x) { return x * 2; }
              func void main() { g = f(3) + 1; printInt(g); }",
        );

        assert!(diagnostics.is_empty());
        assert!(types.values().all(|ty| !ty.is_error()));
        assert!(!types.is_empty());
    }

    #[test]
    fn typeck_add_rejects_bool_operand() {
        let errors = type_errors(b"func void main() { int x; x = 1 + true; }");
        assert_eq!(errors, vec!["cannot add int with bool"]);
    }

    #[test]
    fn typeck_relational_rejects_bools() {
        let errors = type_errors(b"func void main() { bool b; b = true < false; }");
        assert_eq!(errors, vec!["cannot compare bool with bool"]);
    }

    #[test]
    fn typeck_equality_accepts_bools() {
        let (_, diagnostics) = check_src(b"func void main() { bool b; b = true == false; }");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn typeck_equality_rejects_mixed_scalars() {
        let errors = type_errors(b"func void main() { bool b; b = 1 == true; }");
        assert_eq!(errors, vec!["cannot compare int with bool"]);
    }

    #[test]
    fn typeck_break_outside_loop() {
        let errors = type_errors(b"func void main() { break; }");
        assert_eq!(errors, vec!["Invalid use of break"]);
    }

    #[test]
    fn typeck_break_inside_loop_is_valid() {
        let (_, diagnostics) = check_src(
            b"func void main() { int i; for (i = 0; i < 3; i = i + 1;) { break; } }",
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn typeck_return_in_void_function() {
        let errors = type_errors(b"func void main() { return 1; }");
        assert_eq!(errors, vec!["Invalid use of return keyword"]);
    }

    #[test]
    fn typeck_return_type_mismatch() {
        let errors = type_errors(b"func int f() { return true; }");
        assert_eq!(
            errors,
            vec!["Return expression type does not match function return type"]
        );
    }

    #[test]
    fn typeck_main_constraints() {
        // Three errors: main has arguments, main is not void, and the bare
        // return does not produce the declared int.
        let errors = type_errors(b"func int main(int x) { return; }");
        assert_eq!(
            errors,
            vec![
                "Main function must have type void",
                "Main function cannot have arguments",
                "Return expression type does not match function return type",
            ]
        );
    }

    #[test]
    fn typeck_parameter_must_be_scalar() {
        let errors = type_errors(b"func void f(void x) { }");
        assert_eq!(errors, vec!["Parameter 1 in f has invalid type"]);
    }

    #[test]
    fn typeck_void_variable_rejected() {
        let errors = type_errors(b"void x; func void main() { }");
        assert_eq!(errors, vec!["Variable x has invalid type void"]);
    }

    #[test]
    fn typeck_if_condition_must_be_bool() {
        let errors = type_errors(b"func void main() { if 1 { } }");
        assert_eq!(
            errors,
            vec!["IfElse condition expression must evaluate to bool type"]
        );
    }

    #[test]
    fn typeck_for_condition_must_be_bool() {
        let errors = type_errors(b"func void main() { int i; for (i = 0; i + 1; i = i + 1;) { } }");
        assert_eq!(
            errors,
            vec!["For loop condition expression must evaluate to bool type"]
        );
    }

    #[test]
    fn typeck_call_argument_mismatch() {
        let errors = type_errors(b"func void main() { printInt(true); }");
        assert_eq!(errors, vec!["cannot call func(int):void with (bool)"]);
    }

    #[test]
    fn typeck_index_requires_int() {
        let errors = type_errors(b"int a[4]; func void main() { a[true] = 1; }");
        assert_eq!(errors, vec!["cannot index array[4,int] with bool"]);
    }

    #[test]
    fn typeck_assignment_mismatch() {
        let errors = type_errors(b"func void main() { int x; x = true; }");
        assert_eq!(errors, vec!["cannot assign int with bool"]);
    }

    #[test]
    fn typeck_array_element_assignment_types() {
        let (_, diagnostics) = check_src(
            b"bool flags[2]; func void main() { flags[0] = true; flags[1] = flags[0]; }",
        );
        assert!(diagnostics.is_empty());
    }
}
