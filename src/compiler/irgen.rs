//! IR Lowering
//!
//! Compiler pass that lowers the typed AST into the three-address IR,
//! building each function's control-flow graph. Assumes a well-typed
//! program: the driver never runs this pass once a diagnostic has been
//! collected.

use std::collections::HashMap;

use crate::compiler::ast::{
    Assignment, Call, Declaration, DeclarationList, Expression, OpExpr, Operation, Statement,
    StatementList,
};
use crate::compiler::ir::{
    BinaryOp, Function, GlobalDecl, InstId, Instruction, LocalVar, Predicate, Program, Value,
};
use crate::compiler::sema::symbols::{Symbol, Symbols};
use crate::compiler::types::Type;

/// An AST fragment lowered into the arena: the entry instruction, the unique
/// exit instruction, and (for expressions) the temporary holding the result.
struct InstPair {
    start: InstId,
    end: InstId,
    value: Option<LocalVar>,
}

impl InstPair {
    fn new(start: InstId, end: InstId) -> Self {
        InstPair {
            start,
            end,
            value: None,
        }
    }

    fn with_value(start: InstId, end: InstId, value: LocalVar) -> Self {
        InstPair {
            start,
            end,
            value: Some(value),
        }
    }

    fn value(&self) -> LocalVar {
        self.value
            .clone()
            .expect("expression fragment should produce a value")
    }
}

/// Lowers the typed AST into an IR [`Program`].
#[must_use]
pub fn lower(ast: &DeclarationList, symbols: &Symbols) -> Program {
    let mut lowerer = AstLower {
        symbols,
        locals: HashMap::new(),
        loop_exit: None,
        program: Program::default(),
    };

    for decl in &ast.decls {
        lowerer.lower_decl(decl);
    }

    lowerer.program
}

/// Lowering state: the binding of local symbols to their value temporaries
/// and the exit join of the innermost loop (the target of `break`).
struct AstLower<'a> {
    symbols: &'a Symbols,
    locals: HashMap<Symbol, LocalVar>,
    loop_exit: Option<InstId>,
    program: Program,
}

impl AstLower<'_> {
    fn lower_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Variable(var) => {
                self.program.globals.push(GlobalDecl {
                    symbol: var.symbol,
                    num_elements: 1,
                });
            }
            Declaration::Array(array) => {
                let Type::Array { extent, .. } = self.symbols.ty(array.symbol) else {
                    unreachable!("array declaration should carry an array type");
                };

                self.program.globals.push(GlobalDecl {
                    symbol: array.symbol,
                    num_elements: *extent,
                });
            }
            Declaration::Function(def) => {
                let name = self.symbols.name(def.symbol).to_string();
                let ty = self.symbols.ty(def.symbol).clone();
                let mut f = Function::new(name, ty);

                for param in &def.params {
                    let var = f.temp_var(self.symbols.ty(*param).clone());
                    self.locals.insert(*param, var.clone());
                    f.params.push(var);
                }

                let body = self.lower_stmt_list(&mut f, &def.body);
                f.set_start(body.start);

                self.locals.clear();
                self.program.functions.push(f);
            }
        }
    }

    fn lower_stmt_list(&mut self, f: &mut Function, list: &StatementList) -> InstPair {
        let start = f.add_inst(Instruction::Nop);
        let mut prev = start;

        for stmt in &list.stmts {
            let pair = self.lower_stmt(f, stmt);
            f.set_next(prev, 0, pair.start);
            prev = pair.end;
        }

        InstPair::new(start, prev)
    }

    fn lower_stmt(&mut self, f: &mut Function, stmt: &Statement) -> InstPair {
        match stmt {
            Statement::Declaration(var) => {
                // A local declaration binds a fresh temporary; no code.
                let tmp = f.temp_var(self.symbols.ty(var.symbol).clone());
                self.locals.insert(var.symbol, tmp);

                let nop = f.add_inst(Instruction::Nop);
                InstPair::new(nop, nop)
            }
            Statement::Assignment(assign) => self.lower_assignment(f, assign),
            Statement::Call(call) => self.lower_call(f, call),
            Statement::IfElse(branch) => {
                let cond = self.lower_expr(f, &branch.cond);

                let jump = f.add_inst(Instruction::Jump { pred: cond.value() });
                let exit = f.add_inst(Instruction::Nop);
                f.set_next(cond.end, 0, jump);

                let then_block = self.lower_stmt_list(f, &branch.then_block);
                f.set_next(jump, 1, then_block.start);
                f.set_next(then_block.end, 0, exit);

                if branch.else_block.stmts.is_empty() {
                    let bypass = f.add_inst(Instruction::Nop);
                    f.set_next(jump, 0, bypass);
                    f.set_next(bypass, 0, exit);
                } else {
                    let else_block = self.lower_stmt_list(f, &branch.else_block);
                    f.set_next(jump, 0, else_block.start);
                    f.set_next(else_block.end, 0, exit);
                }

                InstPair::new(cond.start, exit)
            }
            Statement::For(lp) => {
                let exit = f.add_inst(Instruction::Nop);
                let saved = self.loop_exit.replace(exit);

                let init = self.lower_assignment(f, &lp.init);
                let cond = self.lower_expr(f, &lp.cond);
                let incr = self.lower_assignment(f, &lp.incr);
                let body = self.lower_stmt_list(f, &lp.body);

                let jump = f.add_inst(Instruction::Jump { pred: cond.value() });

                f.set_next(init.end, 0, cond.start);
                f.set_next(cond.end, 0, jump);

                // Condition true: body, then the increment, then back to the
                // condition re-entry.
                f.set_next(jump, 1, body.start);
                f.set_next(body.end, 0, incr.start);
                f.set_next(incr.end, 0, cond.start);

                // Condition false: fall out of the loop.
                f.set_next(jump, 0, exit);

                self.loop_exit = saved;

                InstPair::new(init.start, exit)
            }
            Statement::Break(_) => {
                // The fragment *starts* at the loop exit, so the preceding
                // statement's edge lands there; the fresh nop is a dangling
                // continuation that terminates the current path.
                let exit = self
                    .loop_exit
                    .expect("break should be lowered inside a loop");
                let dangling = f.add_inst(Instruction::Nop);

                InstPair::new(exit, dangling)
            }
            Statement::Return(ret) => match &ret.value {
                Some(value) => {
                    let pair = self.lower_expr(f, value);
                    let ret = f.add_inst(Instruction::Return {
                        value: Some(pair.value()),
                    });
                    f.set_next(pair.end, 0, ret);

                    InstPair::new(pair.start, ret)
                }
                None => {
                    let ret = f.add_inst(Instruction::Return { value: None });
                    InstPair::new(ret, ret)
                }
            },
        }
    }

    fn lower_assignment(&mut self, f: &mut Function, assign: &Assignment) -> InstPair {
        match &assign.location {
            Expression::VarAccess(access) => {
                if let Some(local) = self.locals.get(&access.symbol).cloned() {
                    // Local: the location lowers to the bound temporary.
                    let rhs = self.lower_expr(f, &assign.value);
                    let copy = f.add_inst(Instruction::Copy {
                        dst: local,
                        src: Value::Local(rhs.value()),
                    });
                    f.set_next(rhs.end, 0, copy);

                    return InstPair::new(rhs.start, copy);
                }

                // Global: store through its address.
                let rhs = self.lower_expr(f, &assign.value);

                let addr = f.temp_addr_var(self.symbols.ty(access.symbol).clone());
                let at = f.add_inst(Instruction::AddressAt {
                    dst: addr.clone(),
                    base: access.symbol,
                    offset: None,
                });
                let store = f.add_inst(Instruction::Store {
                    src: rhs.value(),
                    dst: addr,
                });

                f.set_next(rhs.end, 0, at);
                f.set_next(at, 0, store);

                InstPair::new(rhs.start, store)
            }
            Expression::ArrayAccess(access) => {
                let index = self.lower_expr(f, &access.index);
                let rhs = self.lower_expr(f, &assign.value);

                let addr = f.temp_addr_var(self.element_type(access.base));
                let at = f.add_inst(Instruction::AddressAt {
                    dst: addr.clone(),
                    base: access.base,
                    offset: Some(index.value()),
                });
                let store = f.add_inst(Instruction::Store {
                    src: rhs.value(),
                    dst: addr,
                });

                f.set_next(index.end, 0, rhs.start);
                f.set_next(rhs.end, 0, at);
                f.set_next(at, 0, store);

                InstPair::new(index.start, store)
            }
            _ => unreachable!("assignment location should be a designator"),
        }
    }

    fn lower_call(&mut self, f: &mut Function, call: &Call) -> InstPair {
        let start = f.add_inst(Instruction::Nop);
        let mut prev = start;

        let mut args = vec![];
        for arg in &call.args {
            let pair = self.lower_expr(f, arg);
            f.set_next(prev, 0, pair.start);
            prev = pair.end;
            args.push(pair.value());
        }

        let Type::Func { ret, .. } = self.symbols.ty(call.callee) else {
            unreachable!("callee should have a function type");
        };

        if **ret == Type::Void {
            let inst = f.add_inst(Instruction::Call {
                dst: None,
                callee: call.callee,
                args,
            });
            f.set_next(prev, 0, inst);

            InstPair::new(start, inst)
        } else {
            let dst = f.temp_var((**ret).clone());
            let inst = f.add_inst(Instruction::Call {
                dst: Some(dst.clone()),
                callee: call.callee,
                args,
            });
            f.set_next(prev, 0, inst);

            InstPair::with_value(start, inst, dst)
        }
    }

    fn lower_expr(&mut self, f: &mut Function, expr: &Expression) -> InstPair {
        match expr {
            Expression::LiteralInt(lit) => {
                let tmp = f.temp_var(Type::Int);
                let copy = f.add_inst(Instruction::Copy {
                    dst: tmp.clone(),
                    src: Value::Integer(lit.value),
                });

                InstPair::with_value(copy, copy, tmp)
            }
            Expression::LiteralBool(lit) => {
                let tmp = f.temp_var(Type::Bool);
                let copy = f.add_inst(Instruction::Copy {
                    dst: tmp.clone(),
                    src: Value::Boolean(lit.value),
                });

                InstPair::with_value(copy, copy, tmp)
            }
            Expression::VarAccess(access) => {
                if let Some(local) = self.locals.get(&access.symbol).cloned() {
                    let nop = f.add_inst(Instruction::Nop);
                    return InstPair::with_value(nop, nop, local);
                }

                // Global: compute its address, then load the value.
                let ty = self.symbols.ty(access.symbol).clone();
                let addr = f.temp_addr_var(ty.clone());
                let at = f.add_inst(Instruction::AddressAt {
                    dst: addr.clone(),
                    base: access.symbol,
                    offset: None,
                });

                let tmp = f.temp_var(ty);
                let load = f.add_inst(Instruction::Load {
                    dst: tmp.clone(),
                    src: addr,
                });
                f.set_next(at, 0, load);

                InstPair::with_value(at, load, tmp)
            }
            Expression::ArrayAccess(access) => {
                let index = self.lower_expr(f, &access.index);

                let ty = self.element_type(access.base);
                let addr = f.temp_addr_var(ty.clone());
                let at = f.add_inst(Instruction::AddressAt {
                    dst: addr.clone(),
                    base: access.base,
                    offset: Some(index.value()),
                });
                f.set_next(index.end, 0, at);

                let tmp = f.temp_var(ty);
                let load = f.add_inst(Instruction::Load {
                    dst: tmp.clone(),
                    src: addr,
                });
                f.set_next(at, 0, load);

                InstPair::with_value(index.start, load, tmp)
            }
            Expression::Call(call) => self.lower_call(f, call),
            Expression::OpExpr(op) => self.lower_op(f, op),
        }
    }

    fn lower_op(&mut self, f: &mut Function, op: &OpExpr) -> InstPair {
        let lhs = self.lower_expr(f, &op.lhs);

        if let Some(pred) = compare_predicate(op.op) {
            let rhs_expr = op.rhs.as_ref().expect("comparison should be binary");
            let rhs = self.lower_expr(f, rhs_expr);

            let dst = f.temp_var(Type::Bool);
            let cmp = f.add_inst(Instruction::Compare {
                pred,
                dst: dst.clone(),
                lhs: lhs.value(),
                rhs: rhs.value(),
            });

            f.set_next(lhs.end, 0, rhs.start);
            f.set_next(rhs.end, 0, cmp);

            return InstPair::with_value(lhs.start, cmp, dst);
        }

        if let Some(binop) = binary_op(op.op) {
            let rhs_expr = op.rhs.as_ref().expect("arithmetic should be binary");
            let rhs = self.lower_expr(f, rhs_expr);

            let dst = f.temp_var(Type::Int);
            let bin = f.add_inst(Instruction::Binary {
                op: binop,
                dst: dst.clone(),
                lhs: lhs.value(),
                rhs: rhs.value(),
            });

            f.set_next(lhs.end, 0, rhs.start);
            f.set_next(rhs.end, 0, bin);

            return InstPair::with_value(lhs.start, bin, dst);
        }

        if op.op == Operation::LogicNot {
            let dst = f.temp_var(Type::Bool);
            let not = f.add_inst(Instruction::UnaryNot {
                dst: dst.clone(),
                src: lhs.value(),
            });
            f.set_next(lhs.end, 0, not);

            return InstPair::with_value(lhs.start, not, dst);
        }

        // `&&` and `||` short-circuit: the right operand only runs on the
        // edge that still needs it.
        let rhs_expr = op.rhs.as_ref().expect("logical operator should be binary");

        let pred = lhs.value();
        let jump = f.add_inst(Instruction::Jump { pred: pred.clone() });
        let exit = f.add_inst(Instruction::Nop);
        let dst = f.temp_var(Type::Bool);

        f.set_next(lhs.end, 0, jump);

        match op.op {
            Operation::LogicOr => {
                // True: the result is the left value, skip the right operand.
                let short = f.add_inst(Instruction::Copy {
                    dst: dst.clone(),
                    src: Value::Local(pred),
                });
                f.set_next(jump, 1, short);
                f.set_next(short, 0, exit);

                // False: evaluate the right operand.
                let rhs = self.lower_expr(f, rhs_expr);
                f.set_next(jump, 0, rhs.start);

                let full = f.add_inst(Instruction::Copy {
                    dst: dst.clone(),
                    src: Value::Local(rhs.value()),
                });
                f.set_next(rhs.end, 0, full);
                f.set_next(full, 0, exit);
            }
            Operation::LogicAnd => {
                // True: evaluate the right operand.
                let rhs = self.lower_expr(f, rhs_expr);
                f.set_next(jump, 1, rhs.start);

                let full = f.add_inst(Instruction::Copy {
                    dst: dst.clone(),
                    src: Value::Local(rhs.value()),
                });
                f.set_next(rhs.end, 0, full);
                f.set_next(full, 0, exit);

                // False: the result is the left value, skip the right
                // operand.
                let short = f.add_inst(Instruction::Copy {
                    dst: dst.clone(),
                    src: Value::Local(pred),
                });
                f.set_next(jump, 0, short);
                f.set_next(short, 0, exit);
            }
            _ => unreachable!("remaining operators are logical"),
        }

        InstPair::with_value(lhs.start, exit, dst)
    }

    fn element_type(&self, base: Symbol) -> Type {
        let Type::Array { base, .. } = self.symbols.ty(base) else {
            unreachable!("array access base should have an array type");
        };
        (**base).clone()
    }
}

fn compare_predicate(op: Operation) -> Option<Predicate> {
    match op {
        Operation::Ge => Some(Predicate::Ge),
        Operation::Gt => Some(Predicate::Gt),
        Operation::Le => Some(Predicate::Le),
        Operation::Lt => Some(Predicate::Lt),
        Operation::Eq => Some(Predicate::Eq),
        Operation::Ne => Some(Predicate::Ne),
        _ => None,
    }
}

fn binary_op(op: Operation) -> Option<BinaryOp> {
    match op {
        Operation::Add => Some(BinaryOp::Add),
        Operation::Sub => Some(BinaryOp::Sub),
        Operation::Mul => Some(BinaryOp::Mul),
        Operation::Div => Some(BinaryOp::Div),
        _ => None,
    }
}
