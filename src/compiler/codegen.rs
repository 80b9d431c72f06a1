//! Code Generation
//!
//! Compiler pass that linearises each function's control-flow graph into
//! _gas-x86-64-linux_ textual assembly (AT&T syntax, System-V AMD64 ABI).
//!
//! The generator is deliberately unoptimised: every temporary lives in an
//! 8-byte stack slot, and every operation reads its operands into the
//! scratch registers `%r10`/`%r11`/`%rax`, computes, and writes back.

use std::collections::{HashMap, HashSet};
use std::io::{self, BufWriter, Write};

use crate::compiler::ir::{
    AddressVar, BinaryOp, Function, InstId, Instruction, LocalVar, Predicate, Program, Value,
};
use crate::compiler::sema::symbols::Symbols;

/// Registers carrying the first six integer arguments, in ABI order.
const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Emits the assembly for `program` to the provided `writer`.
///
/// # Errors
///
/// Returns an error if the assembly could not be written to the `writer`.
pub fn generate<W: Write>(program: &Program, symbols: &Symbols, writer: W) -> io::Result<()> {
    let mut writer = BufWriter::new(writer);

    // Globals are common symbols: 8 bytes per element, 8-byte aligned.
    for global in &program.globals {
        writeln!(
            writer,
            "\t.comm {}, {}, 8",
            symbols.name(global.symbol),
            8 * global.num_elements
        )?;
    }

    // Jump labels are unique across the whole program.
    let mut label_count = 0usize;

    for func in &program.functions {
        gen_function(func, symbols, &mut label_count, &mut writer)?;
    }

    writer.flush()
}

/// Emits one function: prologue, argument spills, and the linearised body.
fn gen_function<W: Write>(
    f: &Function,
    symbols: &Symbols,
    label_count: &mut usize,
    writer: &mut BufWriter<W>,
) -> io::Result<()> {
    let mut emitter = FuncEmitter {
        f,
        symbols,
        labels: assign_labels(f, label_count),
        slots: HashMap::new(),
        next_slot: 1,
    };

    writeln!(writer, "\t.globl {}", f.name)?;
    writeln!(writer, "{}:", f.name)?;

    // One 8-byte slot per value and address temporary, rounded up to an even
    // count to keep the frame 16-byte aligned.
    let mut num_vars = (f.num_temp_vars() + f.num_temp_addr_vars()) as u64;
    if num_vars % 2 == 1 {
        num_vars += 1;
    }
    writeln!(writer, "\tenter ${}, $0", 8 * num_vars)?;

    // Spill incoming arguments into their slots: the first six from the ABI
    // registers, the rest from above the saved base pointer.
    for (i, param) in f.params.iter().enumerate() {
        let slot = emitter.def_slot(VarKey::Local(param.id));

        if let Some(reg) = ARG_REGISTERS.get(i) {
            writeln!(writer, "\tmovq {reg}, {}", rbp_offset(slot))?;
        } else {
            // Argument i (0-based) lives at 16 + 8*(i - 6) above %rbp.
            writeln!(writer, "\tmovq {}(%rbp), %r10", 16 + 8 * (i - 6))?;
            writeln!(writer, "\tmovq %r10, {}", rbp_offset(slot))?;
        }
    }

    emitter.emit_body(writer)
}

/// Assigns a label to every branch target: any instruction with in-degree
/// greater than one, or the target of a jump's true edge.
fn assign_labels(f: &Function, label_count: &mut usize) -> HashMap<InstId, String> {
    let Some(start) = f.start() else {
        return HashMap::new();
    };

    // Depth-first order keeps the numbering deterministic.
    let mut order = vec![];
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    seen.insert(start);

    while let Some(id) = stack.pop() {
        order.push(id);
        for edge in (0..2).rev() {
            if let Some(next) = f.next(id, edge) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
    }

    let mut in_degree: HashMap<InstId, usize> = HashMap::new();
    let mut jump_targets = HashSet::new();

    for &id in &order {
        for edge in 0..2 {
            if let Some(next) = f.next(id, edge) {
                *in_degree.entry(next).or_insert(0) += 1;

                if edge == 1 {
                    jump_targets.insert(next);
                }
            }
        }
    }

    let mut labels = HashMap::new();
    for id in order {
        if jump_targets.contains(&id) || in_degree.get(&id).copied().unwrap_or(0) > 1 {
            labels.insert(id, format!(".L{}", *label_count));
            *label_count += 1;
        }
    }

    labels
}

/// Key of a stack slot: value and address temporaries are numbered
/// separately, so the slot map distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum VarKey {
    Local(u32),
    Addr(u32),
}

fn rbp_offset(slot: usize) -> String {
    format!("-{}(%rbp)", 8 * slot)
}

/// Per-function emission state: the label map and the slot assignment.
struct FuncEmitter<'a> {
    f: &'a Function,
    symbols: &'a Symbols,
    labels: HashMap<InstId, String>,
    slots: HashMap<VarKey, usize>,
    next_slot: usize,
}

impl FuncEmitter<'_> {
    /// Returns the slot of a definition site, assigning the next free slot
    /// on first use. Assignment is injective: a key never moves.
    fn def_slot(&mut self, key: VarKey) -> usize {
        if let Some(slot) = self.slots.get(&key) {
            return *slot;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(key, slot);
        slot
    }

    /// Returns the slot of an operand, which must have been defined.
    fn use_slot(&self, key: VarKey) -> usize {
        *self
            .slots
            .get(&key)
            .expect("operand should have a stack slot")
    }

    fn local_home(&self, var: &LocalVar) -> String {
        rbp_offset(self.use_slot(VarKey::Local(var.id)))
    }

    fn addr_home(&self, var: &AddressVar) -> String {
        rbp_offset(self.use_slot(VarKey::Addr(var.id)))
    }

    /// Linearises the CFG by depth-first traversal and emits each reachable
    /// instruction once. Successors are pushed in reverse index order so the
    /// false/fall-through edge pops first; reaching an already-emitted
    /// instruction emits an explicit `jmp` to its label instead.
    fn emit_body<W: Write>(&mut self, writer: &mut BufWriter<W>) -> io::Result<()> {
        let Some(start) = self.f.start() else {
            writeln!(writer, "\tleave")?;
            return writeln!(writer, "\tret");
        };

        let mut visited = HashSet::new();
        let mut stack = vec![start];
        visited.insert(start);

        while let Some(id) = stack.pop() {
            if let Some(label) = self.labels.get(&id) {
                writeln!(writer, "{label}:")?;
            }

            self.emit_inst(id, writer)?;

            if self.f.num_next(id) == 0 {
                writeln!(writer, "\tleave")?;
                writeln!(writer, "\tret")?;
            }

            // The true edge of a jump was already handled by its `je`; only
            // the fall-through edge may need an explicit jump.
            if let Some(next) = self.f.next(id, 1) {
                if visited.insert(next) {
                    stack.push(next);
                }
            }

            if let Some(next) = self.f.next(id, 0) {
                if visited.insert(next) {
                    stack.push(next);
                } else {
                    let label = self
                        .labels
                        .get(&next)
                        .expect("revisited instruction should carry a label");
                    writeln!(writer, "\tjmp {label}")?;
                }
            }
        }

        Ok(())
    }

    fn emit_inst<W: Write>(&mut self, id: InstId, writer: &mut BufWriter<W>) -> io::Result<()> {
        match self.f.inst(id) {
            Instruction::Copy { dst, src } => {
                let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));

                match src {
                    Value::Integer(v) => writeln!(writer, "\tmovq ${v}, {dst}"),
                    Value::Boolean(v) => writeln!(writer, "\tmovq ${}, {dst}", i64::from(*v)),
                    Value::Local(var) => {
                        writeln!(writer, "\tmovq {}, %r10", self.local_home(var))?;
                        writeln!(writer, "\tmovq %r10, {dst}")
                    }
                }
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                let lhs = self.local_home(lhs);
                let rhs = self.local_home(rhs);
                let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));

                match op {
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                        let mnemonic = match op {
                            BinaryOp::Add => "addq",
                            BinaryOp::Sub => "subq",
                            _ => "imulq",
                        };

                        writeln!(writer, "\tmovq {lhs}, %r10")?;
                        writeln!(writer, "\t{mnemonic} {rhs}, %r10")?;
                        writeln!(writer, "\tmovq %r10, {dst}")
                    }
                    BinaryOp::Div => {
                        // Dividend in %rdx:%rax, quotient back in %rax.
                        writeln!(writer, "\tmovq {lhs}, %rax")?;
                        writeln!(writer, "\tcqto")?;
                        writeln!(writer, "\tidivq {rhs}")?;
                        writeln!(writer, "\tmovq %rax, {dst}")
                    }
                }
            }
            Instruction::Compare {
                pred,
                dst,
                lhs,
                rhs,
            } => {
                let lhs = self.local_home(lhs);
                let rhs = self.local_home(rhs);
                let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));

                let cc = match pred {
                    Predicate::Ge => "ge",
                    Predicate::Gt => "g",
                    Predicate::Le => "le",
                    Predicate::Lt => "l",
                    Predicate::Eq => "e",
                    Predicate::Ne => "ne",
                };

                writeln!(writer, "\tmovq $1, %r10")?;
                writeln!(writer, "\tmovq $0, %rax")?;
                writeln!(writer, "\tmovq {lhs}, %r11")?;
                writeln!(writer, "\tcmpq {rhs}, %r11")?;
                writeln!(writer, "\tcmov{cc} %r10, %rax")?;
                writeln!(writer, "\tmovq %rax, {dst}")
            }
            Instruction::UnaryNot { dst, src } => {
                // Booleans are 0 or 1, so `1 - src` negates.
                let src = self.local_home(src);
                let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));

                writeln!(writer, "\tmovq $1, %r11")?;
                writeln!(writer, "\tsubq {src}, %r11")?;
                writeln!(writer, "\tmovq %r11, {dst}")
            }
            Instruction::Jump { pred } => {
                let target = self.f.next(id, 1).expect("jump should have a true edge");
                let label = self
                    .labels
                    .get(&target)
                    .expect("jump target should carry a label");

                writeln!(writer, "\tmovq {}, %r10", self.local_home(pred))?;
                writeln!(writer, "\tcmpq $1, %r10")?;
                writeln!(writer, "\tje {label}")
            }
            Instruction::AddressAt { dst, base, offset } => {
                let dst = rbp_offset(self.def_slot(VarKey::Addr(dst.id)));

                writeln!(
                    writer,
                    "\tmovq {}@GOTPCREL(%rip), %r11",
                    self.symbols.name(*base)
                )?;

                if let Some(offset) = offset {
                    writeln!(writer, "\tmovq {}, %r10", self.local_home(offset))?;
                    writeln!(writer, "\timulq $8, %r10")?;
                    writeln!(writer, "\taddq %r10, %r11")?;
                }

                writeln!(writer, "\tmovq %r11, {dst}")
            }
            Instruction::Load { dst, src } => {
                let src = self.addr_home(src);
                let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));

                writeln!(writer, "\tmovq {src}, %r11")?;
                writeln!(writer, "\tmovq 0(%r11), %r10")?;
                writeln!(writer, "\tmovq %r10, {dst}")
            }
            Instruction::Store { src, dst } => {
                writeln!(writer, "\tmovq {}, %r11", self.addr_home(dst))?;
                writeln!(writer, "\tmovq {}, %r10", self.local_home(src))?;
                writeln!(writer, "\tmovq %r10, 0(%r11)")
            }
            Instruction::Call { dst, callee, args } => {
                for (arg, reg) in args.iter().zip(ARG_REGISTERS) {
                    writeln!(writer, "\tmovq {}, {reg}", self.local_home(arg))?;
                }

                // Stack-passed portion, padded to keep the call site 16-byte
                // aligned. The caller pops its own pushes right after the
                // call returns.
                let stack_args = args.len().saturating_sub(6);
                let pad = stack_args > 0 && stack_args % 2 == 1;

                if pad {
                    writeln!(writer, "\tpushq $0")?;
                }
                for arg in args.iter().skip(6).rev() {
                    writeln!(writer, "\tpushq {}", self.local_home(arg))?;
                }

                writeln!(writer, "\tcall {}", self.symbols.name(*callee))?;

                let pushed = 8 * (stack_args + usize::from(pad));
                if pushed > 0 {
                    writeln!(writer, "\taddq ${pushed}, %rsp")?;
                }

                if let Some(dst) = dst {
                    let dst = rbp_offset(self.def_slot(VarKey::Local(dst.id)));
                    writeln!(writer, "\tmovq %rax, {dst}")?;
                }

                Ok(())
            }
            Instruction::Return { value } => {
                // `leave; ret` comes from the terminal-instruction rule.
                if let Some(value) = value {
                    writeln!(writer, "\tmovq {}, %rax", self.local_home(value))?;
                }

                Ok(())
            }
            Instruction::Nop => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{irgen, lexer::Lexer, parser, sema, type_check};

    fn gen(src: &[u8]) -> String {
        let tokens = Lexer::new(src).lex().expect("source should tokenize");
        let program = parser::parse_program(tokens).expect("source should parse");
        let (ast, symbols, diagnostics) = sema::build_ast(&program);
        assert!(diagnostics.is_empty(), "sema diagnostics: {diagnostics:?}");
        let (_, type_errors) = type_check::check(&ast, &symbols);
        assert!(type_errors.is_empty(), "type errors: {type_errors:?}");

        let ir = irgen::lower(&ast, &symbols);
        let mut asm = Vec::new();
        generate(&ir, &symbols, &mut asm).expect("emission should succeed");

        String::from_utf8(asm).expect("assembly should be UTF-8")
    }

    #[test]
    fn codegen_globals_reserve_eight_bytes_per_element() {
        let asm = gen(b"int g; bool flags[5]; func void main() { }");

        assert!(asm.contains("\t.comm g, 8, 8"));
        assert!(asm.contains("\t.comm flags, 40, 8"));
    }

    #[test]
    fn codegen_function_header_and_frame() {
        let asm = gen(b"func void main() { printInt(1 + 2); }");

        assert!(asm.contains("\t.globl main"));
        assert!(asm.contains("main:"));

        // The frame reserves an even number of 8-byte slots.
        let enter = asm
            .lines()
            .find(|l| l.trim_start().starts_with("enter"))
            .expect("function should set up a frame");
        let bytes: u64 = enter
            .trim()
            .trim_start_matches("enter $")
            .split(',')
            .next()
            .expect("enter should carry an operand")
            .parse()
            .expect("frame size should be numeric");
        assert_eq!(bytes % 16, 0);
    }

    #[test]
    fn codegen_every_path_returns() {
        let asm = gen(b"func void main() { }");

        assert!(asm.contains("\tleave\n\tret"));
    }

    #[test]
    fn codegen_arguments_spill_from_abi_registers() {
        let asm = gen(b"func int add(int a, int b) { return a + b; } func void main() { }");

        assert!(asm.contains("\tmovq %rdi, -8(%rbp)"));
        assert!(asm.contains("\tmovq %rsi, -16(%rbp)"));
    }

    #[test]
    fn codegen_seventh_argument_copied_from_caller_frame() {
        let asm = gen(
            b"func int f(int a, int b, int c, int d, int e, int g, int h) { return h; }
              func void main() { }",
        );

        // Argument 7 sits just above the saved %rbp and return address.
        assert!(asm.contains("\tmovq 16(%rbp), %r10"));
        assert!(asm.contains("\tmovq %r10, -56(%rbp)"));
    }

    #[test]
    fn codegen_call_passes_register_arguments() {
        let asm = gen(b"func void main() { printInt(42); }");

        assert!(asm.contains(", %rdi\n\tcall printInt"));
    }

    #[test]
    fn codegen_call_balances_stack_arguments() {
        let asm = gen(
            b"func int f(int a, int b, int c, int d, int e, int g, int h) { return a; }
              func void main() { printInt(f(1, 2, 3, 4, 5, 6, 7)); }",
        );

        // One stack argument plus alignment padding: 16 bytes pushed, popped
        // immediately after the call.
        assert!(asm.contains("\tpushq $0"));
        let call_idx = asm.find("\tcall f\n").expect("main should call f");
        let after = &asm[call_idx..];
        assert!(after.contains("\taddq $16, %rsp"));
    }

    #[test]
    fn codegen_division_uses_rax_rdx_pair() {
        let asm = gen(b"func void main() { printInt(7 / 2); }");

        assert!(asm.contains("\tcqto"));
        assert!(asm.contains("\tidivq"));
    }

    #[test]
    fn codegen_comparison_uses_cmov() {
        let asm = gen(b"func void main() { printBool(1 < 2); }");

        assert!(asm.contains("\tcmovl %r10, %rax"));
    }

    #[test]
    fn codegen_jump_tests_predicate_against_one() {
        let asm = gen(b"func void main() { if true { println(); } }");

        assert!(asm.contains("\tcmpq $1, %r10"));
        assert!(asm.contains("\tje .L"));
    }

    #[test]
    fn codegen_loop_emits_back_edge_jump() {
        let asm = gen(
            b"func void main() { int i; for (i = 0; i < 3; i = i + 1;) { printInt(i); } }",
        );

        assert!(asm.contains("\tjmp .L"));
    }

    #[test]
    fn codegen_global_access_via_gotpcrel() {
        let asm = gen(b"int g; func void main() { g = 4; printInt(g); }");

        assert!(asm.contains("\tmovq g@GOTPCREL(%rip), %r11"));
        assert!(asm.contains("\tmovq %r10, 0(%r11)"));
        assert!(asm.contains("\tmovq 0(%r11), %r10"));
    }

    #[test]
    fn codegen_array_index_scales_by_eight() {
        let asm = gen(b"int a[4]; func void main() { a[2] = 9; }");

        assert!(asm.contains("\timulq $8, %r10"));
        assert!(asm.contains("\taddq %r10, %r11"));
    }

    #[test]
    fn codegen_unary_not_subtracts_from_one() {
        let asm = gen(b"func void main() { printBool(!true); }");

        assert!(asm.contains("\tmovq $1, %r11"));
        assert!(asm.contains("\tsubq "));
    }

    #[test]
    fn codegen_return_value_lands_in_rax() {
        let asm = gen(b"func int f() { return 5; } func void main() { }");

        let f_idx = asm.find("f:").expect("f should be emitted");
        let body = &asm[f_idx..];
        assert!(body.contains(", %rax\n\tleave\n\tret"));
    }

    #[test]
    fn codegen_labels_unique_across_functions() {
        let asm = gen(
            b"func int f(int x) { if x > 0 { return 1; } else { return 2; } }
              func void main() { if true { println(); } }",
        );

        let mut labels: Vec<&str> = asm
            .lines()
            .filter(|l| l.starts_with(".L") && l.ends_with(':'))
            .collect();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();

        assert_eq!(labels.len(), total, "label defined twice");
    }
}
