//! Intermediate Representation
//!
//! Three-address instructions organised as a per-function control-flow
//! graph. Each function owns a flat arena of instruction nodes; "pointers"
//! between instructions are arena indices, which side-steps the ownership
//! cycles a loop would otherwise create. Every node carries a fixed two-slot
//! successor array: slot 1 is used only by [`Instruction::Jump`] (taken when
//! the predicate is true), every other edge lives in slot 0.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::compiler::sema::symbols::{Symbol, Symbols};
use crate::compiler::types::Type;

/// A whole program: global declarations plus function bodies.
#[derive(Debug, Default)]
pub struct Program {
    /// Global scalar and array declarations, in source order.
    pub globals: Vec<GlobalDecl>,
    /// Function bodies, in source order.
    pub functions: Vec<Function>,
}

impl Program {
    /// Returns a displayable rendering of the program, resolving symbol
    /// names against `symbols`.
    #[must_use]
    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> DisplayProgram<'a> {
        DisplayProgram {
            program: self,
            symbols,
        }
    }
}

/// A global variable or array; `num_elements` is 1 for scalars.
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct GlobalDecl {
    pub symbol: Symbol,
    pub num_elements: u64,
}

/// Reference to an instruction inside its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(u32);

impl InstId {
    /// Returns the arena index of the instruction.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// An 8-byte value temporary.
///
/// Identity (equality, hashing) is the temporary's number; the type rides
/// along for operand-shape checking and display.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct LocalVar {
    pub id: u32,
    pub ty: Type,
}

impl PartialEq for LocalVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalVar {}

impl Hash for LocalVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for LocalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.id)
    }
}

/// An 8-byte temporary holding the computed address of a global or array
/// element. Numbered separately from value temporaries.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct AddressVar {
    pub id: u32,
    pub ty: Type,
}

impl PartialEq for AddressVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AddressVar {}

impl Hash for AddressVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for AddressVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.id)
    }
}

/// A value an instruction may read.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer constant.
    Integer(i64),
    /// A boolean constant.
    Boolean(bool),
    /// A value temporary.
    Local(LocalVar),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Local(var) => write!(f, "{var}"),
        }
    }
}

/// Arithmetic operators of [`Instruction::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison predicates of [`Instruction::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Predicate {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
}

/// Instruction variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Copies `src` into `dst`.
    Copy {
        /// Destination temporary.
        dst: LocalVar,
        /// Source value.
        src: Value,
    },
    /// `dst = lhs op rhs` for an arithmetic operator.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Destination temporary.
        dst: LocalVar,
        /// Left operand.
        lhs: LocalVar,
        /// Right operand.
        rhs: LocalVar,
    },
    /// `dst = lhs pred rhs`, producing a boolean.
    Compare {
        /// The predicate.
        pred: Predicate,
        /// Destination temporary.
        dst: LocalVar,
        /// Left operand.
        lhs: LocalVar,
        /// Right operand.
        rhs: LocalVar,
    },
    /// `dst = !src`.
    UnaryNot {
        /// Destination temporary.
        dst: LocalVar,
        /// Source temporary.
        src: LocalVar,
    },
    /// Two-way branch: successor 0 is taken when `pred` is false,
    /// successor 1 when it is true.
    Jump {
        /// The branch predicate.
        pred: LocalVar,
    },
    /// Computes the effective address of a global variable or array element.
    AddressAt {
        /// Destination address temporary.
        dst: AddressVar,
        /// The global symbol.
        base: Symbol,
        /// Element index for array accesses, absent for scalars.
        offset: Option<LocalVar>,
    },
    /// Reads the 8-byte value at address `src` into `dst`.
    Load {
        /// Destination temporary.
        dst: LocalVar,
        /// Source address.
        src: AddressVar,
    },
    /// Writes `src` to the address in `dst`.
    Store {
        /// Source temporary.
        src: LocalVar,
        /// Destination address.
        dst: AddressVar,
    },
    /// Calls `callee` with `args`; `dst` holds the result for non-void
    /// callees.
    Call {
        /// Result temporary, absent for void callees.
        dst: Option<LocalVar>,
        /// The called function's symbol.
        callee: Symbol,
        /// Argument temporaries, in order.
        args: Vec<LocalVar>,
    },
    /// Returns to the caller. A zero-successor terminator.
    Return {
        /// The returned value, absent in void functions.
        value: Option<LocalVar>,
    },
    /// Structural glue for joins and empty regions; has no effect.
    Nop,
}

/// An instruction node in the arena: the payload plus its successor slots.
#[derive(Debug)]
struct InstNode {
    inst: Instruction,
    succs: [Option<InstId>; 2],
}

/// A function body: its typed signature, parameter temporaries, and the
/// instruction arena rooted at `start`.
#[derive(Debug)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// The function's `Func` type.
    pub ty: Type,
    /// Parameter temporaries, in declaration order.
    pub params: Vec<LocalVar>,
    start: Option<InstId>,
    insts: Vec<InstNode>,
    tmp_count: u32,
    addr_count: u32,
}

impl Function {
    /// Returns a new, empty function body.
    #[must_use]
    pub fn new(name: String, ty: Type) -> Self {
        Function {
            name,
            ty,
            params: vec![],
            start: None,
            insts: vec![],
            tmp_count: 0,
            addr_count: 0,
        }
    }

    /// Allocates a fresh value temporary of the given type.
    pub fn temp_var(&mut self, ty: Type) -> LocalVar {
        let var = LocalVar {
            id: self.tmp_count,
            ty,
        };
        self.tmp_count += 1;
        var
    }

    /// Allocates a fresh address temporary of the given type.
    pub fn temp_addr_var(&mut self, ty: Type) -> AddressVar {
        let var = AddressVar {
            id: self.addr_count,
            ty,
        };
        self.addr_count += 1;
        var
    }

    /// Appends an instruction to the arena, returning its id. The new
    /// instruction has no successors until [`Function::set_next`] links it.
    pub fn add_inst(&mut self, inst: Instruction) -> InstId {
        let id = InstId(u32::try_from(self.insts.len()).expect("arena size should fit in u32"));
        self.insts.push(InstNode {
            inst,
            succs: [None, None],
        });
        id
    }

    /// Links successor slot `edge` of `from` to `to`.
    ///
    /// A return is a zero-successor terminator: edges out of one are
    /// dropped, so sequential composition past a `return` (statements after
    /// it, or the join of a branch whose arms both return) leaves that code
    /// unreachable instead of falling through.
    pub fn set_next(&mut self, from: InstId, edge: usize, to: InstId) {
        if matches!(self.inst(from), Instruction::Return { .. }) {
            return;
        }

        debug_assert!(
            edge == 0 || matches!(self.inst(from), Instruction::Jump { .. }),
            "only a jump uses successor slot 1"
        );
        self.insts[from.index()].succs[edge] = Some(to);
    }

    /// Returns the successor in slot `edge` of the given instruction.
    #[inline]
    #[must_use]
    pub fn next(&self, id: InstId, edge: usize) -> Option<InstId> {
        self.insts[id.index()].succs[edge]
    }

    /// Returns the number of successors of the given instruction.
    #[must_use]
    pub fn num_next(&self, id: InstId) -> usize {
        self.insts[id.index()].succs.iter().flatten().count()
    }

    /// Returns the instruction payload of the given id.
    #[inline]
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()].inst
    }

    /// Sets the entry instruction of the function.
    #[inline]
    pub fn set_start(&mut self, start: InstId) {
        self.start = Some(start);
    }

    /// Returns the entry instruction of the function.
    #[inline]
    #[must_use]
    pub fn start(&self) -> Option<InstId> {
        self.start
    }

    /// Returns every instruction id in the arena, including any that are not
    /// reachable from the start (e.g., the dangling continuation after a
    /// `break`).
    pub fn inst_ids(&self) -> impl Iterator<Item = InstId> + '_ {
        (0..self.insts.len()).map(|i| InstId(i as u32))
    }

    /// Returns the number of value temporaries allocated.
    #[inline]
    #[must_use]
    pub const fn num_temp_vars(&self) -> u32 {
        self.tmp_count
    }

    /// Returns the number of address temporaries allocated.
    #[inline]
    #[must_use]
    pub const fn num_temp_addr_vars(&self) -> u32 {
        self.addr_count
    }
}

/// Rendering of a [`Program`] with symbol names resolved.
#[derive(Debug)]
pub struct DisplayProgram<'a> {
    program: &'a Program,
    symbols: &'a Symbols,
}

impl fmt::Display for DisplayProgram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IR Program")?;

        for global in &self.program.globals {
            writeln!(
                f,
                "{:4}GlobalDecl {}, {}",
                "",
                self.symbols.name(global.symbol),
                global.num_elements
            )?;
        }

        for func in &self.program.functions {
            let params: Vec<String> = func.params.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "{:4}Function {} ({}) : {}",
                "",
                func.name,
                params.join(", "),
                func.ty
            )?;

            for id in func.inst_ids() {
                let succs: Vec<String> = [func.next(id, 0), func.next(id, 1)]
                    .iter()
                    .flatten()
                    .map(|s| s.index().to_string())
                    .collect();

                let marker = if func.start() == Some(id) { "*" } else { " " };

                writeln!(
                    f,
                    "{:7}{marker}[{:<3}] {:<40} -> [{}]",
                    "",
                    id.index(),
                    self.format_inst(func.inst(id)),
                    succs.join(", ")
                )?;
            }
        }

        Ok(())
    }
}

impl DisplayProgram<'_> {
    fn format_inst(&self, inst: &Instruction) -> String {
        match inst {
            Instruction::Copy { dst, src } => format!("Copy {dst} <- {src}"),
            Instruction::Binary { op, dst, lhs, rhs } => {
                format!("{op:?} {dst} <- {lhs}, {rhs}")
            }
            Instruction::Compare {
                pred,
                dst,
                lhs,
                rhs,
            } => format!("Compare({pred:?}) {dst} <- {lhs}, {rhs}"),
            Instruction::UnaryNot { dst, src } => format!("Not {dst} <- {src}"),
            Instruction::Jump { pred } => format!("Jump {pred}"),
            Instruction::AddressAt { dst, base, offset } => match offset {
                Some(offset) => format!(
                    "AddressAt {dst} <- {}[{offset}]",
                    self.symbols.name(*base)
                ),
                None => format!("AddressAt {dst} <- {}", self.symbols.name(*base)),
            },
            Instruction::Load { dst, src } => format!("Load {dst} <- [{src}]"),
            Instruction::Store { src, dst } => format!("Store [{dst}] <- {src}"),
            Instruction::Call { dst, callee, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                let callee = self.symbols.name(*callee);
                match dst {
                    Some(dst) => format!("Call {dst} <- {callee}({})", args.join(", ")),
                    None => format!("Call {callee}({})", args.join(", ")),
                }
            }
            Instruction::Return { value } => match value {
                Some(value) => format!("Return {value}"),
                None => "Return".to_string(),
            },
            Instruction::Nop => "Nop".to_string(),
        }
    }
}
