//! Types of the Crux language.
//!
//! Each typed operation answers with the result type of the operation, or
//! with [`Type::Error`] when the operand types do not permit it. The type
//! checker records every `Error` answer as a diagnostic.

use std::fmt;

/// Closed set of Crux types.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// 64-bit signed integer.
    Int,
    /// Boolean.
    Bool,
    /// Absence of a value; legal only as a function return type.
    Void,
    /// A global array of scalars.
    Array {
        /// Element type (`Int` or `Bool`).
        base: Box<Type>,
        /// Number of elements. Metadata only: not part of equivalence.
        extent: u64,
    },
    /// A function.
    Func {
        /// Parameter types, in order.
        params: Vec<Type>,
        /// Return type.
        ret: Box<Type>,
    },
    /// The sentinel type of an ill-typed construct.
    Error(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Array { base, extent } => write!(f, "array[{extent},{base}]"),
            Type::Func { params, ret } => {
                write!(f, "func(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "):{ret}")
            }
            Type::Error(_) => write!(f, "error"),
        }
    }
}

impl Type {
    /// Returns `true` if `self` and `other` are structurally equivalent.
    ///
    /// Arrays are equivalent by base type only (the extent is metadata), and
    /// function types are never equivalent to anything; their argument lists
    /// are compared element-wise by [`Type::call`] instead.
    #[must_use]
    pub fn equivalent(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Int, Type::Int) | (Type::Bool, Type::Bool) | (Type::Void, Type::Void) => true,
            (Type::Array { base: a, .. }, Type::Array { base: b, .. }) => a.equivalent(b),
            _ => false,
        }
    }

    /// `Int + Int -> Int`
    #[must_use]
    pub fn add(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) => Type::Int,
            _ => self.op_error("add", other),
        }
    }

    /// `Int - Int -> Int`
    #[must_use]
    pub fn sub(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) => Type::Int,
            _ => self.op_error("sub", other),
        }
    }

    /// `Int * Int -> Int`
    #[must_use]
    pub fn mul(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) => Type::Int,
            _ => self.op_error("mul", other),
        }
    }

    /// `Int / Int -> Int`
    #[must_use]
    pub fn div(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) => Type::Int,
            _ => self.op_error("div", other),
        }
    }

    /// Scalar comparison: `Int ~ Int -> Bool` for the six predicates,
    /// `Bool ~ Bool -> Bool` for equality (the caller restricts the
    /// relational predicates to `Int` operands).
    #[must_use]
    pub fn compare(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) | (Type::Bool, Type::Bool) => Type::Bool,
            _ => self.op_error("compare", other),
        }
    }

    /// `Bool && Bool -> Bool`
    #[must_use]
    pub fn and(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Bool, Type::Bool) => Type::Bool,
            _ => self.op_error("and", other),
        }
    }

    /// `Bool || Bool -> Bool`
    #[must_use]
    pub fn or(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Bool, Type::Bool) => Type::Bool,
            _ => self.op_error("or", other),
        }
    }

    /// `!Bool -> Bool`
    #[must_use]
    pub fn not(&self) -> Type {
        match self {
            Type::Bool => Type::Bool,
            _ => Type::Error(format!("cannot not {self}")),
        }
    }

    /// `Array[T,_] indexed by Int -> T`
    #[must_use]
    pub fn index(&self, idx: &Type) -> Type {
        match (self, idx) {
            (Type::Array { base, .. }, Type::Int) => (**base).clone(),
            _ => self.op_error("index", idx),
        }
    }

    /// Assignment of a `source` value to an lvalue of this type; permitted
    /// when the two are equivalent, yielding the lvalue's type.
    #[must_use]
    pub fn assign(&self, source: &Type) -> Type {
        if self.equivalent(source) {
            self.clone()
        } else {
            self.op_error("assign", source)
        }
    }

    /// Call of a value of this type with arguments of the given types;
    /// permitted for a `Func` whose parameter list is element-wise equivalent
    /// to `args`, yielding the return type.
    #[must_use]
    pub fn call(&self, args: &[Type]) -> Type {
        match self {
            Type::Func { params, ret }
                if params.len() == args.len()
                    && params.iter().zip(args).all(|(p, a)| p.equivalent(a)) =>
            {
                (**ret).clone()
            }
            _ => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                Type::Error(format!("cannot call {self} with ({})", args.join(",")))
            }
        }
    }

    /// Returns `true` for the sentinel error type.
    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Type::Error(_))
    }

    fn op_error(&self, op: &str, other: &Type) -> Type {
        Type::Error(format!("cannot {op} {self} with {other}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array(extent: u64) -> Type {
        Type::Array {
            base: Box::new(Type::Int),
            extent,
        }
    }

    #[test]
    fn types_arithmetic_on_ints() {
        assert_eq!(Type::Int.add(&Type::Int), Type::Int);
        assert_eq!(Type::Int.sub(&Type::Int), Type::Int);
        assert_eq!(Type::Int.mul(&Type::Int), Type::Int);
        assert_eq!(Type::Int.div(&Type::Int), Type::Int);
    }

    #[test]
    fn types_arithmetic_rejects_bool() {
        let result = Type::Int.add(&Type::Bool);
        assert_eq!(result, Type::Error("cannot add int with bool".into()));
    }

    #[test]
    fn types_compare_scalars() {
        assert_eq!(Type::Int.compare(&Type::Int), Type::Bool);
        assert_eq!(Type::Bool.compare(&Type::Bool), Type::Bool);
        assert!(Type::Int.compare(&Type::Bool).is_error());
    }

    #[test]
    fn types_logic_on_bools_only() {
        assert_eq!(Type::Bool.and(&Type::Bool), Type::Bool);
        assert_eq!(Type::Bool.or(&Type::Bool), Type::Bool);
        assert_eq!(Type::Bool.not(), Type::Bool);
        assert!(Type::Int.and(&Type::Int).is_error());
        assert!(Type::Int.not().is_error());
    }

    #[test]
    fn types_index_yields_base() {
        assert_eq!(int_array(5).index(&Type::Int), Type::Int);
        assert!(int_array(5).index(&Type::Bool).is_error());
        assert!(Type::Int.index(&Type::Int).is_error());
    }

    #[test]
    fn types_array_equivalence_ignores_extent() {
        assert!(int_array(5).equivalent(&int_array(9)));
        assert!(!int_array(5).equivalent(&Type::Array {
            base: Box::new(Type::Bool),
            extent: 5,
        }));
        assert!(!int_array(5).equivalent(&Type::Int));
    }

    #[test]
    fn types_func_never_equivalent() {
        let f = Type::Func {
            params: vec![],
            ret: Box::new(Type::Void),
        };
        assert!(!f.equivalent(&f.clone()));
    }

    #[test]
    fn types_call_checks_argument_list() {
        let f = Type::Func {
            params: vec![Type::Int, Type::Bool],
            ret: Box::new(Type::Int),
        };

        assert_eq!(f.call(&[Type::Int, Type::Bool]), Type::Int);
        assert!(f.call(&[Type::Int]).is_error());
        assert!(f.call(&[Type::Bool, Type::Bool]).is_error());
        assert!(Type::Int.call(&[]).is_error());
    }

    #[test]
    fn types_assign_requires_equivalence() {
        assert_eq!(Type::Int.assign(&Type::Int), Type::Int);
        assert!(Type::Int.assign(&Type::Bool).is_error());
        assert!(Type::Bool.assign(&Type::Error("x".into())).is_error());
    }
}
