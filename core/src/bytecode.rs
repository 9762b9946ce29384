//! Instruction set
//!
//! Operands name registers in one of the frame's typed banks. Instructions are
//! serialized with an `"op"` tag; register operands of unknown kind are written
//! as `{"int": 3}`, `{"ref": 0}` and so on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::program::FunctionId;
use crate::values::ElementKind;

/* ===================== Registers ===================== */

macro_rules! register {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u16);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

register!(IntReg);
register!(FloatReg);
register!(StrReg);
register!(BoolReg);
register!(
    /// Reference bank: arrays, maps, records, ranges, errors, blobs, null
    RefReg
);
register!(IterReg);

/// Register bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegKind {
    Int,
    Float,
    Str,
    Bool,
    Ref,
    Iter,
}

impl fmt::Display for RegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegKind::Int => "int",
            RegKind::Float => "float",
            RegKind::Str => "string",
            RegKind::Bool => "boolean",
            RegKind::Ref => "ref",
            RegKind::Iter => "iterator",
        };
        f.write_str(name)
    }
}

/// A value register of any bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnyReg {
    Int(IntReg),
    Float(FloatReg),
    Str(StrReg),
    Bool(BoolReg),
    Ref(RefReg),
}

impl AnyReg {
    pub fn kind(self) -> RegKind {
        match self {
            AnyReg::Int(_) => RegKind::Int,
            AnyReg::Float(_) => RegKind::Float,
            AnyReg::Str(_) => RegKind::Str,
            AnyReg::Bool(_) => RegKind::Bool,
            AnyReg::Ref(_) => RegKind::Ref,
        }
    }

    pub fn index(self) -> usize {
        match self {
            AnyReg::Int(r) => r.index(),
            AnyReg::Float(r) => r.index(),
            AnyReg::Str(r) => r.index(),
            AnyReg::Bool(r) => r.index(),
            AnyReg::Ref(r) => r.index(),
        }
    }
}

/* ===================== Instructions ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Instruction {
    Nop,

    // Constants
    IConst { dst: IntReg, value: i64 },
    FConst { dst: FloatReg, value: f64 },
    BConst { dst: BoolReg, value: bool },
    /// Load entry `index` of the string constant pool
    SConst { dst: StrReg, index: usize },
    RNull { dst: RefReg },

    /// Copy between registers. A reference destination accepts any value.
    Move { src: AnyReg, dst: AnyReg },

    // Integer arithmetic (wrapping)
    IAdd { lhs: IntReg, rhs: IntReg, dst: IntReg },
    ISub { lhs: IntReg, rhs: IntReg, dst: IntReg },
    IMul { lhs: IntReg, rhs: IntReg, dst: IntReg },
    IDiv { lhs: IntReg, rhs: IntReg, dst: IntReg },
    IMod { lhs: IntReg, rhs: IntReg, dst: IntReg },

    // Float arithmetic
    FAdd { lhs: FloatReg, rhs: FloatReg, dst: FloatReg },
    FSub { lhs: FloatReg, rhs: FloatReg, dst: FloatReg },
    FMul { lhs: FloatReg, rhs: FloatReg, dst: FloatReg },
    FDiv { lhs: FloatReg, rhs: FloatReg, dst: FloatReg },

    // Comparison
    ILt { lhs: IntReg, rhs: IntReg, dst: BoolReg },
    ILe { lhs: IntReg, rhs: IntReg, dst: BoolReg },
    IEq { lhs: IntReg, rhs: IntReg, dst: BoolReg },
    FLt { lhs: FloatReg, rhs: FloatReg, dst: BoolReg },
    SEq { lhs: StrReg, rhs: StrReg, dst: BoolReg },

    SConcat { lhs: StrReg, rhs: StrReg, dst: StrReg },
    BNot { src: BoolReg, dst: BoolReg },

    // Branches
    Goto { target: usize },
    BrTrue { cond: BoolReg, target: usize },
    BrFalse { cond: BoolReg, target: usize },

    // Arrays
    /// Without `length` the array starts empty with the default capacity
    NewArray {
        kind: ElementKind,
        #[serde(default)]
        length: Option<IntReg>,
        dst: RefReg,
    },
    ArrayLoad { array: RefReg, index: IntReg, dst: AnyReg },
    ArrayStore { array: RefReg, index: IntReg, src: AnyReg },
    /// Size of an array or map, or the element count of a range
    LengthOf { src: RefReg, dst: IntReg },

    // Maps and records
    NewMap { dst: RefReg },
    MapStore { map: RefReg, key: StrReg, src: AnyReg },
    MapLoad { map: RefReg, key: StrReg, dst: AnyReg },
    NewStruct { type_name: String, dst: RefReg },
    FieldStore { record: RefReg, field: String, src: AnyReg },
    FieldLoad { record: RefReg, field: String, dst: AnyReg },

    // Iteration
    NewRange { start: IntReg, end: IntReg, dst: RefReg },
    IterNew { collection: RefReg, iter: IterReg },
    IterHasNext { iter: IterReg, dst: BoolReg },
    /// Arity is the number of destinations
    IterNext { iter: IterReg, dsts: Vec<AnyReg> },

    // Errors
    NewError { message: StrReg, dst: RefReg },
    Throw { error: RefReg },

    // Calls
    Call {
        function: FunctionId,
        #[serde(default)]
        args: Vec<AnyReg>,
        #[serde(default)]
        rets: Vec<AnyReg>,
    },
    NativeCall {
        name: String,
        #[serde(default)]
        args: Vec<AnyReg>,
        #[serde(default)]
        rets: Vec<AnyReg>,
    },
    Return {
        #[serde(default)]
        values: Vec<AnyReg>,
    },
}
