//! Stack frames
//!
//! A frame is one function activation: its typed register banks plus the
//! bookkeeping needed to resume the caller.

use crate::bytecode::{AnyReg, BoolReg, FloatReg, IntReg, IterReg, RefReg, RegKind, StrReg};
use crate::errors::ExecutionError;
use crate::program::{FunctionId, RegisterShape, WorkerInfo};
use crate::values::{Value, ValueIterator};

/* ===================== Register Banks ===================== */

#[derive(Debug, Default)]
pub struct RegisterBanks {
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub strings: Vec<String>,
    pub bools: Vec<bool>,
    pub refs: Vec<Value>,
    pub iterators: Vec<Option<Box<dyn ValueIterator>>>,
}

impl RegisterBanks {
    pub fn with_shape(shape: &RegisterShape) -> Self {
        Self {
            ints: vec![0; shape.ints as usize],
            floats: vec![0.0; shape.floats as usize],
            strings: vec![String::new(); shape.strings as usize],
            bools: vec![false; shape.bools as usize],
            refs: vec![Value::Null; shape.refs as usize],
            iterators: (0..shape.iterators).map(|_| None).collect(),
        }
    }
}

fn slot<T>(bank: &[T], kind: RegKind, index: usize) -> Result<&T, ExecutionError> {
    bank.get(index).ok_or(ExecutionError::InvalidRegister {
        kind,
        index: index as u16,
    })
}

fn slot_mut<T>(bank: &mut [T], kind: RegKind, index: usize) -> Result<&mut T, ExecutionError> {
    bank.get_mut(index).ok_or(ExecutionError::InvalidRegister {
        kind,
        index: index as u16,
    })
}

fn mismatch(kind: RegKind, value: &Value) -> ExecutionError {
    ExecutionError::TypeMismatch {
        expected: kind.to_string(),
        found: value.type_tag(),
    }
}

/// Bank a value lands in when passed without an explicit register
pub fn natural_kind(value: &Value) -> RegKind {
    match value {
        Value::Int(_) => RegKind::Int,
        Value::Float(_) => RegKind::Float,
        Value::Str(_) => RegKind::Str,
        Value::Bool(_) => RegKind::Bool,
        _ => RegKind::Ref,
    }
}

/* ===================== Stack Frame ===================== */

#[derive(Debug)]
pub struct StackFrame {
    pub function: FunctionId,
    pub worker: String,

    /// Next instruction to execute
    pub ip: usize,

    /// Entry offset of the worker's code
    pub code_addr: usize,

    /// Caller offset to resume at; `None` for the bottom frame
    pub return_addr: Option<usize>,

    /// Caller registers receiving this frame's results
    pub ret_regs: Vec<AnyReg>,

    regs: RegisterBanks,
}

impl StackFrame {
    pub fn new(function: FunctionId, worker: &WorkerInfo) -> Self {
        Self {
            function,
            worker: worker.name.clone(),
            ip: worker.code_addr,
            code_addr: worker.code_addr,
            return_addr: None,
            ret_regs: Vec::new(),
            regs: RegisterBanks::with_shape(&worker.registers),
        }
    }

    pub fn returning_to(mut self, return_addr: usize, ret_regs: Vec<AnyReg>) -> Self {
        self.return_addr = Some(return_addr);
        self.ret_regs = ret_regs;
        self
    }

    pub fn registers(&self) -> &RegisterBanks {
        &self.regs
    }

    /// Bind arguments in order, each to the next free register of its bank
    pub fn bind_args(&mut self, args: &[(RegKind, Value)]) -> Result<(), ExecutionError> {
        let mut next = [0u16; 6];
        for (kind, value) in args {
            let counter = &mut next[*kind as usize];
            let reg = match kind {
                RegKind::Int => AnyReg::Int(IntReg(*counter)),
                RegKind::Float => AnyReg::Float(FloatReg(*counter)),
                RegKind::Str => AnyReg::Str(StrReg(*counter)),
                RegKind::Bool => AnyReg::Bool(BoolReg(*counter)),
                RegKind::Ref => AnyReg::Ref(RefReg(*counter)),
                RegKind::Iter => {
                    return Err(ExecutionError::TypeMismatch {
                        expected: "value".to_string(),
                        found: value.type_tag(),
                    })
                }
            };
            self.write(reg, value.clone())?;
            *counter += 1;
        }
        Ok(())
    }

    /* ----- typed access ----- */

    pub fn int(&self, reg: IntReg) -> Result<i64, ExecutionError> {
        slot(&self.regs.ints, RegKind::Int, reg.index()).copied()
    }

    pub fn set_int(&mut self, reg: IntReg, value: i64) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.ints, RegKind::Int, reg.index())? = value;
        Ok(())
    }

    pub fn float(&self, reg: FloatReg) -> Result<f64, ExecutionError> {
        slot(&self.regs.floats, RegKind::Float, reg.index()).copied()
    }

    pub fn set_float(&mut self, reg: FloatReg, value: f64) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.floats, RegKind::Float, reg.index())? = value;
        Ok(())
    }

    pub fn string(&self, reg: StrReg) -> Result<&str, ExecutionError> {
        slot(&self.regs.strings, RegKind::Str, reg.index()).map(String::as_str)
    }

    pub fn set_string(&mut self, reg: StrReg, value: String) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.strings, RegKind::Str, reg.index())? = value;
        Ok(())
    }

    pub fn bool(&self, reg: BoolReg) -> Result<bool, ExecutionError> {
        slot(&self.regs.bools, RegKind::Bool, reg.index()).copied()
    }

    pub fn set_bool(&mut self, reg: BoolReg, value: bool) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.bools, RegKind::Bool, reg.index())? = value;
        Ok(())
    }

    pub fn reference(&self, reg: RefReg) -> Result<&Value, ExecutionError> {
        slot(&self.regs.refs, RegKind::Ref, reg.index())
    }

    pub fn set_reference(&mut self, reg: RefReg, value: Value) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.refs, RegKind::Ref, reg.index())? = value;
        Ok(())
    }

    pub fn iterator_mut(
        &mut self,
        reg: IterReg,
    ) -> Result<&mut Box<dyn ValueIterator>, ExecutionError> {
        slot_mut(&mut self.regs.iterators, RegKind::Iter, reg.index())?
            .as_mut()
            .ok_or(ExecutionError::UninitializedIterator(reg.0))
    }

    pub fn set_iterator(
        &mut self,
        reg: IterReg,
        iter: Box<dyn ValueIterator>,
    ) -> Result<(), ExecutionError> {
        *slot_mut(&mut self.regs.iterators, RegKind::Iter, reg.index())? = Some(iter);
        Ok(())
    }

    /* ----- untyped access ----- */

    pub fn read(&self, reg: AnyReg) -> Result<Value, ExecutionError> {
        Ok(match reg {
            AnyReg::Int(r) => Value::Int(self.int(r)?),
            AnyReg::Float(r) => Value::Float(self.float(r)?),
            AnyReg::Str(r) => Value::Str(self.string(r)?.to_string()),
            AnyReg::Bool(r) => Value::Bool(self.bool(r)?),
            AnyReg::Ref(r) => self.reference(r)?.clone(),
        })
    }

    /// Write `value` into `reg`. Typed banks only accept their own kind.
    pub fn write(&mut self, reg: AnyReg, value: Value) -> Result<(), ExecutionError> {
        match (reg, value) {
            (AnyReg::Ref(r), value) => self.set_reference(r, value),
            (AnyReg::Int(r), Value::Int(i)) => self.set_int(r, i),
            (AnyReg::Float(r), Value::Float(f)) => self.set_float(r, f),
            (AnyReg::Str(r), Value::Str(s)) => self.set_string(r, s),
            (AnyReg::Bool(r), Value::Bool(b)) => self.set_bool(r, b),
            (reg, value) => Err(mismatch(reg.kind(), &value)),
        }
    }

    /// Reset `reg` to its bank's default (zero, empty, false or null)
    pub fn write_default(&mut self, reg: AnyReg) -> Result<(), ExecutionError> {
        match reg {
            AnyReg::Int(r) => self.set_int(r, 0),
            AnyReg::Float(r) => self.set_float(r, 0.0),
            AnyReg::Str(r) => self.set_string(r, String::new()),
            AnyReg::Bool(r) => self.set_bool(r, false),
            AnyReg::Ref(r) => self.set_reference(r, Value::Null),
        }
    }
}
