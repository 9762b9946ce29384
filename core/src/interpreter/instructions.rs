//! Instruction handlers
//!
//! Calls and returns move between frames and so take the whole context.
//! Every other instruction only touches the current frame.

use tracing::debug;

use crate::bytecode::{AnyReg, Instruction};
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::frame::StackFrame;
use crate::natives::NativeContext;
use crate::program::{FunctionId, ProgramFile};
use crate::values::{
    ArrayRef, Arity, ErrorValue, IntRange, MapRef, StructRef, Value,
};

/// Control outcome of one instruction
#[derive(Debug)]
pub(super) enum Flow {
    Continue,
    /// The bottom frame returned
    Returned(Vec<Value>),
}

pub(super) fn execute(
    ctx: &mut Context,
    program: &ProgramFile,
    instruction: &Instruction,
) -> Result<Flow, ExecutionError> {
    match instruction {
        Instruction::Call {
            function,
            args,
            rets,
        } => call(ctx, program, *function, args, rets),
        Instruction::NativeCall { name, args, rets } => native_call(ctx, name, args, rets),
        Instruction::Return { values } => return_from(ctx, values),
        other => {
            let frame = ctx.control_stack.current_mut()?;
            execute_in_frame(frame, program, other)?;
            Ok(Flow::Continue)
        }
    }
}

/* ===================== Calls ===================== */

fn call(
    ctx: &mut Context,
    program: &ProgramFile,
    id: FunctionId,
    args: &[AnyReg],
    rets: &[AnyReg],
) -> Result<Flow, ExecutionError> {
    let info = program
        .function(id)
        .ok_or(ExecutionError::UnknownFunction(id))?;

    let max_depth = ctx.invocation.settings.max_call_depth;
    if ctx.control_stack.depth() >= max_depth {
        return Err(ExecutionError::StackOverflow { depth: max_depth });
    }

    let caller = ctx.control_stack.current_mut()?;
    let values = args
        .iter()
        .map(|reg| Ok((reg.kind(), caller.read(*reg)?)))
        .collect::<Result<Vec<_>, ExecutionError>>()?;

    let mut frame =
        StackFrame::new(id, &info.default_worker).returning_to(caller.ip, rets.to_vec());
    frame.bind_args(&values)?;

    if !info.workers.is_empty() {
        ctx.invocation.spawn_workers(id, info, &values)?;
    }
    debug!(function = %info.name, depth = ctx.control_stack.depth() + 1, "call");
    ctx.control_stack.push_frame(frame);
    Ok(Flow::Continue)
}

fn return_from(ctx: &mut Context, regs: &[AnyReg]) -> Result<Flow, ExecutionError> {
    let frame = ctx.control_stack.current_mut()?;
    let values = regs
        .iter()
        .map(|reg| frame.read(*reg))
        .collect::<Result<Vec<_>, _>>()?;

    let frame = ctx.control_stack.pop_frame()?;
    let Some(return_addr) = frame.return_addr else {
        return Ok(Flow::Returned(values));
    };

    let caller = ctx.control_stack.current_mut()?;
    caller.ip = return_addr;
    write_results(caller, &frame.ret_regs, values)?;
    Ok(Flow::Continue)
}

fn native_call(
    ctx: &mut Context,
    name: &str,
    args: &[AnyReg],
    rets: &[AnyReg],
) -> Result<Flow, ExecutionError> {
    let native = ctx
        .invocation
        .natives
        .get(name)
        .ok_or_else(|| ExecutionError::UnknownNative(name.to_string()))?;

    let frame = ctx.control_stack.current_mut()?;
    let values = args
        .iter()
        .map(|reg| frame.read(*reg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut native_ctx = NativeContext {
        invocation: ctx.invocation.id,
        worker: &ctx.worker,
        output: &ctx.invocation.output,
    };
    let results = native(&mut native_ctx, &values).map_err(|e| ExecutionError::Native {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let frame = ctx.control_stack.current_mut()?;
    write_results(frame, rets, results)?;
    Ok(Flow::Continue)
}

/// Write results positionally; targets without a result get their default
fn write_results(
    frame: &mut StackFrame,
    targets: &[AnyReg],
    values: Vec<Value>,
) -> Result<(), ExecutionError> {
    let mut values = values.into_iter();
    for target in targets {
        match values.next() {
            Some(value) => frame.write(*target, value)?,
            None => frame.write_default(*target)?,
        }
    }
    Ok(())
}

/* ===================== Frame-local Instructions ===================== */

fn execute_in_frame(
    frame: &mut StackFrame,
    program: &ProgramFile,
    instruction: &Instruction,
) -> Result<(), ExecutionError> {
    use Instruction::*;

    match instruction {
        Nop => {}

        IConst { dst, value } => frame.set_int(*dst, *value)?,
        FConst { dst, value } => frame.set_float(*dst, *value)?,
        BConst { dst, value } => frame.set_bool(*dst, *value)?,
        SConst { dst, index } => {
            let s = program
                .constant(*index)
                .ok_or(ExecutionError::InvalidConstant(*index))?;
            frame.set_string(*dst, s.to_string())?;
        }
        RNull { dst } => frame.set_reference(*dst, Value::Null)?,

        Move { src, dst } => {
            let value = frame.read(*src)?;
            frame.write(*dst, value)?;
        }

        // Integer arithmetic
        IAdd { lhs, rhs, dst } => {
            let v = frame.int(*lhs)?.wrapping_add(frame.int(*rhs)?);
            frame.set_int(*dst, v)?;
        }
        ISub { lhs, rhs, dst } => {
            let v = frame.int(*lhs)?.wrapping_sub(frame.int(*rhs)?);
            frame.set_int(*dst, v)?;
        }
        IMul { lhs, rhs, dst } => {
            let v = frame.int(*lhs)?.wrapping_mul(frame.int(*rhs)?);
            frame.set_int(*dst, v)?;
        }
        IDiv { lhs, rhs, dst } => {
            let divisor = frame.int(*rhs)?;
            if divisor == 0 {
                return Err(ExecutionError::DivisionByZero);
            }
            let v = frame.int(*lhs)?.wrapping_div(divisor);
            frame.set_int(*dst, v)?;
        }
        IMod { lhs, rhs, dst } => {
            let divisor = frame.int(*rhs)?;
            if divisor == 0 {
                return Err(ExecutionError::DivisionByZero);
            }
            let v = frame.int(*lhs)?.wrapping_rem(divisor);
            frame.set_int(*dst, v)?;
        }

        // Float arithmetic
        FAdd { lhs, rhs, dst } => {
            let v = frame.float(*lhs)? + frame.float(*rhs)?;
            frame.set_float(*dst, v)?;
        }
        FSub { lhs, rhs, dst } => {
            let v = frame.float(*lhs)? - frame.float(*rhs)?;
            frame.set_float(*dst, v)?;
        }
        FMul { lhs, rhs, dst } => {
            let v = frame.float(*lhs)? * frame.float(*rhs)?;
            frame.set_float(*dst, v)?;
        }
        FDiv { lhs, rhs, dst } => {
            let v = frame.float(*lhs)? / frame.float(*rhs)?;
            frame.set_float(*dst, v)?;
        }

        // Comparison
        ILt { lhs, rhs, dst } => {
            let v = frame.int(*lhs)? < frame.int(*rhs)?;
            frame.set_bool(*dst, v)?;
        }
        ILe { lhs, rhs, dst } => {
            let v = frame.int(*lhs)? <= frame.int(*rhs)?;
            frame.set_bool(*dst, v)?;
        }
        IEq { lhs, rhs, dst } => {
            let v = frame.int(*lhs)? == frame.int(*rhs)?;
            frame.set_bool(*dst, v)?;
        }
        FLt { lhs, rhs, dst } => {
            let v = frame.float(*lhs)? < frame.float(*rhs)?;
            frame.set_bool(*dst, v)?;
        }
        SEq { lhs, rhs, dst } => {
            let v = frame.string(*lhs)? == frame.string(*rhs)?;
            frame.set_bool(*dst, v)?;
        }

        SConcat { lhs, rhs, dst } => {
            let v = format!("{}{}", frame.string(*lhs)?, frame.string(*rhs)?);
            frame.set_string(*dst, v)?;
        }
        BNot { src, dst } => {
            let v = !frame.bool(*src)?;
            frame.set_bool(*dst, v)?;
        }

        // Branches
        Goto { target } => frame.ip = *target,
        BrTrue { cond, target } => {
            if frame.bool(*cond)? {
                frame.ip = *target;
            }
        }
        BrFalse { cond, target } => {
            if !frame.bool(*cond)? {
                frame.ip = *target;
            }
        }

        // Arrays
        NewArray { kind, length, dst } => {
            let array = match length {
                Some(len) => ArrayRef::with_length(*kind, frame.int(*len)?)?,
                None => ArrayRef::new(*kind),
            };
            frame.set_reference(*dst, Value::Array(array))?;
        }
        ArrayLoad { array, index, dst } => {
            let array = expect_array(frame.reference(*array)?)?;
            let value = array.get(frame.int(*index)?)?;
            frame.write(*dst, value)?;
        }
        ArrayStore { array, index, src } => {
            let array = expect_array(frame.reference(*array)?)?;
            let value = frame.read(*src)?;
            array.set(frame.int(*index)?, value)?;
        }
        LengthOf { src, dst } => {
            let len = match frame.reference(*src)? {
                Value::Array(array) => array.size() as i64,
                Value::Map(map) => map.len() as i64,
                Value::Range(range) => range_len(range),
                Value::Str(s) => s.chars().count() as i64,
                Value::Blob(bytes) => bytes.len() as i64,
                Value::Null => return Err(ExecutionError::NullReference),
                other => return Err(mismatch("collection", other)),
            };
            frame.set_int(*dst, len)?;
        }

        // Maps and records
        NewMap { dst } => frame.set_reference(*dst, Value::Map(MapRef::new()))?,
        MapStore { map, key, src } => {
            let map = expect_map(frame.reference(*map)?)?;
            let value = frame.read(*src)?;
            map.insert(frame.string(*key)?, value);
        }
        MapLoad { map, key, dst } => {
            let map = expect_map(frame.reference(*map)?)?;
            let value = map.get(frame.string(*key)?);
            frame.write(*dst, value)?;
        }
        NewStruct { type_name, dst } => {
            frame.set_reference(*dst, Value::Struct(StructRef::new(type_name.clone())))?
        }
        FieldStore { record, field, src } => {
            let record = expect_struct(frame.reference(*record)?)?;
            let value = frame.read(*src)?;
            record.set_field(field.clone(), value);
        }
        FieldLoad { record, field, dst } => {
            let record = expect_struct(frame.reference(*record)?)?;
            frame.write(*dst, record.get_field(field))?;
        }

        // Iteration
        NewRange { start, end, dst } => {
            let range = IntRange::new(frame.int(*start)?, frame.int(*end)?);
            frame.set_reference(*dst, Value::Range(range))?;
        }
        IterNew { collection, iter } => {
            let value = frame.reference(*collection)?;
            if value.is_null() {
                return Err(ExecutionError::NullReference);
            }
            let iterator = value
                .as_collection()
                .ok_or_else(|| ExecutionError::NotACollection(value.type_tag()))?
                .new_iterator();
            frame.set_iterator(*iter, iterator)?;
        }
        IterHasNext { iter, dst } => {
            let has_next = frame.iterator_mut(*iter)?.has_next();
            frame.set_bool(*dst, has_next)?;
        }
        IterNext { iter, dsts } => {
            let arity = Arity::try_from(dsts.len())?;
            let values = frame.iterator_mut(*iter)?.get_next(arity)?;
            for (dst, value) in dsts.iter().zip(values) {
                frame.write(*dst, value)?;
            }
        }

        // Errors
        NewError { message, dst } => {
            let err = Value::error(frame.string(*message)?);
            frame.set_reference(*dst, err)?;
        }
        Throw { error } => {
            let raised = match frame.reference(*error)? {
                Value::Error(err) => ErrorValue::clone(err),
                Value::Null => return Err(ExecutionError::NullReference),
                other => ErrorValue::new(other.string_value()),
            };
            return Err(ExecutionError::Raised(raised));
        }

        Call { .. } | NativeCall { .. } | Return { .. } => {
            unreachable!("frame transitions are dispatched by execute()")
        }
    }
    Ok(())
}

/* ===================== Helpers ===================== */

fn mismatch(expected: &str, found: &Value) -> ExecutionError {
    ExecutionError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_tag(),
    }
}

fn expect_array(value: &Value) -> Result<ArrayRef, ExecutionError> {
    match value {
        Value::Array(array) => Ok(array.clone()),
        Value::Null => Err(ExecutionError::NullReference),
        other => Err(mismatch("array", other)),
    }
}

fn expect_map(value: &Value) -> Result<MapRef, ExecutionError> {
    match value {
        Value::Map(map) => Ok(map.clone()),
        Value::Null => Err(ExecutionError::NullReference),
        other => Err(mismatch("map", other)),
    }
}

fn expect_struct(value: &Value) -> Result<StructRef, ExecutionError> {
    match value {
        Value::Struct(record) => Ok(record.clone()),
        Value::Null => Err(ExecutionError::NullReference),
        other => Err(mismatch("struct", other)),
    }
}

fn range_len(range: &IntRange) -> i64 {
    if range.is_empty() {
        return 0;
    }
    let len = i128::from(range.end) - i128::from(range.start) + 1;
    len.min(i128::from(i64::MAX)) as i64
}
