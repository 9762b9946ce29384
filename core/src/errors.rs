//! Error types
//!
//! Library errors are `thiserror` enums. Application edges (program loading,
//! configuration, CLI) wrap them in `anyhow` with context.

use thiserror::Error;

use crate::bytecode::RegKind;
use crate::interpreter::Fault;
use crate::program::FunctionId;
use crate::scheduler::WorkerFailure;
use crate::values::{ElementKind, ErrorValue, TypeTag};

/* ===================== Collections ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrayError {
    #[error("array index out of range: index: {index}, size: {size}")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("array index too large: {index}")]
    IndexTooLarge { index: i64 },

    #[error("incompatible types: expected '{expected}', found '{found}'")]
    ElementType { expected: ElementKind, found: TypeTag },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IteratorError {
    #[error("iterator has no more elements")]
    Exhausted,

    #[error("unsupported iterator arity {0}, expected 1 or 2")]
    InvalidArity(usize),

    #[error("collection was dropped while being iterated")]
    CollectionDropped,

    #[error(transparent)]
    Array(#[from] ArrayError),
}

/* ===================== Execution ===================== */

/// Error raised while executing one instruction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error(transparent)]
    Iterator(#[from] IteratorError),

    #[error("control stack underflow")]
    StackUnderflow,

    #[error("stack overflow: call depth exceeded {depth}")]
    StackOverflow { depth: usize },

    #[error("invalid {kind} register {index}")]
    InvalidRegister { kind: RegKind, index: u16 },

    #[error("invalid instruction pointer {ip}")]
    InvalidInstructionPointer { ip: usize },

    #[error("invalid constant pool index {0}")]
    InvalidConstant(usize),

    #[error("incompatible types: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: TypeTag },

    #[error("null reference")]
    NullReference,

    #[error("/ by zero")]
    DivisionByZero,

    #[error("value of type '{0}' is not iterable")]
    NotACollection(TypeTag),

    #[error("iterator register {0} was never initialised")]
    UninitializedIterator(u16),

    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),

    #[error("unknown native function '{0}'")]
    UnknownNative(String),

    #[error("native function '{name}' failed: {message}")]
    Native { name: String, message: String },

    /// A language-level error value was thrown
    #[error("{0}")]
    Raised(ErrorValue),
}

impl ExecutionError {
    /// Interpreter invariant violations caused by malformed bytecode or an
    /// internal bug, as opposed to conditions the program itself triggered
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExecutionError::StackUnderflow
                | ExecutionError::InvalidRegister { .. }
                | ExecutionError::InvalidInstructionPointer { .. }
        )
    }
}

/// Unrecoverable native failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    #[error("argument {index}: expected {expected}, found '{found}'")]
    Argument {
        index: usize,
        expected: &'static str,
        found: TypeTag,
    },

    #[error("{0}")]
    Failed(String),
}

/* ===================== Debugging ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DebugError {
    #[error("debug client did not start the session within {secs}s")]
    HandshakeTimeout { secs: u64 },

    #[error("debug client disconnected")]
    ClientDisconnected,

    #[error("invalid breakpoint '{0}', expected <source>:<line>")]
    InvalidBreakpoint(String),
}

/* ===================== Runs ===================== */

/// Failure of a whole invocation
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no main function in entry package '{0}'")]
    MainNotFound(String),

    #[error("function '{0}' not found")]
    FunctionNotFound(String),

    #[error(transparent)]
    Debug(#[from] DebugError),

    #[error("{}", .0.error)]
    Faulted(Box<Fault>),

    #[error("{} worker(s) failed", .0.len())]
    WorkersFailed(Vec<WorkerFailure>),
}
