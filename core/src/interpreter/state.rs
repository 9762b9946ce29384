//! Execution state of one worker

use std::fmt;

use crate::control_stack::StackTraceEntry;
use crate::errors::ExecutionError;
use crate::values::Value;

/* ===================== Execution State ===================== */

#[derive(Debug, Clone, Default)]
pub enum ExecutionState {
    #[default]
    Running,
    /// Parked at a breakpoint or step until the debug client resumes
    SuspendedForDebug,
    Returned(Vec<Value>),
    Faulted(Fault),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Returned(_) | ExecutionState::Faulted(_))
    }
}

/* ===================== Step Result ===================== */

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// Execution complete
    Done,
}

/* ===================== Fault ===================== */

/// An execution error together with the stack it unwound
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub error: ExecutionError,
    /// Innermost frame first
    pub stack_trace: Vec<StackTraceEntry>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for entry in &self.stack_trace {
            write!(f, "\n    {}", entry)?;
        }
        Ok(())
    }
}
