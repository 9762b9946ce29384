//! # Interpreter
//!
//! Fetch-decode-execute over register bytecode.
//!
//! ## Core Principles
//!
//! 1. **Frame-driven execution**: all state lives in the context's control
//!    stack, calls push frames instead of recursing
//! 2. **Synchronous steps**: `step()` never blocks; the driver only yields at
//!    debugger gates
//! 3. **Faults unwind everything**: any execution error captures a stack trace,
//!    empties the stack and ends the worker

pub mod exec_loop;
mod instructions;
pub mod state;

#[cfg(test)]
mod tests;

pub use exec_loop::{run_until_done, step};
pub use state::{ExecutionState, Fault, Step};
