pub mod bytecode;
pub mod cli;
pub mod config;
pub mod context;
pub mod control_stack;
pub mod debugger;
pub mod errors;
pub mod frame;
pub mod interpreter;
pub mod natives;
pub mod program;
pub mod runner;
pub mod scheduler;
pub mod values;

// Re-export main types
pub use errors::{ArrayError, DebugError, ExecutionError, IteratorError, NativeError, RunError};
pub use program::ProgramFile;
pub use runner::{ProgramRunner, RunOutcome};
pub use values::Value;
