//! Test helpers for interpreter tests
//!
//! Common utilities for loading programs and running them

use crate::errors::RunError;
use crate::interpreter::Fault;
use crate::natives::Output;
use crate::program::ProgramFile;
use crate::runner::ProgramRunner;

/// Parse a program, round-trip it through JSON and load it again
///
/// The round trip checks that everything the loader accepts also
/// serializes back into the same shape.
pub fn load_program(json: &str) -> ProgramFile {
    let program = ProgramFile::from_json_str(json).expect("Parse program failed");
    let json = serde_json::to_string(&program).expect("Program serialization failed");
    ProgramFile::from_json_str(&json).expect("Program deserialization failed")
}

/// Runner over `json` whose program output is captured
pub fn runner(json: &str) -> (ProgramRunner, Output) {
    let output = Output::captured();
    let runner = ProgramRunner::new(load_program(json)).with_output(output.clone());
    (runner, output)
}

/// Unwrap the fault of a failed run
pub fn expect_fault(result: Result<impl std::fmt::Debug, RunError>) -> Fault {
    match result {
        Err(RunError::Faulted(fault)) => *fault,
        other => panic!("expected a faulted run, got {:?}", other),
    }
}
