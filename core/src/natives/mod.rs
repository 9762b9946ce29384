//! Native functions
//!
//! Natives receive their arguments as values and return a result vector that
//! the interpreter writes positionally into the call's target registers.
//!
//! Failure convention:
//! - recoverable failure: `Ok(vec![<default>, Value::Error(..)])`
//! - unrecoverable failure: `Err(NativeError)`, which faults the worker

pub mod strings;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::NativeError;
use crate::scheduler::WorkerInstance;
use crate::values::{TypeTag, Value};

pub type NativeFn = fn(&mut NativeContext<'_>, &[Value]) -> Result<Vec<Value>, NativeError>;

/// What a native can see of its caller
pub struct NativeContext<'a> {
    pub invocation: Uuid,
    pub worker: &'a WorkerInstance,
    pub output: &'a Output,
}

/* ===================== Output ===================== */

/// Destination of program output
#[derive(Debug, Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    /// Lines collected in memory
    Captured(Arc<Mutex<Vec<String>>>),
}

impl Output {
    pub fn captured() -> Self {
        Output::Captured(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn write_line(&self, line: &str) {
        match self {
            Output::Stdout => println!("{}", line),
            Output::Captured(lines) => lines.lock().push(line.to_string()),
        }
    }

    /// Captured lines so far; always empty for stdout
    pub fn lines(&self) -> Vec<String> {
        match self {
            Output::Stdout => Vec::new(),
            Output::Captured(lines) => lines.lock().clone(),
        }
    }
}

/* ===================== Registry ===================== */

#[derive(Default, Clone)]
pub struct NativeRegistry {
    funcs: HashMap<String, NativeFn>,
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("NativeRegistry").field("funcs", &names).finish()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in native
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        strings::register(&mut registry);
        registry.register("io.println", native_println);
        registry
    }

    pub fn register(&mut self, name: &str, func: NativeFn) {
        self.funcs.insert(name.to_string(), func);
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.funcs.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

/* ===================== Argument Helpers ===================== */

pub(crate) fn expect_args(args: &[Value], expected: usize) -> Result<(), NativeError> {
    if args.len() != expected {
        return Err(NativeError::Arity {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

pub(crate) fn arg_str(args: &[Value], index: usize) -> Result<&str, NativeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        other => Err(NativeError::Argument {
            index,
            expected: "string",
            found: other.map(Value::type_tag).unwrap_or(TypeTag::Null),
        }),
    }
}

/// io.println(values...): prints the values' string forms separated by spaces
fn native_println(ctx: &mut NativeContext<'_>, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    let line = args
        .iter()
        .map(Value::string_value)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.output.write_line(&line);
    Ok(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::FunctionId;

    pub(crate) fn worker() -> WorkerInstance {
        WorkerInstance {
            id: 1,
            function: FunctionId(0),
            function_name: "main".to_string(),
            worker_name: "default".to_string(),
        }
    }

    #[test]
    fn test_registry() {
        fn dummy(_: &mut NativeContext<'_>, _: &[Value]) -> Result<Vec<Value>, NativeError> {
            Ok(vec![Value::Int(1)])
        }

        let mut registry = NativeRegistry::new();
        assert!(registry.is_empty());
        registry.register("test.dummy", dummy);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("test.dummy").is_some());
        assert!(registry.get("test.other").is_none());
        assert!(NativeRegistry::with_builtins().get("string.matchesWithRegex").is_some());
    }

    #[test]
    fn test_println_writes_to_output() {
        let output = Output::captured();
        let worker = worker();
        let mut ctx = NativeContext {
            invocation: Uuid::new_v4(),
            worker: &worker,
            output: &output,
        };
        native_println(&mut ctx, &[Value::str("sum:"), Value::Int(6)]).unwrap();
        assert_eq!(output.lines(), vec!["sum: 6"]);
    }

    #[test]
    fn test_argument_checks() {
        assert_eq!(
            expect_args(&[], 1).unwrap_err(),
            NativeError::Arity {
                expected: 1,
                got: 0
            }
        );
        assert!(matches!(
            arg_str(&[Value::Int(1)], 0),
            Err(NativeError::Argument { index: 0, .. })
        ));
    }
}
