//! Program runner
//!
//! Drives one invocation end to end: optional debugger handshake, package
//! initialisation, the entry function with its workers, and the final join.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bytecode::RegKind;
use crate::config::RuntimeSettings;
use crate::context::{Context, Invocation};
use crate::debugger::DebugManager;
use crate::errors::{ExecutionError, RunError};
use crate::frame::{natural_kind, StackFrame};
use crate::interpreter::Fault;
use crate::natives::{NativeRegistry, Output};
use crate::program::{FunctionId, FunctionInfo, ProgramFile};
use crate::values::{ArrayRef, Value};

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub invocation: Uuid,
    /// Values returned by the entry function
    pub values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ProgramRunner {
    program: Arc<ProgramFile>,
    natives: Arc<NativeRegistry>,
    settings: RuntimeSettings,
    output: Output,
}

impl ProgramRunner {
    /// Runner with the built-in natives and default settings
    pub fn new(program: ProgramFile) -> Self {
        Self {
            program: Arc::new(program),
            natives: Arc::new(NativeRegistry::with_builtins()),
            settings: RuntimeSettings::default(),
            output: Output::default(),
        }
    }

    pub fn with_natives(mut self, natives: NativeRegistry) -> Self {
        self.natives = Arc::new(natives);
        self
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn program(&self) -> &ProgramFile {
        &self.program
    }

    /// Run the entry package's `main`.
    ///
    /// `args` reach main as a string array in reference register 0. With a
    /// debugger, the handshake must complete before anything executes.
    pub async fn run_main(
        &self,
        args: Vec<String>,
        debugger: Option<Arc<DebugManager>>,
    ) -> Result<RunOutcome, RunError> {
        let (main_id, main) = self
            .program
            .main_function()
            .ok_or_else(|| RunError::MainNotFound(self.program.entry_package.clone()))?;

        if let Some(debugger) = &debugger {
            debugger.wait_till_debuggee_responds().await?;
        }

        let invocation = self.invocation(debugger.clone());
        info!(invocation = %invocation.id, args = args.len(), "run started");

        let result = self.run_main_inner(&invocation, main_id, main, args).await;
        match &result {
            Ok(_) => info!(invocation = %invocation.id, "run completed"),
            Err(e) => warn!(invocation = %invocation.id, error = %e, "run failed"),
        }

        if let Some(debugger) = &debugger {
            debugger.notify_exit(if result.is_ok() { 0 } else { 1 });
        }
        result.map(|values| RunOutcome {
            invocation: invocation.id,
            values,
        })
    }

    async fn run_main_inner(
        &self,
        invocation: &Arc<Invocation>,
        main_id: FunctionId,
        main: &FunctionInfo,
        args: Vec<String>,
    ) -> Result<Vec<Value>, RunError> {
        for package in &self.program.packages {
            let Some(init_id) = package.init_function else {
                continue;
            };
            let init = self
                .program
                .function(init_id)
                .ok_or_else(|| RunError::FunctionNotFound(init_id.to_string()))?;
            info!(package = %package.name, "initialising package");
            run_function(invocation, init_id, init, Vec::new()).await?;
        }

        let mut main_args = Vec::new();
        if main.default_worker.registers.refs > 0 {
            let array = ArrayRef::from_strings(args).map_err(|e| setup_fault(e.into()))?;
            main_args.push((RegKind::Ref, Value::Array(array)));
        }
        run_function(invocation, main_id, main, main_args).await
    }

    /// Run any function by name with positional arguments.
    ///
    /// Each argument goes to the next register of its natural bank (ints to
    /// int registers and so on, everything else to reference registers).
    /// Package initialisation is not run.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, RunError> {
        let (id, info) = self
            .program
            .find_function(name)
            .ok_or_else(|| RunError::FunctionNotFound(name.to_string()))?;
        let args = args.into_iter().map(|v| (natural_kind(&v), v)).collect();

        let invocation = self.invocation(None);
        run_function(&invocation, id, info, args).await
    }

    fn invocation(&self, debugger: Option<Arc<DebugManager>>) -> Arc<Invocation> {
        Invocation::new(
            Arc::clone(&self.program),
            Arc::clone(&self.natives),
            self.settings.clone(),
            debugger,
            self.output.clone(),
        )
    }
}

fn setup_fault(error: ExecutionError) -> RunError {
    RunError::Faulted(Box::new(Fault {
        error,
        stack_trace: Vec::new(),
    }))
}

/// Run `function`'s default worker inline and its named workers as tasks,
/// then wait for all of them.
///
/// A fault of the default worker takes precedence over failures of named
/// workers; either way every worker is drained first.
async fn run_function(
    invocation: &Arc<Invocation>,
    id: FunctionId,
    info: &FunctionInfo,
    args: Vec<(RegKind, Value)>,
) -> Result<Vec<Value>, RunError> {
    let mut frame = StackFrame::new(id, &info.default_worker);
    frame.bind_args(&args).map_err(setup_fault)?;

    let worker = invocation
        .scheduler
        .register(id, &info.name, &info.default_worker.name);
    if let Err(e) = invocation.spawn_workers(id, info, &args) {
        let fault = Fault {
            error: e,
            stack_trace: Vec::new(),
        };
        invocation.scheduler.complete(worker.id, &Err(fault.clone()));
        return Err(RunError::Faulted(Box::new(fault)));
    }

    let mut ctx = Context::new(Arc::clone(invocation), worker.clone());
    ctx.control_stack.push_frame(frame);
    let outcome = ctx.run().await;
    invocation.scheduler.complete(worker.id, &outcome);

    let joined = ctx.await_workers().await;
    match (outcome, joined) {
        (Err(fault), _) => Err(RunError::Faulted(Box::new(fault))),
        (Ok(_), Err(e)) => Err(e),
        (Ok(values), Ok(())) => Ok(values),
    }
}
