//! Execution contexts
//!
//! An [`Invocation`] is everything shared by the workers of one run: the
//! program, natives, scheduler and optional debugger. Each worker executes in
//! its own [`Context`], which owns that worker's control stack.

use std::sync::Arc;

use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::bytecode::RegKind;
use crate::config::RuntimeSettings;
use crate::control_stack::ControlStack;
use crate::debugger::{DebugContext, DebugManager};
use crate::errors::{ExecutionError, RunError};
use crate::frame::StackFrame;
use crate::interpreter::{self, ExecutionState};
use crate::natives::{NativeRegistry, Output};
use crate::program::{FunctionId, FunctionInfo, ProgramFile};
use crate::scheduler::{WorkerInstance, WorkerOutcome, WorkerScheduler};
use crate::values::Value;

/* ===================== Invocation ===================== */

#[derive(Debug)]
pub struct Invocation {
    pub id: Uuid,
    pub program: Arc<ProgramFile>,
    pub natives: Arc<NativeRegistry>,
    pub scheduler: WorkerScheduler,
    pub debugger: Option<Arc<DebugManager>>,
    pub settings: RuntimeSettings,
    pub output: Output,
}

impl Invocation {
    pub fn new(
        program: Arc<ProgramFile>,
        natives: Arc<NativeRegistry>,
        settings: RuntimeSettings,
        debugger: Option<Arc<DebugManager>>,
        output: Output,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            program,
            natives,
            scheduler: WorkerScheduler::new(),
            debugger,
            settings,
            output,
        })
    }

    /// Spawn every named worker of `function`, each bound to `args`.
    ///
    /// All frames are built before anything is spawned, so a binding error
    /// leaves no worker behind.
    pub fn spawn_workers(
        self: &Arc<Self>,
        function: FunctionId,
        info: &FunctionInfo,
        args: &[(RegKind, Value)],
    ) -> Result<Vec<WorkerInstance>, ExecutionError> {
        let frames = info
            .workers
            .iter()
            .map(|worker| {
                let mut frame = StackFrame::new(function, worker);
                frame.bind_args(args)?;
                Ok(frame)
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        Ok(frames
            .into_iter()
            .map(|frame| self.spawn_frame(&info.name, frame))
            .collect())
    }

    fn spawn_frame(self: &Arc<Self>, function_name: &str, frame: StackFrame) -> WorkerInstance {
        let instance = self
            .scheduler
            .register(frame.function, function_name, &frame.worker);
        let span = tracing::debug_span!(
            "worker",
            invocation = %self.id,
            worker_id = instance.id,
            worker = %instance.worker_name
        );

        let invocation = Arc::clone(self);
        let worker = instance.clone();
        tokio::spawn(
            async move {
                let mut ctx = Context::new(Arc::clone(&invocation), worker.clone());
                ctx.control_stack.push_frame(frame);
                let outcome = ctx.run().await;
                invocation.scheduler.complete(worker.id, &outcome);
            }
            .instrument(span),
        );
        instance
    }
}

/* ===================== Context ===================== */

/// One worker's execution state
#[derive(Debug)]
pub struct Context {
    pub invocation: Arc<Invocation>,
    pub worker: WorkerInstance,
    pub control_stack: ControlStack,
    pub debug: Option<DebugContext>,
    pub state: ExecutionState,
}

impl Context {
    pub fn new(invocation: Arc<Invocation>, worker: WorkerInstance) -> Self {
        let debug = invocation
            .debugger
            .as_ref()
            .map(|_| DebugContext::new(worker.id, worker.worker_name.clone()));
        Self {
            invocation,
            worker,
            control_stack: ControlStack::new(),
            debug,
            state: ExecutionState::Running,
        }
    }

    pub fn program(&self) -> &ProgramFile {
        &self.invocation.program
    }

    /// Run until the worker returns or faults
    pub async fn run(&mut self) -> WorkerOutcome {
        debug!(worker = %self.worker.worker_name, "worker started");
        interpreter::run_until_done(self).await;
        match std::mem::take(&mut self.state) {
            ExecutionState::Faulted(fault) => Err(fault),
            ExecutionState::Returned(values) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }

    /// Wait for every worker of the invocation to finish.
    ///
    /// Consumes the context: its control stack is done by now, and only the
    /// shared invocation is held while waiting.
    pub async fn await_workers(self) -> Result<(), RunError> {
        let invocation = Arc::clone(&self.invocation);
        drop(self);
        invocation.scheduler.await_all().await
    }
}
