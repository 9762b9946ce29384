//! Core execution loop
//!
//! ## Function Organization
//! 1. run_until_done() - Top-level driver: debug gate, then step
//! 2. step() - Fetch, advance, execute one instruction

use std::sync::Arc;

use tracing::{error, trace};

use super::instructions::{execute, Flow};
use super::state::{ExecutionState, Fault, Step};
use crate::context::Context;
use crate::errors::ExecutionError;

/* ===================== Public API ===================== */

/// Run the worker until it returns or faults.
///
/// With a debugger attached, every instruction boundary is offered to the
/// debug manager first; this is the only place a worker can park.
pub async fn run_until_done(ctx: &mut Context) {
    loop {
        if let Some(debugger) = ctx.invocation.debugger.clone() {
            debug_gate(ctx, &debugger).await;
        }
        match step(ctx) {
            Step::Continue => continue,
            Step::Done => break,
        }
    }
}

/// Execute one instruction
pub fn step(ctx: &mut Context) -> Step {
    if ctx.state.is_terminal() {
        return Step::Done;
    }

    match fetch_and_execute(ctx) {
        Ok(Flow::Continue) => Step::Continue,
        Ok(Flow::Returned(values)) => {
            ctx.state = ExecutionState::Returned(values);
            Step::Done
        }
        Err(err) => {
            fault(ctx, err);
            Step::Done
        }
    }
}

fn fetch_and_execute(ctx: &mut Context) -> Result<Flow, ExecutionError> {
    let program = Arc::clone(&ctx.invocation.program);
    let frame = ctx.control_stack.current_mut()?;
    let ip = frame.ip;
    let instruction = program
        .instruction(ip)
        .ok_or(ExecutionError::InvalidInstructionPointer { ip })?;
    frame.ip += 1;

    trace!(ip, instruction = ?instruction, "execute");
    execute(ctx, &program, instruction)
}

/* ===================== Faults ===================== */

/// Capture the stack trace, unwind everything and mark the worker faulted
fn fault(ctx: &mut Context, err: ExecutionError) {
    let stack_trace = ctx.control_stack.snapshot(&ctx.invocation.program);
    if err.is_fatal() {
        error!(worker = %ctx.worker.worker_name, error = %err, "interpreter invariant violated");
    }
    ctx.control_stack.clear();
    ctx.state = ExecutionState::Faulted(Fault {
        error: err,
        stack_trace,
    });
}

/* ===================== Debugging ===================== */

async fn debug_gate(ctx: &mut Context, debugger: &crate::debugger::DebugManager) {
    let Some(ip) = ctx.control_stack.current().map(|frame| frame.ip) else {
        return;
    };
    let depth = ctx.control_stack.depth();
    let Some(debug) = ctx.debug.as_mut() else {
        return;
    };
    let program = Arc::clone(&ctx.invocation.program);
    let position = program.position_of(ip);

    let Some(reason) = debugger.should_suspend(debug, depth, position) else {
        return;
    };
    let Some(position) = position.cloned() else {
        return;
    };

    let mut frames = ctx.control_stack.snapshot(&program);
    // The top frame has not advanced past the instruction about to run
    if let Some(top) = frames.first_mut() {
        top.position = Some(position.clone());
    }
    ctx.state = ExecutionState::SuspendedForDebug;
    debugger.suspend(debug, position, reason, frames).await;
    ctx.state = ExecutionState::Running;
}
