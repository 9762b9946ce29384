//! Debug protocol messages exchanged with a client

use serde::{Deserialize, Serialize};

use super::breakpoints::Breakpoint;
use crate::control_stack::StackTraceEntry;
use crate::program::SourcePos;
use crate::scheduler::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspendReason {
    Breakpoint,
    Step,
}

/// Debuggee -> client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    /// Sent once before execution; the debuggee then waits for `Start`
    Ready,

    Suspended {
        worker: WorkerId,
        worker_name: String,
        position: SourcePos,
        reason: SuspendReason,
        /// Innermost first
        frames: Vec<StackTraceEntry>,
    },

    Exit { status: i32 },
}

/// Client -> debuggee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DebugCommand {
    Start,
    Resume,
    /// Resume, suspending again at the next new source position
    Step,
    /// Replace the breakpoint set
    SetBreakpoints { breakpoints: Vec<Breakpoint> },
}
