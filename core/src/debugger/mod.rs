//! Debug manager
//!
//! One [`DebugManager`] is created per debugged run and shared with every
//! worker of the invocation. Workers consult it at each instruction boundary
//! through their own [`DebugContext`]; a worker that reaches a breakpoint
//! emits a `Suspended` event and parks until the client resumes it.
//!
//! The client side is a pair of channels ([`DebugClient`]). The [`wire`]
//! module bridges those channels to line-delimited JSON.

pub mod breakpoints;
pub mod protocol;
pub mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub use breakpoints::{Breakpoint, BreakpointRegistry};
pub use protocol::{DebugCommand, DebugEvent, SuspendReason};

use crate::config::DebugSettings;
use crate::control_stack::StackTraceEntry;
use crate::errors::DebugError;
use crate::program::SourcePos;
use crate::scheduler::WorkerId;

/* ===================== Per-worker State ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Run,
    /// Suspend at the next new source position
    Step,
}

/// Debug state owned by one worker's context
#[derive(Debug, Clone)]
pub struct DebugContext {
    pub worker: WorkerId,
    pub worker_name: String,
    pub mode: DebugMode,
    /// Last position seen by each frame of the control stack, bottom first
    pub last_positions: Vec<Option<SourcePos>>,
}

impl DebugContext {
    pub fn new(worker: WorkerId, worker_name: impl Into<String>) -> Self {
        Self {
            worker,
            worker_name: worker_name.into(),
            mode: DebugMode::Run,
            last_positions: Vec::new(),
        }
    }
}

/* ===================== Client Handle ===================== */

/// In-process end of the debug channels
#[derive(Debug)]
pub struct DebugClient {
    pub events: mpsc::UnboundedReceiver<DebugEvent>,
    pub commands: mpsc::UnboundedSender<DebugCommand>,
}

impl DebugClient {
    pub async fn next_event(&mut self) -> Option<DebugEvent> {
        self.events.recv().await
    }

    /// Returns false once the debuggee has gone away
    pub fn send(&self, command: DebugCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/* ===================== Manager ===================== */

#[derive(Debug)]
pub struct DebugManager {
    breakpoints: RwLock<BreakpointRegistry>,
    events: mpsc::UnboundedSender<DebugEvent>,
    // Suspended workers take turns reading commands
    commands: Mutex<mpsc::UnboundedReceiver<DebugCommand>>,
    handshake_timeout: Duration,
    detached: AtomicBool,
}

impl DebugManager {
    pub fn new(handshake_timeout: Duration) -> (Arc<Self>, DebugClient) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            breakpoints: RwLock::new(BreakpointRegistry::default()),
            events: event_tx,
            commands: Mutex::new(command_rx),
            handshake_timeout,
            detached: AtomicBool::new(false),
        });
        let client = DebugClient {
            events: event_rx,
            commands: command_tx,
        };
        (manager, client)
    }

    /// Manager with the configured timeout and initial breakpoints
    pub fn from_settings(settings: &DebugSettings) -> Result<(Arc<Self>, DebugClient), DebugError> {
        let breakpoints = settings
            .breakpoints
            .iter()
            .map(|s| s.parse::<Breakpoint>())
            .collect::<Result<Vec<_>, _>>()?;
        let (manager, client) =
            Self::new(Duration::from_secs(settings.handshake_timeout_secs));
        manager.add_breakpoints(breakpoints);
        Ok((manager, client))
    }

    pub fn add_breakpoints(&self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        let mut registry = self.breakpoints.write();
        for bp in breakpoints {
            debug!(breakpoint = %bp, "breakpoint added");
            registry.add(bp);
        }
    }

    pub fn set_breakpoints(&self, breakpoints: Vec<Breakpoint>) {
        info!(count = breakpoints.len(), "breakpoints replaced");
        self.breakpoints.write().replace(breakpoints);
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.read().to_vec()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Startup handshake: announce readiness and wait for `Start`.
    ///
    /// Breakpoints sent before `Start` are applied.
    pub async fn wait_till_debuggee_responds(&self) -> Result<(), DebugError> {
        if self.events.send(DebugEvent::Ready).is_err() {
            return Err(DebugError::ClientDisconnected);
        }
        info!(timeout = ?self.handshake_timeout, "waiting for debug client");

        let handshake = async {
            let mut commands = self.commands.lock().await;
            loop {
                match commands.recv().await {
                    Some(DebugCommand::Start) => return Ok(()),
                    Some(DebugCommand::SetBreakpoints { breakpoints }) => {
                        self.set_breakpoints(breakpoints)
                    }
                    Some(other) => debug!(command = ?other, "ignored before start"),
                    None => return Err(DebugError::ClientDisconnected),
                }
            }
        };

        match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(result) => {
                if result.is_ok() {
                    info!("debug client attached");
                }
                result
            }
            Err(_) => Err(DebugError::HandshakeTimeout {
                secs: self.handshake_timeout.as_secs(),
            }),
        }
    }

    /// Decide whether the worker must stop before executing an instruction
    /// at `pos` in the frame at `depth` (1 for the bottom frame).
    ///
    /// Only entering a new position within a frame can trigger a stop, so
    /// returning from a call onto the line that made it does not stop again.
    pub fn should_suspend(
        &self,
        ctx: &mut DebugContext,
        depth: usize,
        pos: Option<&SourcePos>,
    ) -> Option<SuspendReason> {
        if self.is_detached() || depth == 0 {
            return None;
        }
        // Entries above `depth` belong to frames that have returned
        ctx.last_positions.resize(depth, None);
        let pos = pos?;
        let last = &mut ctx.last_positions[depth - 1];
        if last.as_ref() == Some(pos) {
            return None;
        }
        *last = Some(pos.clone());

        if ctx.mode == DebugMode::Step {
            Some(SuspendReason::Step)
        } else if self.breakpoints.read().contains(pos) {
            Some(SuspendReason::Breakpoint)
        } else {
            None
        }
    }

    /// Report the suspension and park until the client resumes or steps
    pub async fn suspend(
        &self,
        ctx: &mut DebugContext,
        position: SourcePos,
        reason: SuspendReason,
        frames: Vec<StackTraceEntry>,
    ) {
        info!(
            worker = %ctx.worker_name,
            position = %position,
            reason = ?reason,
            "worker suspended"
        );
        let event = DebugEvent::Suspended {
            worker: ctx.worker,
            worker_name: ctx.worker_name.clone(),
            position,
            reason,
            frames,
        };
        if self.events.send(event).is_err() {
            self.detach();
            return;
        }

        let mut commands = self.commands.lock().await;
        loop {
            match commands.recv().await {
                Some(DebugCommand::Resume) => {
                    ctx.mode = DebugMode::Run;
                    break;
                }
                Some(DebugCommand::Step) => {
                    ctx.mode = DebugMode::Step;
                    break;
                }
                Some(DebugCommand::SetBreakpoints { breakpoints }) => {
                    self.set_breakpoints(breakpoints)
                }
                Some(DebugCommand::Start) => debug!("duplicate start ignored"),
                None => {
                    self.detach();
                    break;
                }
            }
        }
        debug!(worker = %ctx.worker_name, "worker resumed");
    }

    pub fn notify_exit(&self, status: i32) {
        info!(status, "debuggee exiting");
        let _ = self.events.send(DebugEvent::Exit { status });
    }

    fn detach(&self) {
        if !self.detached.swap(true, Ordering::AcqRel) {
            warn!("debug client disconnected, continuing without debugger");
            self.breakpoints.write().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(source: &str, line: u32) -> SourcePos {
        SourcePos {
            source: source.to_string(),
            line,
        }
    }

    #[test]
    fn test_same_position_does_not_retrigger() {
        let (manager, _client) = DebugManager::new(Duration::from_secs(1));
        manager.add_breakpoints([Breakpoint::new("a.bal", 10)]);
        let mut ctx = DebugContext::new(1, "default");

        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 9))), None);
        assert_eq!(
            manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 10))),
            Some(SuspendReason::Breakpoint)
        );
        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 10))), None);
        assert_eq!(manager.should_suspend(&mut ctx, 1, None), None);
        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 11))), None);
    }

    #[test]
    fn test_return_to_calling_line_does_not_retrigger() {
        let (manager, _client) = DebugManager::new(Duration::from_secs(1));
        manager.add_breakpoints([Breakpoint::new("a.bal", 10)]);
        let mut ctx = DebugContext::new(1, "default");

        assert_eq!(
            manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 10))),
            Some(SuspendReason::Breakpoint)
        );
        assert_eq!(manager.should_suspend(&mut ctx, 2, Some(&pos("a.bal", 20))), None);
        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 10))), None);

        // A fresh activation of a frame at the breakpoint line stops again
        assert_eq!(
            manager.should_suspend(&mut ctx, 2, Some(&pos("a.bal", 10))),
            Some(SuspendReason::Breakpoint)
        );
        assert_eq!(ctx.last_positions.len(), 2);
    }

    #[test]
    fn test_step_mode_stops_on_every_new_line() {
        let (manager, _client) = DebugManager::new(Duration::from_secs(1));
        let mut ctx = DebugContext::new(1, "default");
        ctx.mode = DebugMode::Step;

        assert_eq!(
            manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 1))),
            Some(SuspendReason::Step)
        );
        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 1))), None);
        assert_eq!(
            manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 2))),
            Some(SuspendReason::Step)
        );
    }

    #[tokio::test]
    async fn test_handshake_applies_breakpoints_then_starts() {
        let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
        client.send(DebugCommand::SetBreakpoints {
            breakpoints: vec![Breakpoint::new("x.bal", 4)],
        });
        client.send(DebugCommand::Start);

        tokio_test::assert_ok!(manager.wait_till_debuggee_responds().await);
        assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
        assert_eq!(manager.breakpoints(), vec![Breakpoint::new("x.bal", 4)]);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (manager, _client) = DebugManager::new(Duration::from_millis(20));
        assert_eq!(
            manager.wait_till_debuggee_responds().await.unwrap_err(),
            DebugError::HandshakeTimeout { secs: 0 }
        );
    }

    #[tokio::test]
    async fn test_handshake_fails_when_client_is_gone() {
        let (manager, client) = DebugManager::new(Duration::from_secs(5));
        drop(client);
        assert_eq!(
            manager.wait_till_debuggee_responds().await.unwrap_err(),
            DebugError::ClientDisconnected
        );
    }

    #[tokio::test]
    async fn test_disconnect_while_suspended_detaches() {
        let (manager, client) = DebugManager::new(Duration::from_secs(5));
        manager.add_breakpoints([Breakpoint::new("a.bal", 1)]);
        let mut ctx = DebugContext::new(1, "default");
        drop(client);

        manager
            .suspend(&mut ctx, pos("a.bal", 1), SuspendReason::Breakpoint, vec![])
            .await;
        assert!(manager.is_detached());
        assert!(manager.breakpoints().is_empty());
        assert_eq!(manager.should_suspend(&mut ctx, 1, Some(&pos("a.bal", 2))), None);
    }
}
