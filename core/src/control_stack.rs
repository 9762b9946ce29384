//! Per-context call stack

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;
use crate::frame::StackFrame;
use crate::program::{ProgramFile, SourcePos};

/// One line of a stack trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackTraceEntry {
    pub function: String,
    pub worker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePos>,
}

impl std::fmt::Display for StackTraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {}", self.function)?;
        if self.worker != "default" {
            write!(f, "[{}]", self.worker)?;
        }
        match &self.position {
            Some(pos) => write!(f, " ({})", pos),
            None => write!(f, " (unknown source)"),
        }
    }
}

/// LIFO of frames owned by a single context
#[derive(Debug, Default)]
pub struct ControlStack {
    frames: Vec<StackFrame>,
}

impl ControlStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Result<StackFrame, ExecutionError> {
        self.frames.pop().ok_or(ExecutionError::StackUnderflow)
    }

    pub fn current(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Result<&mut StackFrame, ExecutionError> {
        self.frames.last_mut().ok_or(ExecutionError::StackUnderflow)
    }

    /// Bottom-first
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Stack trace, innermost frame first
    pub fn snapshot(&self, program: &ProgramFile) -> Vec<StackTraceEntry> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                // A frame's ip has already moved past the executing instruction
                let ip = frame.ip.saturating_sub(1).max(frame.code_addr);
                StackTraceEntry {
                    function: program
                        .function(frame.function)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| frame.function.to_string()),
                    worker: frame.worker.clone(),
                    position: program.position_of(ip).cloned(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{FunctionId, WorkerInfo};

    fn frame(function: u32, code_addr: usize) -> StackFrame {
        StackFrame::new(
            FunctionId(function),
            &WorkerInfo {
                name: "default".to_string(),
                code_addr,
                registers: Default::default(),
            },
        )
    }

    #[test]
    fn test_lifo() {
        let mut stack = ControlStack::new();
        stack.push_frame(frame(0, 0));
        stack.push_frame(frame(1, 10));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current().unwrap().function, FunctionId(1));

        assert_eq!(stack.pop_frame().unwrap().function, FunctionId(1));
        assert_eq!(stack.pop_frame().unwrap().function, FunctionId(0));
        assert_eq!(stack.pop_frame().unwrap_err(), ExecutionError::StackUnderflow);
    }

    #[test]
    fn test_snapshot_is_top_first() {
        let program = ProgramFile::from_json_str(
            r#"{
                "functions": [
                    { "name": "main", "default_worker": { "code_addr": 0 } },
                    { "name": "helper", "default_worker": { "code_addr": 2 } }
                ],
                "code": [],
                "line_numbers": [
                    { "ip": 0, "source": "app.bal", "line": 1 },
                    { "ip": 2, "source": "app.bal", "line": 7 }
                ]
            }"#,
        )
        .unwrap();

        let mut stack = ControlStack::new();
        let mut main = frame(0, 0);
        main.ip = 2;
        stack.push_frame(main);
        stack.push_frame(frame(1, 2));

        let trace = stack.snapshot(&program);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].function, "helper");
        assert_eq!(trace[0].position.as_ref().unwrap().line, 7);
        assert_eq!(trace[1].function, "main");
        assert_eq!(trace[1].to_string(), "at main (app.bal:1)");
    }
}
