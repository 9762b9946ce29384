//! Tests for running under the debug manager

use std::time::Duration;

use super::helpers::runner;
use crate::debugger::{Breakpoint, DebugCommand, DebugEvent, DebugManager, SuspendReason};
use crate::errors::{DebugError, RunError};
use crate::program::SourcePos;
use crate::values::Value;

const PROGRAM: &str = r#"{
    "entry_package": "app",
    "functions": [{
        "name": "main", "package": "app",
        "default_worker": { "code_addr": 0, "registers": { "ints": 2 } }
    }],
    "code": [
        { "op": "IConst", "dst": 0, "value": 1 },
        { "op": "IConst", "dst": 1, "value": 2 },
        { "op": "IAdd", "lhs": 0, "rhs": 1, "dst": 0 },
        { "op": "NativeCall", "name": "io.println", "args": [{ "int": 0 }] },
        { "op": "Return", "values": [{ "int": 0 }] }
    ],
    "line_numbers": [
        { "ip": 0, "source": "fileA", "line": 9 },
        { "ip": 1, "source": "fileA", "line": 10 },
        { "ip": 3, "source": "fileA", "line": 11 }
    ]
}"#;

fn at(line: u32) -> SourcePos {
    SourcePos {
        source: "fileA".to_string(),
        line,
    }
}

fn suspended_at(event: Option<DebugEvent>) -> (SourcePos, SuspendReason) {
    match event {
        Some(DebugEvent::Suspended {
            position, reason, ..
        }) => (position, reason),
        other => panic!("expected a suspension, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_breakpoint_suspends_once_per_line() {
    let (runner, output) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    client.send(DebugCommand::SetBreakpoints {
        breakpoints: vec![Breakpoint::new("fileA", 10)],
    });
    client.send(DebugCommand::Start);

    let run = tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await });

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    match client.next_event().await {
        Some(DebugEvent::Suspended {
            worker_name,
            position,
            reason,
            frames,
            ..
        }) => {
            assert_eq!(worker_name, "default");
            assert_eq!(position, at(10));
            assert_eq!(reason, SuspendReason::Breakpoint);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].to_string(), "at main (fileA:10)");
        }
        other => panic!("expected a suspension, got {:?}", other),
    }
    // Nothing after the breakpoint has run yet
    assert!(output.lines().is_empty());

    // The second instruction on line 10 must not stop again
    client.send(DebugCommand::Resume);
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.values, vec![Value::Int(3)]);
    assert_eq!(output.lines(), vec!["3"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_breakpoint_on_a_calling_line_suspends_once() {
    let (runner, output) = runner(
        r#"{
        "entry_package": "app",
        "functions": [
            { "name": "main", "package": "app",
              "default_worker": { "code_addr": 0, "registers": { "ints": 2 } } },
            { "name": "double", "package": "app",
              "default_worker": { "code_addr": 4, "registers": { "ints": 1 } } }
        ],
        "code": [
            { "op": "IConst", "dst": 0, "value": 4 },
            { "op": "Call", "function": 1, "args": [{ "int": 0 }], "rets": [{ "int": 1 }] },
            { "op": "NativeCall", "name": "io.println", "args": [{ "int": 1 }] },
            { "op": "Return", "values": [{ "int": 1 }] },
            { "op": "IAdd", "lhs": 0, "rhs": 0, "dst": 0 },
            { "op": "Return", "values": [{ "int": 0 }] }
        ],
        "line_numbers": [
            { "ip": 0, "source": "fileA", "line": 10 },
            { "ip": 4, "source": "fileA", "line": 20 }
        ]
    }"#,
    );
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    manager.add_breakpoints([Breakpoint::new("fileA", 10)]);
    client.send(DebugCommand::Start);

    let run = tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await });

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    assert_eq!(
        suspended_at(client.next_event().await),
        (at(10), SuspendReason::Breakpoint)
    );

    // Returning from `double` lands back on line 10 without stopping
    client.send(DebugCommand::Resume);
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.values, vec![Value::Int(8)]);
    assert_eq!(output.lines(), vec!["8"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_breakpoints_runs_straight_through() {
    let (runner, _) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    client.send(DebugCommand::Start);

    let outcome = runner.run_main(vec![], Some(manager)).await.unwrap();
    assert_eq!(outcome.values, vec![Value::Int(3)]);

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_step_stops_at_next_line() {
    let (runner, _) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    manager.add_breakpoints([Breakpoint::new("fileA", 10)]);
    client.send(DebugCommand::Start);

    let run = tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await });

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    assert_eq!(
        suspended_at(client.next_event().await),
        (at(10), SuspendReason::Breakpoint)
    );

    client.send(DebugCommand::Step);
    assert_eq!(
        suspended_at(client.next_event().await),
        (at(11), SuspendReason::Step)
    );

    client.send(DebugCommand::Resume);
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_breakpoints_replaced_while_suspended() {
    let (runner, _) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    manager.add_breakpoints([Breakpoint::new("fileA", 9)]);
    client.send(DebugCommand::Start);

    let run = tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await });

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    assert_eq!(
        suspended_at(client.next_event().await),
        (at(9), SuspendReason::Breakpoint)
    );

    client.send(DebugCommand::SetBreakpoints {
        breakpoints: vec![Breakpoint::new("fileA", 11)],
    });
    client.send(DebugCommand::Resume);
    assert_eq!(
        suspended_at(client.next_event().await),
        (at(11), SuspendReason::Breakpoint)
    );

    client.send(DebugCommand::Resume);
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_timeout_runs_nothing() {
    let (runner, output) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_millis(50));

    let err = runner.run_main(vec![], Some(manager)).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Debug(DebugError::HandshakeTimeout { .. })
    ));
    assert!(output.lines().is_empty());
    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_disconnect_while_suspended_lets_run_finish() {
    let (runner, output) = runner(PROGRAM);
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    manager.add_breakpoints([Breakpoint::new("fileA", 10), Breakpoint::new("fileA", 11)]);
    client.send(DebugCommand::Start);

    let run = {
        let manager = manager.clone();
        tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await })
    };

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    assert_eq!(suspended_at(client.next_event().await).0, at(10));
    drop(client);

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.values, vec![Value::Int(3)]);
    assert_eq!(output.lines(), vec!["3"]);
    assert!(manager.is_detached());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_named_worker_reports_its_name() {
    let (runner, _) = runner(
        r#"{
        "entry_package": "app",
        "functions": [{
            "name": "main", "package": "app",
            "default_worker": { "code_addr": 0 },
            "workers": [{ "name": "w1", "code_addr": 1 }]
        }],
        "code": [
            { "op": "Return" },
            { "op": "Nop" },
            { "op": "Return" }
        ],
        "line_numbers": [
            { "ip": 0, "source": "fileB", "line": 1 },
            { "ip": 1, "source": "fileB", "line": 20 }
        ]
    }"#,
    );
    let (manager, mut client) = DebugManager::new(Duration::from_secs(5));
    manager.add_breakpoints([Breakpoint::new("fileB", 20)]);
    client.send(DebugCommand::Start);

    let run = tokio::spawn(async move { runner.run_main(vec![], Some(manager)).await });

    assert_eq!(client.next_event().await, Some(DebugEvent::Ready));
    match client.next_event().await {
        Some(DebugEvent::Suspended {
            worker_name, frames, ..
        }) => {
            assert_eq!(worker_name, "w1");
            assert_eq!(frames[0].to_string(), "at main[w1] (fileB:20)");
        }
        other => panic!("expected a suspension, got {:?}", other),
    }

    client.send(DebugCommand::Resume);
    assert_eq!(client.next_event().await, Some(DebugEvent::Exit { status: 0 }));
    run.await.unwrap().unwrap();
}
