//! Tests for calls, returns and the call-depth guard

use super::helpers::{expect_fault, runner};
use crate::config::RuntimeSettings;
use crate::errors::ExecutionError;
use crate::program::FunctionId;
use crate::values::Value;

const FACTORIAL: &str = r#"{
    "functions": [{
        "name": "fact",
        "default_worker": { "code_addr": 0, "registers": { "ints": 4, "bools": 1 } }
    }],
    "code": [
        { "op": "IConst", "dst": 1, "value": 1 },
        { "op": "ILe", "lhs": 0, "rhs": 1, "dst": 0 },
        { "op": "BrFalse", "cond": 0, "target": 4 },
        { "op": "Return", "values": [{ "int": 1 }] },
        { "op": "ISub", "lhs": 0, "rhs": 1, "dst": 2 },
        { "op": "Call", "function": 0, "args": [{ "int": 2 }], "rets": [{ "int": 3 }] },
        { "op": "IMul", "lhs": 0, "rhs": 3, "dst": 3 },
        { "op": "Return", "values": [{ "int": 3 }] }
    ],
    "line_numbers": [
        { "ip": 0, "source": "fact.bal", "line": 1 },
        { "ip": 4, "source": "fact.bal", "line": 2 }
    ]
}"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_call_writes_results_into_caller() {
    let (runner, _) = runner(
        r#"{
        "entry_package": "app",
        "functions": [
            { "name": "main", "package": "app",
              "default_worker": { "code_addr": 0, "registers": { "ints": 3 } } },
            { "name": "add", "package": "app",
              "default_worker": { "code_addr": 4, "registers": { "ints": 2 } } }
        ],
        "code": [
            { "op": "IConst", "dst": 0, "value": 2 },
            { "op": "IConst", "dst": 1, "value": 3 },
            { "op": "Call", "function": 1, "args": [{ "int": 0 }, { "int": 1 }], "rets": [{ "int": 2 }] },
            { "op": "Return", "values": [{ "int": 2 }] },
            { "op": "IAdd", "lhs": 0, "rhs": 1, "dst": 0 },
            { "op": "Return", "values": [{ "int": 0 }] }
        ]
    }"#,
    );

    let outcome = runner.run_main(vec![], None).await.unwrap();
    assert_eq!(outcome.values, vec![Value::Int(5)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recursion() {
    let (runner, _) = runner(FACTORIAL);
    let values = runner.invoke("fact", vec![Value::Int(10)]).await.unwrap();
    assert_eq!(values, vec![Value::Int(3_628_800)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_depth_is_bounded() {
    let (runner, _) = runner(FACTORIAL);
    let runner = runner.with_settings(RuntimeSettings { max_call_depth: 16 });

    let fault = expect_fault(runner.invoke("fact", vec![Value::Int(100)]).await);
    assert_eq!(fault.error, ExecutionError::StackOverflow { depth: 16 });
    assert_eq!(fault.stack_trace.len(), 16);
    assert!(fault
        .stack_trace
        .iter()
        .all(|entry| entry.function == "fact"));

    // Shallow enough still works
    let values = runner.invoke("fact", vec![Value::Int(5)]).await.unwrap();
    assert_eq!(values, vec![Value::Int(120)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_results_reset_targets_to_default() {
    let (runner, _) = runner(
        r#"{
        "functions": [
            { "name": "caller",
              "default_worker": { "code_addr": 0, "registers": { "ints": 1, "refs": 1 } } },
            { "name": "one",
              "default_worker": { "code_addr": 4, "registers": { "ints": 1 } } }
        ],
        "code": [
            { "op": "NewMap", "dst": 0 },
            { "op": "Call", "function": 1, "rets": [{ "int": 0 }, { "ref": 0 }] },
            { "op": "Return", "values": [{ "int": 0 }, { "ref": 0 }] },
            { "op": "Nop" },
            { "op": "IConst", "dst": 0, "value": 9 },
            { "op": "Return", "values": [{ "int": 0 }] }
        ]
    }"#,
    );

    let values = runner.invoke("caller", vec![]).await.unwrap();
    assert_eq!(values, vec![Value::Int(9), Value::Null]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fault_in_callee_reports_both_frames() {
    let (runner, _) = runner(
        r#"{
        "functions": [
            { "name": "outer", "default_worker": { "code_addr": 0 } },
            { "name": "inner", "default_worker": { "code_addr": 2, "registers": { "refs": 1 } } }
        ],
        "code": [
            { "op": "Call", "function": 1 },
            { "op": "Return" },
            { "op": "Throw", "error": 0 }
        ],
        "line_numbers": [
            { "ip": 0, "source": "app.bal", "line": 4 },
            { "ip": 2, "source": "app.bal", "line": 9 }
        ]
    }"#,
    );

    let fault = expect_fault(runner.invoke("outer", vec![]).await);
    assert_eq!(fault.error, ExecutionError::NullReference);
    let trace: Vec<String> = fault.stack_trace.iter().map(|e| e.to_string()).collect();
    assert_eq!(trace, vec!["at inner (app.bal:9)", "at outer (app.bal:4)"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_function() {
    let (runner, _) = runner(
        r#"{
        "functions": [{ "name": "f", "default_worker": { "code_addr": 0 } }],
        "code": [{ "op": "Call", "function": 7 }]
    }"#,
    );

    let fault = expect_fault(runner.invoke("f", vec![]).await);
    assert_eq!(fault.error, ExecutionError::UnknownFunction(FunctionId(7)));
}
