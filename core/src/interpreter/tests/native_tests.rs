//! Tests for native calls from bytecode

use super::helpers::{expect_fault, runner};
use crate::errors::{ExecutionError, NativeError};
use crate::natives::{NativeContext, NativeRegistry};
use crate::values::Value;

const MATCHES: &str = r#"{
    "functions": [
        { "name": "check",
          "default_worker": { "code_addr": 0, "registers": { "strings": 2, "bools": 1, "refs": 1 } } },
        { "name": "check_record",
          "default_worker": { "code_addr": 2, "registers": { "strings": 2, "bools": 1, "refs": 2 } } }
    ],
    "code": [
        { "op": "NativeCall", "name": "string.matchesWithRegex",
          "args": [{ "str": 0 }, { "str": 1 }], "rets": [{ "bool": 0 }, { "ref": 0 }] },
        { "op": "Return", "values": [{ "bool": 0 }, { "ref": 0 }] },

        { "op": "NewStruct", "type_name": "RegExp", "dst": 1 },
        { "op": "FieldStore", "record": 1, "field": "pattern", "src": { "str": 1 } },
        { "op": "NativeCall", "name": "string.matchesWithRegex",
          "args": [{ "str": 0 }, { "ref": 1 }], "rets": [{ "bool": 0 }, { "ref": 0 }] },
        { "op": "Return", "values": [{ "bool": 0 }, { "ref": 0 }] }
    ]
}"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_regex_match_fills_both_targets() {
    let (runner, _) = runner(MATCHES);

    let values = runner
        .invoke("check", vec![Value::str("abc"), Value::str("a.c")])
        .await
        .unwrap();
    assert_eq!(values, vec![Value::Bool(true), Value::Null]);

    // Whole-input match only
    let values = runner
        .invoke("check", vec![Value::str("abc"), Value::str("b")])
        .await
        .unwrap();
    assert_eq!(values, vec![Value::Bool(false), Value::Null]);

    let values = runner
        .invoke("check_record", vec![Value::str("2024"), Value::str("[0-9]+")])
        .await
        .unwrap();
    assert_eq!(values, vec![Value::Bool(true), Value::Null]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_regex_is_a_recoverable_error() {
    let (runner, _) = runner(MATCHES);

    let values = runner
        .invoke("check", vec![Value::str("abc"), Value::str("a(")])
        .await
        .unwrap();
    assert_eq!(values[0], Value::Bool(false));
    assert!(matches!(values[1], Value::Error(_)));

    // Unbalanced on its own even though anchoring would balance it
    let values = runner
        .invoke("check", vec![Value::str("axyz"), Value::str("a)|(b")])
        .await
        .unwrap();
    assert_eq!(values[0], Value::Bool(false));
    assert!(matches!(values[1], Value::Error(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_native_faults() {
    let (runner, _) = runner(
        r#"{
        "functions": [{ "name": "f", "default_worker": { "code_addr": 0 } }],
        "code": [{ "op": "NativeCall", "name": "net.open" }]
    }"#,
    );

    let fault = expect_fault(runner.invoke("f", vec![]).await);
    assert_eq!(fault.error, ExecutionError::UnknownNative("net.open".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_error_faults_the_worker() {
    let (runner, _) = runner(
        r#"{
        "functions": [{ "name": "f", "default_worker": { "code_addr": 0, "registers": { "ints": 1 } } }],
        "code": [
            { "op": "NativeCall", "name": "string.length", "rets": [{ "int": 0 }] },
            { "op": "Return", "values": [{ "int": 0 }] }
        ]
    }"#,
    );

    let fault = expect_fault(runner.invoke("f", vec![]).await);
    assert_eq!(
        fault.error,
        ExecutionError::Native {
            name: "string.length".to_string(),
            message: NativeError::Arity {
                expected: 1,
                got: 0
            }
            .to_string(),
        }
    );
}

fn native_worker_name(
    ctx: &mut NativeContext<'_>,
    _args: &[Value],
) -> Result<Vec<Value>, NativeError> {
    Ok(vec![Value::str(ctx.worker.worker_name.clone())])
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_native_sees_its_worker() {
    let (runner, _) = runner(
        r#"{
        "functions": [{
            "name": "f",
            "default_worker": { "code_addr": 0, "registers": { "strings": 1 } }
        }],
        "code": [
            { "op": "NativeCall", "name": "test.worker_name", "rets": [{ "str": 0 }] },
            { "op": "Return", "values": [{ "str": 0 }] }
        ]
    }"#,
    );
    let mut natives = NativeRegistry::with_builtins();
    natives.register("test.worker_name", native_worker_name);
    let runner = runner.with_natives(natives);

    let values = runner.invoke("f", vec![]).await.unwrap();
    assert_eq!(values, vec![Value::str("default")]);
}
