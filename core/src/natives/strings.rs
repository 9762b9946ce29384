//! String natives

use regex::Regex;

use super::{arg_str, expect_args, NativeContext, NativeRegistry};
use crate::errors::NativeError;
use crate::values::{ArrayRef, TypeTag, Value};

pub fn register(registry: &mut NativeRegistry) {
    registry.register("string.matchesWithRegex", native_matches_with_regex);
    registry.register("string.findAllWithRegex", native_find_all_with_regex);
    registry.register("string.replaceAllWithRegex", native_replace_all_with_regex);
    registry.register("string.length", native_length);
    registry.register("string.toUpperCase", native_to_upper_case);
    registry.register("string.contains", native_contains);
}

/// Pattern argument: a string, or a record with a string `pattern` field
fn arg_pattern(args: &[Value], index: usize) -> Result<String, NativeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(Value::Struct(record)) => match record.get_field("pattern") {
            Value::Str(s) => Ok(s),
            other => Err(NativeError::Argument {
                index,
                expected: "regex with a string pattern",
                found: other.type_tag(),
            }),
        },
        other => Err(NativeError::Argument {
            index,
            expected: "regex",
            found: other.map(Value::type_tag).unwrap_or(TypeTag::Null),
        }),
    }
}

/// Compile `pattern` so that it must match the whole input.
///
/// The pattern is validated on its own first: wrapping can balance an
/// otherwise invalid pattern such as `a)|(b`.
fn compile_anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)?;
    Regex::new(&format!("^(?:{})$", pattern))
}

/// string.matchesWithRegex(s, regex) (boolean, error?)
fn native_matches_with_regex(
    _ctx: &mut NativeContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 2)?;
    let s = arg_str(args, 0)?;
    let pattern = arg_pattern(args, 1)?;

    Ok(match compile_anchored(&pattern) {
        Ok(re) => vec![Value::Bool(re.is_match(s))],
        Err(e) => vec![Value::Bool(false), Value::error(e.to_string())],
    })
}

/// string.findAllWithRegex(s, regex) (string[], error?)
fn native_find_all_with_regex(
    _ctx: &mut NativeContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 2)?;
    let s = arg_str(args, 0)?;
    let pattern = arg_pattern(args, 1)?;

    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => return Ok(vec![Value::Null, Value::error(e.to_string())]),
    };
    let found = ArrayRef::from_strings(re.find_iter(s).map(|m| m.as_str()))
        .map_err(|e| NativeError::Failed(e.to_string()))?;
    Ok(vec![Value::Array(found)])
}

/// string.replaceAllWithRegex(s, regex, replacement) (string, error?)
fn native_replace_all_with_regex(
    _ctx: &mut NativeContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 3)?;
    let s = arg_str(args, 0)?;
    let pattern = arg_pattern(args, 1)?;
    let replacement = arg_str(args, 2)?;

    Ok(match Regex::new(&pattern) {
        Ok(re) => vec![Value::str(re.replace_all(s, replacement))],
        Err(e) => vec![Value::str(""), Value::error(e.to_string())],
    })
}

/// string.length(s) int, counted in characters
fn native_length(_ctx: &mut NativeContext<'_>, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 1)?;
    let s = arg_str(args, 0)?;
    Ok(vec![Value::Int(s.chars().count() as i64)])
}

fn native_to_upper_case(
    _ctx: &mut NativeContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 1)?;
    Ok(vec![Value::str(arg_str(args, 0)?.to_uppercase())])
}

fn native_contains(_ctx: &mut NativeContext<'_>, args: &[Value]) -> Result<Vec<Value>, NativeError> {
    expect_args(args, 2)?;
    let s = arg_str(args, 0)?;
    let needle = arg_str(args, 1)?;
    Ok(vec![Value::Bool(s.contains(needle))])
}
