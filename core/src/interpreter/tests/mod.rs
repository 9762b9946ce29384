//! Tests for the interpreter
//!
//! Organized by feature area

mod call_tests;
mod debug_tests;
mod helpers;
mod native_tests;
