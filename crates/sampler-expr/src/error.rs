// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::types::Type;

/// Errors raised while compiling an expression. No partial program is ever
/// produced: any of these rejects the whole build.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("couldn't parse expression: {0}")]
    Parse(String),

    #[error("unknown identifier {0}")]
    UnknownIdent(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("operator {op} is not defined for {left} and {right}")]
    BinaryTypeMismatch {
        op: String,
        left: Type,
        right: Type,
    },

    #[error("operator {op} is not defined for {operand}")]
    UnaryTypeMismatch { op: String, operand: Type },

    #[error("{function} is not defined for {got}")]
    ArgumentTypeMismatch { function: String, got: Type },

    #[error("message {message} has no field {field}")]
    UnknownField { message: String, field: String },

    #[error("{0} cannot be accessed by member or index")]
    NotIndexable(Type),

    #[error("expression expects return type of bool, not {0}")]
    NotBoolean(Type),

    #[error("{function} function second argument requires {expected}")]
    StatefulArgument {
        function: &'static str,
        expected: &'static str,
    },
}

/// Errors raised while evaluating a compiled program against one sample.
/// These are per-sample and non-fatal: the caller reports them and treats the
/// evaluation as a non-match.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("no such field {0}")]
    NoSuchField(String),

    #[error("no such key {0}")]
    NoSuchKey(String),

    #[error("index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("expected a {expected} value, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },

    #[error("{function} function requires an {expected} value, got {got}")]
    StatefulType {
        function: &'static str,
        expected: &'static str,
        got: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("internal evaluation error: {0}")]
    Internal(&'static str),
}
