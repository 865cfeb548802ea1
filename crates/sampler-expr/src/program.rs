// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::check::{self, CompiledExpr};
use crate::error::{CompileError, EvalError};
use crate::eval::{self, EvalContext};
use crate::inject::{self, StateConfig};
use crate::parser;
use crate::state::{CompleteState, SequenceState, StateSlot};
use crate::types::{Env, Type};
use crate::value::Value;

/// A compiled expression program bound to an environment.
///
/// Compilation parses the source, type-checks it against the environment,
/// verifies that the expression produces a boolean and runs the
/// state-injection pass. The program owns the state slots of every stateful
/// call site it contains, so evaluation takes `&mut self` and concurrent
/// evaluations of the same program must be serialized by the caller.
#[derive(Debug)]
pub struct Program {
    expr: CompiledExpr,
    state: Vec<StateSlot>,
}

impl Program {
    pub fn compile(env: &Env, source: &str) -> Result<Program, CompileError> {
        let ast = parser::parse(source)?;
        let (compiled, ty) = check::check(&ast, env)?;
        if ty != Type::Bool {
            return Err(CompileError::NotBoolean(ty));
        }
        let (expr, descriptors) = inject::inject_state(compiled)?;
        let state = descriptors
            .iter()
            .map(|descriptor| match descriptor.config {
                StateConfig::Sequence(order) => StateSlot::Sequence(SequenceState::new(order)),
                StateConfig::Complete(step) => StateSlot::Complete(CompleteState::new(step)),
            })
            .collect();
        Ok(Program { expr, state })
    }

    /// Evaluates the program with `sample` bound to the given value. The
    /// result is guaranteed boolean by the compile-time check.
    pub fn eval(&mut self, sample: &Value) -> Result<bool, EvalError> {
        let mut ctx = EvalContext {
            sample,
            state: &mut self.state,
        };
        match eval::eval(&self.expr, &mut ctx)? {
            Value::Bool(result) => Ok(result),
            other => Err(EvalError::Type {
                expected: "bool",
                got: other.kind(),
            }),
        }
    }

    /// Number of stateful call sites discovered at compile time.
    pub fn state_slots(&self) -> usize {
        self.state.len()
    }
}
