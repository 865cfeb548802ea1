// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tree-walking evaluator for compiled expressions. Values under a dynamic
//! schema are only known at runtime, so operators dispatch on the concrete
//! value kinds here; anything the checker could not rule out statically
//! surfaces as an [`EvalError`].

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::check::{CompiledExpr, Function};
use crate::error::EvalError;
use crate::state::StateSlot;
use crate::value::Value;

pub(crate) struct EvalContext<'a> {
    pub sample: &'a Value,
    pub state: &'a mut [StateSlot],
}

pub(crate) fn eval(expr: &CompiledExpr, ctx: &mut EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        CompiledExpr::Literal(literal) => Ok(literal_value(literal)),

        CompiledExpr::SampleRef => Ok(ctx.sample.clone()),

        CompiledExpr::StateRef(_) => Err(EvalError::Internal(
            "state reference evaluated outside of a stateful call",
        )),

        CompiledExpr::Member { operand, field } => {
            let operand = eval(operand, ctx)?;
            match operand {
                Value::Map(mut fields) => fields
                    .remove(field)
                    .ok_or_else(|| EvalError::NoSuchField(field.clone())),
                other => Err(EvalError::Type {
                    expected: "map",
                    got: other.kind(),
                }),
            }
        }

        CompiledExpr::Index { operand, index } => {
            let operand = eval(operand, ctx)?;
            let index = eval(index, ctx)?;
            match (operand, index) {
                (Value::List(mut items), index) => {
                    let i = index_value(&index)?;
                    if i < 0 || i as usize >= items.len() {
                        return Err(EvalError::IndexOutOfRange(i));
                    }
                    Ok(items.swap_remove(i as usize))
                }
                (Value::Map(mut fields), Value::String(key)) => fields
                    .remove(&key)
                    .ok_or(EvalError::NoSuchKey(key)),
                (Value::Map(_), other) => Err(EvalError::Type {
                    expected: "string",
                    got: other.kind(),
                }),
                (other, _) => Err(EvalError::Type {
                    expected: "list or map",
                    got: other.kind(),
                }),
            }
        }

        CompiledExpr::Unary { op, operand } => {
            let operand = eval(operand, ctx)?;
            match (op, operand) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Neg, Value::Int(i)) => {
                    i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow)
                }
                (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                (op, other) => Err(EvalError::Type {
                    expected: if *op == UnaryOp::Not { "bool" } else { "int or float" },
                    got: other.kind(),
                }),
            }
        }

        CompiledExpr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),

        CompiledExpr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            let cond = bool_value(eval(cond, ctx)?)?;
            if cond {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }

        CompiledExpr::Call { function, args } => eval_call(*function, args, ctx),

        CompiledExpr::List(elements) => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval(element, ctx)?);
            }
            Ok(Value::List(items))
        }

        CompiledExpr::Map(entries) => {
            let mut fields = std::collections::BTreeMap::new();
            for (key, value) in entries {
                let key = match eval(key, ctx)? {
                    Value::String(key) => key,
                    other => {
                        return Err(EvalError::Type {
                            expected: "string",
                            got: other.kind(),
                        })
                    }
                };
                fields.insert(key, eval(value, ctx)?);
            }
            Ok(Value::Map(fields))
        }
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &CompiledExpr,
    right: &CompiledExpr,
    ctx: &mut EvalContext<'_>,
) -> Result<Value, EvalError> {
    // && and || short-circuit; everything else evaluates both operands.
    match op {
        BinaryOp::And => {
            if !bool_value(eval(left, ctx)?)? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(bool_value(eval(right, ctx)?)?));
        }
        BinaryOp::Or => {
            if bool_value(eval(left, ctx)?)? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(bool_value(eval(right, ctx)?)?));
        }
        _ => {}
    }

    let left = eval(left, ctx)?;
    let right = eval(right, ctx)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(&left, &right)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => eval_in(&left, &right),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            eval_arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

// Equality is structural; numbers compare across int/uint/float kinds.
fn values_equal(left: &Value, right: &Value) -> bool {
    if let Some(ordering) = numeric_cmp(left, right) {
        return ordering == Ordering::Equal;
    }
    left == right
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    let as_float = |value: &Value| match value {
        Value::Int(v) => Some(*v as f64),
        Value::Uint(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    };
    match (as_float(left), as_float(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => None,
    }
}

fn compare_values(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    if let Some(ordering) = numeric_cmp(left, right) {
        return Ok(ordering);
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (l, r) => Err(EvalError::Type {
            expected: l.kind(),
            got: r.kind(),
        }),
    }
}

fn eval_in(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match right {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|item| values_equal(item, left)))),
        Value::Map(fields) => match left {
            Value::String(key) => Ok(Value::Bool(fields.contains_key(key))),
            other => Err(EvalError::Type {
                expected: "string",
                got: other.kind(),
            }),
        },
        other => Err(EvalError::Type {
            expected: "list or map",
            got: other.kind(),
        }),
    }
}

fn eval_arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => {
            let result = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.checked_div(r)
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.checked_rem(r)
                }
                _ => unreachable!(),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        (Value::Uint(l), Value::Uint(r)) => {
            let result = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.checked_div(r)
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.checked_rem(r)
                }
                _ => unreachable!(),
            };
            result.map(Value::Uint).ok_or(EvalError::Overflow)
        }
        (Value::Float(l), Value::Float(r)) => {
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Mod => l % r,
                _ => unreachable!(),
            };
            Ok(Value::Float(result))
        }
        (Value::String(l), Value::String(r)) if op == BinaryOp::Add => {
            Ok(Value::String(l + &r))
        }
        (l, r) => Err(EvalError::Type {
            expected: l.kind(),
            got: r.kind(),
        }),
    }
}

fn eval_call(
    function: Function,
    args: &[CompiledExpr],
    ctx: &mut EvalContext<'_>,
) -> Result<Value, EvalError> {
    match function {
        Function::Abs => {
            let value = eval(&args[0], ctx)?;
            match value {
                Value::Int(v) => v.checked_abs().map(Value::Int).ok_or(EvalError::Overflow),
                Value::Uint(v) => Ok(Value::Uint(v)),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                other => Err(EvalError::Type {
                    expected: "int, uint or float",
                    got: other.kind(),
                }),
            }
        }

        Function::Now => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|_| EvalError::Internal("system clock before unix epoch"))?;
            Ok(Value::Int(now.as_secs() as i64))
        }

        Function::SequenceWithState => {
            let value = eval(&args[0], ctx)?;
            let slot = state_slot(args, ctx)?;
            match &mut ctx.state[slot] {
                StateSlot::Sequence(state) => Ok(Value::Bool(state.call(&value)?)),
                StateSlot::Complete(_) => {
                    Err(EvalError::Internal("state slot kind mismatch"))
                }
            }
        }

        Function::CompleteWithState => {
            let value = eval(&args[0], ctx)?;
            let slot = state_slot(args, ctx)?;
            match &mut ctx.state[slot] {
                StateSlot::Complete(state) => Ok(Value::Bool(state.call(&value)?)),
                StateSlot::Sequence(_) => {
                    Err(EvalError::Internal("state slot kind mismatch"))
                }
            }
        }

        Function::Sequence | Function::Complete => Err(EvalError::Internal(
            "stateful call was not rewritten by the injection pass",
        )),
    }
}

fn state_slot(args: &[CompiledExpr], ctx: &EvalContext<'_>) -> Result<usize, EvalError> {
    match args.last() {
        Some(CompiledExpr::StateRef(slot)) if *slot < ctx.state.len() => Ok(*slot),
        _ => Err(EvalError::Internal("missing state slot argument")),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(v) => Value::Int(*v),
        Literal::Uint(v) => Value::Uint(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::String(v) => Value::String(v.clone()),
        Literal::Bool(v) => Value::Bool(*v),
        Literal::Null => Value::Null,
    }
}

fn bool_value(value: Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| EvalError::Type {
        expected: "bool",
        got: value.kind(),
    })
}

fn index_value(value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Uint(u) => Ok(*u as i64),
        other => Err(EvalError::Type {
            expected: "int",
            got: other.kind(),
        }),
    }
}
