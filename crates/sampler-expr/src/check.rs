// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Type checker. Walks the parsed tree, verifies it against the environment
//! and lowers it into a compiled tree with resolved function overloads.
//!
//! Dynamic schemas type almost everything under `sample` as `dyn`, so most of
//! the checking there happens at evaluation time; message schemas check member
//! accesses against the declared fields.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::CompileError;
use crate::types::{Env, Type};

/// Resolved built-in overload of a call node. The `WithState` variants only
/// appear after the state-injection pass has rewritten the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Function {
    Abs,
    Now,
    Sequence,
    Complete,
    SequenceWithState,
    CompleteWithState,
}

/// Checked expression tree. Mirrors [`Expr`] with identifiers resolved against
/// the environment, function overloads resolved, and an extra [`StateRef`]
/// node kind used by the state-injection pass.
///
/// [`StateRef`]: CompiledExpr::StateRef
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CompiledExpr {
    Literal(Literal),
    SampleRef,
    StateRef(usize),
    Member {
        operand: Box<CompiledExpr>,
        field: String,
    },
    Index {
        operand: Box<CompiledExpr>,
        index: Box<CompiledExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<CompiledExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    Ternary {
        cond: Box<CompiledExpr>,
        then: Box<CompiledExpr>,
        otherwise: Box<CompiledExpr>,
    },
    Call {
        function: Function,
        args: Vec<CompiledExpr>,
    },
    List(Vec<CompiledExpr>),
    Map(Vec<(CompiledExpr, CompiledExpr)>),
}

pub(crate) fn check(expr: &Expr, env: &Env) -> Result<(CompiledExpr, Type), CompileError> {
    match expr {
        Expr::Literal(literal) => {
            let ty = literal_type(literal);
            Ok((CompiledExpr::Literal(literal.clone()), ty))
        }

        Expr::Ident(name) => {
            let ty = env
                .ident_type(name)
                .ok_or_else(|| CompileError::UnknownIdent(name.clone()))?;
            Ok((CompiledExpr::SampleRef, ty))
        }

        Expr::Member { operand, field } => {
            let (operand, operand_ty) = check(operand, env)?;
            let ty = member_type(&operand_ty, field)?;
            Ok((
                CompiledExpr::Member {
                    operand: Box::new(operand),
                    field: field.clone(),
                },
                ty,
            ))
        }

        Expr::Index { operand, index } => {
            let (operand, operand_ty) = check(operand, env)?;
            let (index, _) = check(index, env)?;
            let ty = match operand_ty {
                Type::Dyn => Type::Dyn,
                Type::List(elem) => *elem,
                Type::Map(_, value) => *value,
                other => return Err(CompileError::NotIndexable(other)),
            };
            Ok((
                CompiledExpr::Index {
                    operand: Box::new(operand),
                    index: Box::new(index),
                },
                ty,
            ))
        }

        Expr::Unary { op, operand } => {
            let (operand, operand_ty) = check(operand, env)?;
            let ty = match op {
                UnaryOp::Not if matches!(operand_ty, Type::Bool | Type::Dyn) => Type::Bool,
                UnaryOp::Neg if matches!(operand_ty, Type::Int | Type::Float) => operand_ty,
                UnaryOp::Neg if operand_ty.is_dyn() => Type::Dyn,
                _ => {
                    return Err(CompileError::UnaryTypeMismatch {
                        op: unary_symbol(*op).to_string(),
                        operand: operand_ty,
                    })
                }
            };
            Ok((
                CompiledExpr::Unary {
                    op: *op,
                    operand: Box::new(operand),
                },
                ty,
            ))
        }

        Expr::Binary { op, left, right } => {
            let (left, left_ty) = check(left, env)?;
            let (right, right_ty) = check(right, env)?;
            let ty = binary_type(*op, &left_ty, &right_ty)?;
            Ok((
                CompiledExpr::Binary {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                ty,
            ))
        }

        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            let (cond, cond_ty) = check(cond, env)?;
            if !matches!(cond_ty, Type::Bool | Type::Dyn) {
                return Err(CompileError::UnaryTypeMismatch {
                    op: "?:".to_string(),
                    operand: cond_ty,
                });
            }
            let (then, then_ty) = check(then, env)?;
            let (otherwise, otherwise_ty) = check(otherwise, env)?;
            let ty = if then_ty == otherwise_ty { then_ty } else { Type::Dyn };
            Ok((
                CompiledExpr::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                ty,
            ))
        }

        Expr::Call { function, args } => check_call(function, args, env),

        Expr::List(elements) => {
            let mut compiled = Vec::with_capacity(elements.len());
            let mut elem_ty: Option<Type> = None;
            for element in elements {
                let (element, ty) = check(element, env)?;
                elem_ty = Some(match elem_ty {
                    None => ty,
                    Some(prev) if prev == ty => prev,
                    Some(_) => Type::Dyn,
                });
                compiled.push(element);
            }
            Ok((
                CompiledExpr::List(compiled),
                Type::List(Box::new(elem_ty.unwrap_or(Type::Dyn))),
            ))
        }

        Expr::Map(entries) => {
            let mut compiled = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let (key, key_ty) = check(key, env)?;
                if !matches!(key_ty, Type::String | Type::Dyn) {
                    return Err(CompileError::BinaryTypeMismatch {
                        op: "map key".to_string(),
                        left: key_ty,
                        right: Type::String,
                    });
                }
                let (value, _) = check(value, env)?;
                compiled.push((key, value));
            }
            Ok((
                CompiledExpr::Map(compiled),
                Type::Map(Box::new(Type::String), Box::new(Type::Dyn)),
            ))
        }
    }
}

fn check_call(
    function: &str,
    args: &[Expr],
    env: &Env,
) -> Result<(CompiledExpr, Type), CompileError> {
    let (resolved, expected_arity) = match function {
        "abs" => (Function::Abs, 1),
        "now" => (Function::Now, 0),
        "sequence" => (Function::Sequence, 2),
        "complete" => (Function::Complete, 2),
        other => return Err(CompileError::UnknownFunction(other.to_string())),
    };
    if args.len() != expected_arity {
        return Err(CompileError::Arity {
            function: function.to_string(),
            expected: expected_arity,
            got: args.len(),
        });
    }

    let mut compiled = Vec::with_capacity(args.len());
    let mut arg_types = Vec::with_capacity(args.len());
    for arg in args {
        let (arg, ty) = check(arg, env)?;
        compiled.push(arg);
        arg_types.push(ty);
    }

    let ty = match resolved {
        Function::Abs => match &arg_types[0] {
            Type::Int | Type::Uint | Type::Float => arg_types[0].clone(),
            Type::Dyn => Type::Dyn,
            other => {
                return Err(CompileError::ArgumentTypeMismatch {
                    function: function.to_string(),
                    got: other.clone(),
                })
            }
        },
        Function::Now => Type::Int,
        Function::Sequence => {
            if !matches!(
                arg_types[0],
                Type::Int | Type::Uint | Type::Float | Type::String | Type::Dyn
            ) {
                return Err(CompileError::ArgumentTypeMismatch {
                    function: function.to_string(),
                    got: arg_types[0].clone(),
                });
            }
            if !matches!(arg_types[1], Type::String | Type::Dyn) {
                return Err(CompileError::StatefulArgument {
                    function: "sequence",
                    expected: "a constant string with value \"asc\" or \"desc\"",
                });
            }
            Type::Bool
        }
        Function::Complete => {
            if !(arg_types[0].is_numeric() || arg_types[0].is_dyn()) {
                return Err(CompileError::ArgumentTypeMismatch {
                    function: function.to_string(),
                    got: arg_types[0].clone(),
                });
            }
            if !(arg_types[1].is_numeric() || arg_types[1].is_dyn()) {
                return Err(CompileError::StatefulArgument {
                    function: "complete",
                    expected: "a constant float or int",
                });
            }
            Type::Bool
        }
        Function::SequenceWithState | Function::CompleteWithState => {
            unreachable!("state overloads are only produced by the injection pass")
        }
    };

    Ok((
        CompiledExpr::Call {
            function: resolved,
            args: compiled,
        },
        ty,
    ))
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Int(_) => Type::Int,
        Literal::Uint(_) => Type::Uint,
        Literal::Float(_) => Type::Float,
        Literal::String(_) => Type::String,
        Literal::Bool(_) => Type::Bool,
        Literal::Null => Type::Null,
    }
}

fn member_type(operand: &Type, field: &str) -> Result<Type, CompileError> {
    match operand {
        Type::Dyn => Ok(Type::Dyn),
        Type::Map(_, value) => Ok((**value).clone()),
        Type::Message(desc) => {
            let descriptor = desc
                .field_by_name(field)
                .ok_or_else(|| CompileError::UnknownField {
                    message: desc.full_name().to_string(),
                    field: field.to_string(),
                })?;
            Ok(crate::types::field_type(descriptor.runtime_field_type()))
        }
        other => Err(CompileError::NotIndexable(other.clone())),
    }
}

fn binary_type(op: BinaryOp, left: &Type, right: &Type) -> Result<Type, CompileError> {
    let mismatch = || CompileError::BinaryTypeMismatch {
        op: op.to_string(),
        left: left.clone(),
        right: right.clone(),
    };

    match op {
        BinaryOp::Or | BinaryOp::And => {
            if matches!(left, Type::Bool | Type::Dyn) && matches!(right, Type::Bool | Type::Dyn) {
                Ok(Type::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            if left.is_dyn()
                || right.is_dyn()
                || left == right
                || (left.is_numeric() && right.is_numeric())
            {
                Ok(Type::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let comparable = |ty: &Type| ty.is_numeric() || matches!(ty, Type::String | Type::Dyn);
            if comparable(left) && comparable(right) {
                Ok(Type::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::In => {
            if matches!(right, Type::List(_) | Type::Map(..) | Type::Dyn) {
                Ok(Type::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Add => match (left, right) {
            (Type::String, Type::String) => Ok(Type::String),
            _ => arithmetic_type(left, right).ok_or_else(mismatch),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic_type(left, right).ok_or_else(mismatch)
        }
    }
}

fn arithmetic_type(left: &Type, right: &Type) -> Option<Type> {
    match (left, right) {
        (Type::Dyn, other) | (other, Type::Dyn)
            if other.is_numeric() || other.is_dyn() =>
        {
            Some(Type::Dyn)
        }
        (Type::Int, Type::Int) => Some(Type::Int),
        (Type::Uint, Type::Uint) => Some(Type::Uint),
        (Type::Float, Type::Float) => Some(Type::Float),
        _ => None,
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
        UnaryOp::Neg => "-",
    }
}
