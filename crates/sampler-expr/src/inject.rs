// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! State-injection rewrite pass.
//!
//! Walks the checked tree depth-first, left-to-right, operand before
//! arguments. Every `sequence`/`complete` call found at any nesting depth is
//! rewritten to its state-aware overload with a fresh, monotonically-numbered
//! state-slot reference appended as a trailing argument. The pass produces a
//! new tree plus the descriptor list of every call site in traversal order;
//! the input tree is consumed, never mutated in place.

use crate::ast::Literal;
use crate::check::{CompiledExpr, Function};
use crate::error::CompileError;
use crate::state::Order;

/// Configuration parsed from the constant second argument of one stateful
/// call site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum StateConfig {
    Sequence(Order),
    Complete(f64),
}

/// One stateful call site discovered by the pass, in traversal order. The
/// slot index matches the `StateRef` argument appended to the rewritten call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StatefulFunctionDescriptor {
    pub slot: usize,
    pub config: StateConfig,
}

pub(crate) fn inject_state(
    expr: CompiledExpr,
) -> Result<(CompiledExpr, Vec<StatefulFunctionDescriptor>), CompileError> {
    let mut descriptors = Vec::new();
    let expr = walk(expr, &mut descriptors)?;
    Ok((expr, descriptors))
}

fn walk(
    expr: CompiledExpr,
    descriptors: &mut Vec<StatefulFunctionDescriptor>,
) -> Result<CompiledExpr, CompileError> {
    match expr {
        CompiledExpr::Literal(_) | CompiledExpr::SampleRef | CompiledExpr::StateRef(_) => Ok(expr),

        CompiledExpr::Member { operand, field } => Ok(CompiledExpr::Member {
            operand: Box::new(walk(*operand, descriptors)?),
            field,
        }),

        CompiledExpr::Index { operand, index } => Ok(CompiledExpr::Index {
            operand: Box::new(walk(*operand, descriptors)?),
            index: Box::new(walk(*index, descriptors)?),
        }),

        CompiledExpr::Unary { op, operand } => Ok(CompiledExpr::Unary {
            op,
            operand: Box::new(walk(*operand, descriptors)?),
        }),

        CompiledExpr::Binary { op, left, right } => Ok(CompiledExpr::Binary {
            op,
            left: Box::new(walk(*left, descriptors)?),
            right: Box::new(walk(*right, descriptors)?),
        }),

        CompiledExpr::Ternary {
            cond,
            then,
            otherwise,
        } => Ok(CompiledExpr::Ternary {
            cond: Box::new(walk(*cond, descriptors)?),
            then: Box::new(walk(*then, descriptors)?),
            otherwise: Box::new(walk(*otherwise, descriptors)?),
        }),

        CompiledExpr::Call { function, args } => walk_call(function, args, descriptors),

        CompiledExpr::List(elements) => Ok(CompiledExpr::List(
            elements
                .into_iter()
                .map(|element| walk(element, descriptors))
                .collect::<Result<Vec<_>, _>>()?,
        )),

        CompiledExpr::Map(entries) => Ok(CompiledExpr::Map(
            entries
                .into_iter()
                .map(|(key, value)| {
                    Ok((walk(key, descriptors)?, walk(value, descriptors)?))
                })
                .collect::<Result<Vec<_>, CompileError>>()?,
        )),
    }
}

fn walk_call(
    function: Function,
    args: Vec<CompiledExpr>,
    descriptors: &mut Vec<StatefulFunctionDescriptor>,
) -> Result<CompiledExpr, CompileError> {
    let (function, config) = match function {
        Function::Sequence => {
            let order = parse_order(&args[1])?;
            (Function::SequenceWithState, Some(StateConfig::Sequence(order)))
        }
        Function::Complete => {
            let step = parse_step(&args[1])?;
            (Function::CompleteWithState, Some(StateConfig::Complete(step)))
        }
        other => (other, None),
    };

    // The slot is allocated before descending into the arguments so call
    // sites are numbered in preorder.
    let slot = config.map(|config| {
        let slot = descriptors.len();
        descriptors.push(StatefulFunctionDescriptor { slot, config });
        slot
    });

    let mut args = args
        .into_iter()
        .map(|arg| walk(arg, descriptors))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(slot) = slot {
        args.push(CompiledExpr::StateRef(slot));
    }

    Ok(CompiledExpr::Call { function, args })
}

fn parse_order(arg: &CompiledExpr) -> Result<Order, CompileError> {
    let error = CompileError::StatefulArgument {
        function: "sequence",
        expected: "a constant string with value \"asc\" or \"desc\"",
    };
    match arg {
        CompiledExpr::Literal(Literal::String(order)) => match order.as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(error),
        },
        _ => Err(error),
    }
}

fn parse_step(arg: &CompiledExpr) -> Result<f64, CompileError> {
    match arg {
        CompiledExpr::Literal(Literal::Int(step)) => Ok(*step as f64),
        CompiledExpr::Literal(Literal::Uint(step)) => Ok(*step as f64),
        CompiledExpr::Literal(Literal::Float(step)) => Ok(*step),
        _ => Err(CompileError::StatefulArgument {
            function: "complete",
            expected: "a constant float or int",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check;
    use crate::parser::parse;
    use crate::types::Env;

    fn compile(source: &str) -> (CompiledExpr, Vec<StatefulFunctionDescriptor>) {
        let ast = parse(source).unwrap();
        let (compiled, _) = check(&ast, &Env::dynamic()).unwrap();
        inject_state(compiled).unwrap()
    }

    fn find_calls(expr: &CompiledExpr, out: &mut Vec<(Function, usize)>) {
        match expr {
            CompiledExpr::Call { function, args } => {
                if let Some(CompiledExpr::StateRef(slot)) = args.last() {
                    out.push((*function, *slot));
                }
                for arg in args {
                    find_calls(arg, out);
                }
            }
            CompiledExpr::Member { operand, .. } | CompiledExpr::Unary { operand, .. } => {
                find_calls(operand, out)
            }
            CompiledExpr::Index { operand, index } => {
                find_calls(operand, out);
                find_calls(index, out);
            }
            CompiledExpr::Binary { left, right, .. } => {
                find_calls(left, out);
                find_calls(right, out);
            }
            CompiledExpr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                find_calls(cond, out);
                find_calls(then, out);
                find_calls(otherwise, out);
            }
            CompiledExpr::List(elements) => elements.iter().for_each(|e| find_calls(e, out)),
            CompiledExpr::Map(entries) => entries.iter().for_each(|(k, v)| {
                find_calls(k, out);
                find_calls(v, out);
            }),
            _ => {}
        }
    }

    #[test]
    fn test_inject_appends_state_argument() {
        let (expr, descriptors) = compile(r#"sequence(sample.id, "asc")"#);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].slot, 0);
        assert_eq!(descriptors[0].config, StateConfig::Sequence(Order::Asc));

        let mut calls = Vec::new();
        find_calls(&expr, &mut calls);
        assert_eq!(calls, vec![(Function::SequenceWithState, 0)]);
    }

    #[test]
    fn test_inject_numbers_slots_in_traversal_order() {
        let (expr, descriptors) = compile(
            r#"sequence(sample.a, "asc") && complete(sample.b, 1) || sequence(sample.c, "desc")"#,
        );
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].config, StateConfig::Sequence(Order::Asc));
        assert_eq!(descriptors[1].config, StateConfig::Complete(1.0));
        assert_eq!(descriptors[2].config, StateConfig::Sequence(Order::Desc));
        assert_eq!(
            descriptors.iter().map(|d| d.slot).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let mut calls = Vec::new();
        find_calls(&expr, &mut calls);
        assert_eq!(calls.len(), 3);
    }

    #[test]
    fn test_inject_finds_nested_calls() {
        let (_, descriptors) = compile(r#"[complete(sample.a, 2)][0] == true"#);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].config, StateConfig::Complete(2.0));
    }

    #[test]
    fn test_inject_rejects_non_constant_order() {
        let ast = parse(r#"sequence(sample.id, sample.order)"#).unwrap();
        let (compiled, _) = check(&ast, &Env::dynamic()).unwrap();
        let err = inject_state(compiled).unwrap_err();
        assert!(matches!(
            err,
            CompileError::StatefulArgument { function: "sequence", .. }
        ));
    }

    #[test]
    fn test_inject_rejects_bad_order_value() {
        let ast = parse(r#"sequence(sample.id, "up")"#).unwrap();
        let (compiled, _) = check(&ast, &Env::dynamic()).unwrap();
        assert!(inject_state(compiled).is_err());
    }

    #[test]
    fn test_inject_rejects_non_constant_step() {
        let ast = parse(r#"complete(sample.id, sample.step)"#).unwrap();
        let (compiled, _) = check(&ast, &Env::dynamic()).unwrap();
        let err = inject_state(compiled).unwrap_err();
        assert!(matches!(
            err,
            CompileError::StatefulArgument { function: "complete", .. }
        ));
    }

    #[test]
    fn test_inject_leaves_stateless_calls_alone() {
        let (expr, descriptors) = compile(r#"abs(sample.id) == 1"#);
        assert!(descriptors.is_empty());
        let mut calls = Vec::new();
        find_calls(&expr, &mut calls);
        assert!(calls.is_empty());
    }
}
