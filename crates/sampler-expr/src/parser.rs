// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! pest-backed parser turning expression source into the untyped [`Expr`] tree.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::CompileError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct ExprParser;

pub(crate) fn parse(source: &str) -> Result<Expr, CompileError> {
    let mut pairs = ExprParser::parse(Rule::root, source)
        .map_err(|err| CompileError::Parse(err.to_string()))?;
    let root = pairs.next().ok_or_else(|| {
        CompileError::Parse("empty expression".to_string())
    })?;
    let expression = root
        .into_inner()
        .find(|pair| pair.as_rule() == Rule::expression)
        .ok_or_else(|| CompileError::Parse("empty expression".to_string()))?;
    build_expression(expression)
}

fn build_expression(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    build_ternary(only_inner(pair))
}

fn only_inner(pair: Pair<'_, Rule>) -> Pair<'_, Rule> {
    pair.into_inner().next().expect("grammar guarantees one inner node")
}

fn build_ternary(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let cond = build_or(inner.next().expect("ternary has a first operand"))?;
    match (inner.next(), inner.next()) {
        (Some(then), Some(otherwise)) => Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(build_ternary(then)?),
            otherwise: Box::new(build_ternary(otherwise)?),
        }),
        _ => Ok(cond),
    }
}

fn build_or(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_and(inner.next().expect("or has a first operand"))?;
    for operand in inner {
        expr = Expr::Binary {
            op: BinaryOp::Or,
            left: Box::new(expr),
            right: Box::new(build_and(operand)?),
        };
    }
    Ok(expr)
}

fn build_and(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_rel(inner.next().expect("and has a first operand"))?;
    for operand in inner {
        expr = Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(expr),
            right: Box::new(build_rel(operand)?),
        };
    }
    Ok(expr)
}

fn build_rel(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let left = build_additive(inner.next().expect("relation has a left operand"))?;
    let Some(op_pair) = inner.next() else {
        return Ok(left);
    };
    let op = match op_pair.as_str().trim() {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "in" => BinaryOp::In,
        other => return Err(CompileError::Parse(format!("unknown operator {other}"))),
    };
    let right = build_additive(inner.next().expect("relation has a right operand"))?;
    Ok(Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn build_additive(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_multiplicative(inner.next().expect("addition has a first operand"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            other => return Err(CompileError::Parse(format!("unknown operator {other}"))),
        };
        let operand = inner.next().expect("addition has a right operand");
        expr = Expr::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(build_multiplicative(operand)?),
        };
    }
    Ok(expr)
}

fn build_multiplicative(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_unary(inner.next().expect("multiplication has a first operand"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            other => return Err(CompileError::Parse(format!("unknown operator {other}"))),
        };
        let operand = inner.next().expect("multiplication has a right operand");
        expr = Expr::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(build_unary(operand)?),
        };
    }
    Ok(expr)
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut ops = Vec::new();
    let mut operand = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::unary_op => ops.push(match part.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                other => return Err(CompileError::Parse(format!("unknown operator {other}"))),
            }),
            Rule::postfix_expr => operand = Some(build_postfix(part)?),
            _ => unreachable!("unexpected node in unary expression"),
        }
    }
    let mut expr = operand.expect("unary expression has an operand");
    for op in ops.into_iter().rev() {
        expr = fold_negation(op, expr);
    }
    Ok(expr)
}

// Numeric negation of a literal is folded into the constant so that
// `complete(sample.id, -1)` still sees a constant second argument.
fn fold_negation(op: UnaryOp, operand: Expr) -> Expr {
    if op == UnaryOp::Neg {
        match operand {
            Expr::Literal(Literal::Int(v)) => return Expr::Literal(Literal::Int(-v)),
            Expr::Literal(Literal::Float(v)) => return Expr::Literal(Literal::Float(-v)),
            other => {
                return Expr::Unary {
                    op,
                    operand: Box::new(other),
                }
            }
        }
    }
    Expr::Unary {
        op,
        operand: Box::new(operand),
    }
}

fn build_postfix(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_primary(inner.next().expect("postfix expression has a primary"))?;
    for postfix in inner {
        let part = only_inner(postfix);
        match part.as_rule() {
            Rule::member => {
                let field = only_inner(part).as_str().to_string();
                expr = Expr::Member {
                    operand: Box::new(expr),
                    field,
                };
            }
            Rule::index => {
                let index = build_expression(only_inner(part))?;
                expr = Expr::Index {
                    operand: Box::new(expr),
                    index: Box::new(index),
                };
            }
            _ => unreachable!("unexpected postfix node"),
        }
    }
    Ok(expr)
}

fn build_primary(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let part = only_inner(pair);
    match part.as_rule() {
        Rule::literal => build_literal(part),
        Rule::call => {
            let mut inner = part.into_inner();
            let function = inner.next().expect("call has a function name").as_str().to_string();
            let args = match inner.next() {
                Some(list) => list
                    .into_inner()
                    .map(build_expression)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Expr::Call { function, args })
        }
        Rule::ident => Ok(Expr::Ident(part.as_str().to_string())),
        Rule::list => {
            let elements = match part.into_inner().next() {
                Some(list) => list
                    .into_inner()
                    .map(build_expression)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Expr::List(elements))
        }
        Rule::map => {
            let mut entries = Vec::new();
            for entry in part.into_inner() {
                let mut kv = entry.into_inner();
                let key = build_expression(kv.next().expect("map entry has a key"))?;
                let value = build_expression(kv.next().expect("map entry has a value"))?;
                entries.push((key, value));
            }
            Ok(Expr::Map(entries))
        }
        Rule::paren => build_expression(only_inner(part)),
        other => Err(CompileError::Parse(format!("unexpected node {other:?}"))),
    }
}

fn build_literal(pair: Pair<'_, Rule>) -> Result<Expr, CompileError> {
    let part = only_inner(pair);
    let text = part.as_str();
    let literal = match part.as_rule() {
        Rule::float_lit => Literal::Float(
            text.parse::<f64>()
                .map_err(|err| CompileError::Parse(format!("invalid float literal {text}: {err}")))?,
        ),
        Rule::uint_lit => Literal::Uint(
            text[..text.len() - 1]
                .parse::<u64>()
                .map_err(|err| CompileError::Parse(format!("invalid uint literal {text}: {err}")))?,
        ),
        Rule::int_lit => Literal::Int(
            text.parse::<i64>()
                .map_err(|err| CompileError::Parse(format!("invalid int literal {text}: {err}")))?,
        ),
        Rule::string_lit => Literal::String(unescape(&text[1..text.len() - 1])),
        Rule::bool_lit => Literal::Bool(text == "true"),
        Rule::null_lit => Literal::Null,
        other => return Err(CompileError::Parse(format!("unexpected literal {other:?}"))),
    };
    Ok(Expr::Literal(literal))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comparison() {
        let expr = parse(r#"sample.id == 2"#).unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(Expr::Member {
                    operand: Box::new(Expr::Ident("sample".to_string())),
                    field: "id".to_string(),
                }),
                right: Box::new(Expr::Literal(Literal::Int(2))),
            }
        );
    }

    #[test]
    fn test_parse_precedence() {
        // a || b && c parses as a || (b && c)
        let expr = parse(r#"sample.a == 1 || sample.b == 2 && sample.c == 3"#).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, right, .. } => match *right {
                Expr::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("expected && on the right, got {other:?}"),
            },
            other => panic!("expected || at the top, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_call_with_args() {
        let expr = parse(r#"sequence(sample.id, "asc")"#).unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: "sequence".to_string(),
                args: vec![
                    Expr::Member {
                        operand: Box::new(Expr::Ident("sample".to_string())),
                        field: "id".to_string(),
                    },
                    Expr::Literal(Literal::String("asc".to_string())),
                ],
            }
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("1 == 1").is_ok(), true);
        assert_eq!(
            parse("2u == 2u").unwrap(),
            Expr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(Expr::Literal(Literal::Uint(2))),
                right: Box::new(Expr::Literal(Literal::Uint(2))),
            }
        );
        assert_eq!(
            parse("-1.5 < 0.0").unwrap(),
            Expr::Binary {
                op: BinaryOp::Lt,
                left: Box::new(Expr::Literal(Literal::Float(-1.5))),
                right: Box::new(Expr::Literal(Literal::Float(0.0))),
            }
        );
    }

    #[test]
    fn test_parse_negative_literal_folds() {
        let expr = parse("complete(sample.id, -2)").unwrap();
        match expr {
            Expr::Call { args, .. } => {
                assert_eq!(args[1], Expr::Literal(Literal::Int(-2)));
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_index_and_in() {
        let expr = parse(r#"sample.tags[0] in ["a", "b"]"#).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::In, left, right } => {
                assert!(matches!(*left, Expr::Index { .. }));
                assert!(matches!(*right, Expr::List(ref elems) if elems.len() == 2));
            }
            other => panic!("expected in, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_escapes() {
        let expr = parse(r#"sample.msg == "a\"b\n""#).unwrap();
        match expr {
            Expr::Binary { right, .. } => {
                assert_eq!(*right, Expr::Literal(Literal::String("a\"b\n".to_string())));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("sample.id ==").is_err());
        assert!(parse("sample.id = 1").is_err());
        assert!(parse("(sample.id == 1").is_err());
    }
}
