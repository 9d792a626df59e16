//! Arithmetic built-ins: `+ - * / ^ % ==` (SPEC_FULL.md §4.6). Numbers are
//! not a distinct value kind (§3): every operand is a `Str` parsed on demand,
//! matching the grounding in the teacher's arithmetic expansion
//! (`interpreter/expansion` handles `$((...))` over its own string-typed
//! variables the same way). `0x`-prefixed operands parse as hex integers.

use std::sync::Arc;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

use super::builtin;

fn parse(v: &Value) -> EvalResult<f64> {
    let s = v
        .as_str()
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("not a number: {}", v.repr()))))?;
    let trimmed = s.trim();
    let (neg, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(|n| if neg { -n } else { n } as f64)
            .map_err(|_| Exception::new(Cause::ArgKindError(format!("not a number: {}", v.repr()))));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| Exception::new(Cause::ArgKindError(format!("not a number: {}", v.repr()))))
}

fn format_num(n: f64) -> String {
    if n.is_infinite() {
        if n > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn fold(args: Vec<Value>, identity: f64, op: impl Fn(f64, f64) -> f64) -> EvalResult<Value> {
    if args.is_empty() {
        return Ok(Value::str(format_num(identity)));
    }
    let mut nums = args.iter().map(parse);
    let mut acc = nums.next().unwrap()?;
    for n in nums {
        acc = op(acc, n?);
    }
    Ok(Value::str(format_num(acc)))
}

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "+",
            builtin("+", 0, None, vec![], Arc::new(|ctx, args| {
                ctx.ports.stdout.values.put(fold(args.positional, 0.0, |a, b| a + b)?)
            })),
        ),
        (
            "*",
            builtin("*", 0, None, vec![], Arc::new(|ctx, args| {
                ctx.ports.stdout.values.put(fold(args.positional, 1.0, |a, b| a * b)?)
            })),
        ),
        (
            "-",
            builtin("-", 1, None, vec![], Arc::new(|ctx, args| {
                let mut nums = args.positional.iter().map(parse);
                let first = nums.next().unwrap()?;
                let result = if args.positional.len() == 1 {
                    -first
                } else {
                    nums.try_fold(first, |acc, n| n.map(|n| acc - n))?
                };
                ctx.ports.stdout.values.put(Value::str(format_num(result)))
            })),
        ),
        (
            "/",
            builtin("/", 1, None, vec![], Arc::new(|ctx, args| {
                let mut nums = args.positional.iter().map(parse);
                let first = nums.next().unwrap()?;
                let result = if args.positional.len() == 1 {
                    1.0 / first
                } else {
                    let mut acc = first;
                    for n in nums {
                        acc /= n?;
                    }
                    acc
                };
                ctx.ports.stdout.values.put(Value::str(format_num(result)))
            })),
        ),
        (
            "^",
            builtin("^", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let base = parse(&args.positional[0])?;
                let exp = parse(&args.positional[1])?;
                ctx.ports.stdout.values.put(Value::str(format_num(base.powf(exp))))
            })),
        ),
        (
            "%",
            builtin("%", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let a = parse(&args.positional[0])?;
                let b = parse(&args.positional[1])?;
                if b == 0.0 {
                    return Err(Exception::new(Cause::ArgKindError("modulo by zero".into())));
                }
                ctx.ports.stdout.values.put(Value::str(format_num(a % b)))
            })),
        ),
        (
            "==",
            builtin("==", 1, None, vec![], Arc::new(|ctx, args| {
                let mut nums = args.positional.iter().map(parse);
                let first = nums.next().unwrap()?;
                let mut all_eq = true;
                for n in nums {
                    if n? != first {
                        all_eq = false;
                    }
                }
                ctx.ports.stdout.values.put(Value::bool(all_eq))
            })),
        ),
        (
            "<",
            builtin("<", 2, None, vec![], Arc::new(|ctx, args| {
                let nums: Vec<f64> = args
                    .positional
                    .iter()
                    .map(parse)
                    .collect::<EvalResult<_>>()?;
                let ordered = nums.windows(2).all(|w| w[0] < w[1]);
                ctx.ports.stdout.values.put(Value::bool(ordered))
            })),
        ),
        (
            ">",
            builtin(">", 2, None, vec![], Arc::new(|ctx, args| {
                let nums: Vec<f64> = args
                    .positional
                    .iter()
                    .map(parse)
                    .collect::<EvalResult<_>>()?;
                let ordered = nums.windows(2).all(|w| w[0] > w[1]);
                ctx.ports.stdout.values.put(Value::bool(ordered))
            })),
        ),
    ]
}
