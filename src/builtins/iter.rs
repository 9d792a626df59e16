//! Iteration built-ins: `each`, `range`, `take`, `drop`, `count`, `all`,
//! `repeat`, `constantly` (SPEC_FULL.md §4.6). Grounded in the teacher's
//! `commands/seq` (numeric ranges) and `commands/head`/`wc` (take/count)
//! for the argument shapes, generalized from lines of text to the value
//! channel.

use std::sync::Arc;

use crate::closure::{CallArgs, Callable, NativeBuiltin};
use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

use super::builtin;

fn input_values(ctx: &mut crate::eval::EvalCtx, args: &CallArgs) -> Vec<Value> {
    if let Some(list_arg) = args.positional.get(1) {
        list_arg.as_list().map(|s| s.to_vec()).unwrap_or_default()
    } else {
        ctx.ports.stdin.values.drain_all()
    }
}

fn parse_num(v: &Value, what: &str) -> EvalResult<f64> {
    v.as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("{what}: not a number: {}", v.repr()))))
}

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "each",
            builtin("each", 1, Some(2), vec![], Arc::new(|ctx, args| {
                let f = args.positional[0]
                    .as_callable()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("each expects a fn as its first argument".into())))?
                    .clone();
                for v in input_values(ctx, &args) {
                    ctx.invoke(&f, CallArgs::new(vec![v], Default::default()))?;
                }
                Ok(())
            })),
        ),
        (
            "range",
            builtin("range", 1, Some(2), vec![("step", Value::str("1"))], Arc::new(|ctx, args| {
                let (begin, end) = match args.positional.len() {
                    1 => (0.0, parse_num(&args.positional[0], "range")?),
                    _ => (
                        parse_num(&args.positional[0], "range")?,
                        parse_num(&args.positional[1], "range")?,
                    ),
                };
                let step = parse_num(args.options.get("step").unwrap(), "range")?;
                if step == 0.0 {
                    return Err(Exception::new(Cause::ArgKindError("range: &step must not be 0".into())));
                }
                let mut i = begin;
                while (step > 0.0 && i < end) || (step < 0.0 && i > end) {
                    ctx.ports.stdout.values.put(Value::str(format_num(i)))?;
                    i += step;
                }
                Ok(())
            })),
        ),
        (
            "take",
            builtin("take", 1, Some(2), vec![], Arc::new(|ctx, args| {
                let n = parse_num(&args.positional[0], "take")? as usize;
                let items = input_values(ctx, &args);
                for v in items.into_iter().take(n) {
                    ctx.ports.stdout.values.put(v)?;
                }
                Ok(())
            })),
        ),
        (
            "drop",
            builtin("drop", 1, Some(2), vec![], Arc::new(|ctx, args| {
                let n = parse_num(&args.positional[0], "drop")? as usize;
                let items = input_values(ctx, &args);
                for v in items.into_iter().skip(n) {
                    ctx.ports.stdout.values.put(v)?;
                }
                Ok(())
            })),
        ),
        (
            "count",
            builtin("count", 0, Some(1), vec![], Arc::new(|ctx, args| {
                let n = if let Some(v) = args.positional.first() {
                    v.as_list().map(|l| l.len()).unwrap_or(1)
                } else {
                    ctx.ports.stdin.values.drain_all().len()
                };
                ctx.ports.stdout.values.put(Value::str(n.to_string()))
            })),
        ),
        (
            "all",
            builtin("all", 0, Some(1), vec![], Arc::new(|ctx, args| {
                for v in input_values(ctx, &args) {
                    ctx.ports.stdout.values.put(v)?;
                }
                Ok(())
            })),
        ),
        (
            "repeat",
            builtin("repeat", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let n = parse_num(&args.positional[0], "repeat")? as usize;
                let v = args.positional[1].clone();
                for _ in 0..n {
                    ctx.ports.stdout.values.put(v.clone())?;
                }
                Ok(())
            })),
        ),
        (
            "constantly",
            builtin("constantly", 1, Some(1), vec![], Arc::new(|ctx, args| {
                let v = args.positional[0].clone();
                let captured = v.clone();
                let wrapped = Value::Fn(Arc::new(Callable::Native(Arc::new(NativeBuiltin {
                    name: "constantly-closure",
                    min_args: 0,
                    max_args: Some(0),
                    options: vec![],
                    func: Arc::new(move |ctx, _args| ctx.ports.stdout.values.put(captured.clone())),
                }))));
                ctx.ports.stdout.values.put(wrapped)
            })),
        ),
    ]
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
