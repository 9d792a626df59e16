//! String built-ins (SPEC_FULL.md §4.6): `has-prefix`, `has-suffix`,
//! `has-value`, `==s`, `<s`, `joins`, `splits`, `replaces`, `ord`, `base`,
//! `wcswidth`. Grounded in the teacher's `commands/tr`, `commands/cut` for
//! string manipulation shape; `wcswidth` uses the `unicode-width` crate the
//! way `query_engine` (pack-adjacent) leans on crates.io for text-measure
//! concerns the teacher itself doesn't need.

use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

use super::builtin;

fn str_arg(v: &Value) -> EvalResult<&str> {
    v.as_str()
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("expected a string, got {}", v.type_name()))))
}

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "has-prefix",
            builtin("has-prefix", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let s = str_arg(&args.positional[0])?;
                let p = str_arg(&args.positional[1])?;
                ctx.ports.stdout.values.put(Value::bool(s.starts_with(p)))
            })),
        ),
        (
            "has-suffix",
            builtin("has-suffix", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let s = str_arg(&args.positional[0])?;
                let p = str_arg(&args.positional[1])?;
                ctx.ports.stdout.values.put(Value::bool(s.ends_with(p)))
            })),
        ),
        (
            "has-value",
            builtin("has-value", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let found = match &args.positional[0] {
                    Value::List(items) => items.iter().any(|v| v.eq_structural(&args.positional[1])),
                    Value::Map(m) => m.values().any(|v| v.eq_structural(&args.positional[1])),
                    other => {
                        return Err(Exception::new(Cause::ArgKindError(format!(
                            "has-value: cannot search a {}",
                            other.type_name()
                        ))))
                    }
                };
                ctx.ports.stdout.values.put(Value::bool(found))
            })),
        ),
        (
            "==s",
            builtin("==s", 1, None, vec![], Arc::new(|ctx, args| {
                let mut all = true;
                if let Some(first) = args.positional.first() {
                    let first = str_arg(first)?;
                    for v in &args.positional[1..] {
                        if str_arg(v)? != first {
                            all = false;
                        }
                    }
                }
                ctx.ports.stdout.values.put(Value::bool(all))
            })),
        ),
        (
            "<s",
            builtin("<s", 2, None, vec![], Arc::new(|ctx, args| {
                let strs: Vec<&str> = args
                    .positional
                    .iter()
                    .map(str_arg)
                    .collect::<EvalResult<_>>()?;
                let ordered = strs.windows(2).all(|w| w[0] < w[1]);
                ctx.ports.stdout.values.put(Value::bool(ordered))
            })),
        ),
        (
            "joins",
            builtin("joins", 1, Some(2), vec![], Arc::new(|ctx, args| {
                let sep = str_arg(&args.positional[0])?;
                let items = if let Some(list) = args.positional.get(1) {
                    list.as_list().map(|s| s.to_vec()).unwrap_or_default()
                } else {
                    ctx.ports.stdin.values.drain_all()
                };
                let parts: Vec<String> = items.iter().map(Value::display_text).collect();
                ctx.ports.stdout.values.put(Value::str(parts.join(sep)))
            })),
        ),
        (
            "splits",
            builtin("splits", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let sep = str_arg(&args.positional[0])?;
                let s = str_arg(&args.positional[1])?;
                let parts: Vec<&str> = if sep.is_empty() {
                    s.split_terminator("").skip(1).collect()
                } else {
                    s.split(sep).collect()
                };
                for p in parts {
                    ctx.ports.stdout.values.put(Value::str(p.to_string()))?;
                }
                Ok(())
            })),
        ),
        (
            "replaces",
            builtin("replaces", 3, Some(3), vec![], Arc::new(|ctx, args| {
                let old = str_arg(&args.positional[0])?;
                let new = str_arg(&args.positional[1])?;
                let s = str_arg(&args.positional[2])?;
                ctx.ports.stdout.values.put(Value::str(s.replace(old, new)))
            })),
        ),
        (
            "ord",
            builtin("ord", 1, Some(1), vec![], Arc::new(|ctx, args| {
                let s = str_arg(&args.positional[0])?;
                for ch in s.chars() {
                    ctx.ports.stdout.values.put(Value::str(format!("0x{:x}", ch as u32)))?;
                }
                Ok(())
            })),
        ),
        (
            "base",
            builtin("base", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let radix = str_arg(&args.positional[0])?
                    .parse::<u32>()
                    .map_err(|_| Exception::new(Cause::ArgKindError("base: invalid radix".into())))?;
                let n = str_arg(&args.positional[1])?
                    .parse::<i64>()
                    .map_err(|_| Exception::new(Cause::ArgKindError("base: not an integer".into())))?;
                if !(2..=36).contains(&radix) {
                    return Err(Exception::new(Cause::ArgKindError("base: radix must be 2..=36".into())));
                }
                ctx.ports.stdout.values.put(Value::str(to_radix(n, radix)))
            })),
        ),
        (
            "wcswidth",
            builtin("wcswidth", 1, Some(1), vec![], Arc::new(|ctx, args| {
                let s = str_arg(&args.positional[0])?;
                ctx.ports.stdout.values.put(Value::str(s.width().to_string()))
            })),
        ),
    ]
}

fn to_radix(mut n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let neg = n < 0;
    if neg {
        n = -n;
    }
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while n > 0 {
        out.push(digits[(n as u32 % radix) as usize]);
        n /= radix as i64;
    }
    if neg {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}
