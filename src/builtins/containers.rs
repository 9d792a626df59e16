//! Container built-ins: `keys`, `has-key`, `assoc`, `dissoc` (SPEC_FULL.md
//! §4.6). Thin wrappers over the functional update/lookup logic in
//! `container.rs`.

use std::sync::Arc;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

use super::builtin;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "keys",
            builtin("keys", 1, Some(1), vec![], Arc::new(|ctx, args| {
                match &args.positional[0] {
                    Value::Map(m) => {
                        for k in m.keys() {
                            ctx.ports.stdout.values.put(k.clone())?;
                        }
                        Ok(())
                    }
                    Value::List(items) => {
                        for i in 0..items.len() {
                            ctx.ports.stdout.values.put(Value::str(i.to_string()))?;
                        }
                        Ok(())
                    }
                    other => Err(Exception::new(Cause::ArgKindError(format!(
                        "keys: cannot enumerate a {}",
                        other.type_name()
                    )))),
                }
            })),
        ),
        (
            "has-key",
            builtin("has-key", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let found = match &args.positional[0] {
                    Value::Map(m) => m.contains_key(&args.positional[1]),
                    Value::List(items) => args.positional[1]
                        .as_str()
                        .and_then(|s| s.parse::<i64>().ok())
                        .map(|i| {
                            let len = items.len() as i64;
                            let idx = if i < 0 { i + len } else { i };
                            idx >= 0 && idx < len
                        })
                        .unwrap_or(false),
                    other => {
                        return Err(Exception::new(Cause::ArgKindError(format!(
                            "has-key: cannot query a {}",
                            other.type_name()
                        ))))
                    }
                };
                ctx.ports.stdout.values.put(Value::bool(found))
            })),
        ),
        (
            "assoc",
            builtin("assoc", 3, Some(3), vec![], Arc::new(|ctx, args| {
                let updated = crate::container::assoc(&args.positional[0], &args.positional[1], args.positional[2].clone())?;
                ctx.ports.stdout.values.put(updated)
            })),
        ),
        (
            "dissoc",
            builtin("dissoc", 2, Some(2), vec![], Arc::new(|ctx, args| {
                let updated = crate::container::dissoc(&args.positional[0], &args.positional[1])?;
                ctx.ports.stdout.values.put(updated)
            })),
        ),
    ]
}
