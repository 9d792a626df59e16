//! Identity built-ins: `is`, `eq`, `bool` (SPEC_FULL.md §3, §4.6).

use std::sync::Arc;

use crate::value::Value;

use super::builtin;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "is",
            builtin("is", 1, None, vec![], Arc::new(|ctx, args| {
                let all_same = args
                    .positional
                    .windows(2)
                    .all(|w| w[0].is_identical(&w[1]));
                ctx.ports.stdout.values.put(Value::bool(all_same))
            })),
        ),
        (
            "eq",
            builtin("eq", 1, None, vec![], Arc::new(|ctx, args| {
                let all_same = args
                    .positional
                    .windows(2)
                    .all(|w| w[0].eq_deep(&w[1]));
                ctx.ports.stdout.values.put(Value::bool(all_same))
            })),
        ),
        (
            "bool",
            builtin("bool", 1, Some(1), vec![], Arc::new(|ctx, args| {
                let truthy = match &args.positional[0] {
                    Value::Bool(b) => *b,
                    Value::Str(s) => !s.is_empty(),
                    _ => true,
                };
                ctx.ports.stdout.values.put(Value::bool(truthy))
            })),
        ),
    ]
}
