//! Output built-ins: `put`, `print`, `echo`, `pprint` (SPEC_FULL.md §4.6).
//! Grounded in the teacher's `commands/echo/mod.rs` for the newline/no-newline
//! split between `print` and `echo`.

use super::builtin;
use crate::value::Value;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "put",
            builtin("put", 0, None, vec![], std::sync::Arc::new(|ctx, args| {
                for v in args.positional {
                    ctx.ports.stdout.values.put(v)?;
                }
                Ok(())
            })),
        ),
        (
            "print",
            builtin("print", 0, None, vec![], std::sync::Arc::new(|ctx, args| {
                let text: String = args.positional.iter().map(Value::display_text).collect();
                ctx.ports.stdout.bytes.write(text.as_bytes())
            })),
        ),
        (
            "echo",
            builtin("echo", 0, None, vec![], std::sync::Arc::new(|ctx, args| {
                let text: Vec<String> = args.positional.iter().map(Value::display_text).collect();
                let mut line = text.join(" ");
                line.push('\n');
                ctx.ports.stdout.bytes.write(line.as_bytes())
            })),
        ),
        (
            "pprint",
            builtin("pprint", 0, None, vec![], std::sync::Arc::new(|ctx, args| {
                for v in &args.positional {
                    let mut line = v.repr();
                    line.push('\n');
                    ctx.ports.stdout.bytes.write(line.as_bytes())?;
                }
                Ok(())
            })),
        ),
    ]
}
