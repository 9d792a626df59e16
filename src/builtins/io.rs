//! Stream coders: `slurp`, `from-lines`, `to-lines`, `from-json`, `to-json`
//! (SPEC_FULL.md §4.6). JSON conversion uses `serde_json`, following the
//! other example repos in the retrieval pack rather than the teacher (which
//! has no JSON support of its own).

use std::sync::Arc;

use indexmap::IndexMap;

use super::builtin;
use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "slurp",
            builtin("slurp", 0, Some(0), vec![], Arc::new(|ctx, _args| {
                let bytes = ctx.ports.stdin.bytes.read_to_end()?;
                ctx.ports
                    .stdout
                    .values
                    .put(Value::str(String::from_utf8_lossy(&bytes).into_owned()))
            })),
        ),
        (
            "from-lines",
            builtin("from-lines", 0, Some(0), vec![], Arc::new(|ctx, _args| {
                let bytes = ctx.ports.stdin.bytes.read_to_end()?;
                let text = String::from_utf8_lossy(&bytes);
                for line in text.lines() {
                    ctx.ports.stdout.values.put(Value::str(line.to_string()))?;
                }
                Ok(())
            })),
        ),
        (
            "to-lines",
            builtin("to-lines", 0, None, vec![], Arc::new(|ctx, args| {
                let values = if args.positional.is_empty() {
                    ctx.ports.stdin.values.drain_all()
                } else {
                    args.positional
                };
                for v in values {
                    let mut line = v.display_text();
                    line.push('\n');
                    ctx.ports.stdout.bytes.write(line.as_bytes())?;
                }
                Ok(())
            })),
        ),
        (
            "from-json",
            builtin("from-json", 0, Some(1), vec![], Arc::new(|ctx, args| {
                let text = if let Some(arg) = args.positional.first() {
                    arg.as_str()
                        .ok_or_else(|| Exception::new(Cause::ArgKindError("from-json expects a string".into())))?
                        .to_string()
                } else {
                    let bytes = ctx.ports.stdin.bytes.read_to_end()?;
                    String::from_utf8_lossy(&bytes).into_owned()
                };
                let parsed: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| Exception::new(Cause::ArgKindError(format!("invalid JSON: {e}"))))?;
                ctx.ports.stdout.values.put(json_to_value(&parsed))
            })),
        ),
        (
            "to-json",
            builtin("to-json", 0, None, vec![], Arc::new(|ctx, args| {
                let values = if args.positional.is_empty() {
                    ctx.ports.stdin.values.drain_all()
                } else {
                    args.positional
                };
                for v in values {
                    let json = value_to_json(&v)?;
                    let mut line = serde_json::to_string(&json)
                        .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                    line.push('\n');
                    ctx.ports.stdout.bytes.write(line.as_bytes())?;
                }
                Ok(())
            })),
        ),
    ]
}

fn json_to_value(j: &serde_json::Value) -> Value {
    match j {
        serde_json::Value::Null => Value::str(""),
        serde_json::Value::Bool(b) => Value::bool(*b),
        serde_json::Value::Number(n) => Value::str(n.to_string()),
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(Value::str(k.clone()), json_to_value(v));
            }
            Value::map(out)
        }
    }
}

fn value_to_json(v: &Value) -> EvalResult<serde_json::Value> {
    match v {
        Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::List(items) => Ok(serde_json::Value::Array(
            items.iter().map(value_to_json).collect::<EvalResult<_>>()?,
        )),
        Value::Map(m) => {
            let mut out = serde_json::Map::new();
            for (k, val) in m.iter() {
                let key = k
                    .as_str()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("to-json requires string map keys".into())))?;
                out.insert(key.to_string(), value_to_json(val)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Err(Exception::new(Cause::ArgKindError(format!(
            "{} has no JSON representation",
            other.type_name()
        )))),
    }
}
