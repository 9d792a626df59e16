//! Built-in command library (SPEC_FULL.md §4.6).
//!
//! Grounded in the teacher's `commands::Command` trait and
//! `CommandRegistry` (`commands/registry.rs`): a flat table from name to
//! callable, populated once at startup into the root frame. Unlike the
//! teacher, which gives each external-process emulation (`echo`, `cat`,
//! `wc`, ...) its own file under `commands/<name>/`, this evaluator's
//! built-ins are a small in-process value/stream library rather than n
//! process emulations, so they are grouped by semantic category in one
//! module tree instead of one file per command (noted in DESIGN.md).

mod arith;
mod containers;
mod control;
mod identity;
mod io;
mod iter;
mod module;
mod output;
pub mod process;
mod strings;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::closure::{CallArgs, Callable, NativeBuiltin};
use crate::eval::EvalCtx;
use crate::exception::EvalResult;
use crate::scope::Frame;
use crate::value::Value;

pub(crate) type BuiltinFn = Arc<dyn Fn(&mut EvalCtx, CallArgs) -> EvalResult<()> + Send + Sync>;

pub(crate) fn builtin(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    options: Vec<(&'static str, Value)>,
    func: BuiltinFn,
) -> Value {
    Value::Fn(Arc::new(Callable::Native(Arc::new(NativeBuiltin {
        name,
        min_args,
        max_args,
        options,
        func,
    }))))
}

/// Declare every built-in into `root` under its plain name (§4.6: "built-ins
/// live in the root namespace frame, shadowable like any other binding").
pub fn register_all(root: &Frame) {
    root.declare_local("true", Value::bool(true));
    root.declare_local("false", Value::bool(false));

    let mut all: Vec<(&'static str, Value)> = Vec::new();
    all.extend(output::builtins());
    all.extend(io::builtins());
    all.extend(iter::builtins());
    all.extend(arith::builtins());
    all.extend(strings::builtins());
    all.extend(containers::builtins());
    all.extend(identity::builtins());
    all.extend(control::builtins());
    all.extend(process::builtins());
    all.extend(module::builtins());
    for (name, value) in all {
        root.declare_local(name, value);
    }
}

pub(crate) fn opts_map(args: &CallArgs) -> IndexMap<String, Value> {
    args.options.clone()
}
