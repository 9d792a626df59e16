//! Callable values (SPEC_FULL.md §4.4): native built-ins and user closures.
//!
//! Grounded in the teacher's `commands::Command` trait (`commands/mod.rs`):
//! a flat registry of named, async-callable units each validating its own
//! arguments before running. Generalized here to also cover user-written
//! closures, whose call path (push a child frame, bind params, run the
//! body, pop on every exit including a `Return` marker) mirrors the
//! teacher's function-call handling in `interpreter/functions.rs`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::compiler::Op;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception};
use crate::scope::Frame;
use crate::value::Value;

/// Arguments gathered at a call site, already separated into positional and
/// named-option groups (`&opt=val` forms, §4.1).
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub options: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, options: IndexMap<String, Value>) -> Self {
        CallArgs { positional, options }
    }
}

/// A native built-in. `min_args`/`max_args` (`None` = unbounded, for
/// variadic commands like `put`) are checked before `func` runs so every
/// built-in can assume well-formed positional arity (§4.4 "arity check
/// precedes option validation").
pub struct NativeBuiltin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// Declared option names and their default values. A call supplying an
    /// option not in this list fails with `ArgKindError` (§4.4).
    pub options: Vec<(&'static str, Value)>,
    pub func: Arc<dyn Fn(&mut EvalCtx, CallArgs) -> EvalResult<()> + Send + Sync>,
}

impl fmt::Debug for NativeBuiltin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeBuiltin({})", self.name)
    }
}

impl NativeBuiltin {
    fn check_arity(&self, args: &CallArgs) -> EvalResult<()> {
        let n = args.positional.len();
        if n < self.min_args || self.max_args.map_or(false, |max| n > max) {
            return Err(Exception::new(Cause::ArityError(format!(
                "{} expects {}{} argument(s), got {}",
                self.name,
                self.min_args,
                match self.max_args {
                    Some(max) if max != self.min_args => format!("..{max}"),
                    _ => String::new(),
                },
                n
            ))));
        }
        Ok(())
    }

    fn check_options(&self, args: &CallArgs) -> EvalResult<()> {
        for name in args.options.keys() {
            if !self.options.iter().any(|(n, _)| n == name) {
                return Err(Exception::new(Cause::ArgKindError(format!(
                    "{} has no option &{}",
                    self.name, name
                ))));
            }
        }
        Ok(())
    }

    fn with_defaults(&self, mut args: CallArgs) -> CallArgs {
        for (name, default) in &self.options {
            args.options
                .entry((*name).to_string())
                .or_insert_with(|| default.clone());
        }
        args
    }
}

/// A user-written lambda (`[params]{body}`, §4.1, §4.4), closed over the
/// frame in effect at the point the literal was evaluated.
pub struct ClosureData {
    pub params: Vec<String>,
    pub rest: Option<String>,
    /// Declared option names and their (already-evaluated) default values.
    pub options: IndexMap<String, Value>,
    pub body: Op,
    pub captured_frame: Arc<Frame>,
    pub name: Option<String>,
}

impl fmt::Debug for ClosureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClosureData({})", self.name.as_deref().unwrap_or("<anonymous>"))
    }
}

impl ClosureData {
    fn check_arity(&self, args: &CallArgs) -> EvalResult<()> {
        let n = args.positional.len();
        let label = self.name.as_deref().unwrap_or("<closure>");
        if n < self.params.len() {
            return Err(Exception::new(Cause::ArityError(format!(
                "{label} expects at least {} argument(s), got {n}",
                self.params.len()
            ))));
        }
        if self.rest.is_none() && n > self.params.len() {
            return Err(Exception::new(Cause::ArityError(format!(
                "{label} expects exactly {} argument(s), got {n}",
                self.params.len()
            ))));
        }
        Ok(())
    }

    fn check_options(&self, args: &CallArgs) -> EvalResult<()> {
        let label = self.name.as_deref().unwrap_or("<closure>");
        for name in args.options.keys() {
            if !self.options.contains_key(name) {
                return Err(Exception::new(Cause::ArgKindError(format!(
                    "{label} has no option &{name}"
                ))));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum Callable {
    Native(Arc<NativeBuiltin>),
    Closure(Arc<ClosureData>),
}

impl Callable {
    pub fn name(&self) -> Option<&str> {
        match self {
            Callable::Native(n) => Some(n.name),
            Callable::Closure(c) => c.name.as_deref(),
        }
    }
}

/// Invoke a `Callable` with already-evaluated arguments against `ctx`'s
/// current ports. Closures run in a fresh child frame of their captured
/// lexical scope (not of the caller's frame, §9); a `Return` raised inside
/// the body is swallowed here since it marks exactly "stop running this
/// closure's body", never propagating further (§7).
pub fn call(ctx: &mut EvalCtx, callable: &Callable, args: CallArgs) -> EvalResult<()> {
    match callable {
        Callable::Native(builtin) => {
            builtin.check_arity(&args)?;
            builtin.check_options(&args)?;
            let args = builtin.with_defaults(args);
            (builtin.func)(ctx, args)
        }
        Callable::Closure(closure) => {
            closure.check_arity(&args)?;
            closure.check_options(&args)?;

            let frame = Frame::child(&closure.captured_frame);
            let mut positional = args.positional.into_iter();
            for name in &closure.params {
                let v = positional.next().expect("arity already checked");
                frame.declare_local(name, v);
            }
            if let Some(rest) = &closure.rest {
                frame.declare_local(rest, Value::list(positional.collect()));
            }
            for (name, default) in &closure.options {
                let v = args.options.get(name).cloned().unwrap_or_else(|| default.clone());
                frame.declare_local(name, v);
            }

            let saved_frame = std::mem::replace(&mut ctx.frame, frame);
            let result = (closure.body)(ctx);
            ctx.frame = saved_frame;

            match result {
                Ok(()) => Ok(()),
                Err(e) if matches!(e.cause, Cause::Return) => Ok(()),
                Err(e) => Err(e),
            }
        }
    }
}
