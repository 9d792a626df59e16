//! Evaluation context (SPEC_FULL.md §4.2, §4.3).
//!
//! `EvalCtx` is threaded through every compiled `Op`/`ExprOp` invocation. It
//! plays the role of the teacher's `ExecutionContext` (`interpreter/context.rs`):
//! the "current" lexical frame and port triple, swapped out and restored
//! around redirections, captures, and closure calls rather than copied per
//! call, plus the shared, cross-call state (execution limits, module cache).

use std::path::PathBuf;
use std::sync::Arc;

use crate::closure::Callable;
use crate::compiler::Op;
use crate::exception::{Cause, EvalResult, Exception};
use crate::module_loader::ModuleCache;
use crate::port::{OutPort, Ports};
use crate::scope::Frame;
use crate::value::Value;

/// Guards against runaway recursion and non-terminating scripts (§4.2 "the
/// evaluator enforces execution limits"). The teacher enforces an analogous
/// cap in `interpreter/mod.rs` on command-substitution depth; this
/// generalizes it to closure-call depth and a coarse executed-op counter.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_call_depth: usize,
    pub max_ops: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_call_depth: 2048,
            max_ops: 50_000_000,
        }
    }
}

pub struct EvalCtx {
    pub frame: Arc<Frame>,
    pub ports: Ports,
    pub limits: Limits,
    pub modules: Arc<ModuleCache>,
    pub script_dir: PathBuf,
    /// The shared frame built-ins were registered into (§4.5): a `use`d
    /// module runs with a fresh top-level frame parented on this one, so it
    /// sees every built-in but none of the importing script's own bindings.
    pub builtins_root: Arc<Frame>,
    call_depth: usize,
    ops_executed: u64,
}

impl EvalCtx {
    pub fn new(
        frame: Arc<Frame>,
        ports: Ports,
        modules: Arc<ModuleCache>,
        script_dir: PathBuf,
        builtins_root: Arc<Frame>,
    ) -> Self {
        EvalCtx {
            frame,
            ports,
            limits: Limits::default(),
            modules,
            script_dir,
            builtins_root,
            call_depth: 0,
            ops_executed: 0,
        }
    }

    /// Called once per `Op`/`ExprOp` invocation by the compiler's dispatch
    /// glue, to bound scripts like `while $true { }` (§4.2 edge case).
    pub fn tick(&mut self) -> EvalResult<()> {
        self.ops_executed += 1;
        if self.ops_executed > self.limits.max_ops {
            return Err(Exception::new(Cause::IOError(
                "execution limit exceeded".into(),
            )));
        }
        Ok(())
    }

    pub fn enter_call(&mut self) -> EvalResult<()> {
        self.call_depth += 1;
        if self.call_depth > self.limits.max_call_depth {
            self.call_depth -= 1;
            return Err(Exception::new(Cause::IOError(
                "call depth limit exceeded (possible infinite recursion)".into(),
            )));
        }
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.call_depth -= 1;
    }

    /// `(...)` capture (§4.2, §8 scenario 7/9): run `op` against a fresh
    /// collecting output port, then return everything it emitted as a list.
    /// Explicit `put` values come first, followed by whatever it wrote to
    /// its byte sink split into line values — see DESIGN.md for why true
    /// chronological interleaving of the two streams is not preserved.
    pub fn capture_output(&mut self, op: &Op) -> EvalResult<Vec<Value>> {
        let (out, bytes_buf, values_buf) = OutPort::collecting();
        let saved = std::mem::replace(&mut self.ports.stdout, out);
        let result = op(self);
        self.ports.stdout = saved;

        let values = std::mem::take(&mut *values_buf.lock().unwrap());
        let bytes = std::mem::take(&mut *bytes_buf.lock().unwrap());

        match result {
            Ok(()) => Ok(merge_captured(values, &bytes)),
            Err(mut e) => {
                e.partial_values = merge_captured(values, &bytes);
                Err(e)
            }
        }
    }

    /// `?(...)` capture (§4.2, §8 scenario 8): run `op`, discarding whatever
    /// it produced, and report only whether it raised a (non-control-flow)
    /// exception.
    pub fn capture_exception(&mut self, op: &Op) -> EvalResult<bool> {
        let out = OutPort::discard();
        let saved = std::mem::replace(&mut self.ports.stdout, out);
        let result = op(self);
        self.ports.stdout = saved;
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_control_flow() => Err(e),
            Err(_) => Ok(false),
        }
    }

    pub fn invoke(&mut self, callable: &Callable, args: crate::closure::CallArgs) -> EvalResult<()> {
        self.enter_call()?;
        let result = crate::closure::call(self, callable, args);
        self.exit_call();
        result
    }
}

fn merge_captured(values: Vec<Value>, bytes: &[u8]) -> Vec<Value> {
    let mut out = values;
    if !bytes.is_empty() {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            out.push(Value::str(line.to_string()));
        }
    }
    out
}
