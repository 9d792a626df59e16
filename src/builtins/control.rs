//! Control built-ins: `fail`, `return`, `nop`, `run-parallel`, `del`
//! (SPEC_FULL.md §4.6, §7). `run-parallel` is the one place built-ins reach
//! for real OS concurrency rather than in-process sequencing, grounded in
//! the pipeline executor's own one-task-per-stage design (§4.3) generalized
//! from pipeline stages to arbitrary closures.

use std::sync::Arc;

use crate::closure::CallArgs;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception};
use crate::port::{InPort, Ports};
use crate::scope::NameRef;
use crate::value::Value;

use super::builtin;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "fail",
            builtin("fail", 1, Some(1), vec![], Arc::new(|_ctx, args| {
                Err(Exception::new(Cause::UserFail(Box::new(args.positional[0].clone()))))
            })),
        ),
        (
            "return",
            builtin("return", 0, Some(0), vec![], Arc::new(|_ctx, _args| {
                Err(Exception::new(Cause::Return))
            })),
        ),
        (
            "nop",
            builtin("nop", 0, None, vec![], Arc::new(|_ctx, _args| Ok(()))),
        ),
        (
            "run-parallel",
            builtin("run-parallel", 0, None, vec![], Arc::new(run_parallel)),
        ),
        (
            "del",
            builtin("del", 1, Some(1), vec![], Arc::new(|_ctx, args| {
                let target = args.positional[0]
                    .as_str()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("del: expected a variable name".into())))?;
                match NameRef::parse(target) {
                    NameRef::Env(name) => {
                        std::env::remove_var(name);
                        Ok(())
                    }
                    _ => Err(Exception::new(Cause::ArgKindError(format!(
                        "del: unsupported target {target:?}, only E:NAME is supported"
                    )))),
                }
            })),
        ),
    ]
}

fn run_parallel(ctx: &mut EvalCtx, args: CallArgs) -> EvalResult<()> {
    let frame = ctx.frame.clone();
    let modules = ctx.modules.clone();
    let script_dir = ctx.script_dir.clone();
    let builtins_root = ctx.builtins_root.clone();
    let stdout = ctx.ports.stdout.clone();
    let stderr = ctx.ports.stderr.clone();

    let results: Vec<EvalResult<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = args
            .positional
            .iter()
            .map(|thunk| {
                let callable = thunk.as_callable().cloned();
                let frame = frame.clone();
                let modules = modules.clone();
                let script_dir = script_dir.clone();
                let builtins_root = builtins_root.clone();
                let stdout = stdout.clone();
                let stderr = stderr.clone();
                scope.spawn(move || -> EvalResult<()> {
                    let f = callable.ok_or_else(|| {
                        Exception::new(Cause::ArgKindError(
                            "run-parallel: every argument must be a fn".into(),
                        ))
                    })?;
                    let ports = Ports {
                        stdin: InPort::closed(),
                        stdout,
                        stderr,
                    };
                    let mut sub_ctx = EvalCtx::new(frame, ports, modules, script_dir, builtins_root);
                    sub_ctx.invoke(&f, CallArgs::default())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("run-parallel thread panicked"))
            .collect()
    });

    for r in results {
        r?;
    }
    Ok(())
}
