//! Pipeline executor (SPEC_FULL.md §4.3): runs a multi-stage pipeline's
//! stages concurrently, wiring each adjacent pair with a `Connection`.
//!
//! The evaluator core is synchronous end to end (§4.2); only the top-level
//! driver (`shell.rs`) is async, entering via `tokio::task::block_in_place`
//! the way the teacher's own `interpreter/mod.rs` bridges into its blocking
//! command execution. Because of that, a pipeline stage needs no `tokio`
//! runtime handle of its own — real concurrency between stages is plain OS
//! threads via `std::thread::scope`, which join before this function
//! returns (see DESIGN.md for why this supersedes the `spawn_blocking`
//! sketch in an earlier design pass).

use std::sync::Arc;

use crate::compiler::Op;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception};
use crate::port::{Connection, InPort, Ports};
use crate::scope::Frame;

/// Run `stages` (already-compiled pipeline stage bodies) against `ctx`'s
/// current stdin/stdout, sharing its stderr across every stage. A
/// single-stage pipeline runs directly on `ctx`, since no wiring is needed
/// (§4.3 "failure of any stage..."; this also keeps the common case free of
/// thread-spawn overhead).
pub fn run_pipeline(ctx: &mut EvalCtx, stages: Vec<Op>) -> EvalResult<()> {
    if stages.len() <= 1 {
        return match stages.first() {
            Some(op) => op(ctx),
            None => Ok(()),
        };
    }

    let n = stages.len();
    let connections: Vec<Connection> = (0..n - 1).map(|_| Connection::new()).collect();

    let stderr = ctx.ports.stderr.clone();
    let first_in = std::mem::replace(&mut ctx.ports.stdin, InPort::closed());
    let last_out = ctx.ports.stdout.clone();

    let mut in_ports = Vec::with_capacity(n);
    in_ports.push(first_in);
    for conn in &connections {
        in_ports.push(conn.take_in_port());
    }

    let mut out_ports = Vec::with_capacity(n);
    for conn in &connections {
        out_ports.push(conn.out_port());
    }
    out_ports.push(last_out);

    // Each `Connection` keeps its own sender alive alongside the clone handed
    // to `out_ports` above; drop that original here so the stage holding the
    // clone is the only live sender left. Otherwise a consumer stage reading
    // to EOF (`each`, `slurp`, `from-lines`, ...) blocks forever, since
    // `connections` would otherwise outlive the `thread::scope` join below.
    drop(connections);

    let frame: Arc<Frame> = ctx.frame.clone();
    let modules = ctx.modules.clone();
    let script_dir = ctx.script_dir.clone();
    let builtins_root = ctx.builtins_root.clone();

    let results: Vec<EvalResult<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = stages
            .into_iter()
            .zip(in_ports.into_iter().zip(out_ports.into_iter()))
            .map(|(op, (stdin, stdout))| {
                let frame = frame.clone();
                let modules = modules.clone();
                let script_dir = script_dir.clone();
                let builtins_root = builtins_root.clone();
                let stderr = stderr.clone();
                scope.spawn(move || -> EvalResult<()> {
                    let ports = Ports { stdin, stdout, stderr };
                    let mut stage_ctx = EvalCtx::new(frame, ports, modules, script_dir, builtins_root);
                    op(&mut stage_ctx)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("pipeline stage panicked"))
            .collect()
    });

    aggregate(results)
}

/// First-failing-stage-wins (§4.3): the earliest stage (in pipeline order)
/// to raise a non-benign exception determines the pipeline's outcome. A
/// downstream stage failing only because an upstream stage already closed
/// its input ("broken pipe") is not itself the root cause and is skipped
/// unless it's the only failure on record.
fn aggregate(results: Vec<EvalResult<()>>) -> EvalResult<()> {
    let mut first_real: Option<Exception> = None;
    let mut first_broken_pipe: Option<Exception> = None;
    for r in results {
        if let Err(e) = r {
            if is_broken_pipe(&e) {
                if first_broken_pipe.is_none() {
                    first_broken_pipe = Some(e);
                }
            } else if first_real.is_none() {
                first_real = Some(e);
            }
        }
    }
    match first_real.or(first_broken_pipe) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn is_broken_pipe(e: &Exception) -> bool {
    matches!(&e.cause, Cause::IOError(msg) if msg.contains("broken pipe"))
}
