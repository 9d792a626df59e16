//! The `use` built-in (SPEC_FULL.md §4.5, §9 "Module cache").
//!
//! Grounded in the teacher's script-sourcing builtin (`interpreter/source.rs`
//! wired up as the `source`/`.` command) generalized from "re-run a script in
//! the current frame" to "run a script once in its own frame and bind the
//! result as a namespace". The argument's slash-separated prefix selects a
//! filesystem directory; the first colon-separated segment of the final
//! path component is both the file to load and the name it's bound under.
//! Trailing colon segments name a nested namespace the loaded module is
//! expected to `use` itself — not a different bind target, just a
//! validated path into it (`use a/b/c:d` still binds local name `c`, with
//! `d` reachable as `$c:d:...` because `c`'s own top-level `use c/d`
//! populated that import). Two `use` statements that bottom out at the
//! same file on disk share one cached namespace instance (§8 scenario 7).

use std::path::Path;
use std::sync::Arc;

use crate::compiler::Compiler;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception};
use crate::port::{InPort, OutPort, Ports};
use crate::scope::Frame;
use crate::value::Value;

use super::builtin;

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![(
        "use",
        builtin("use", 1, Some(1), vec![], Arc::new(use_builtin)),
    )]
}

fn use_builtin(ctx: &mut EvalCtx, args: crate::closure::CallArgs) -> EvalResult<()> {
    let spec = args.positional[0]
        .as_str()
        .ok_or_else(|| Exception::new(Cause::ArgKindError("use: module path must be a string".into())))?;

    let (dir_part, file_and_ns) = match spec.rfind('/') {
        Some(i) => (&spec[..i], &spec[i + 1..]),
        None => ("", spec),
    };
    let colon_parts: Vec<&str> = file_and_ns.split(':').collect();
    let filename = colon_parts[0];
    let nested = &colon_parts[1..];

    let from_dir = if dir_part.is_empty() {
        ctx.script_dir.clone()
    } else {
        ctx.script_dir.join(dir_part)
    };

    let modules = ctx.modules.clone();
    let builtins_root = ctx.builtins_root.clone();
    let ns = modules.load(filename, &from_dir, |path| run_module(path, &modules, &builtins_root))?;

    let mut probe = ns.clone();
    for seg in nested {
        probe = probe
            .get_namespace(seg)
            .ok_or_else(|| Exception::new(Cause::CompileError(format!("no such nested module: {seg}"))))?;
    }

    ctx.frame.bind_namespace(filename, ns);
    Ok(())
}

/// Compile and run the module at `path` in a fresh top-level frame parented
/// on `builtins_root`, returning that frame as the module's exported
/// namespace (every name it declared at its own top level, per §4.5).
fn run_module(path: &Path, modules: &Arc<crate::module_loader::ModuleCache>, builtins_root: &Arc<Frame>) -> EvalResult<Arc<Frame>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Exception::new(Cause::IOError(format!("reading module {}: {e}", path.display()))))?;
    let chunk = crate::parser::parse(&text)?;
    let op = Compiler::new().compile_chunk(&chunk)?;

    let module_frame = Frame::child(builtins_root);
    let script_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let module_ports = Ports {
        stdin: InPort::closed(),
        stdout: OutPort::discard(),
        stderr: OutPort::discard(),
    };
    let mut module_ctx = EvalCtx::new(
        module_frame.clone(),
        module_ports,
        modules.clone(),
        script_dir,
        builtins_root.clone(),
    );
    op(&mut module_ctx)?;
    Ok(module_frame)
}
