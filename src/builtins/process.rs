//! Process & OS-resource built-ins: `exec`, `external`, `fopen`, `fclose`,
//! `pipe`, `prclose`, `pwclose` (SPEC_FULL.md §4.6, §9). The teacher never
//! shells out to a real process (its bash runs against an in-memory
//! sandboxed filesystem); this evaluator's process primitives are grounded
//! instead in the pack's `groblegark-oddjobs` shell-exec module, which
//! spawns real `std::process::Command` children and feeds/drains their
//! stdio synchronously.

use std::process::{Command, Stdio};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::closure::CallArgs;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

use super::builtin;

/// Shared by the compiler's "head resolved to a plain string" fallback and
/// the `exec`/`external` built-ins: run `name` as a real child process,
/// feeding it `stdin_bytes` and returning its captured stdout/stderr bytes
/// and exit status. `env` holds `&env=[...]` overrides (§4.6 line 120); when
/// empty the child inherits this process's environment unchanged.
pub fn run_external(
    name: &str,
    args: &[String],
    env: &[(String, String)],
    stdin_bytes: &[u8],
) -> EvalResult<(Vec<u8>, Vec<u8>, i32)> {
    use std::io::Write;

    let mut cmd = Command::new(name);
    cmd.args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Exception::new(Cause::UndefinedCommand(name.to_string())),
            _ => Exception::new(Cause::IOError(e.to_string())),
        })?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(stdin_bytes)
        .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;

    let output = child
        .wait_with_output()
        .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;

    Ok((output.stdout, output.stderr, output.status.code().unwrap_or(-1)))
}

/// Parses the `&env=[...]` call-site option (a list of `"KEY=VALUE"`
/// strings) into the pairs `run_external` feeds to `Command::env`.
fn parse_env_option(opts: &IndexMap<String, Value>, builtin_name: &str) -> EvalResult<Vec<(String, String)>> {
    let Some(env_val) = opts.get("env") else {
        return Ok(Vec::new());
    };
    let items = env_val
        .as_list()
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("{builtin_name}: &env must be a list"))))?;
    items
        .iter()
        .map(|item| {
            let s = item
                .as_str()
                .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("{builtin_name}: &env entries must be strings"))))?;
            s.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("{builtin_name}: &env entry missing '=': {s:?}"))))
        })
        .collect()
}

/// Shared body for `exec`/`external`, which differ only in name-resolution
/// fallback (§9 "exec"/"external" near-duplication, recorded in DESIGN.md).
fn run_process_builtin(name: &'static str, ctx: &mut EvalCtx, args: CallArgs) -> EvalResult<()> {
    let prog = args.positional[0]
        .as_str()
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("{name}: command name must be a string"))))?
        .to_string();
    let extra: Vec<String> = args.positional[1..].iter().map(Value::display_text).collect();
    let env = parse_env_option(&args.options, name)?;
    let stdin_bytes = ctx.ports.stdin.bytes.read_to_end()?;
    let (stdout, stderr, code) = run_external(&prog, &extra, &env, &stdin_bytes)?;
    ctx.ports.stdout.bytes.write(&stdout)?;
    ctx.ports.stderr.bytes.write(&stderr)?;
    if code != 0 {
        let mut e = Exception::new(Cause::ExternalCommandFailed(code));
        e.partial_bytes = stdout;
        return Err(e);
    }
    Ok(())
}

pub(super) fn builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "exec",
            builtin("exec", 1, None, vec![("env", Value::list(Vec::new()))], Arc::new(|ctx, args| {
                run_process_builtin("exec", ctx, args)
            })),
        ),
        (
            "external",
            builtin("external", 1, None, vec![("env", Value::list(Vec::new()))], Arc::new(|ctx, args| {
                run_process_builtin("external", ctx, args)
            })),
        ),
        (
            "fopen",
            builtin("fopen", 1, Some(2), vec![], Arc::new(|ctx, args| {
                let path = args.positional[0]
                    .as_str()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("fopen: path must be a string".into())))?;
                let mode = args
                    .positional
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or("r");
                let file = match mode {
                    "r" => std::fs::File::open(path),
                    "w" => std::fs::File::create(path),
                    "a" => std::fs::OpenOptions::new().append(true).create(true).open(path),
                    other => {
                        return Err(Exception::new(Cause::ArgKindError(format!(
                            "fopen: unknown mode {other:?}"
                        ))))
                    }
                }
                .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                ctx.ports.stdout.values.put(Value::File(Arc::new(crate::value::FileHandle {
                    path: path.to_string(),
                    file: std::sync::Mutex::new(Some(file)),
                })))
            })),
        ),
        (
            "fclose",
            builtin("fclose", 1, Some(1), vec![], Arc::new(|_ctx, args| {
                match &args.positional[0] {
                    Value::File(h) => {
                        let mut slot = h.file.lock().unwrap();
                        if slot.take().is_none() {
                            return Err(Exception::new(Cause::IOError(format!(
                                "file already closed: {}",
                                h.path
                            ))));
                        }
                        Ok(())
                    }
                    other => Err(Exception::new(Cause::ArgKindError(format!(
                        "fclose: not a file: {}",
                        other.type_name()
                    )))),
                }
            })),
        ),
        (
            "pipe",
            builtin("pipe", 0, Some(0), vec![], Arc::new(|ctx, _args| {
                ctx.ports.stdout.values.put(Value::Pipe(crate::port::PipeHandle::new()))
            })),
        ),
        (
            "prclose",
            builtin("prclose", 1, Some(1), vec![], Arc::new(|_ctx, args| {
                match &args.positional[0] {
                    Value::Pipe(p) => p.close_read(),
                    other => Err(Exception::new(Cause::ArgKindError(format!(
                        "prclose: not a pipe: {}",
                        other.type_name()
                    )))),
                }
            })),
        ),
        (
            "pwclose",
            builtin("pwclose", 1, Some(1), vec![], Arc::new(|_ctx, args| {
                match &args.positional[0] {
                    Value::Pipe(p) => p.close_write(),
                    other => Err(Exception::new(Cause::ArgKindError(format!(
                        "pwclose: not a pipe: {}",
                        other.type_name()
                    )))),
                }
            })),
        ),
    ]
}
