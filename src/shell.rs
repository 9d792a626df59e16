//! Top-level driver (SPEC_FULL.md §4.2, §4.5): ties the parser, compiler,
//! module cache and root frame together into one entry point a caller runs
//! a script against.
//!
//! Grounded in the teacher's `Bash`/`BashOptions`/`ExecResult` (`bash.rs`):
//! a long-lived struct owning the root state, an `exec` method bridging
//! async callers into the evaluator's synchronous core via
//! `tokio::task::block_in_place`, and a result struct shaped for the CLI's
//! `--json` flag.

use std::path::PathBuf;
use std::sync::Arc;

use crate::compiler::Compiler;
use crate::eval::EvalCtx;
use crate::exception::Exception;
use crate::module_loader::ModuleCache;
use crate::port::{ByteWriter, InPort, OutPort, Ports, ValueWriter};
use crate::scope::Frame;
use crate::value::Value;

/// Options for creating an `Engine`, mirroring the teacher's `BashOptions`.
#[derive(Default)]
pub struct EngineOptions {
    /// Working directory scripts resolve relative module paths against.
    pub cwd: Option<PathBuf>,
}

/// The outcome of running one script: everything it put on the value
/// channel (§3, §4.3's `V:`), everything written to its byte sinks (`B:`),
/// and a Unix-style exit code derived from whether it raised an exception.
pub struct ExecResult {
    pub values: Vec<Value>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// The last value put on the value channel, if any — a convenience for
    /// callers that only care about a script's final result.
    pub fn value(&self) -> Option<&Value> {
        self.values.last()
    }

    fn ok(values: Vec<Value>, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        ExecResult {
            values,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: 0,
        }
    }

    fn failed(e: &Exception, stdout: Vec<u8>, mut stderr: Vec<u8>) -> Self {
        stderr.extend(format!("{e}\n").into_bytes());
        ExecResult {
            values: Vec::new(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: 1,
        }
    }
}

/// The evaluator's long-lived state: the root (built-ins) frame and the
/// module cache shared across every script run through this engine.
pub struct Engine {
    root: Arc<Frame>,
    modules: Arc<ModuleCache>,
    cwd: PathBuf,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let root = Frame::root();
        crate::builtins::register_all(&root);
        let cwd = options
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Engine { root, modules: ModuleCache::new(), cwd }
    }

    /// Parse, compile, and run `script`, collecting its output. Each call
    /// runs in a fresh top-level frame (so scripts don't see each other's
    /// bindings) but shares this engine's built-ins and module cache.
    pub async fn exec(&self, script: &str) -> ExecResult {
        let script = script.to_string();
        let root = self.root.clone();
        let modules = self.modules.clone();
        let cwd = self.cwd.clone();

        tokio::task::block_in_place(move || Self::run_sync(&script, root, modules, cwd))
    }

    fn run_sync(script: &str, root: Arc<Frame>, modules: Arc<ModuleCache>, cwd: PathBuf) -> ExecResult {
        let chunk = match crate::parser::parse(script) {
            Ok(c) => c,
            Err(e) => return ExecResult::failed(&e, Vec::new(), Vec::new()),
        };
        let op = match Compiler::new().compile_chunk(&chunk) {
            Ok(op) => op,
            Err(e) => return ExecResult::failed(&e, Vec::new(), Vec::new()),
        };

        let frame = Frame::child(&root);
        let (stdout, stdout_bytes, stdout_values) = OutPort::collecting();
        let stderr_buf = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stderr = OutPort { bytes: ByteWriter::Collect(stderr_buf.clone()), values: ValueWriter::Discard };
        let ports = Ports { stdin: InPort::closed(), stdout, stderr };

        let mut ctx = EvalCtx::new(frame, ports, modules, cwd, root);
        let result = op(&mut ctx);

        let stdout_bytes = std::mem::take(&mut *stdout_bytes.lock().unwrap());
        let stderr_bytes = std::mem::take(&mut *stderr_buf.lock().unwrap());
        let values = std::mem::take(&mut *stdout_values.lock().unwrap());

        match result {
            Ok(()) => ExecResult::ok(values, stdout_bytes, stderr_bytes),
            Err(e) => {
                let mut out = ExecResult::failed(&e, stdout_bytes, stderr_bytes);
                out.values = values;
                out
            }
        }
    }
}
