//! Exception taxonomy (SPEC_FULL.md §7).
//!
//! Mirrors the teacher crate's `interpreter/errors.rs`: a closed set of
//! causes, each able to carry the output a failing `Op` had already produced
//! before it failed, so that output survives unwinding to whichever
//! construct intercepts it (`try`, `?(...)`, a pipeline, or the top level).
//! Unlike the teacher, which gives every cause its own struct implementing a
//! shared `ControlFlowError` trait, every cause here carries identical
//! partial-output bookkeeping, so they are unified into one `Exception`
//! struct with a `Cause` discriminant (see DESIGN.md).

use std::fmt;

use crate::value::Value;

/// A source span, copied onto an `Exception` by whichever `Op` raises it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

/// The closed taxonomy of failure causes (§7). `Return`/`Break`/`Continue`
/// are control-flow markers: structurally exceptions, but intercepted by a
/// specific construct rather than propagating to `try`/`?(...)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Cause {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("compile error: {0}")]
    CompileError(String),
    #[error("arity error: {0}")]
    ArityError(String),
    #[error("bad argument: {0}")]
    ArgKindError(String),
    #[error("variable not found: ${0}")]
    UndefinedVariable(String),
    #[error("unknown command: {0}")]
    UndefinedCommand(String),
    #[error("not a callable: {0}")]
    NotCallable(String),
    #[error("external command failed with exit status {0}")]
    ExternalCommandFailed(i32),
    #[error("no match for wildcard: {0}")]
    WildcardNoMatch(String),
    #[error("I/O error: {0}")]
    IOError(String),
    #[error("{0}")]
    UserFail(Box<Value>),
    #[error("return")]
    Return,
    #[error("break")]
    Break,
    #[error("continue")]
    Continue,
}

impl Cause {
    /// Control-flow markers are intercepted by a specific construct instead
    /// of propagating to `try`/`?(...)` (§7).
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Cause::Return | Cause::Break | Cause::Continue)
    }
}

/// A raised failure, carrying whatever the failing `Op` had already written
/// to its byte sink / emitted on its value channel.
#[derive(Debug, Clone)]
pub struct Exception {
    pub cause: Cause,
    pub traceback: Vec<Span>,
    pub partial_bytes: Vec<u8>,
    pub partial_values: Vec<Value>,
}

impl Exception {
    pub fn new(cause: Cause) -> Self {
        Self {
            cause,
            traceback: Vec::new(),
            partial_bytes: Vec::new(),
            partial_values: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.traceback.push(span);
        self
    }

    pub fn is_control_flow(&self) -> bool {
        self.cause.is_control_flow()
    }

    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self::new(Cause::UserFail(Box::new(Value::str(msg.into()))))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for Exception {}

/// Shorthand used throughout the evaluator: any `Op`/builtin step either
/// succeeds with unit or raises an `Exception`.
pub type EvalResult<T = ()> = Result<T, Exception>;
