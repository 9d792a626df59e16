//! Compiler (SPEC_FULL.md §4.1): lowers the AST to closures over `EvalCtx`.
//!
//! Grounded in the teacher's split between word expansion
//! (`interpreter/word_expansion.rs`, producing a value from an expression)
//! and command execution (`interpreter/execution_engine.rs`, running a
//! command against the current ports) — generalized here into two compiled
//! artifact kinds, `Op` (a pipeline stage / control form / chunk) and
//! `ExprOp` (anything evaluating to exactly one `Value`).
//!
//! Name resolution is dynamic: rather than resolving every reference to a
//! static (depth, slot-index) pair at compile time, a compiled `Op` holds
//! the name string and looks it up through the live `Frame` chain at run
//! time. `Frame`'s backing map is already a hashed `IndexMap`, so the cost
//! difference is small, and it avoids needing a separate static-scope
//! tracking pass (see DESIGN.md for this Open Question's resolution).

use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast;
use crate::closure::{CallArgs, Callable, ClosureData};
use crate::container;
use crate::eval::EvalCtx;
use crate::exception::{Cause, EvalResult, Exception, Span};
use crate::glob;
use crate::pipeline;
use crate::scope::{NameRef, Slot};
use crate::value::Value;

pub type Op = Arc<dyn Fn(&mut EvalCtx) -> EvalResult<()> + Send + Sync>;
pub type ExprOp = Arc<dyn Fn(&mut EvalCtx) -> EvalResult<Value> + Send + Sync>;

pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Compiler
    }

    pub fn compile_chunk(&self, chunk: &ast::Chunk) -> EvalResult<Op> {
        let pipelines: Vec<Op> = chunk
            .pipelines
            .iter()
            .map(|p| self.compile_pipeline(p))
            .collect::<EvalResult<_>>()?;
        Ok(Arc::new(move |ctx: &mut EvalCtx| {
            ctx.tick()?;
            for p in &pipelines {
                p(ctx)?;
            }
            Ok(())
        }))
    }

    fn compile_pipeline(&self, p: &ast::Pipeline) -> EvalResult<Op> {
        match p {
            ast::Pipeline::Forms { forms, .. } => self.compile_forms(forms),
            ast::Pipeline::Compound(c) => self.compile_compound(c),
            ast::Pipeline::Assign(a) => self.compile_assignment(a),
        }
    }

    /// `x = 1`, `local:x = 1`, spacey `a @b = 2 3 foo`, and `x[k] = v`
    /// (§4.1, §9). The non-spacey target/value-count mismatch is a compile
    /// error, since both lengths are static; the spacey form only requires
    /// enough values to cover the fixed targets.
    fn compile_assignment(&self, a: &ast::Assignment) -> EvalResult<Op> {
        if a.destructure {
            if a.rest_target.is_some() || a.values.len() != 1 {
                return Err(Exception::new(Cause::CompileError(
                    "brace destructuring assignment takes exactly one value expression".into(),
                )));
            }
            let targets: Vec<CompiledTarget> = a
                .targets
                .iter()
                .map(|t| self.compile_target(t))
                .collect::<EvalResult<_>>()?;
            let value = self.compile_expr(&a.values[0])?;
            let span: Span = a.span.into();
            return Ok(Arc::new(move |ctx: &mut EvalCtx| {
                ctx.tick()?;
                let v = value(ctx)?;
                let items = v
                    .as_list()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("destructuring assignment requires a list value".into())))
                    .map_err(|e| e.with_span(span))?;
                if items.len() != targets.len() {
                    return Err(Exception::new(Cause::ArityError(format!(
                        "destructuring assignment has {} target(s) but value has {} element(s)",
                        targets.len(),
                        items.len()
                    )))
                    .with_span(span));
                }
                for (target, val) in targets.iter().zip(items.iter().cloned()) {
                    target.assign(ctx, val).map_err(|e| e.with_span(span))?;
                }
                Ok(())
            }));
        }

        if a.rest_target.is_none() && a.targets.len() != a.values.len() {
            return Err(Exception::new(Cause::CompileError(format!(
                "assignment has {} target(s) but {} value(s)",
                a.targets.len(),
                a.values.len()
            ))));
        }
        if a.rest_target.is_some() && a.values.len() < a.targets.len() {
            return Err(Exception::new(Cause::CompileError(
                "spacey assignment needs at least one value per fixed target".into(),
            )));
        }

        let targets: Vec<CompiledTarget> = a
            .targets
            .iter()
            .map(|t| self.compile_target(t))
            .collect::<EvalResult<_>>()?;
        let rest_target = a
            .rest_target
            .as_ref()
            .map(|t| self.compile_target(t))
            .transpose()?;
        let values: Vec<ExprOp> = a.values.iter().map(|v| self.compile_expr(v)).collect::<EvalResult<_>>()?;
        let span: Span = a.span.into();

        Ok(Arc::new(move |ctx: &mut EvalCtx| {
            ctx.tick()?;
            let mut vals = values.iter().map(|v| v(ctx)).collect::<EvalResult<Vec<_>>>()?;
            let rest_vals = vals.split_off(targets.len());
            for (target, val) in targets.iter().zip(vals) {
                target.assign(ctx, val).map_err(|e| e.with_span(span))?;
            }
            if let Some(rest) = &rest_target {
                rest.assign(ctx, Value::list(rest_vals)).map_err(|e| e.with_span(span))?;
            }
            Ok(())
        }))
    }

    fn compile_target(&self, t: &ast::AssignTarget) -> EvalResult<CompiledTarget> {
        match t {
            ast::AssignTarget::Plain(name) => Ok(CompiledTarget::Plain(name.clone())),
            ast::AssignTarget::Local(name) => Ok(CompiledTarget::Local(name.clone())),
            ast::AssignTarget::Up(name) => Ok(CompiledTarget::Up(name.clone())),
            ast::AssignTarget::Env(name) => Ok(CompiledTarget::Env(name.clone())),
            ast::AssignTarget::Index(name, idx_exprs) => {
                let idx: Vec<ExprOp> = idx_exprs.iter().map(|e| self.compile_expr(e)).collect::<EvalResult<_>>()?;
                Ok(CompiledTarget::Index(name.clone(), idx))
            }
        }
    }

    fn compile_forms(&self, forms: &[ast::Form]) -> EvalResult<Op> {
        let stages: Vec<Op> = forms
            .iter()
            .map(|f| self.compile_form(f))
            .collect::<EvalResult<_>>()?;
        Ok(Arc::new(move |ctx: &mut EvalCtx| {
            pipeline::run_pipeline(ctx, stages.clone())
        }))
    }

    fn compile_form(&self, f: &ast::Form) -> EvalResult<Op> {
        let temp_assigns: Vec<(String, ExprOp)> = f
            .temp_assignments
            .iter()
            .map(|a| self.compile_temp_assignment(a))
            .collect::<EvalResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        let head = self.compile_head(&f.head)?;
        let args: Vec<CompiledArg> = f
            .args
            .iter()
            .map(|a| self.compile_arg(a))
            .collect::<EvalResult<_>>()?;
        let options: Vec<(String, ExprOp)> = f
            .options
            .iter()
            .map(|(k, e)| Ok::<_, Exception>((k.clone(), self.compile_expr(e)?)))
            .collect::<EvalResult<_>>()?;
        let redirs: Vec<CompiledRedirection> = f
            .redirections
            .iter()
            .map(|r| self.compile_redirection(r))
            .collect::<EvalResult<_>>()?;
        let span: Span = f.span.into();

        Ok(Arc::new(move |ctx: &mut EvalCtx| -> EvalResult<()> {
            ctx.tick()?;

            let mut temp_snapshots: Vec<(String, Option<Slot>)> = Vec::new();
            for (name, value_op) in &temp_assigns {
                let prev = ctx.frame.get_local_slot(name);
                let v = value_op(ctx)?;
                ctx.frame.declare_local(name, v);
                temp_snapshots.push((name.clone(), prev));
            }

            let outcome = run_form_body(ctx, &head, &args, &options, &redirs, span);

            for (name, prev) in temp_snapshots.into_iter().rev() {
                match prev {
                    Some(slot) => ctx.frame.set_local_slot(&name, slot),
                    None => ctx.frame.remove_local(&name),
                }
            }

            outcome
        }))
    }

    /// A form's head has no separate command namespace (unlike elvish's
    /// `name~`): a bare word is looked up as an ordinary variable first, and
    /// only falls back to being treated as an external command's name when
    /// nothing is bound under it. `e:name`, being lexed as `e`/`:`/`name`
    /// and reassembled via `Concat`, never takes this lookup path, so it
    /// always dispatches as an external command regardless of what `name`
    /// might otherwise resolve to.
    fn compile_head(&self, e: &ast::Expr) -> EvalResult<ExprOp> {
        if let ast::Expr::Str(name, _) = e {
            let name = name.clone();
            return Ok(Arc::new(move |ctx: &mut EvalCtx| {
                match ctx.frame.get_slot(&name) {
                    Some(slot) => Ok(slot.lock().unwrap().clone()),
                    None => Ok(Value::str(name.clone())),
                }
            }));
        }
        self.compile_expr(e)
    }

    /// `a=1 b=2 cmd` temp-assignment targets (§4.1). Only plain names are
    /// supported as temporary-assignment targets; `local:`/`up:`/`E:`/index
    /// targets on a temporary assignment are rejected at compile time since
    /// "restore after this one form" has no sensible meaning for them.
    fn compile_temp_assignment(&self, a: &ast::Assignment) -> EvalResult<Vec<(String, ExprOp)>> {
        if a.targets.len() != a.values.len() || a.rest_target.is_some() {
            return Err(Exception::new(Cause::CompileError(
                "temporary assignments must pair one value per target".into(),
            )));
        }
        a.targets
            .iter()
            .zip(&a.values)
            .map(|(t, v)| match t {
                ast::AssignTarget::Plain(name) => Ok((name.clone(), self.compile_expr(v)?)),
                _ => Err(Exception::new(Cause::CompileError(
                    "temporary assignments only support plain names".into(),
                ))),
            })
            .collect()
    }

    fn compile_arg(&self, a: &ast::Arg) -> EvalResult<CompiledArg> {
        match a {
            ast::Arg::Plain(e) => Ok(CompiledArg::Plain(self.compile_expr(e)?)),
            ast::Arg::Spread(e) => Ok(CompiledArg::Spread(self.compile_expr(e)?)),
            ast::Arg::Glob { pattern, nomatch_ok, .. } => {
                let parts: Vec<ExprOp> = pattern
                    .iter()
                    .map(|e| self.compile_expr(e))
                    .collect::<EvalResult<_>>()?;
                Ok(CompiledArg::Glob(parts, *nomatch_ok))
            }
        }
    }

    fn compile_redirection(&self, r: &ast::Redirection) -> EvalResult<CompiledRedirection> {
        let (kind, expr, mode) = match r {
            ast::Redirection::Read(e, _) => (RedirTarget::Stdin, e, RedirMode::Read),
            ast::Redirection::Write(e, _) => (RedirTarget::Stdout, e, RedirMode::Write),
            ast::Redirection::Append(e, _) => (RedirTarget::Stdout, e, RedirMode::Append),
            ast::Redirection::ReadWrite(e, _) => (RedirTarget::Stdout, e, RedirMode::ReadWrite),
        };
        Ok(CompiledRedirection {
            target: kind,
            mode,
            path: self.compile_expr(expr)?,
        })
    }

    fn compile_compound(&self, c: &ast::Compound) -> EvalResult<Op> {
        match c {
            ast::Compound::If { branches, else_body, span } => {
                let compiled_branches: Vec<(ExprOp, Op)> = branches
                    .iter()
                    .map(|(cond, body)| Ok::<_, Exception>((self.compile_expr(cond)?, self.compile_chunk(body)?)))
                    .collect::<EvalResult<_>>()?;
                let else_op = else_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    ctx.tick()?;
                    for (cond, body) in &compiled_branches {
                        if truthy(&cond(ctx)?) {
                            return body(ctx).map_err(|e| e.with_span(span));
                        }
                    }
                    if let Some(op) = &else_op {
                        return op(ctx).map_err(|e| e.with_span(span));
                    }
                    Ok(())
                }))
            }
            ast::Compound::While { cond, body, else_body, span } => {
                let cond = self.compile_expr(cond)?;
                let body = self.compile_chunk(body)?;
                let else_op = else_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let mut ran = false;
                    loop {
                        ctx.tick()?;
                        if !truthy(&cond(ctx)?) {
                            break;
                        }
                        ran = true;
                        match body(ctx) {
                            Ok(()) => {}
                            Err(e) if matches!(e.cause, Cause::Break) => return Ok(()),
                            Err(e) if matches!(e.cause, Cause::Continue) => continue,
                            Err(e) => return Err(e.with_span(span)),
                        }
                    }
                    if !ran {
                        if let Some(op) = &else_op {
                            return op(ctx).map_err(|e| e.with_span(span));
                        }
                    }
                    Ok(())
                }))
            }
            ast::Compound::For { var, iterable, body, else_body, span } => {
                let var = var.clone();
                let iterable = self.compile_expr(iterable)?;
                let body = self.compile_chunk(body)?;
                let else_op = else_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let items = iterable(ctx)?;
                    let items = items.as_list().map(|s| s.to_vec()).ok_or_else(|| {
                        Exception::new(Cause::ArgKindError("for: not a list".into())).with_span(span)
                    })?;
                    let mut ran = false;
                    for item in items {
                        ctx.tick()?;
                        ran = true;
                        ctx.frame.declare_local(&var, item);
                        match body(ctx) {
                            Ok(()) => {}
                            Err(e) if matches!(e.cause, Cause::Break) => return Ok(()),
                            Err(e) if matches!(e.cause, Cause::Continue) => continue,
                            Err(e) => return Err(e.with_span(span)),
                        }
                    }
                    if !ran {
                        if let Some(op) = &else_op {
                            return op(ctx).map_err(|e| e.with_span(span));
                        }
                    }
                    Ok(())
                }))
            }
            ast::Compound::Try {
                body,
                except_var,
                except_body,
                else_body,
                finally_body,
                span,
            } => {
                let body = self.compile_chunk(body)?;
                let except_var = except_var.clone();
                let except_op = except_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let else_op = else_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let finally_op = finally_body.as_ref().map(|b| self.compile_chunk(b)).transpose()?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    ctx.tick()?;
                    let result = body(ctx);
                    let outcome = match result {
                        Ok(()) => {
                            if let Some(op) = &else_op {
                                op(ctx)
                            } else {
                                Ok(())
                            }
                        }
                        Err(e) if e.is_control_flow() => Err(e),
                        Err(e) => {
                            if let Some(op) = &except_op {
                                if let Some(name) = &except_var {
                                    ctx.frame.declare_local(name, Value::Exception(Arc::new(e)));
                                }
                                op(ctx)
                            } else {
                                Err(e)
                            }
                        }
                    };
                    if let Some(op) = &finally_op {
                        op(ctx)?;
                    }
                    outcome.map_err(|e| e.with_span(span))
                }))
            }
        }
    }

    pub fn compile_expr(&self, e: &ast::Expr) -> EvalResult<ExprOp> {
        match e {
            ast::Expr::Str(s, _) => {
                let v = Value::str(s.clone());
                Ok(Arc::new(move |_ctx: &mut EvalCtx| Ok(v.clone())))
            }
            ast::Expr::Bool(b, _) => {
                let b = *b;
                Ok(Arc::new(move |_ctx: &mut EvalCtx| Ok(Value::bool(b))))
            }
            ast::Expr::Var(name, span) => {
                let name_ref = NameRef::parse(name);
                let span: Span = (*span).into();
                let display = name.clone();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    resolve(ctx, &name_ref, &display)
                        .map(|slot| slot.lock().unwrap().clone())
                        .map_err(|e| e.with_span(span))
                }))
            }
            ast::Expr::Capture(chunk, _) => {
                let op = self.compile_chunk(chunk)?;
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    ctx.capture_output(&op).map(Value::list)
                }))
            }
            ast::Expr::ExceptionCapture(chunk, _) => {
                let op = self.compile_chunk(chunk)?;
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    ctx.capture_exception(&op).map(Value::bool)
                }))
            }
            ast::Expr::Lambda(lambda, _) => self.compile_lambda(lambda),
            ast::Expr::List(items, _) => {
                let items: Vec<ExprOp> = items.iter().map(|e| self.compile_expr(e)).collect::<EvalResult<_>>()?;
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let values = items.iter().map(|op| op(ctx)).collect::<EvalResult<Vec<_>>>()?;
                    Ok(Value::list(values))
                }))
            }
            ast::Expr::Map(pairs, _) => {
                let pairs: Vec<(ExprOp, ExprOp)> = pairs
                    .iter()
                    .map(|(k, v)| Ok::<_, Exception>((self.compile_expr(k)?, self.compile_expr(v)?)))
                    .collect::<EvalResult<_>>()?;
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let mut m = IndexMap::new();
                    for (k, v) in &pairs {
                        m.insert(k(ctx)?, v(ctx)?);
                    }
                    Ok(Value::map(m))
                }))
            }
            ast::Expr::Index(base, idx, span) => {
                let base = self.compile_expr(base)?;
                let idx = self.compile_expr(idx)?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let b = base(ctx)?;
                    let i = idx(ctx)?;
                    container::index(&b, &i).map_err(|e| e.with_span(span))
                }))
            }
            ast::Expr::Slice(base, begin, end, span) => {
                let base = self.compile_expr(base)?;
                let begin = begin.as_deref().map(|e| self.compile_expr(e)).transpose()?;
                let end = end.as_deref().map(|e| self.compile_expr(e)).transpose()?;
                let span: Span = (*span).into();
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let b = base(ctx)?;
                    let begin_n = begin.as_ref().map(|op| parse_index(&op(ctx)?)).transpose()?;
                    let end_n = end.as_ref().map(|op| parse_index(&op(ctx)?)).transpose()?;
                    container::slice(&b, begin_n, end_n).map_err(|e| e.with_span(span))
                }))
            }
            ast::Expr::Concat(parts, _) => {
                let parts: Vec<ExprOp> = parts.iter().map(|e| self.compile_expr(e)).collect::<EvalResult<_>>()?;
                Ok(Arc::new(move |ctx: &mut EvalCtx| {
                    let mut out = String::new();
                    for p in &parts {
                        out.push_str(&p(ctx)?.display_text());
                    }
                    Ok(Value::str(out))
                }))
            }
            ast::Expr::Tilde(user, _) => {
                let user = user.clone();
                Ok(Arc::new(move |_ctx: &mut EvalCtx| {
                    glob::expand_tilde(user.as_deref()).map(Value::str)
                }))
            }
        }
    }

    fn compile_lambda(&self, lambda: &ast::Lambda) -> EvalResult<ExprOp> {
        let params = lambda.params.clone();
        let rest = lambda.rest.clone();
        let option_exprs: Vec<(String, ExprOp)> = lambda
            .options
            .iter()
            .map(|(k, e)| Ok::<_, Exception>((k.clone(), self.compile_expr(e)?)))
            .collect::<EvalResult<_>>()?;
        let body = self.compile_chunk(&lambda.body)?;
        let name = lambda.fn_sugar_name.clone();

        Ok(Arc::new(move |ctx: &mut EvalCtx| {
            let mut options = IndexMap::new();
            for (k, default_op) in &option_exprs {
                options.insert(k.clone(), default_op(ctx)?);
            }
            let closure = ClosureData {
                params: params.clone(),
                rest: rest.clone(),
                options,
                body: body.clone(),
                captured_frame: ctx.frame.clone(),
                name: name.clone(),
            };
            Ok(Value::Fn(Arc::new(Callable::Closure(Arc::new(closure)))))
        }))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

enum CompiledTarget {
    Plain(String),
    Local(String),
    Up(String),
    Env(String),
    Index(String, Vec<ExprOp>),
}

impl CompiledTarget {
    fn assign(&self, ctx: &mut EvalCtx, value: Value) -> EvalResult<()> {
        match self {
            CompiledTarget::Plain(name) => {
                ctx.frame.assign(name, value);
                Ok(())
            }
            CompiledTarget::Local(name) => {
                ctx.frame.declare_local(name, value);
                Ok(())
            }
            CompiledTarget::Up(name) => ctx.frame.assign_up(name, value),
            CompiledTarget::Env(name) => {
                std::env::set_var(name, value.display_text());
                Ok(())
            }
            CompiledTarget::Index(name, idx_ops) => {
                let current = ctx
                    .frame
                    .get_slot(name)
                    .ok_or_else(|| Exception::new(Cause::UndefinedVariable(name.clone())))?
                    .lock()
                    .unwrap()
                    .clone();
                let keys = idx_ops.iter().map(|op| op(ctx)).collect::<EvalResult<Vec<_>>>()?;
                let updated = container::assoc_path(&current, &keys, value)?;
                ctx.frame.assign(name, updated);
                Ok(())
            }
        }
    }
}

enum CompiledArg {
    Plain(ExprOp),
    Spread(ExprOp),
    Glob(Vec<ExprOp>, bool),
}

impl CompiledArg {
    fn expand(&self, ctx: &mut EvalCtx, out: &mut Vec<Value>) -> EvalResult<()> {
        match self {
            CompiledArg::Plain(op) => {
                out.push(op(ctx)?);
                Ok(())
            }
            CompiledArg::Spread(op) => {
                let v = op(ctx)?;
                let items = v
                    .as_list()
                    .ok_or_else(|| Exception::new(Cause::ArgKindError("@ spread requires a list".into())))?;
                out.extend(items.iter().cloned());
                Ok(())
            }
            CompiledArg::Glob(parts, nomatch_ok) => {
                let mut pattern = String::new();
                for p in parts {
                    pattern.push_str(&p(ctx)?.display_text());
                }
                let matches = glob::expand_or_fail(&pattern, *nomatch_ok)?;
                out.extend(matches.into_iter().map(Value::str));
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy)]
enum RedirTarget {
    Stdin,
    Stdout,
}

#[derive(Clone, Copy)]
enum RedirMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

struct CompiledRedirection {
    target: RedirTarget,
    mode: RedirMode,
    path: ExprOp,
}

enum PortSnapshot {
    Stdin(crate::port::InPort),
    Stdout(crate::port::OutPort),
}

impl CompiledRedirection {
    fn apply(&self, ctx: &mut EvalCtx) -> EvalResult<PortSnapshot> {
        let path_val = (self.path)(ctx)?;
        let path = path_val
            .as_str()
            .ok_or_else(|| Exception::new(Cause::ArgKindError("redirection target must be a string path".into())))?;

        use std::fs::OpenOptions;
        match self.target {
            RedirTarget::Stdin => {
                let file = OpenOptions::new()
                    .read(true)
                    .open(path)
                    .map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                let new_port = crate::port::InPort {
                    bytes: crate::port::ByteReader::File(Arc::new(std::sync::Mutex::new(file))),
                    values: crate::port::ValueReader::Empty,
                };
                Ok(PortSnapshot::Stdin(std::mem::replace(&mut ctx.ports.stdin, new_port)))
            }
            RedirTarget::Stdout => {
                let mut opts = OpenOptions::new();
                match self.mode {
                    RedirMode::Write => {
                        opts.write(true).create(true).truncate(true);
                    }
                    RedirMode::Append => {
                        opts.append(true).create(true);
                    }
                    RedirMode::ReadWrite => {
                        opts.read(true).write(true).create(true);
                    }
                    RedirMode::Read => unreachable!("stdout redirection can't be Read"),
                }
                let file = opts.open(path).map_err(|e| Exception::new(Cause::IOError(e.to_string())))?;
                let new_port = crate::port::OutPort {
                    bytes: crate::port::ByteWriter::File(Arc::new(std::sync::Mutex::new(file))),
                    values: crate::port::ValueWriter::Discard,
                };
                Ok(PortSnapshot::Stdout(std::mem::replace(&mut ctx.ports.stdout, new_port)))
            }
        }
    }

    fn restore(&self, ctx: &mut EvalCtx, snap: PortSnapshot) {
        match snap {
            PortSnapshot::Stdin(p) => ctx.ports.stdin = p,
            PortSnapshot::Stdout(p) => ctx.ports.stdout = p,
        }
    }
}

fn run_form_body(
    ctx: &mut EvalCtx,
    head: &ExprOp,
    args: &[CompiledArg],
    options: &[(String, ExprOp)],
    redirs: &[CompiledRedirection],
    span: Span,
) -> EvalResult<()> {
    let mut port_snapshots = Vec::with_capacity(redirs.len());
    let result = (|| -> EvalResult<()> {
        for r in redirs {
            port_snapshots.push(r.apply(ctx)?);
        }

        let head_val = head(ctx)?;

        let mut positional = Vec::new();
        for a in args {
            a.expand(ctx, &mut positional)?;
        }

        let mut opt_map = IndexMap::new();
        for (k, op) in options {
            opt_map.insert(k.clone(), op(ctx)?);
        }

        dispatch(ctx, &head_val, positional, opt_map)
    })();

    for (r, snap) in redirs.iter().zip(port_snapshots.into_iter()).rev() {
        r.restore(ctx, snap);
    }

    result.map_err(|e| e.with_span(span))
}

fn dispatch(ctx: &mut EvalCtx, head: &Value, positional: Vec<Value>, options: IndexMap<String, Value>) -> EvalResult<()> {
    match head {
        Value::Fn(callable) => ctx.invoke(callable, CallArgs::new(positional, options)),
        Value::Str(name) => {
            if !options.is_empty() {
                return Err(Exception::new(Cause::ArgKindError(format!(
                    "external command {name} does not accept named options"
                ))));
            }
            let args: Vec<String> = positional.iter().map(Value::display_text).collect();
            let stdin_bytes = ctx.ports.stdin.bytes.read_to_end()?;
            let (stdout, stderr, code) = crate::builtins::process::run_external(name, &args, &[], &stdin_bytes)?;
            ctx.ports.stdout.bytes.write(&stdout)?;
            ctx.ports.stderr.bytes.write(&stderr)?;
            if code != 0 {
                let mut e = Exception::new(Cause::ExternalCommandFailed(code));
                e.partial_bytes = stdout;
                return Err(e);
            }
            Ok(())
        }
        other => Err(Exception::new(Cause::NotCallable(other.type_name().to_string()))),
    }
}

fn resolve(ctx: &mut EvalCtx, name_ref: &NameRef, display: &str) -> EvalResult<Slot> {
    match name_ref {
        NameRef::Local(name) => ctx
            .frame
            .get_local_slot(name)
            .ok_or_else(|| Exception::new(Cause::UndefinedVariable(format!("local:{name}")))),
        NameRef::Up(name) => ctx
            .frame
            .parent()
            .and_then(|p| p.get_slot(name))
            .ok_or_else(|| Exception::new(Cause::UndefinedVariable(format!("up:{name}")))),
        NameRef::Env(name) => {
            let v = std::env::var(name).unwrap_or_default();
            Ok(crate::scope::new_slot(Value::str(v)))
        }
        NameRef::Plain(name) => ctx
            .frame
            .get_slot(name)
            .ok_or_else(|| Exception::new(Cause::UndefinedVariable(display.to_string()))),
        NameRef::Namespaced(path, name) => ctx
            .frame
            .resolve_namespaced(path, name)
            .ok_or_else(|| Exception::new(Cause::UndefinedVariable(display.to_string()))),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Str(s) => !s.is_empty(),
        _ => true,
    }
}

fn parse_index(v: &Value) -> EvalResult<i64> {
    v.as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("not an integer index: {}", v.repr()))))
}
