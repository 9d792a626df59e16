//! Recursive-descent parser (SPEC_FULL.md §1, §4.1, §6): turns a token
//! stream into the `ast::Chunk` the Compiler consumes.
//!
//! Grounded in the teacher's `parser::parser` module (a hand-written
//! descent over its own lexer, one function per grammar production) but
//! sized to this language's much smaller grammar: no here-documents, no
//! arithmetic sub-expressions, no brace-expansion. This is the minimal
//! text-to-AST bridge the CLI and test harness need to run a script; it is
//! not meant to recover from malformed input the way a REPL's parser would.

mod lexer;

use crate::ast::{
    Arg, AssignTarget, Assignment, Chunk, Compound, Expr, Form, Lambda, Pipeline, Redirection, Span,
};
use crate::exception::{Cause, EvalResult, Exception};
use lexer::{lex, TokKind, Token};

/// Parse a full script into a `Chunk`, the Compiler's sole input.
pub fn parse(src: &str) -> EvalResult<Chunk> {
    let toks = lex(src).map_err(|msg| Exception::new(Cause::ParseError(msg)))?;
    let mut p = Parser { toks, pos: 0 };
    let chunk = p.parse_chunk(None)?;
    p.expect(TokKind::Eof)?;
    Ok(chunk)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

enum BracketItem {
    Plain(Expr),
    Option(String, Expr),
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.toks.get(self.pos + offset).unwrap_or_else(|| self.toks.last().unwrap())
    }

    fn cur_kind(&self) -> TokKind {
        self.peek().kind
    }

    fn cur_begin(&self) -> usize {
        self.peek().begin
    }

    fn prev_end(&self) -> usize {
        self.toks[self.pos.saturating_sub(1)].end
    }

    fn advance(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokKind) -> EvalResult<Token> {
        if self.cur_kind() == kind {
            Ok(self.advance())
        } else {
            Err(parse_err(format!("expected {kind:?}, found {}", self.peek())))
        }
    }

    fn expect_word(&mut self) -> EvalResult<String> {
        if self.cur_kind() == TokKind::Word {
            Ok(self.advance().text)
        } else {
            Err(parse_err(format!("expected a word, found {}", self.peek())))
        }
    }

    fn cur_is_word(&self, text: &str) -> bool {
        self.cur_kind() == TokKind::Word && self.peek().text == text
    }

    fn expect_keyword(&mut self, kw: &str) -> EvalResult<Token> {
        if self.cur_is_word(kw) {
            Ok(self.advance())
        } else {
            Err(parse_err(format!("expected '{kw}', found {}", self.peek())))
        }
    }

    fn at_pipeline_end(&self) -> bool {
        matches!(
            self.cur_kind(),
            TokKind::Eof | TokKind::Semicolon | TokKind::Newline | TokKind::Pipe | TokKind::RBrace | TokKind::RParen
        )
    }

    fn skip_seps(&mut self) {
        while matches!(self.cur_kind(), TokKind::Semicolon | TokKind::Newline) {
            self.advance();
        }
    }

    /// `stop == None` is the top-level chunk (runs to `Eof`); `Some(kind)` is
    /// a nested body that stops at its closing delimiter without consuming
    /// it (the caller does that).
    fn parse_chunk(&mut self, stop: Option<TokKind>) -> EvalResult<Chunk> {
        let begin = self.cur_begin();
        let mut pipelines = Vec::new();
        self.skip_seps();
        loop {
            if self.cur_kind() == TokKind::Eof {
                break;
            }
            if let Some(k) = stop {
                if self.cur_kind() == k {
                    break;
                }
            }
            pipelines.push(self.parse_pipeline()?);
            self.skip_seps();
        }
        let end = self.prev_end();
        Ok(Chunk { pipelines, span: Span { begin, end } })
    }

    fn parse_pipeline(&mut self) -> EvalResult<Pipeline> {
        if self.cur_is_word("if") {
            return Ok(Pipeline::Compound(self.parse_if()?));
        }
        if self.cur_is_word("while") {
            return Ok(Pipeline::Compound(self.parse_while()?));
        }
        if self.cur_is_word("for") {
            return Ok(Pipeline::Compound(self.parse_for()?));
        }
        if self.cur_is_word("try") {
            return Ok(Pipeline::Compound(self.parse_try()?));
        }
        if self.cur_is_word("fn") {
            return self.parse_fn_sugar();
        }
        self.parse_forms_or_assign()
    }

    fn parse_if(&mut self) -> EvalResult<Compound> {
        let begin = self.cur_begin();
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        loop {
            let cond = self.parse_glued_expr()?;
            self.expect(TokKind::LBrace)?;
            let body = self.parse_chunk(Some(TokKind::RBrace))?;
            self.expect(TokKind::RBrace)?;
            branches.push((cond, body));
            if self.cur_is_word("elif") {
                self.advance();
                continue;
            }
            break;
        }
        let else_body = self.parse_optional_else()?;
        let end = self.prev_end();
        Ok(Compound::If { branches, else_body, span: Span { begin, end } })
    }

    fn parse_optional_else(&mut self) -> EvalResult<Option<Chunk>> {
        if self.cur_is_word("else") {
            self.advance();
            self.expect(TokKind::LBrace)?;
            let body = self.parse_chunk(Some(TokKind::RBrace))?;
            self.expect(TokKind::RBrace)?;
            Ok(Some(body))
        } else {
            Ok(None)
        }
    }

    fn parse_while(&mut self) -> EvalResult<Compound> {
        let begin = self.cur_begin();
        self.expect_keyword("while")?;
        let cond = self.parse_glued_expr()?;
        self.expect(TokKind::LBrace)?;
        let body = self.parse_chunk(Some(TokKind::RBrace))?;
        self.expect(TokKind::RBrace)?;
        let else_body = self.parse_optional_else()?;
        let end = self.prev_end();
        Ok(Compound::While { cond, body, else_body, span: Span { begin, end } })
    }

    fn parse_for(&mut self) -> EvalResult<Compound> {
        let begin = self.cur_begin();
        self.expect_keyword("for")?;
        let var = self.expect_word()?;
        self.expect_keyword("in")?;
        let iterable = self.parse_glued_expr()?;
        self.expect(TokKind::LBrace)?;
        let body = self.parse_chunk(Some(TokKind::RBrace))?;
        self.expect(TokKind::RBrace)?;
        let else_body = self.parse_optional_else()?;
        let end = self.prev_end();
        Ok(Compound::For { var, iterable, body, else_body, span: Span { begin, end } })
    }

    fn parse_try(&mut self) -> EvalResult<Compound> {
        let begin = self.cur_begin();
        self.expect_keyword("try")?;
        self.expect(TokKind::LBrace)?;
        let body = self.parse_chunk(Some(TokKind::RBrace))?;
        self.expect(TokKind::RBrace)?;

        let mut except_var = None;
        let mut except_body = None;
        if self.cur_is_word("except") {
            self.advance();
            if self.cur_kind() == TokKind::Word {
                except_var = Some(self.advance().text);
            }
            self.expect(TokKind::LBrace)?;
            except_body = Some(self.parse_chunk(Some(TokKind::RBrace))?);
            self.expect(TokKind::RBrace)?;
        }

        let else_body = self.parse_optional_else()?;

        let finally_body = if self.cur_is_word("finally") {
            self.advance();
            self.expect(TokKind::LBrace)?;
            let b = self.parse_chunk(Some(TokKind::RBrace))?;
            self.expect(TokKind::RBrace)?;
            Some(b)
        } else {
            None
        };

        let end = self.prev_end();
        Ok(Compound::Try { body, except_var, except_body, else_body, finally_body, span: Span { begin, end } })
    }

    /// `fn name [params]{body}` desugars straight to `name = [params]{body}`:
    /// this evaluator resolves a form's head like any other expression, so
    /// there's no separate command namespace requiring the `name~` slot the
    /// sugar binds to elsewhere.
    fn parse_fn_sugar(&mut self) -> EvalResult<Pipeline> {
        let begin = self.cur_begin();
        self.expect_keyword("fn")?;
        let name = self.expect_word()?;
        let lambda_expr = self.parse_atom()?;
        let mut lambda = match lambda_expr {
            Expr::Lambda(l, _) => l,
            _ => return Err(parse_err("fn sugar requires a [params]{body} lambda".into())),
        };
        lambda.fn_sugar_name = Some(name.clone());
        let end = self.prev_end();
        let span = Span { begin, end };
        Ok(Pipeline::Assign(Assignment {
            targets: vec![AssignTarget::Plain(name)],
            rest_target: None,
            values: vec![Expr::Lambda(lambda, span)],
            destructure: false,
            span,
        }))
    }

    fn parse_forms_or_assign(&mut self) -> EvalResult<Pipeline> {
        if self.cur_kind() == TokKind::LBrace && self.looks_like_destructure() {
            return self.parse_destructure_assign();
        }
        if let Some(a) = self.try_parse_spacey_assign()? {
            return Ok(Pipeline::Assign(a));
        }

        let mut temp_assignments = Vec::new();
        while let Some(a) = self.try_parse_compact_assign()? {
            temp_assignments.push(a);
        }

        if self.at_pipeline_end() {
            return match temp_assignments.len() {
                1 => Ok(Pipeline::Assign(temp_assignments.into_iter().next().unwrap())),
                0 => Err(parse_err("expected a command".into())),
                _ => Err(parse_err("dangling temporary assignments with no command".into())),
            };
        }

        let begin = temp_assignments.first().map(|a| a.span.begin).unwrap_or_else(|| self.cur_begin());
        let mut forms = vec![self.parse_form(temp_assignments)?];
        while self.cur_kind() == TokKind::Pipe {
            self.advance();
            forms.push(self.parse_form(Vec::new())?);
        }
        let end = self.prev_end();
        Ok(Pipeline::Forms { forms, span: Span { begin, end } })
    }

    /// `{` word (`,` word)* `}` immediately followed by `=` with no command
    /// after (§8 scenario 6). Checked with raw lookahead since a plain list
    /// literal `{...}` doesn't exist in this grammar, so any `{ident,...}=`
    /// run is unambiguously the destructure form.
    fn looks_like_destructure(&self) -> bool {
        if self.cur_kind() != TokKind::LBrace {
            return false;
        }
        let mut i = 1;
        if self.peek_at(i).kind != TokKind::Word {
            return false;
        }
        i += 1;
        loop {
            match self.peek_at(i).kind {
                TokKind::Comma => {
                    i += 1;
                    if self.peek_at(i).kind != TokKind::Word {
                        return false;
                    }
                    i += 1;
                }
                TokKind::RBrace => {
                    i += 1;
                    break;
                }
                _ => return false,
            }
        }
        self.peek_at(i).kind == TokKind::Eq
    }

    fn parse_destructure_assign(&mut self) -> EvalResult<Pipeline> {
        let begin = self.cur_begin();
        self.expect(TokKind::LBrace)?;
        let mut targets = vec![AssignTarget::Plain(self.expect_word()?)];
        while self.cur_kind() == TokKind::Comma {
            self.advance();
            targets.push(AssignTarget::Plain(self.expect_word()?));
        }
        self.expect(TokKind::RBrace)?;
        self.expect(TokKind::Eq)?;
        let value = self.parse_glued_expr()?;
        let end = self.prev_end();
        Ok(Pipeline::Assign(Assignment {
            targets,
            rest_target: None,
            values: vec![value],
            destructure: true,
            span: Span { begin, end },
        }))
    }

    /// `a @b = 2 3 foo` (§4.1): one or more bare identifiers (the last
    /// optionally `@`-prefixed as the rest target), then an `=` token that is
    /// *not* glued to the preceding target — that's what tells this form
    /// apart from the compact `x=1` shape, which is glued on both sides.
    fn try_parse_spacey_assign(&mut self) -> EvalResult<Option<Assignment>> {
        let start = self.pos;
        let begin = self.cur_begin();
        let mut targets = Vec::new();
        let mut rest_target = None;

        loop {
            if self.cur_kind() != TokKind::Word {
                self.pos = start;
                return Ok(None);
            }
            let tok = self.peek().clone();
            if let Some(rest_name) = tok.text.strip_prefix('@') {
                let rest_name = rest_name.to_string();
                self.advance();
                rest_target = Some(AssignTarget::Plain(rest_name));
                break;
            }
            self.advance();
            targets.push(AssignTarget::Plain(tok.text));
            if self.cur_kind() == TokKind::Eq {
                break;
            }
            if self.cur_kind() != TokKind::Word {
                self.pos = start;
                return Ok(None);
            }
        }

        if targets.is_empty() && rest_target.is_none() {
            self.pos = start;
            return Ok(None);
        }
        if self.cur_kind() != TokKind::Eq {
            self.pos = start;
            return Ok(None);
        }
        let last_target_end = self.prev_end();
        let eq = self.peek().clone();
        if eq.begin == last_target_end {
            // glued: this is the compact `x=1` shape, not spacey.
            self.pos = start;
            return Ok(None);
        }
        self.advance();

        let mut values = Vec::new();
        while !self.at_pipeline_end() {
            values.push(self.parse_glued_expr()?);
        }
        if values.is_empty() {
            self.pos = start;
            return Ok(None);
        }
        let end = self.prev_end();
        Ok(Some(Assignment { targets, rest_target, values, destructure: false, span: Span { begin, end } }))
    }

    /// `x=1`, `local:x=1`, `x[0]=1` — target, `=`, and the first value token
    /// all mutually glued with no whitespace.
    fn try_parse_compact_assign(&mut self) -> EvalResult<Option<Assignment>> {
        let start = self.pos;
        let begin = self.cur_begin();
        let target = match self.try_parse_target_glued()? {
            Some(t) => t,
            None => {
                self.pos = start;
                return Ok(None);
            }
        };
        let target_end = self.prev_end();
        if self.cur_kind() != TokKind::Eq || self.peek().begin != target_end {
            self.pos = start;
            return Ok(None);
        }
        let eq = self.advance();
        if self.peek().begin != eq.end || self.at_pipeline_end() {
            self.pos = start;
            return Ok(None);
        }
        let value = self.parse_glued_expr()?;
        let end = self.prev_end();
        Ok(Some(Assignment {
            targets: vec![target],
            rest_target: None,
            values: vec![value],
            destructure: false,
            span: Span { begin, end },
        }))
    }

    fn try_parse_target_glued(&mut self) -> EvalResult<Option<AssignTarget>> {
        if self.cur_kind() != TokKind::Word {
            return Ok(None);
        }
        let first = self.advance();
        let target = if matches!(first.text.as_str(), "local" | "up" | "E")
            && self.cur_kind() == TokKind::Colon
            && self.peek().begin == first.end
            && self.peek_at(1).kind == TokKind::Word
            && self.peek_at(1).begin == self.peek().end
        {
            self.advance(); // colon
            let name = self.advance().text;
            match first.text.as_str() {
                "local" => AssignTarget::Local(name),
                "up" => AssignTarget::Up(name),
                "E" => AssignTarget::Env(name),
                _ => unreachable!(),
            }
        } else {
            AssignTarget::Plain(first.text)
        };
        self.maybe_index_target(target)
    }

    fn maybe_index_target(&mut self, target: AssignTarget) -> EvalResult<Option<AssignTarget>> {
        let name = match &target {
            AssignTarget::Plain(n) | AssignTarget::Local(n) | AssignTarget::Up(n) | AssignTarget::Env(n) => n.clone(),
            AssignTarget::Index(n, _) => n.clone(),
        };
        let mut idx_exprs = Vec::new();
        while self.cur_kind() == TokKind::LBracket && self.peek().begin == self.prev_end() {
            self.advance();
            idx_exprs.push(self.parse_glued_expr()?);
            self.expect(TokKind::RBracket)?;
        }
        if idx_exprs.is_empty() {
            Ok(Some(target))
        } else {
            Ok(Some(AssignTarget::Index(name, idx_exprs)))
        }
    }

    fn parse_form(&mut self, temp_assignments: Vec<Assignment>) -> EvalResult<Form> {
        let begin = temp_assignments.first().map(|a| a.span.begin).unwrap_or_else(|| self.cur_begin());
        let head = self.parse_glued_expr()?;
        let mut args = Vec::new();
        let mut options = Vec::new();
        let mut redirections = Vec::new();
        loop {
            match self.cur_kind() {
                TokKind::Amp => {
                    self.advance();
                    let key = self.expect_word()?;
                    self.expect(TokKind::Eq)?;
                    let val = self.parse_glued_expr()?;
                    options.push((key, val));
                }
                TokKind::RedirRead | TokKind::RedirWrite | TokKind::RedirAppend | TokKind::RedirReadWrite => {
                    let kind_tok = self.advance();
                    let rbegin = kind_tok.begin;
                    let path = self.parse_glued_expr()?;
                    let rend = self.prev_end();
                    let rspan = Span { begin: rbegin, end: rend };
                    redirections.push(match kind_tok.kind {
                        TokKind::RedirRead => Redirection::Read(path, rspan),
                        TokKind::RedirWrite => Redirection::Write(path, rspan),
                        TokKind::RedirAppend => Redirection::Append(path, rspan),
                        TokKind::RedirReadWrite => Redirection::ReadWrite(path, rspan),
                        _ => unreachable!(),
                    });
                }
                TokKind::Pipe | TokKind::Semicolon | TokKind::Newline | TokKind::Eof | TokKind::RBrace | TokKind::RParen => break,
                _ => args.push(self.parse_arg()?),
            }
        }
        let end = self.prev_end();
        Ok(Form { temp_assignments, head, args, options, redirections, span: Span { begin, end } })
    }

    fn parse_arg(&mut self) -> EvalResult<Arg> {
        let begin = self.cur_begin();
        if self.cur_kind() == TokKind::Word && self.peek().text == "@" {
            self.advance();
            let inner = self.parse_glued_expr()?;
            return Ok(Arg::Spread(inner));
        }
        let (pieces, is_bareword, is_glob) = self.parse_glued_pieces()?;
        let _ = is_bareword;
        if is_glob {
            let mut nomatch_ok = false;
            if self.cur_kind() == TokKind::LBracket
                && self.peek().begin == self.prev_end()
                && self.peek_at(1).kind == TokKind::Word
                && self.peek_at(1).text == "nomatch-ok"
                && self.peek_at(2).kind == TokKind::RBracket
            {
                self.advance();
                self.advance();
                self.advance();
                nomatch_ok = true;
            }
            let end = self.prev_end();
            Ok(Arg::Glob { pattern: pieces, nomatch_ok, span: Span { begin, end } })
        } else if pieces.len() == 1 {
            Ok(Arg::Plain(pieces.into_iter().next().unwrap()))
        } else {
            let end = self.prev_end();
            Ok(Arg::Plain(Expr::Concat(pieces, Span { begin, end })))
        }
    }

    fn parse_glued_expr(&mut self) -> EvalResult<Expr> {
        let begin = self.cur_begin();
        let (pieces, _, _) = self.parse_glued_pieces()?;
        Ok(collapse(pieces, begin, self.prev_end()))
    }

    /// Reads one atom, then keeps absorbing whatever follows with no
    /// whitespace in between: more atoms (`foo$bar`), a bare `:` (module
    /// path text like `a/b/c:d`), or `[...]` index/slice chains.
    fn parse_glued_pieces(&mut self) -> EvalResult<(Vec<Expr>, bool, bool)> {
        let mut is_glob = false;
        let first_tok = self.peek().clone();
        if first_tok.kind == TokKind::Word && glob_like(&first_tok.text) {
            is_glob = true;
        }
        let mut pieces = vec![self.parse_atom()?];
        let is_bareword = first_tok.kind == TokKind::Word;

        loop {
            if self.cur_kind() == TokKind::LBracket && self.peek().begin == self.prev_end() {
                let base = pieces.pop().unwrap();
                pieces.push(self.parse_index_chain(base)?);
                continue;
            }
            if self.peek().begin != self.prev_end() {
                break;
            }
            match self.cur_kind() {
                TokKind::Colon => {
                    self.advance();
                    pieces.push(Expr::Str(":".to_string(), Span { begin: self.prev_end() - 1, end: self.prev_end() }));
                }
                TokKind::Word | TokKind::Str | TokKind::Var | TokKind::Tilde | TokKind::LParen | TokKind::QLParen | TokKind::LBracket => {
                    let tok = self.peek().clone();
                    if tok.kind == TokKind::Word && glob_like(&tok.text) {
                        is_glob = true;
                    }
                    pieces.push(self.parse_atom()?);
                }
                _ => break,
            }
        }
        Ok((pieces, is_bareword, is_glob))
    }

    fn parse_index_chain(&mut self, base: Expr) -> EvalResult<Expr> {
        let begin = base.span().begin;
        self.expect(TokKind::LBracket)?;
        let result = if self.cur_kind() == TokKind::Colon {
            self.advance();
            if self.cur_kind() == TokKind::RBracket {
                self.advance();
                Expr::Slice(Box::new(base), None, None, Span { begin, end: self.prev_end() })
            } else {
                let end_expr = self.parse_glued_expr()?;
                self.expect(TokKind::RBracket)?;
                Expr::Slice(Box::new(base), None, Some(Box::new(end_expr)), Span { begin, end: self.prev_end() })
            }
        } else {
            let first = self.parse_glued_expr()?;
            if self.cur_kind() == TokKind::Colon {
                self.advance();
                if self.cur_kind() == TokKind::RBracket {
                    self.advance();
                    Expr::Slice(Box::new(base), Some(Box::new(first)), None, Span { begin, end: self.prev_end() })
                } else {
                    let end_expr = self.parse_glued_expr()?;
                    self.expect(TokKind::RBracket)?;
                    Expr::Slice(Box::new(base), Some(Box::new(first)), Some(Box::new(end_expr)), Span { begin, end: self.prev_end() })
                }
            } else {
                self.expect(TokKind::RBracket)?;
                Expr::Index(Box::new(base), Box::new(first), Span { begin, end: self.prev_end() })
            }
        };
        if self.cur_kind() == TokKind::LBracket && self.peek().begin == self.prev_end() {
            self.parse_index_chain(result)
        } else {
            Ok(result)
        }
    }

    fn parse_atom(&mut self) -> EvalResult<Expr> {
        let t = self.peek().clone();
        match t.kind {
            TokKind::Str => {
                self.advance();
                Ok(Expr::Str(t.text, Span { begin: t.begin, end: t.end }))
            }
            TokKind::Var => {
                self.advance();
                Ok(Expr::Var(t.text, Span { begin: t.begin, end: t.end }))
            }
            TokKind::Tilde => {
                self.advance();
                Ok(Expr::Tilde(None, Span { begin: t.begin, end: t.end }))
            }
            TokKind::LParen => {
                self.advance();
                let chunk = self.parse_chunk(Some(TokKind::RParen))?;
                self.expect(TokKind::RParen)?;
                Ok(Expr::Capture(Box::new(chunk), Span { begin: t.begin, end: self.prev_end() }))
            }
            TokKind::QLParen => {
                self.advance();
                let chunk = self.parse_chunk(Some(TokKind::RParen))?;
                self.expect(TokKind::RParen)?;
                Ok(Expr::ExceptionCapture(Box::new(chunk), Span { begin: t.begin, end: self.prev_end() }))
            }
            TokKind::LBracket => self.parse_bracket_construct(),
            TokKind::Word => {
                self.advance();
                match t.text.as_str() {
                    "true" => Ok(Expr::Bool(true, Span { begin: t.begin, end: t.end })),
                    "false" => Ok(Expr::Bool(false, Span { begin: t.begin, end: t.end })),
                    _ => Ok(Expr::Str(t.text, Span { begin: t.begin, end: t.end })),
                }
            }
            _ => Err(parse_err(format!("unexpected token {t}"))),
        }
    }

    fn parse_bracket_item(&mut self) -> EvalResult<BracketItem> {
        if self.cur_kind() == TokKind::Amp {
            self.advance();
            let key = self.expect_word()?;
            self.expect(TokKind::Eq)?;
            let value = self.parse_glued_expr()?;
            Ok(BracketItem::Option(key, value))
        } else {
            Ok(BracketItem::Plain(self.parse_glued_expr()?))
        }
    }

    /// `[]`/`[a b c]` (list), `[&k=v ...]` (map), or `[params]{body}`
    /// (lambda) — disambiguated once the closing `]` is known, since a bare
    /// identifier list reads the same as a lambda's positional parameters.
    fn parse_bracket_construct(&mut self) -> EvalResult<Expr> {
        let begin = self.cur_begin();
        self.expect(TokKind::LBracket)?;
        let mut items = Vec::new();
        while self.cur_kind() != TokKind::RBracket {
            items.push(self.parse_bracket_item()?);
        }
        self.expect(TokKind::RBracket)?;

        if self.cur_kind() == TokKind::LBrace {
            self.advance();
            let body = self.parse_chunk(Some(TokKind::RBrace))?;
            self.expect(TokKind::RBrace)?;
            let mut params = Vec::new();
            let mut rest = None;
            let mut options = Vec::new();
            for item in items {
                match item {
                    BracketItem::Option(k, v) => options.push((k, v)),
                    BracketItem::Plain(Expr::Str(s, _)) => {
                        if let Some(r) = s.strip_prefix('@') {
                            rest = Some(r.to_string());
                        } else {
                            params.push(s);
                        }
                    }
                    BracketItem::Plain(_) => {
                        return Err(parse_err("lambda parameters must be plain identifiers".into()));
                    }
                }
            }
            let end = self.prev_end();
            return Ok(Expr::Lambda(
                Box::new(Lambda { params, rest, options, body, fn_sugar_name: None }),
                Span { begin, end },
            ));
        }

        let end = self.prev_end();
        let span = Span { begin, end };
        if items.is_empty() {
            return Ok(Expr::List(Vec::new(), span));
        }
        if items.iter().all(|it| matches!(it, BracketItem::Option(..))) {
            let pairs = items
                .into_iter()
                .map(|it| match it {
                    BracketItem::Option(k, v) => (Expr::Str(k, span), v),
                    BracketItem::Plain(_) => unreachable!(),
                })
                .collect();
            return Ok(Expr::Map(pairs, span));
        }
        let elems = items
            .into_iter()
            .map(|it| match it {
                BracketItem::Plain(e) => Ok(e),
                BracketItem::Option(..) => Err(parse_err("list literal can't mix in &key=value entries".into())),
            })
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(Expr::List(elems, span))
    }
}

fn collapse(mut pieces: Vec<Expr>, begin: usize, end: usize) -> Expr {
    if pieces.len() == 1 {
        pieces.pop().unwrap()
    } else {
        Expr::Concat(pieces, Span { begin, end })
    }
}

fn glob_like(text: &str) -> bool {
    text != "true" && text != "false" && text.contains(['*', '?'])
}

fn parse_err(msg: String) -> Exception {
    Exception::new(Cause::ParseError(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arg as A, Expr as E, Pipeline as P};

    fn single_form(src: &str) -> Form {
        let chunk = parse(src).unwrap();
        assert_eq!(chunk.pipelines.len(), 1);
        match chunk.pipelines.into_iter().next().unwrap() {
            P::Forms { mut forms, .. } => {
                assert_eq!(forms.len(), 1);
                forms.pop().unwrap()
            }
            other => panic!("expected a single form, got {other:?}"),
        }
    }

    #[test]
    fn parses_plain_command() {
        let form = single_form("put foo bar");
        assert!(matches!(form.head, E::Str(ref s, _) if s == "put"));
        assert_eq!(form.args.len(), 2);
    }

    #[test]
    fn parses_compact_assignment_alone() {
        let chunk = parse("x=1").unwrap();
        match &chunk.pipelines[0] {
            P::Assign(a) => {
                assert_eq!(a.targets.len(), 1);
                assert!(matches!(a.targets[0], AssignTarget::Plain(ref n) if n == "x"));
                assert!(matches!(a.values[0], E::Str(ref s, _) if s == "1"));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_temporary_assignment_before_command() {
        let form = single_form("x=1 put $x");
        assert_eq!(form.temp_assignments.len(), 1);
        assert!(matches!(form.head, E::Str(ref s, _) if s == "put"));
    }

    #[test]
    fn parses_spacey_assignment() {
        let chunk = parse("a @b = 2 3 foo").unwrap();
        match &chunk.pipelines[0] {
            P::Assign(a) => {
                assert_eq!(a.targets.len(), 1);
                assert!(a.rest_target.is_some());
                assert_eq!(a.values.len(), 3);
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_brace_destructure_assignment() {
        let chunk = parse("{i,p}=(f)").unwrap();
        match &chunk.pipelines[0] {
            P::Assign(a) => {
                assert!(a.destructure);
                assert_eq!(a.targets.len(), 2);
                assert_eq!(a.values.len(), 1);
                assert!(matches!(a.values[0], E::Capture(..)));
            }
            other => panic!("expected destructure assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_pipeline_of_forms() {
        let chunk = parse("put foo | grep foo").unwrap();
        match &chunk.pipelines[0] {
            P::Forms { forms, .. } => assert_eq!(forms.len(), 2),
            other => panic!("expected forms, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_else() {
        let chunk = parse("if $ok { put yes } else { put no }").unwrap();
        match &chunk.pipelines[0] {
            P::Compound(Compound::If { branches, else_body, .. }) => {
                assert_eq!(branches.len(), 1);
                assert!(else_body.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn parses_glob_argument() {
        let form = single_form("put *.txt");
        match &form.args[0] {
            A::Glob { nomatch_ok, .. } => assert!(!nomatch_ok),
            other => panic!("expected glob arg, got {other:?}"),
        }
    }

    #[test]
    fn parses_glob_with_nomatch_ok() {
        let form = single_form("put *.zzz[nomatch-ok]");
        match &form.args[0] {
            A::Glob { nomatch_ok, .. } => assert!(nomatch_ok),
            other => panic!("expected glob arg, got {other:?}"),
        }
    }

    #[test]
    fn parses_fn_sugar_as_plain_assignment() {
        let chunk = parse("fn greet []{ put hi }").unwrap();
        match &chunk.pipelines[0] {
            P::Assign(a) => {
                assert!(matches!(a.targets[0], AssignTarget::Plain(ref n) if n == "greet"));
                assert!(matches!(a.values[0], E::Lambda(..)));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_module_path_with_colon() {
        let form = single_form("use a/b/c:d");
        match &form.args[0] {
            A::Plain(E::Concat(parts, _)) => {
                let joined: String = parts
                    .iter()
                    .map(|p| match p {
                        E::Str(s, _) => s.clone(),
                        _ => panic!("expected string piece"),
                    })
                    .collect();
                assert_eq!(joined, "a/b/c:d");
            }
            other => panic!("expected concatenated path, got {other:?}"),
        }
    }

    #[test]
    fn parses_index_and_options() {
        let form = single_form("replaces &max=3 old new s");
        assert_eq!(form.options.len(), 1);
        assert_eq!(form.options[0].0, "max");
    }
}
