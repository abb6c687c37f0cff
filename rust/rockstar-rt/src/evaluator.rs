//! The tree-walking, line-at-a-time evaluator.
//!
//! A program is split into lines (blank lines preserved as single-token
//! markers, an `EndOfFile` sentinel appended) and run one line at a time
//! from a cursor. Control flow — `If`/`Else`/`While`/`Until` — is tracked
//! with two small stacks rather than a parsed block tree: `pending_block`
//! remembers which construct a future blank line closes, and
//! `loop_return_lines` remembers where to jump back to when that
//! construct is a loop. A third piece of state, `skip`, fast-forwards
//! over a branch that wasn't taken.

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::function::Function;
use rockstar_compiler::{Token, TokenKind};
use rockstar_core::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    While,
    Until,
}

/// State while fast-forwarding over a branch that wasn't taken.
///
/// `depth` counts nested `If`/`While`/`Until` openers seen while
/// skipping, decremented by blank lines; it reaches zero when the
/// skipped construct's own closing blank line is found. `pop_pending_on_exit`
/// is set only when skipping an `Else` body whose `If` was already pushed
/// onto `pending_block` at the top of the construct (condition true) —
/// the skip's own exit must then perform the normal close instead of a
/// no-op, to keep the stack balanced.
#[derive(Debug, Clone, Copy)]
struct SkipState {
    depth: usize,
    pop_pending_on_exit: bool,
}

/// Groups a flat token stream into lines. A blank line is represented as
/// a single-token line carrying its `NewLine`; the stream's trailing
/// `EndOfFile` becomes its own final line.
pub(crate) fn split_lines(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for tok in tokens {
        match tok.kind {
            TokenKind::NewLine => {
                if current.is_empty() {
                    lines.push(vec![tok]);
                } else {
                    lines.push(std::mem::take(&mut current));
                }
            }
            TokenKind::EndOfFile => {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(vec![tok]);
            }
            _ => current.push(tok),
        }
    }
    if lines.is_empty() {
        lines.push(vec![Token::new(TokenKind::EndOfFile, "", 1)]);
    }
    lines
}

pub struct Evaluator {
    lines: Vec<Vec<Token>>,
    cursor: usize,
    env: Environment,
    /// Snapshot of the caller's variables at call time, consulted only
    /// when a name isn't found locally. Never written through.
    parent_vars: Option<HashMap<String, Value>>,
    functions: Rc<RefCell<HashMap<String, Function>>>,
    pending_block: Vec<BlockKind>,
    loop_return_lines: Vec<usize>,
    skip: Option<SkipState>,
    /// Set for the duration of one `eval_expr_with` call: lets the
    /// expression parser synthesize a leading operand from this variable
    /// when the expression opens with a bare operator (`let x be plus 3`).
    current_var: Option<String>,
    result: Option<Value>,
    out: Rc<RefCell<dyn Write>>,
}

impl Evaluator {
    pub fn new(tokens: Vec<Token>, out: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            lines: split_lines(tokens),
            cursor: 0,
            env: Environment::new(),
            parent_vars: None,
            functions: Rc::new(RefCell::new(HashMap::new())),
            pending_block: Vec::new(),
            loop_return_lines: Vec::new(),
            skip: None,
            current_var: None,
            result: None,
            out,
        }
    }

    pub(crate) fn call_frame(
        tokens: Vec<Token>,
        env: Environment,
        parent_vars: HashMap<String, Value>,
        functions: Rc<RefCell<HashMap<String, Function>>>,
        out: Rc<RefCell<dyn Write>>,
    ) -> Self {
        Self {
            lines: split_lines(tokens),
            cursor: 0,
            env,
            parent_vars: Some(parent_vars),
            functions,
            pending_block: Vec::new(),
            loop_return_lines: Vec::new(),
            skip: None,
            current_var: None,
            result: None,
            out,
        }
    }

    /// Runs until `Give`/EOF, returning the given-back value, or `Null`
    /// if the program/function never explicitly gives one back.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let line = self.lines[self.cursor].clone();
            if line[0].kind == TokenKind::EndOfFile {
                return Ok(self.result.take().unwrap_or(Value::Null));
            }
            if let Some(skip) = self.skip {
                self.step_skip(&line, skip)?;
                continue;
            }
            trace!(line = line[0].line, kind = ?line[0].kind, "dispatch");
            match line[0].kind {
                TokenKind::NewLine => self.close_block(),
                TokenKind::Else => {
                    self.skip = Some(SkipState { depth: 1, pop_pending_on_exit: true });
                    self.cursor += 1;
                }
                TokenKind::Shout => {
                    self.dispatch_shout(&line)?;
                    self.cursor += 1;
                }
                TokenKind::Let => {
                    self.dispatch_let(&line)?;
                    self.cursor += 1;
                }
                TokenKind::Put => {
                    self.dispatch_put(&line)?;
                    self.cursor += 1;
                }
                TokenKind::Build => {
                    self.dispatch_build_knock(&line, false)?;
                    self.cursor += 1;
                }
                TokenKind::Knock => {
                    self.dispatch_build_knock(&line, true)?;
                    self.cursor += 1;
                }
                TokenKind::Give => return self.dispatch_give(&line),
                TokenKind::Rock => {
                    self.dispatch_rock(&line)?;
                    self.cursor += 1;
                }
                TokenKind::Roll => {
                    self.dispatch_roll(&line)?;
                    self.cursor += 1;
                }
                TokenKind::Turn => {
                    self.dispatch_turn(&line)?;
                    self.cursor += 1;
                }
                TokenKind::If => self.enter_conditional(&line)?,
                TokenKind::While => self.enter_loop(&line, BlockKind::While)?,
                TokenKind::Until => self.enter_loop(&line, BlockKind::Until)?,
                TokenKind::Variable => self.dispatch_variable(&line)?,
                _ => {
                    return Err(RuntimeError::UnexpectedStatement {
                        token: line[0].to_string(),
                        line: line[0].line,
                    });
                }
            }
        }
    }

    // ---- block / skip bookkeeping -------------------------------------

    fn pop_pending_block(&mut self) -> Option<(BlockKind, Option<usize>)> {
        let kind = self.pending_block.pop()?;
        let loop_line = if matches!(kind, BlockKind::While | BlockKind::Until) {
            self.loop_return_lines.pop()
        } else {
            None
        };
        Some((kind, loop_line))
    }

    fn close_block(&mut self) {
        match self.pop_pending_block() {
            Some((BlockKind::While, Some(loop_line))) | Some((BlockKind::Until, Some(loop_line))) => {
                self.cursor = loop_line;
            }
            _ => self.cursor += 1,
        }
    }

    fn step_skip(&mut self, line: &[Token], mut skip: SkipState) -> Result<(), RuntimeError> {
        match line[0].kind {
            TokenKind::If | TokenKind::While | TokenKind::Until => {
                skip.depth += 1;
                self.skip = Some(skip);
                self.cursor += 1;
            }
            TokenKind::NewLine => {
                skip.depth -= 1;
                if skip.depth == 0 {
                    if skip.pop_pending_on_exit {
                        self.pop_pending_block();
                    }
                    self.skip = None;
                } else {
                    self.skip = Some(skip);
                }
                self.cursor += 1;
            }
            TokenKind::Else if skip.depth == 1 && !skip.pop_pending_on_exit => {
                // Found the matching else for a skipped (condition-false)
                // If: fall into the else body as normal execution, and
                // push the If so the construct's eventual blank line
                // still has exactly one entry to close.
                self.pending_block.push(BlockKind::If);
                self.skip = None;
                self.cursor += 1;
            }
            _ => {
                self.skip = Some(skip);
                self.cursor += 1;
            }
        }
        Ok(())
    }

    fn enter_conditional(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let (cond, end) = self.eval_expr(line, 1)?;
        Self::expect_expr_consumed(line, end)?;
        if cond.as_bool() {
            self.pending_block.push(BlockKind::If);
        } else {
            self.skip = Some(SkipState { depth: 1, pop_pending_on_exit: false });
        }
        self.cursor += 1;
        Ok(())
    }

    fn enter_loop(&mut self, line: &[Token], kind: BlockKind) -> Result<(), RuntimeError> {
        let (cond, end) = self.eval_expr(line, 1)?;
        Self::expect_expr_consumed(line, end)?;
        let wants_true = matches!(kind, BlockKind::While);
        if cond.as_bool() == wants_true {
            self.pending_block.push(kind);
            self.loop_return_lines.push(self.cursor);
        } else {
            self.skip = Some(SkipState { depth: 1, pop_pending_on_exit: false });
        }
        self.cursor += 1;
        Ok(())
    }

    // ---- statement dispatch -------------------------------------------

    fn dispatch_shout(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let (val, end) = self.eval_expr(line, 1)?;
        Self::expect_expr_consumed(line, end)?;
        let mut out = self.out.borrow_mut();
        writeln!(out, "{}", val.as_string()).map_err(|e| RuntimeError::Io {
            message: e.to_string(),
            line: line[0].line,
        })
    }

    fn dispatch_give(&mut self, line: &[Token]) -> Result<Value, RuntimeError> {
        let mut i = 1;
        if line.get(i).map(|t| t.kind) == Some(TokenKind::Back) {
            i += 1;
        }
        let (val, end) = self.eval_expr(line, i)?;
        Self::expect_expr_consumed(line, end)?;
        Ok(val)
    }

    fn dispatch_let(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let var_tok = line
            .get(1)
            .ok_or(RuntimeError::MalformedStatement { statement: "let", line: line[0].line })?;
        let name = self.resolve_name(var_tok)?;
        let mut i = 2;
        if line.get(i).map(|t| t.kind) == Some(TokenKind::At) {
            i += 1;
            let (idx_val, ni) = self.parse_additive(line, i)?;
            i = ni;
            if line.get(i).map(|t| t.kind) != Some(TokenKind::Be) {
                return Err(RuntimeError::MalformedStatement { statement: "let", line: line[0].line });
            }
            i += 1;
            let (val, end) = self.eval_expr_with(line, i, &name)?;
            Self::expect_expr_consumed(line, end)?;
            let idx = idx_val.as_number() as i64;
            self.env
                .set_index(&name, idx, val)
                .map_err(|e| RuntimeError::Value { source: e, line: line[0].line })?;
        } else {
            if line.get(i).map(|t| t.kind) != Some(TokenKind::Be) {
                return Err(RuntimeError::MalformedStatement { statement: "let", line: line[0].line });
            }
            i += 1;
            let (val, end) = self.eval_expr_with(line, i, &name)?;
            Self::expect_expr_consumed(line, end)?;
            self.env.set(&name, val);
        }
        self.env.set_pronoun(&name);
        Ok(())
    }

    fn dispatch_put(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let into_pos = line
            .iter()
            .position(|t| t.kind == TokenKind::Into)
            .ok_or(RuntimeError::MalformedStatement { statement: "put", line: line[0].line })?;
        let (val, end) = self.eval_expr(&line[..into_pos], 1)?;
        Self::expect_expr_consumed(&line[..into_pos], end)?;
        let var_tok = line
            .get(into_pos + 1)
            .ok_or(RuntimeError::MalformedStatement { statement: "put", line: line[0].line })?;
        let name = self.resolve_name(var_tok)?;
        self.env.set(&name, val);
        self.env.set_pronoun(&name);
        Ok(())
    }

    fn dispatch_build_knock(&mut self, line: &[Token], down: bool) -> Result<(), RuntimeError> {
        let statement = if down { "knock" } else { "build" };
        let target_tok = line
            .get(1)
            .ok_or(RuntimeError::MalformedStatement { statement, line: line[0].line })?;
        let name = self.resolve_name(target_tok)?;
        let mut count = 0u32;
        let mut i = 2;
        while let Some(tok) = line.get(i) {
            match tok.kind {
                TokenKind::Up | TokenKind::Down => {
                    count += 1;
                    i += 1;
                }
                TokenKind::Comma => i += 1,
                _ => break,
            }
        }
        if count == 0 {
            return Err(RuntimeError::EmptyBuildKnock { line: line[0].line });
        }
        let current = self.get_value(&name);
        let updated = match current {
            Value::Bool(b) => Value::Bool(if count % 2 == 1 { !b } else { b }),
            Value::Number(n) => {
                Value::Number(if down { n - f64::from(count) } else { n + f64::from(count) })
            }
            other => {
                return Err(RuntimeError::NotBuildable { type_name: other.type_name(), line: line[0].line });
            }
        };
        self.env.set(&name, updated);
        Ok(())
    }

    fn dispatch_rock(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let target_tok = line
            .get(1)
            .ok_or(RuntimeError::MalformedStatement { statement: "rock", line: line[0].line })?;
        let name = self.resolve_name(target_tok)?;
        match line.get(2).map(|t| t.kind) {
            None => self.env.ensure_array(&name),
            Some(TokenKind::Like) => {
                let (val, _) = self.parse_atom(line, 3)?;
                self.env.push(&name, val);
            }
            Some(TokenKind::Plus) => {
                let mut i = 3;
                loop {
                    let (val, ni) = self.parse_additive(line, i)?;
                    self.env.push(&name, val);
                    i = ni;
                    if line.get(i).map(|t| t.kind) == Some(TokenKind::Comma) {
                        i += 1;
                    } else {
                        break;
                    }
                }
            }
            _ => return Err(RuntimeError::MalformedStatement { statement: "rock", line: line[0].line }),
        }
        self.env.set_pronoun(&name);
        Ok(())
    }

    fn dispatch_roll(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let target_tok = line
            .get(1)
            .ok_or(RuntimeError::MalformedStatement { statement: "roll", line: line[0].line })?;
        let name = self.resolve_name(target_tok)?;
        let popped = self
            .env
            .pop_front(&name)
            .map_err(|e| RuntimeError::Value { source: e, line: line[0].line })?;
        if line.get(2).map(|t| t.kind) == Some(TokenKind::Into) {
            let dest_tok = line
                .get(3)
                .ok_or(RuntimeError::MalformedStatement { statement: "roll", line: line[0].line })?;
            let dest = self.resolve_name(dest_tok)?;
            self.env.set(&dest, popped);
            self.env.set_pronoun(&dest);
        } else {
            self.env.set_pronoun(&name);
        }
        Ok(())
    }

    fn dispatch_turn(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let dir_tok = line
            .get(1)
            .ok_or(RuntimeError::MalformedStatement { statement: "turn", line: line[0].line })?;
        let up = match dir_tok.kind {
            TokenKind::Up => true,
            TokenKind::Down => false,
            _ => return Err(RuntimeError::MalformedStatement { statement: "turn", line: line[0].line }),
        };
        let target_tok = line
            .get(2)
            .ok_or(RuntimeError::MalformedStatement { statement: "turn", line: line[0].line })?;
        let name = self.resolve_name(target_tok)?;
        let current = self.get_value(&name);
        let n = match current {
            Value::Number(n) => n,
            other => {
                return Err(RuntimeError::NotTurnable { type_name: other.type_name(), line: line[0].line });
            }
        };
        let updated = if up { n.ceil() } else { n.floor() };
        self.env.set(&name, Value::Number(updated));
        self.env.set_pronoun(&name);
        Ok(())
    }

    fn dispatch_variable(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        match line.get(1).map(|t| t.kind) {
            Some(TokenKind::Is) => {
                let (val, end) = self.eval_expr(line, 2)?;
                Self::expect_expr_consumed(line, end)?;
                let name = line[0].text.clone();
                self.env.set(&name, val);
                self.env.set_pronoun(&name);
                self.cursor += 1;
            }
            Some(TokenKind::Says) => {
                let text = line.get(2).map(|t| t.text.clone()).unwrap_or_default();
                let name = line[0].text.clone();
                self.env.set(&name, Value::String(text));
                self.env.set_pronoun(&name);
                self.cursor += 1;
            }
            Some(TokenKind::Takes) => self.declare_function(line)?,
            Some(TokenKind::Taking) => {
                let name = line[0].text.clone();
                let (args, _) = self.parse_call_args(line, 2)?;
                self.call_function(&name, args, line[0].line)?;
                self.cursor += 1;
            }
            _ => {
                return Err(RuntimeError::UnexpectedStatement {
                    token: line[0].to_string(),
                    line: line[0].line,
                });
            }
        }
        Ok(())
    }

    fn declare_function(&mut self, line: &[Token]) -> Result<(), RuntimeError> {
        let name = line[0].text.clone();
        let mut func = Function::new();
        let mut i = 2;
        match line.get(i) {
            Some(t) if t.kind == TokenKind::Variable => {
                func.add_parameter(t.text.clone());
                i += 1;
            }
            _ => return Err(RuntimeError::MalformedStatement { statement: "takes", line: line[0].line }),
        }
        loop {
            match line.get(i).map(|t| t.kind) {
                Some(TokenKind::Comma) | Some(TokenKind::And) => {
                    i += 1;
                    match line.get(i) {
                        Some(t) if t.kind == TokenKind::Variable => {
                            func.add_parameter(t.text.clone());
                            i += 1;
                        }
                        _ => {
                            return Err(RuntimeError::MalformedStatement {
                                statement: "takes",
                                line: line[0].line,
                            });
                        }
                    }
                }
                _ => break,
            }
        }
        self.cursor += 1;
        for tok in self.capture_function_body() {
            func.add_token(tok);
        }
        self.functions.borrow_mut().insert(name, func);
        Ok(())
    }

    /// Collects the tokens of every line following the current cursor up
    /// to (and consuming) the function's closing blank line. Nested
    /// `If`/`While`/`Until` blocks keep their own blank lines inside the
    /// body rather than ending the function early.
    fn capture_function_body(&mut self) -> Vec<Token> {
        let mut body = Vec::new();
        let mut nest = 0usize;
        loop {
            let line = &self.lines[self.cursor];
            match line[0].kind {
                TokenKind::EndOfFile => break,
                TokenKind::NewLine => {
                    if nest == 0 {
                        self.cursor += 1;
                        break;
                    }
                    nest -= 1;
                    body.push(line[0].clone());
                    self.cursor += 1;
                }
                TokenKind::If | TokenKind::While | TokenKind::Until => {
                    nest += 1;
                    let line_no = line[0].line;
                    body.extend(line.iter().cloned());
                    body.push(Token::new(TokenKind::NewLine, "\n", line_no));
                    self.cursor += 1;
                }
                _ => {
                    let line_no = line[0].line;
                    body.extend(line.iter().cloned());
                    body.push(Token::new(TokenKind::NewLine, "\n", line_no));
                    self.cursor += 1;
                }
            }
        }
        body
    }

    fn call_function(&mut self, name: &str, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
        let func = self
            .functions
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction { name: name.to_string(), line })?;
        let caller_vars = self.env.snapshot();
        func.call(args, Rc::clone(&self.functions), caller_vars, Rc::clone(&self.out), line)
    }

    // ---- name / value resolution ---------------------------------------

    fn resolve_name(&self, tok: &Token) -> Result<String, RuntimeError> {
        match tok.kind {
            TokenKind::Variable => Ok(tok.text.clone()),
            TokenKind::Pronoun => self
                .env
                .pronoun()
                .map(|s| s.to_string())
                .ok_or(RuntimeError::NoPronounAntecedent { line: tok.line }),
            _ => Err(RuntimeError::UnexpectedToken { token: tok.to_string(), line: tok.line }),
        }
    }

    fn get_value(&self, name: &str) -> Value {
        if let Some(v) = self.env.get(name) {
            return v.clone();
        }
        if let Some(parent) = &self.parent_vars {
            if let Some(v) = parent.get(name) {
                return v.clone();
            }
        }
        Value::Null
    }

    // ---- expressions -----------------------------------------------------

    fn eval_expr(&mut self, tokens: &[Token], start: usize) -> Result<(Value, usize), RuntimeError> {
        self.current_var = None;
        self.parse_or(tokens, start)
    }

    fn eval_expr_with(
        &mut self,
        tokens: &[Token],
        start: usize,
        current_var: &str,
    ) -> Result<(Value, usize), RuntimeError> {
        self.current_var = Some(current_var.to_string());
        self.parse_or(tokens, start)
    }

    /// Per spec §4.4: once exactly one operand remains the expression's
    /// value is that operand; anything left over is malformed. Statement
    /// dispatchers that expect an expression to run to the end of the
    /// line (or sub-slice) call this against the index `eval_expr*`
    /// returned, rather than silently discarding it.
    fn expect_expr_consumed(tokens: &[Token], end: usize) -> Result<(), RuntimeError> {
        match tokens.get(end) {
            Some(tok) => Err(RuntimeError::UnexpectedToken { token: tok.to_string(), line: tok.line }),
            None => Ok(()),
        }
    }

    fn parse_or(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let (mut left, mut i) = self.parse_and(tokens, i)?;
        while tokens.get(i).map(|t| t.kind) == Some(TokenKind::Or) {
            if left.as_bool() {
                return Ok((Value::Bool(true), tokens.len()));
            }
            let (right, ni) = self.parse_and(tokens, i + 1)?;
            left = Value::Bool(right.as_bool());
            i = ni;
        }
        Ok((left, i))
    }

    fn parse_and(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let (mut left, mut i) = self.parse_comparison(tokens, i)?;
        while tokens.get(i).map(|t| t.kind) == Some(TokenKind::And) {
            if !left.as_bool() {
                return Ok((Value::Bool(false), tokens.len()));
            }
            let (right, ni) = self.parse_comparison(tokens, i + 1)?;
            left = Value::Bool(right.as_bool());
            i = ni;
        }
        Ok((left, i))
    }

    fn parse_comparison(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let (left, i) = self.parse_additive(tokens, i)?;
        match tokens.get(i).map(|t| t.kind) {
            Some(TokenKind::Is) | Some(TokenKind::Isnt) => self.parse_is_isnt(tokens, i, left),
            _ => Ok((left, i)),
        }
    }

    /// `Is`/`Isnt` followed by an optional comparator (`as great as`, `as
    /// little as`, `greater than`, `lower than`, `not`) and a single
    /// trailing atom. `Isnt` negates the whole comparison — this folds in
    /// the fix for the reference dialect's `isn't` bug, where a bare
    /// `isn't` was wired to `Equal` instead of `NotEqual`.
    fn parse_is_isnt(
        &mut self,
        tokens: &[Token],
        i: usize,
        left: Value,
    ) -> Result<(Value, usize), RuntimeError> {
        let negate_all = tokens[i].kind == TokenKind::Isnt;
        let line = tokens[i].line;
        let mut i = i + 1;
        enum Cmp {
            Eq,
            NotEq,
            Gt,
            Lt,
            Ge,
            Le,
        }
        let cmp = match tokens.get(i).map(|t| t.kind) {
            Some(TokenKind::Not) => {
                i += 1;
                Cmp::NotEq
            }
            Some(TokenKind::As) => match tokens.get(i + 1).map(|t| t.kind) {
                Some(TokenKind::Great) => {
                    if tokens.get(i + 2).map(|t| t.kind) != Some(TokenKind::As) {
                        return Err(RuntimeError::MalformedComparator { line });
                    }
                    i += 3;
                    Cmp::Ge
                }
                Some(TokenKind::Little) => {
                    if tokens.get(i + 2).map(|t| t.kind) != Some(TokenKind::As) {
                        return Err(RuntimeError::MalformedComparator { line });
                    }
                    i += 3;
                    Cmp::Le
                }
                _ => return Err(RuntimeError::MalformedComparator { line }),
            },
            Some(TokenKind::Greater) => {
                if tokens.get(i + 1).map(|t| t.kind) != Some(TokenKind::Than) {
                    return Err(RuntimeError::MalformedComparator { line });
                }
                i += 2;
                Cmp::Gt
            }
            Some(TokenKind::Lower) => {
                if tokens.get(i + 1).map(|t| t.kind) != Some(TokenKind::Than) {
                    return Err(RuntimeError::MalformedComparator { line });
                }
                i += 2;
                Cmp::Lt
            }
            _ => Cmp::Eq,
        };
        let (rhs, i) = self.parse_atom(tokens, i)?;
        let mut result = match cmp {
            Cmp::Eq => left.loose_eq(&rhs),
            Cmp::NotEq => !left.loose_eq(&rhs),
            Cmp::Gt => left.greater_than(&rhs).map_err(|e| RuntimeError::Value { source: e, line })?,
            Cmp::Lt => left.less_than(&rhs).map_err(|e| RuntimeError::Value { source: e, line })?,
            Cmp::Ge => left.greater_or_equal(&rhs).map_err(|e| RuntimeError::Value { source: e, line })?,
            Cmp::Le => left.less_or_equal(&rhs).map_err(|e| RuntimeError::Value { source: e, line })?,
        };
        if negate_all {
            result = !result;
        }
        Ok((Value::Bool(result), i))
    }

    fn parse_additive(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let (mut left, mut i) = self.parse_multiplicative(tokens, i)?;
        loop {
            match tokens.get(i).map(|t| t.kind) {
                Some(TokenKind::Plus) => {
                    let (right, ni) = self.parse_multiplicative(tokens, i + 1)?;
                    left = left.add(&right);
                    i = ni;
                }
                Some(TokenKind::Minus) => {
                    let (right, ni) = self.parse_multiplicative(tokens, i + 1)?;
                    left = left.sub(&right);
                    i = ni;
                }
                _ => break,
            }
        }
        Ok((left, i))
    }

    fn parse_multiplicative(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let (mut left, mut i) = self.parse_unary(tokens, i)?;
        loop {
            match tokens.get(i).map(|t| t.kind) {
                Some(TokenKind::Times) => {
                    let (right, ni) = self.parse_unary(tokens, i + 1)?;
                    left = left.mul(&right);
                    i = ni;
                }
                Some(TokenKind::Over) => {
                    let (right, ni) = self.parse_unary(tokens, i + 1)?;
                    left = left.div(&right);
                    i = ni;
                }
                _ => break,
            }
        }
        Ok((left, i))
    }

    fn parse_unary(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        // One-shot seed: an expression that opens directly on an operator
        // (`let x be plus 3`) synthesizes its left-hand operand from the
        // statement's named variable instead of failing to parse an atom.
        if let Some(name) = self.current_var.take() {
            if matches!(
                tokens.get(i).map(|t| t.kind),
                Some(TokenKind::Plus) | Some(TokenKind::Minus) | Some(TokenKind::Times) | Some(TokenKind::Over)
            ) {
                return Ok((self.get_value(&name), i));
            }
        }
        if tokens.get(i).map(|t| t.kind) == Some(TokenKind::Not) {
            let (v, ni) = self.parse_unary(tokens, i + 1)?;
            return Ok((Value::Bool(!v.as_bool()), ni));
        }
        self.parse_atom(tokens, i)
    }

    fn parse_atom(&mut self, tokens: &[Token], i: usize) -> Result<(Value, usize), RuntimeError> {
        let tok = tokens
            .get(i)
            .ok_or(RuntimeError::UnexpectedExpressionEnd { line: tokens.last().map(|t| t.line).unwrap_or(0) })?;
        let (mut value, mut i) = match tok.kind {
            TokenKind::Number => (tok.literal.clone().unwrap_or_else(|| Value::Number(tok.text.parse().unwrap_or(0.0))), i + 1),
            TokenKind::String => (tok.literal.clone().unwrap_or_else(|| Value::String(tok.text.clone())), i + 1),
            TokenKind::True => (tok.literal.clone().unwrap_or(Value::Bool(true)), i + 1),
            TokenKind::False => (tok.literal.clone().unwrap_or(Value::Bool(false)), i + 1),
            TokenKind::Null => (tok.literal.clone().unwrap_or(Value::Null), i + 1),
            TokenKind::Mysterious => (tok.literal.clone().unwrap_or(Value::Undefined), i + 1),
            TokenKind::Pronoun => {
                let name = self.resolve_name(tok)?;
                (self.get_value(&name), i + 1)
            }
            TokenKind::Roll => {
                let name_tok = tokens
                    .get(i + 1)
                    .ok_or(RuntimeError::UnexpectedExpressionEnd { line: tok.line })?;
                let name = self.resolve_name(name_tok)?;
                let popped = self
                    .env
                    .pop_front(&name)
                    .map_err(|e| RuntimeError::Value { source: e, line: tok.line })?;
                (popped, i + 2)
            }
            TokenKind::Variable => {
                let name = tok.text.clone();
                if tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::Taking) {
                    let (args, ni) = self.parse_call_args(tokens, i + 2)?;
                    let result = self.call_function(&name, args, tok.line)?;
                    (result, ni)
                } else {
                    (self.get_value(&name), i + 1)
                }
            }
            _ => return Err(RuntimeError::UnexpectedToken { token: tok.to_string(), line: tok.line }),
        };
        loop {
            if tokens.get(i).map(|t| t.kind) == Some(TokenKind::At) {
                let (idx_val, ni) = self.parse_additive(tokens, i + 1)?;
                let idx = idx_val.as_number() as i64;
                value = value
                    .get_index(idx)
                    .map_err(|e| RuntimeError::Value { source: e, line: tok.line })?;
                i = ni;
            } else {
                break;
            }
        }
        Ok((value, i))
    }

    /// `Taking`'s argument list: one bare additive-level expression, then
    /// any number more each preceded by a discarded `,` or `and` — kept
    /// at additive precedence (not full `parse_or`) since `and` doubles
    /// as both the logical connective and the argument separator.
    fn parse_call_args(&mut self, tokens: &[Token], mut i: usize) -> Result<(Vec<Value>, usize), RuntimeError> {
        let mut args = Vec::new();
        let (v, ni) = self.parse_additive(tokens, i)?;
        args.push(v);
        i = ni;
        loop {
            match tokens.get(i).map(|t| t.kind) {
                Some(TokenKind::Comma) | Some(TokenKind::And) => {
                    i += 1;
                    let (v, ni) = self.parse_additive(tokens, i)?;
                    args.push(v);
                    i = ni;
                }
                _ => break,
            }
        }
        Ok((args, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockstar_compiler::tokenize;

    fn run_capture(source: &str) -> (Value, String) {
        let tokens = tokenize(source).expect("tokenize");
        let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
        let writer: Rc<RefCell<dyn Write>> = sink.clone() as Rc<RefCell<dyn Write>>;
        let mut ev = Evaluator::new(tokens, writer);
        let result = ev.run().expect("run");
        let out = String::from_utf8(sink.borrow().clone()).unwrap();
        (result, out)
    }

    #[test]
    fn shout_prints_value() {
        let (_, out) = run_capture("Put 5 into X\nShout X\n");
        assert_eq!(out, "5\n");
    }

    #[test]
    fn let_adds_numbers() {
        let (_, out) = run_capture("Let X be 1\nLet X be X plus 2\nShout X\n");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn let_with_bare_operator_uses_named_variable() {
        let (_, out) = run_capture("Let X be 5\nLet X be plus 3\nShout X\n");
        assert_eq!(out, "8\n");
    }

    #[test]
    fn if_takes_true_branch() {
        let (_, out) = run_capture("Let X be 1\nIf X is 1\nShout \"yes\"\n\n");
        assert_eq!(out, "yes\n");
    }

    #[test]
    fn if_takes_else_branch() {
        let (_, out) = run_capture("Let X be 0\nIf X is 1\nShout \"yes\"\nElse\nShout \"no\"\n\n");
        assert_eq!(out, "no\n");
    }

    #[test]
    fn while_loop_counts_down() {
        let src = "Let X be 3\nWhile X is greater than 0\nShout X\nLet X be X minus 1\n\n";
        let (_, out) = run_capture(src);
        assert_eq!(out, "3\n2\n1\n");
    }

    #[test]
    fn isnt_negates_equality() {
        let (_, out) = run_capture("If 1 isn't 2\nShout \"neq\"\n\n");
        assert_eq!(out, "neq\n");
    }

    #[test]
    fn function_call_returns_value() {
        let src = "Double takes X\nGive back X plus X\n\nShout Double taking 4\n";
        let (_, out) = run_capture(src);
        assert_eq!(out, "8\n");
    }

    #[test]
    fn function_arity_mismatch_errors() {
        let tokens = tokenize("Add takes X, Y\nGive back X plus Y\n\nShout Add taking 1\n").unwrap();
        let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut ev = Evaluator::new(tokens, sink);
        let err = ev.run().unwrap_err();
        assert!(matches!(err, RuntimeError::ArityMismatch { want: 2, got: 1, .. }));
    }

    #[test]
    fn rock_and_roll_are_fifo() {
        let src = "Rock the list with 1, 2, 3\nRoll the list into X\nShout X\n";
        let (_, out) = run_capture(src);
        assert_eq!(out, "1\n");
    }

    #[test]
    fn pronoun_resolves_to_last_named_variable() {
        let src = "Let X be 5\nLet it be it plus 1\nShout X\n";
        let (_, out) = run_capture(src);
        assert_eq!(out, "6\n");
    }

    #[test]
    fn build_up_increments() {
        let (_, out) = run_capture("Let X be 1\nBuild X up, up\nShout X\n");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn turn_up_ceils_and_down_floors() {
        let (_, out) = run_capture("Let X be 1.2\nTurn up X\nShout X\n");
        assert_eq!(out, "2\n");
    }

    #[test]
    fn while_loop_with_less_than_runs_expected_iterations() {
        let src = "Counter is 0\nWhile Counter is less than 3\nBuild Counter up\nShout Counter\n\n";
        let (_, out) = run_capture(src);
        assert_eq!(out, "1\n2\n3\n");
    }

    #[test]
    fn shout_with_leftover_tokens_is_malformed() {
        let tokens = tokenize("Shout 1 2\n").unwrap();
        let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut ev = Evaluator::new(tokens, sink);
        let err = ev.run().unwrap_err();
        assert!(matches!(err, RuntimeError::UnexpectedToken { .. }));
    }

    #[test]
    fn if_condition_with_leftover_tokens_is_malformed() {
        let tokens = tokenize("If 1 is 1 2\nShout \"yes\"\n\n").unwrap();
        let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut ev = Evaluator::new(tokens, sink);
        let err = ev.run().unwrap_err();
        assert!(matches!(err, RuntimeError::UnexpectedToken { .. }));
    }

    #[test]
    fn parse_atom_reads_literal_token_over_its_text() {
        let tok = Token::from_value(Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]), 1);
        let tokens = vec![tok, Token::new(TokenKind::EndOfFile, "", 1)];
        let sink: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut ev = Evaluator::new(Vec::new(), sink);
        let (val, end) = ev.parse_atom(&tokens, 0).expect("parse_atom");
        assert_eq!(val, Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]));
        assert_eq!(end, 1);
    }
}
