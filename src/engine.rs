use crate::cursor::{Cursor, Number, Snapshot, Symbol};
use crate::error::{BitshError, Span};
use crate::macros::MacroStore;
use crate::tasks::Scheduler;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Nested macro calls beyond this depth are a runtime error, so a
/// self-recursive macro fails cleanly instead of overflowing the stack.
const MAX_CALL_DEPTH: usize = 64;

/// Result of evaluating one statement. `Return` carries the value of a
/// `return` statement outward through every enclosing block until the
/// statement list driver stops on it. This replaces the classic trick of
/// faking end-of-input to unwind nested lists, so a real end-of-input can
/// never be confused with a `return`.
enum Flow {
    Normal(Number),
    Return(Number),
}

/// The statement-execution core: walks the raw token stream through the
/// cursor, with no syntax tree and no stored intermediate representation.
/// Untaken branches are discarded by structurally skipping their tokens,
/// and macro calls redirect the cursor into stored macro source and restore
/// the caller's exact position afterwards.
pub struct Engine {
    cursor: Cursor,
    store: MacroStore,
    sched: Scheduler,
    vars: [Number; 26],
    arg_frames: Vec<Vec<Number>>,
    call_depth: usize,
    abort: Arc<AtomicBool>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            cursor: Cursor::new(),
            store: MacroStore::new(),
            sched: Scheduler::new(),
            vars: [0; 26],
            arg_frames: Vec::new(),
            call_depth: 0,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that interrupts execution at the next statement boundary
    /// when set (e.g. from a Ctrl-C handler).
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn task_count(&self) -> usize {
        self.sched.len()
    }

    pub fn has_tasks(&self) -> bool {
        !self.sched.is_empty()
    }

    /// Time until the next background task is due, if any are scheduled.
    pub fn next_wake(&self) -> Option<Duration> {
        self.sched.next_wake(Instant::now())
    }

    /// Evaluate one source text as a statement list and return its value:
    /// the value of the last statement evaluated, or of a `return`.
    pub fn eval(&mut self, source: &str) -> Result<Number, BitshError> {
        self.cursor.enter(Rc::from(source));
        self.advance()?;
        self.statement_list()
    }

    /// True when a line holds a single bare expression whose value an
    /// interactive shell should echo. Statement keywords, assignments,
    /// macro definitions, and multi-statement lines are not echoed; their
    /// output, if any, is explicit.
    pub fn is_bare_expression(&self, line: &str) -> bool {
        let mut cursor = Cursor::new();
        cursor.enter(Rc::from(line));
        let mut first = true;
        loop {
            if cursor.advance(&self.store).is_err() {
                return false;
            }
            match cursor.sym() {
                Symbol::Eof => return !first,
                sym if first && starts_statement(sym) => return false,
                Symbol::Semi | Symbol::Assign | Symbol::Define => return false,
                _ => {}
            }
            first = false;
        }
    }

    /// Run every due background task to completion. Each wakeup re-runs the
    /// task's whole macro body; a task whose macro erred or disappeared is
    /// removed from the schedule.
    pub fn pump_background(&mut self) {
        let now = Instant::now();
        for (id, addr) in self.sched.due(now) {
            let Some(source) = self.store.source(addr) else {
                self.sched.stop(id);
                continue;
            };
            self.sched.begin_slice(id);
            let result = self.run_nested(Rc::clone(&source));
            self.sched.end_slice();
            match result {
                Ok(_) => self.sched.reschedule(id, Instant::now()),
                Err(error) => {
                    self.sched.stop(id);
                    error.report(&source, Some(&format!("<task {}>", id)));
                }
            }
        }
    }

    pub(crate) fn advance(&mut self) -> Result<(), BitshError> {
        self.cursor.advance(&self.store)
    }

    pub(crate) fn sym(&self) -> Symbol {
        self.cursor.sym()
    }

    pub(crate) fn cursor_val(&self) -> Number {
        self.cursor.val()
    }

    pub(crate) fn cursor_text(&self) -> String {
        self.cursor.text().to_string()
    }

    pub(crate) fn op_span(&self) -> Span {
        self.cursor.span()
    }

    pub(crate) fn cursor_snapshot(&self) -> Snapshot {
        self.cursor.snapshot()
    }

    pub(crate) fn cursor_restore(&mut self, snapshot: Snapshot) {
        self.cursor.restore(snapshot)
    }

    fn check_abort(&mut self) -> Result<(), BitshError> {
        if self.abort.swap(false, Ordering::Relaxed) {
            Err(BitshError::interrupted(self.cursor.span()))
        } else {
            Ok(())
        }
    }

    /// Parse and execute statements until end of input; the list's value is
    /// the value of its last statement (0 if the list was empty). This is
    /// the sequencing primitive for top-level input, braced blocks, and
    /// macro bodies alike.
    fn statement_list(&mut self) -> Result<Number, BitshError> {
        let mut value = 0;
        while self.cursor.sym() != Symbol::Eof {
            match self.statement()? {
                Flow::Normal(v) => value = v,
                Flow::Return(v) => return Ok(v),
            }
        }
        Ok(value)
    }

    /// Evaluate exactly one statement, starting at its first token.
    fn statement(&mut self) -> Result<Flow, BitshError> {
        self.check_abort()?;

        let flow = match self.cursor.sym() {
            Symbol::While => self.while_statement()?,
            Symbol::If => self.if_statement()?,
            Symbol::LeftBrace => self.block_statement()?,
            Symbol::Return => self.return_statement()?,
            Symbol::Switch => self.switch_statement()?,
            Symbol::Run => self.run_statement()?,
            Symbol::Stop => self.stop_statement()?,
            Symbol::Boot => reset_device(),
            Symbol::Rm => self.rm_statement()?,
            Symbol::Ps => {
                self.advance()?;
                self.show_tasks();
                Flow::Normal(0)
            }
            Symbol::Ls => {
                self.advance()?;
                self.show_macros();
                Flow::Normal(0)
            }
            Symbol::Help => {
                self.advance()?;
                show_help();
                Flow::Normal(0)
            }
            Symbol::Print => self.print_statement()?,
            Symbol::Peek => {
                self.advance()?;
                self.peek_store();
                Flow::Normal(0)
            }
            Symbol::Semi => Flow::Normal(0),
            _ => Flow::Normal(self.expression()?),
        };

        if self.cursor.sym() == Symbol::Semi {
            self.advance()?; // eat trailing ';'
        }
        Ok(flow)
    }

    /// `while cond stmt`: snapshot the cursor at the keyword and re-enter
    /// the conditional from that snapshot on every iteration. When the
    /// condition finally goes false, the body is skipped once structurally.
    fn while_statement(&mut self) -> Result<Flow, BitshError> {
        let top = self.cursor.snapshot();
        let mut value = 0;
        loop {
            self.cursor.restore(top.clone());
            self.advance()?; // eat "while", land on the conditional
            if self.expression()? != 0 {
                match self.statement()? {
                    Flow::Normal(v) => value = v,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            } else {
                self.skip_statement()?;
                return Ok(Flow::Normal(value));
            }
        }
    }

    /// `if cond stmt [else stmt]`: evaluate one arm, structurally skip the
    /// other.
    fn if_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "if"
        if self.expression()? != 0 {
            let flow = self.statement()?;
            if let Flow::Return(_) = flow {
                return Ok(flow);
            }
            if self.cursor.sym() == Symbol::Else {
                self.advance()?; // eat "else"
                self.skip_statement()?;
            }
            Ok(flow)
        } else {
            self.skip_statement()?;
            if self.cursor.sym() == Symbol::Else {
                self.advance()?; // eat "else"
                self.statement()
            } else {
                Ok(Flow::Normal(0))
            }
        }
    }

    /// `{ stmt; stmt; }`: a nested statement list ending at the matching
    /// right brace.
    fn block_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "{"
        let mut value = 0;
        while self.cursor.sym() != Symbol::Eof && self.cursor.sym() != Symbol::RightBrace {
            match self.statement()? {
                Flow::Normal(v) => value = v,
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        if self.cursor.sym() == Symbol::RightBrace {
            self.advance()?; // eat "}"
        }
        Ok(Flow::Normal(value))
    }

    /// `return [expr]`: value 0 when immediately terminated; terminates the
    /// whole enclosing statement list, not just the innermost block.
    fn return_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "return"
        let value = match self.cursor.sym() {
            Symbol::Eof | Symbol::Semi | Symbol::Comma => 0,
            _ => self.expression()?,
        };
        Ok(Flow::Return(value))
    }

    /// `switch sel { stmt0; stmt1; ... }`: execute exactly one statement of
    /// the block, chosen by the selector. Negative selectors clamp to 0; a
    /// selector past the end clamps to the last statement, by rewinding to
    /// the snapshot taken just before the last skip.
    fn switch_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "switch"
        let selector = self.expression()?.max(0);

        if self.cursor.sym() != Symbol::LeftBrace {
            return Err(BitshError::syntax_error_with_help(
                self.cursor.span(),
                "Expected '{' after switch selector".to_string(),
                "Switch statements have the form: switch n { stmt0; stmt1; ... }".to_string(),
            ));
        }
        self.advance()?; // eat "{"

        // Skip the selector's worth of leading statements, remembering where
        // the most recently skipped one began.
        let mut current: Number = 0;
        let mut last_case: Option<Snapshot> = None;
        while current < selector
            && self.cursor.sym() != Symbol::Eof
            && self.cursor.sym() != Symbol::RightBrace
        {
            last_case = Some(self.cursor.snapshot());
            self.skip_statement()?;
            if self.cursor.sym() != Symbol::Eof && self.cursor.sym() != Symbol::RightBrace {
                current += 1;
            }
        }

        // Ran out of statements: back up and execute the last one.
        if current < selector {
            if let Some(mark) = last_case {
                self.cursor.restore(mark);
            }
        }

        // Entirely empty block: nothing to execute.
        if self.cursor.sym() == Symbol::RightBrace || self.cursor.sym() == Symbol::Eof {
            if self.cursor.sym() == Symbol::RightBrace {
                self.advance()?; // eat "}"
            }
            return Ok(Flow::Normal(0));
        }

        let flow = self.statement()?;
        if let Flow::Return(_) = flow {
            return Ok(flow);
        }

        // Discard the unchosen remainder of the block.
        while self.cursor.sym() != Symbol::Eof && self.cursor.sym() != Symbol::RightBrace {
            self.skip_statement()?;
        }
        if self.cursor.sym() == Symbol::RightBrace {
            self.advance()?; // eat "}"
        }
        Ok(flow)
    }

    /// `run macroname [, interval_ms]`: hand the macro to the background
    /// scheduler. Fire-and-forget: the statement's own value is 0.
    fn run_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "run"
        let addr = match self.cursor.sym() {
            Symbol::MacroId => self.cursor.val() as usize,
            Symbol::Ident => {
                return Err(BitshError::unknown_identifier(
                    self.cursor.span(),
                    format!("Unknown macro '{}'", self.cursor.text()),
                ))
            }
            other => {
                return Err(BitshError::syntax_error(
                    self.cursor.span(),
                    format!("Expected macro name after 'run', found {}", other.describe()),
                ))
            }
        };
        self.advance()?; // eat macro name
        let interval = if self.cursor.sym() == Symbol::Comma {
            self.advance()?; // eat ","
            self.expression()?.max(0) as u64
        } else {
            0
        };
        self.sched.start(addr, interval);
        Ok(Flow::Normal(0))
    }

    /// `stop` / `stop *` / `stop expr`: bare `stop` stops the current task
    /// when running in the background, otherwise all tasks; `*` always stops
    /// all; a numeric argument stops that task id (missing id is a no-op).
    fn stop_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "stop"
        match self.cursor.sym() {
            Symbol::Star => {
                self.sched.stop_all();
                self.advance()?;
            }
            Symbol::Semi | Symbol::Eof => match self.sched.current_id() {
                Some(id) => {
                    self.sched.stop(id);
                }
                None => self.sched.stop_all(),
            },
            _ => {
                let id = self.expression()?;
                if let Ok(id) = u32::try_from(id) {
                    self.sched.stop(id);
                }
            }
        }
        Ok(Flow::Normal(0))
    }

    /// `rm macroname` / `rm *`: erase one macro, or wipe the whole store
    /// (which also stops every background task).
    fn rm_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "rm"
        match self.cursor.sym() {
            Symbol::MacroId => {
                let name = self.cursor.text().to_string();
                self.store.erase(&name);
                self.advance()?;
            }
            Symbol::Star => {
                self.sched.stop_all();
                self.store.erase_all();
                self.advance()?;
            }
            other => {
                return Err(BitshError::syntax_error_with_help(
                    self.cursor.span(),
                    format!("Expected macro name or '*' after 'rm', found {}", other.describe()),
                    "Use rm name to remove one macro, or rm * to remove them all.".to_string(),
                ))
            }
        }
        Ok(Flow::Normal(0))
    }

    /// `print item, item, ...`: items are expressions or string literals,
    /// printed space-separated with a trailing newline.
    fn print_statement(&mut self) -> Result<Flow, BitshError> {
        self.advance()?; // eat "print"
        let mut pieces: Vec<String> = Vec::new();
        if !matches!(self.cursor.sym(), Symbol::Semi | Symbol::Eof) {
            loop {
                if self.cursor.sym() == Symbol::Str {
                    pieces.push(self.cursor.text().to_string());
                    self.advance()?;
                } else {
                    pieces.push(self.expression()?.to_string());
                }
                if self.cursor.sym() == Symbol::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        println!("{}", pieces.join(" "));
        Ok(Flow::Normal(0))
    }

    /// Skip a statement without executing it, consuming exactly the span of
    /// tokens execution would have consumed.
    ///
    /// Block mode eats to the matching right brace; single-statement mode
    /// eats to a semicolon at paren depth 0, or to a right paren at depth
    /// <= 0 so skipping works mid-expression. String literals are single
    /// opaque tokens and can never be mistaken for structure.
    fn skip_statement(&mut self) -> Result<(), BitshError> {
        let mut depth: i32 = 0;

        if self.cursor.sym() == Symbol::LeftBrace {
            self.advance()?; // eat "{"
            while self.cursor.sym() != Symbol::Eof {
                match self.cursor.sym() {
                    Symbol::LeftBrace => depth += 1,
                    Symbol::RightBrace => {
                        if depth <= 0 {
                            self.advance()?; // eat "}"
                            return Ok(());
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
                self.advance()?;
            }
        } else {
            while self.cursor.sym() != Symbol::Eof {
                match self.cursor.sym() {
                    Symbol::LeftParen => depth += 1,
                    Symbol::RightParen => {
                        if depth <= 0 {
                            self.advance()?; // eat ")"
                            return Ok(());
                        }
                        depth -= 1;
                    }
                    Symbol::Semi if depth == 0 => {
                        self.advance()?; // eat ";"
                        return Ok(());
                    }
                    _ => {}
                }
                self.advance()?;
            }
        }
        Ok(())
    }

    /// Call a stored macro and yield its value to the caller's expression.
    ///
    /// The argument list is parsed while still in the caller's stream; then
    /// the caller's cursor is snapshotted, the cursor redirected into the
    /// macro source, and the body driven to its own end of input. The
    /// snapshot is restored on every exit path, including errors, so the
    /// caller resumes parsing as if the call had been one opaque expression.
    pub(crate) fn call_macro(&mut self, addr: usize) -> Result<Number, BitshError> {
        let span = self.cursor.span();
        self.advance()?; // eat macro name
        let args = self.parse_arg_list()?;

        let source = self.store.source(addr).ok_or_else(|| {
            BitshError::unknown_identifier(span.clone(), "Macro was removed".to_string())
        })?;
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(BitshError::runtime_error(
                span,
                "Macro call nesting too deep".to_string(),
            ));
        }

        self.arg_frames.push(args);
        self.call_depth += 1;
        let result = self.run_nested(source);
        self.call_depth -= 1;
        self.arg_frames.pop();
        result
    }

    /// Drive a nested source to completion with the caller's cursor state
    /// saved around it.
    fn run_nested(&mut self, source: Rc<str>) -> Result<Number, BitshError> {
        let saved = self.cursor.snapshot();
        self.cursor.enter(source);
        let result = self.advance().and_then(|_| self.statement_list());
        self.cursor.restore(saved);
        result
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Number>, BitshError> {
        let mut args = Vec::new();
        if self.cursor.sym() != Symbol::LeftParen {
            return Ok(args);
        }
        self.advance()?; // eat "("
        if self.cursor.sym() == Symbol::RightParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.cursor.sym() == Symbol::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        if self.cursor.sym() != Symbol::RightParen {
            return Err(BitshError::syntax_error(
                self.cursor.span(),
                "Expected ')' after macro arguments".to_string(),
            ));
        }
        self.advance()?; // eat ")"
        Ok(args)
    }

    pub(crate) fn var(&self, index: usize) -> Number {
        self.vars[index]
    }

    pub(crate) fn set_var(&mut self, index: usize, value: Number) {
        self.vars[index] = value;
    }

    pub(crate) fn current_args(&self) -> Option<&[Number]> {
        self.arg_frames.last().map(|frame| frame.as_slice())
    }

    pub(crate) fn define_macro(&mut self, name: &str, body: &str) {
        self.store.define(name, body);
    }

    fn show_tasks(&self) {
        for task in self.sched.iter() {
            let name = self.store.name(task.macro_addr).unwrap_or("?");
            println!("{}: {} every {}ms", task.id, name, task.interval_ms);
        }
    }

    fn show_macros(&self) {
        for (_, entry) in self.store.iter() {
            println!("{} := \"{}\"", entry.name, entry.body);
        }
    }

    fn peek_store(&self) {
        for (addr, entry) in self.store.iter() {
            println!("{:04}: {} ({} bytes)", addr, entry.name, entry.body.len());
        }
    }
}

fn starts_statement(sym: Symbol) -> bool {
    matches!(
        sym,
        Symbol::While
            | Symbol::If
            | Symbol::LeftBrace
            | Symbol::Return
            | Symbol::Switch
            | Symbol::Run
            | Symbol::Stop
            | Symbol::Boot
            | Symbol::Rm
            | Symbol::Ps
            | Symbol::Ls
            | Symbol::Help
            | Symbol::Print
            | Symbol::Peek
            | Symbol::Semi
    )
}

fn show_help() {
    println!("statements: if, else, while, switch, return, run, stop, rm, ps, ls, print, peek, boot");
    println!("macros:     name := \"statements\"   call with name or name(args); arg(n) reads args");
    println!("variables:  a..z   operators: + - * / % << >> < <= > >= == != ! ~ & | ^ && ||");
}

/// Host stand-in for the processor reset primitive.
fn reset_device() -> ! {
    std::process::exit(0)
}
