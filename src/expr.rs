//! Numeric expression evaluation, performed directly over the token cursor
//! with no intermediate representation. Precedence follows the usual C
//! ladder. Both operands of `&&` and `||` are always evaluated: without a
//! tree there is nothing to prune, and skipping the right-hand tokens would
//! complicate the grammar for no gain at this scale.

use crate::cursor::{Number, Symbol};
use crate::engine::Engine;
use crate::error::BitshError;

impl Engine {
    pub(crate) fn expression(&mut self) -> Result<Number, BitshError> {
        self.logical_or()
    }

    fn logical_or(&mut self) -> Result<Number, BitshError> {
        let mut value = self.logical_and()?;
        while self.sym() == Symbol::PipePipe {
            self.advance()?;
            let rhs = self.logical_and()?;
            value = (value != 0 || rhs != 0) as Number;
        }
        Ok(value)
    }

    fn logical_and(&mut self) -> Result<Number, BitshError> {
        let mut value = self.bit_or()?;
        while self.sym() == Symbol::AmpAmp {
            self.advance()?;
            let rhs = self.bit_or()?;
            value = (value != 0 && rhs != 0) as Number;
        }
        Ok(value)
    }

    fn bit_or(&mut self) -> Result<Number, BitshError> {
        let mut value = self.bit_xor()?;
        while self.sym() == Symbol::Pipe {
            self.advance()?;
            value |= self.bit_xor()?;
        }
        Ok(value)
    }

    fn bit_xor(&mut self) -> Result<Number, BitshError> {
        let mut value = self.bit_and()?;
        while self.sym() == Symbol::Caret {
            self.advance()?;
            value ^= self.bit_and()?;
        }
        Ok(value)
    }

    fn bit_and(&mut self) -> Result<Number, BitshError> {
        let mut value = self.equality()?;
        while self.sym() == Symbol::Amp {
            self.advance()?;
            value &= self.equality()?;
        }
        Ok(value)
    }

    fn equality(&mut self) -> Result<Number, BitshError> {
        let mut value = self.comparison()?;
        loop {
            match self.sym() {
                Symbol::EqualEqual => {
                    self.advance()?;
                    value = (value == self.comparison()?) as Number;
                }
                Symbol::BangEqual => {
                    self.advance()?;
                    value = (value != self.comparison()?) as Number;
                }
                _ => return Ok(value),
            }
        }
    }

    fn comparison(&mut self) -> Result<Number, BitshError> {
        let mut value = self.shift()?;
        loop {
            match self.sym() {
                Symbol::Less => {
                    self.advance()?;
                    value = (value < self.shift()?) as Number;
                }
                Symbol::LessEqual => {
                    self.advance()?;
                    value = (value <= self.shift()?) as Number;
                }
                Symbol::Greater => {
                    self.advance()?;
                    value = (value > self.shift()?) as Number;
                }
                Symbol::GreaterEqual => {
                    self.advance()?;
                    value = (value >= self.shift()?) as Number;
                }
                _ => return Ok(value),
            }
        }
    }

    fn shift(&mut self) -> Result<Number, BitshError> {
        let mut value = self.term()?;
        loop {
            match self.sym() {
                Symbol::Shl => {
                    self.advance()?;
                    value = value.wrapping_shl(self.term()? as u32);
                }
                Symbol::Shr => {
                    self.advance()?;
                    value = value.wrapping_shr(self.term()? as u32);
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<Number, BitshError> {
        let mut value = self.factor()?;
        loop {
            match self.sym() {
                Symbol::Plus => {
                    self.advance()?;
                    value = value.wrapping_add(self.factor()?);
                }
                Symbol::Minus => {
                    self.advance()?;
                    value = value.wrapping_sub(self.factor()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<Number, BitshError> {
        let mut value = self.unary()?;
        loop {
            match self.sym() {
                Symbol::Star => {
                    self.advance()?;
                    value = value.wrapping_mul(self.unary()?);
                }
                Symbol::Slash => {
                    let span = self.op_span();
                    self.advance()?;
                    let rhs = self.unary()?;
                    if rhs == 0 {
                        return Err(BitshError::runtime_error(
                            span,
                            "Division by zero".to_string(),
                        ));
                    }
                    value = value.wrapping_div(rhs);
                }
                Symbol::Percent => {
                    let span = self.op_span();
                    self.advance()?;
                    let rhs = self.unary()?;
                    if rhs == 0 {
                        return Err(BitshError::runtime_error(
                            span,
                            "Division by zero".to_string(),
                        ));
                    }
                    value = value.wrapping_rem(rhs);
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<Number, BitshError> {
        match self.sym() {
            Symbol::Minus => {
                self.advance()?;
                Ok(self.unary()?.wrapping_neg())
            }
            Symbol::Plus => {
                self.advance()?;
                self.unary()
            }
            Symbol::Bang => {
                self.advance()?;
                Ok((self.unary()? == 0) as Number)
            }
            Symbol::Tilde => {
                self.advance()?;
                Ok(!self.unary()?)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Number, BitshError> {
        match self.sym() {
            Symbol::Number => {
                let value = self.cursor_val();
                self.advance()?;
                Ok(value)
            }
            Symbol::LeftParen => {
                self.advance()?;
                let value = self.expression()?;
                if self.sym() != Symbol::RightParen {
                    return Err(BitshError::syntax_error(
                        self.op_span(),
                        "Expected ')' after expression".to_string(),
                    ));
                }
                self.advance()?;
                Ok(value)
            }
            Symbol::Var => self.variable(),
            Symbol::MacroId => self.macro_primary(),
            Symbol::Ident => self.define_primary(),
            Symbol::Arg => self.arg_primary(),
            Symbol::Str => Err(BitshError::syntax_error_with_help(
                self.op_span(),
                "String literal in numeric expression".to_string(),
                "Strings are only valid as print items and macro bodies.".to_string(),
            )),
            other => Err(BitshError::syntax_error(
                self.op_span(),
                format!("Expected expression, found {}", other.describe()),
            )),
        }
    }

    /// Variable read or assignment: `a` yields the value, `a = expr`
    /// assigns and yields the assigned value.
    fn variable(&mut self) -> Result<Number, BitshError> {
        let index = self.cursor_val() as usize;
        self.advance()?;
        if self.sym() == Symbol::Assign {
            self.advance()?;
            let value = self.expression()?;
            self.set_var(index, value);
            Ok(value)
        } else {
            Ok(self.var(index))
        }
    }

    /// A defined macro name: either a redefinition (`name := "body"`) or a
    /// call with an optional argument list.
    fn macro_primary(&mut self) -> Result<Number, BitshError> {
        let addr = self.cursor_val() as usize;
        let name = self.cursor_text();

        // Peek past the name for := without losing the call path.
        let mark = self.cursor_snapshot();
        self.advance()?;
        if self.sym() == Symbol::Define {
            self.advance()?;
            return self.finish_define(&name);
        }
        self.cursor_restore(mark);
        self.call_macro(addr)
    }

    /// An undefined identifier is only legal as the left side of a macro
    /// definition.
    fn define_primary(&mut self) -> Result<Number, BitshError> {
        let name = self.cursor_text();
        let span = self.op_span();
        self.advance()?;
        if self.sym() == Symbol::Define {
            self.advance()?;
            self.finish_define(&name)
        } else {
            Err(BitshError::unknown_identifier_with_help(
                span,
                format!("Unknown identifier '{}'", name),
                format!("Define a macro with {} := \"statements\".", name),
            ))
        }
    }

    fn finish_define(&mut self, name: &str) -> Result<Number, BitshError> {
        if self.sym() != Symbol::Str {
            return Err(BitshError::syntax_error_with_help(
                self.op_span(),
                "Expected string literal after ':='".to_string(),
                "Macro bodies are quoted: name := \"print 1;\"".to_string(),
            ));
        }
        let body = self.cursor_text();
        self.define_macro(name, &body);
        self.advance()?;
        Ok(0)
    }

    /// `arg(n)` inside a macro: argument access, with `arg(0)` as the count.
    fn arg_primary(&mut self) -> Result<Number, BitshError> {
        let span = self.op_span();
        self.advance()?; // eat "arg"
        if self.sym() != Symbol::LeftParen {
            return Err(BitshError::syntax_error(
                self.op_span(),
                "Expected '(' after 'arg'".to_string(),
            ));
        }
        self.advance()?;
        let index = self.expression()?;
        if self.sym() != Symbol::RightParen {
            return Err(BitshError::syntax_error(
                self.op_span(),
                "Expected ')' after argument index".to_string(),
            ));
        }
        self.advance()?;

        let Some(args) = self.current_args() else {
            return Err(BitshError::runtime_error_with_help(
                span,
                "arg() used outside a macro".to_string(),
                "arg(n) reads the nth argument of the enclosing macro call.".to_string(),
            ));
        };
        if index == 0 {
            return Ok(args.len() as Number);
        }
        match usize::try_from(index)
            .ok()
            .and_then(|n| args.get(n - 1))
        {
            Some(&value) => Ok(value),
            None => Err(BitshError::runtime_error(
                span,
                format!("Argument {} out of range ({} supplied)", index, args.len()),
            )),
        }
    }
}
