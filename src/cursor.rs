use crate::error::{BitshError, Span};
use crate::macros::MacroStore;
use std::rc::Rc;

/// The numeric result type threaded through every statement and expression.
pub type Number = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Eof,

    // Punctuation
    Semi,
    Comma,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,

    // Literals and identifiers
    Number,
    Str,
    Var,
    MacroId,
    Ident,

    // Operators
    Assign,
    Define,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    EqualEqual,
    BangEqual,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,

    // Keywords
    While,
    If,
    Else,
    Switch,
    Return,
    Run,
    Stop,
    Boot,
    Rm,
    Ps,
    Ls,
    Help,
    Print,
    Peek,
    Arg,
}

impl Symbol {
    /// Human-readable name used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Symbol::Eof => "end of input",
            Symbol::Semi => "';'",
            Symbol::Comma => "','",
            Symbol::LeftBrace => "'{'",
            Symbol::RightBrace => "'}'",
            Symbol::LeftParen => "'('",
            Symbol::RightParen => "')'",
            Symbol::Number => "number",
            Symbol::Str => "string literal",
            Symbol::Var => "variable",
            Symbol::MacroId => "macro name",
            Symbol::Ident => "identifier",
            Symbol::Assign => "'='",
            Symbol::Define => "':='",
            Symbol::Plus => "'+'",
            Symbol::Minus => "'-'",
            Symbol::Star => "'*'",
            Symbol::Slash => "'/'",
            Symbol::Percent => "'%'",
            Symbol::Shl => "'<<'",
            Symbol::Shr => "'>>'",
            Symbol::Less => "'<'",
            Symbol::LessEqual => "'<='",
            Symbol::Greater => "'>'",
            Symbol::GreaterEqual => "'>='",
            Symbol::EqualEqual => "'=='",
            Symbol::BangEqual => "'!='",
            Symbol::Bang => "'!'",
            Symbol::Tilde => "'~'",
            Symbol::Amp => "'&'",
            Symbol::Pipe => "'|'",
            Symbol::Caret => "'^'",
            Symbol::AmpAmp => "'&&'",
            Symbol::PipePipe => "'||'",
            Symbol::While => "'while'",
            Symbol::If => "'if'",
            Symbol::Else => "'else'",
            Symbol::Switch => "'switch'",
            Symbol::Return => "'return'",
            Symbol::Run => "'run'",
            Symbol::Stop => "'stop'",
            Symbol::Boot => "'boot'",
            Symbol::Rm => "'rm'",
            Symbol::Ps => "'ps'",
            Symbol::Ls => "'ls'",
            Symbol::Help => "'help'",
            Symbol::Print => "'print'",
            Symbol::Peek => "'peek'",
            Symbol::Arg => "'arg'",
        }
    }
}

fn keyword(name: &str) -> Option<Symbol> {
    match name {
        "while" => Some(Symbol::While),
        "if" => Some(Symbol::If),
        "else" => Some(Symbol::Else),
        "switch" => Some(Symbol::Switch),
        "return" => Some(Symbol::Return),
        "run" => Some(Symbol::Run),
        "stop" => Some(Symbol::Stop),
        "boot" => Some(Symbol::Boot),
        "rm" => Some(Symbol::Rm),
        "ps" => Some(Symbol::Ps),
        "ls" => Some(Symbol::Ls),
        "help" => Some(Symbol::Help),
        "print" => Some(Symbol::Print),
        "peek" => Some(Symbol::Peek),
        "arg" => Some(Symbol::Arg),
        _ => None,
    }
}

/// A capturable/restorable position in the token stream.
///
/// Restoring a snapshot reinstates both the raw byte position and the
/// in-flight symbol state, so parsing resumes exactly as it was at capture
/// time. The source handle is part of the snapshot because macro invocation
/// redirects the cursor into a different source entirely.
#[derive(Debug, Clone)]
pub struct Snapshot {
    source: Rc<str>,
    pos: usize,
    tok_start: usize,
    sym: Symbol,
    val: Number,
    text: String,
}

/// Incremental single-token lexer over a shared source buffer.
///
/// There is no token vector: `advance` scans exactly one token, and the
/// current symbol, its numeric value, and a text buffer (identifier name or
/// string literal body) are the only lexer state. Statement evaluation walks
/// the raw stream through this cursor, snapshotting and restoring it for
/// loop re-entry and macro calls.
pub struct Cursor {
    source: Rc<str>,
    pos: usize,
    tok_start: usize,
    sym: Symbol,
    val: Number,
    text: String,
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            source: Rc::from(""),
            pos: 0,
            tok_start: 0,
            sym: Symbol::Eof,
            val: 0,
            text: String::new(),
        }
    }

    /// Redirect the cursor to a new source and rewind to its start.
    /// The caller is responsible for snapshotting first and for fetching
    /// the first symbol with `advance`.
    pub fn enter(&mut self, source: Rc<str>) {
        self.source = source;
        self.pos = 0;
        self.tok_start = 0;
        self.sym = Symbol::Eof;
        self.val = 0;
        self.text.clear();
    }

    pub fn sym(&self) -> Symbol {
        self.sym
    }

    pub fn val(&self) -> Number {
        self.val
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Span of the current token, for error reports.
    pub fn span(&self) -> Span {
        if self.tok_start < self.pos {
            Span::new(self.tok_start, self.pos)
        } else {
            Span::single(self.tok_start)
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            source: Rc::clone(&self.source),
            pos: self.pos,
            tok_start: self.tok_start,
            sym: self.sym,
            val: self.val,
            text: self.text.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.source = snapshot.source;
        self.pos = snapshot.pos;
        self.tok_start = snapshot.tok_start;
        self.sym = snapshot.sym;
        self.val = snapshot.val;
        self.text = snapshot.text;
    }

    /// Scan the next token. Identifiers are resolved against the macro
    /// store: keywords first, then single lowercase letters as variables,
    /// then stored macro names, and anything else is an undefined identifier.
    pub fn advance(&mut self, store: &MacroStore) -> Result<(), BitshError> {
        let source = Rc::clone(&self.source);
        let bytes = source.as_bytes();

        // Skip whitespace and // comments
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos + 1 < bytes.len() && bytes[self.pos] == b'/' && bytes[self.pos + 1] == b'/'
            {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }

        self.tok_start = self.pos;
        self.val = 0;

        if self.pos >= bytes.len() {
            self.sym = Symbol::Eof;
            return Ok(());
        }

        let c = bytes[self.pos];
        match c {
            b'0'..=b'9' => self.scan_number(bytes),
            b'\'' => self.scan_char(bytes),
            b'"' => self.scan_string(),
            c if c.is_ascii_alphabetic() || c == b'_' => {
                self.scan_identifier(bytes, store);
                Ok(())
            }
            _ => self.scan_operator(bytes),
        }
    }

    fn scan_number(&mut self, bytes: &[u8]) -> Result<(), BitshError> {
        let (radix, digits_from) = if bytes[self.pos] == b'0' && self.pos + 1 < bytes.len() {
            match bytes[self.pos + 1] {
                b'x' | b'X' => (16, self.pos + 2),
                b'b' | b'B' => (2, self.pos + 2),
                _ => (10, self.pos),
            }
        } else {
            (10, self.pos)
        };

        self.pos = digits_from;
        while self.pos < bytes.len() && (bytes[self.pos] as char).is_digit(radix) {
            self.pos += 1;
        }

        let digits = &self.source[digits_from..self.pos];
        match Number::from_str_radix(digits, radix) {
            Ok(value) => {
                self.sym = Symbol::Number;
                self.val = value;
                Ok(())
            }
            Err(_) => Err(BitshError::lex_error(
                self.span(),
                format!("Invalid number literal: {}", &self.source[self.tok_start..self.pos]),
            )),
        }
    }

    fn scan_char(&mut self, bytes: &[u8]) -> Result<(), BitshError> {
        self.pos += 1; // opening quote
        let value = match bytes.get(self.pos) {
            Some(b'\\') => {
                self.pos += 1;
                match bytes.get(self.pos) {
                    Some(b'n') => b'\n',
                    Some(b't') => b'\t',
                    Some(b'r') => b'\r',
                    Some(b'0') => 0,
                    Some(&c) => c,
                    None => {
                        return Err(BitshError::lex_error(
                            self.span(),
                            "Unterminated character literal".to_string(),
                        ))
                    }
                }
            }
            Some(&c) => c,
            None => {
                return Err(BitshError::lex_error(
                    self.span(),
                    "Unterminated character literal".to_string(),
                ))
            }
        };
        self.pos += 1;
        if bytes.get(self.pos) != Some(&b'\'') {
            return Err(BitshError::lex_error(
                self.span(),
                "Unterminated character literal".to_string(),
            ));
        }
        self.pos += 1; // closing quote
        self.sym = Symbol::Number;
        self.val = value as Number;
        Ok(())
    }

    // String bodies may hold any UTF-8 text, so this scans at char
    // granularity rather than by byte.
    fn scan_string(&mut self) -> Result<(), BitshError> {
        self.pos += 1; // opening quote
        self.text.clear();
        loop {
            let Some(c) = self.source[self.pos..].chars().next() else {
                return Err(BitshError::lex_error(
                    Span::new(self.tok_start, self.pos),
                    "Unterminated string".to_string(),
                ));
            };
            self.pos += c.len_utf8();
            match c {
                '"' => {
                    self.sym = Symbol::Str;
                    return Ok(());
                }
                '\\' => {
                    let Some(next) = self.source[self.pos..].chars().next() else {
                        return Err(BitshError::lex_error(
                            Span::new(self.tok_start, self.pos),
                            "Unterminated string".to_string(),
                        ));
                    };
                    self.pos += next.len_utf8();
                    let escaped = match next {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    };
                    self.text.push(escaped);
                }
                other => self.text.push(other),
            }
        }
    }

    fn scan_identifier(&mut self, bytes: &[u8], store: &MacroStore) {
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let name = &self.source[self.tok_start..self.pos];
        self.text.clear();
        self.text.push_str(name);

        if let Some(sym) = keyword(name) {
            self.sym = sym;
        } else if name.len() == 1 && name.as_bytes()[0].is_ascii_lowercase() {
            self.sym = Symbol::Var;
            self.val = (name.as_bytes()[0] - b'a') as Number;
        } else if let Some(addr) = store.lookup(name) {
            self.sym = Symbol::MacroId;
            self.val = addr as Number;
        } else {
            self.sym = Symbol::Ident;
        }
    }

    fn scan_operator(&mut self, bytes: &[u8]) -> Result<(), BitshError> {
        let c = bytes[self.pos];
        self.pos += 1;
        let next = bytes.get(self.pos).copied();

        let two = |cursor: &mut Self, sym| {
            cursor.pos += 1;
            sym
        };

        self.sym = match c {
            b';' => Symbol::Semi,
            b',' => Symbol::Comma,
            b'{' => Symbol::LeftBrace,
            b'}' => Symbol::RightBrace,
            b'(' => Symbol::LeftParen,
            b')' => Symbol::RightParen,
            b'+' => Symbol::Plus,
            b'-' => Symbol::Minus,
            b'*' => Symbol::Star,
            b'/' => Symbol::Slash,
            b'%' => Symbol::Percent,
            b'~' => Symbol::Tilde,
            b'^' => Symbol::Caret,
            b'<' => match next {
                Some(b'=') => two(self, Symbol::LessEqual),
                Some(b'<') => two(self, Symbol::Shl),
                _ => Symbol::Less,
            },
            b'>' => match next {
                Some(b'=') => two(self, Symbol::GreaterEqual),
                Some(b'>') => two(self, Symbol::Shr),
                _ => Symbol::Greater,
            },
            b'=' => match next {
                Some(b'=') => two(self, Symbol::EqualEqual),
                _ => Symbol::Assign,
            },
            b'!' => match next {
                Some(b'=') => two(self, Symbol::BangEqual),
                _ => Symbol::Bang,
            },
            b'&' => match next {
                Some(b'&') => two(self, Symbol::AmpAmp),
                _ => Symbol::Amp,
            },
            b'|' => match next {
                Some(b'|') => two(self, Symbol::PipePipe),
                _ => Symbol::Pipe,
            },
            b':' => match next {
                Some(b'=') => two(self, Symbol::Define),
                _ => {
                    return Err(BitshError::lex_error(
                        self.span(),
                        "Unexpected character: ':'".to_string(),
                    ))
                }
            },
            _ => {
                return Err(BitshError::lex_error(
                    self.span(),
                    format!("Unexpected character: '{}'", c as char),
                ))
            }
        };
        Ok(())
    }
}
