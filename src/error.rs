use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    LexError,
    SyntaxError,
    UnknownIdentifier,
    RuntimeError,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct BitshError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl BitshError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn syntax_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::SyntaxError, span, message)
    }

    pub fn syntax_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::SyntaxError, span, message, help)
    }

    pub fn unknown_identifier(span: Span, message: String) -> Self {
        Self::new(ErrorKind::UnknownIdentifier, span, message)
    }

    pub fn unknown_identifier_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::UnknownIdentifier, span, message, help)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::RuntimeError, span, message)
    }

    pub fn runtime_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::RuntimeError, span, message, help)
    }

    pub fn interrupted(span: Span) -> Self {
        Self::new(
            ErrorKind::Interrupted,
            span,
            "Execution interrupted".to_string(),
        )
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<shell>");

        let color = match self.kind {
            ErrorKind::LexError => Color::Red,
            ErrorKind::SyntaxError => Color::Yellow,
            ErrorKind::UnknownIdentifier => Color::Blue,
            ErrorKind::RuntimeError => Color::Magenta,
            ErrorKind::Interrupted => Color::Red,
        };

        let kind_str = match self.kind {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::SyntaxError => "Syntax Error",
            ErrorKind::UnknownIdentifier => "Unknown Identifier",
            ErrorKind::RuntimeError => "Runtime Error",
            ErrorKind::Interrupted => "Interrupted",
        };

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!("{}: {}", kind_str.fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        // Add help note if available
        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        report_builder
            .finish()
            .print((filename, Source::from(source)))
            .unwrap();
    }
}

impl fmt::Display for BitshError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BitshError {}
