// Diagnostics module
//
// Syntax problems are recorded on the tree as data rather than returned as
// errors, so that tools can keep working with the well-formed parts. This
// module holds the record type and a rustc-style renderer for the CLI.

use std::fmt::Write;

use serde::Serialize;

use crate::lexer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A located message about the parsed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub(crate) fn shifted(&self, delta: isize) -> Self {
        Self {
            span: self.span.shifted(delta),
            ..self.clone()
        }
    }
}

/// 1-based line and column (in chars) of a byte offset
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = floor_char_boundary(source, offset);
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn floor_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Renders diagnostics the way rustc does, without color:
///
/// ```text
/// error: unterminated string literal
///   --> script.nu:2:6
///    |
///   2 | echo "abc
///    |      ^^^^
/// ```
pub struct DiagnosticPrinter<'a> {
    file_name: String,
    source: &'a str,
}

impl<'a> DiagnosticPrinter<'a> {
    pub fn new(file_name: impl Into<String>, source: &'a str) -> Self {
        Self {
            file_name: file_name.into(),
            source,
        }
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let (line, column) = line_col(self.source, diagnostic.span.start);
        let src_line = self.source.lines().nth(line - 1).unwrap_or("");

        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", diagnostic.severity.as_str(), diagnostic.message);
        let _ = writeln!(out, "  --> {}:{}:{}", self.file_name, line, column);
        let _ = writeln!(out, "   |");
        let _ = writeln!(out, "{:>3} | {}", line, src_line);

        // Underline to the end of the span or the end of the line, whichever is first
        let remaining = src_line.chars().count().saturating_sub(column - 1);
        let span_chars = if diagnostic.span.is_empty() {
            1
        } else {
            self.source
                .get(diagnostic.span.start..diagnostic.span.end)
                .map(|text| text.chars().take_while(|c| *c != '\n').count())
                .unwrap_or(1)
        };
        let width = span_chars.min(remaining).max(1);
        let _ = writeln!(out, "   | {}{}", " ".repeat(column - 1), "^".repeat(width));

        if let Some(help) = &diagnostic.help {
            let _ = writeln!(out, "help: {}", help);
        }

        out
    }

    pub fn render_all(&self, diagnostics: &[Diagnostic]) -> String {
        diagnostics
            .iter()
            .map(|d| self.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
