use thiserror::Error;

use crate::lexer::{Span, Token, TokenKind};

/// Fatal parse failures: resource limits only.
///
/// Malformed input never produces one of these; it yields Error nodes and
/// diagnostics on the returned tree instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input too large: {size} bytes (max {max})")]
    InputTooLarge { size: usize, max: usize },
    #[error("token limit exceeded (max {max}). File is too complex.")]
    TokenLimitExceeded { max: usize },
    #[error("syntax tree node limit exceeded (max {max}). File is too complex.")]
    NodeLimitExceeded { max: usize },
}

// Recoverable failure of the rule in progress; turned into an Error node
// by whichever statement list or construct catches it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub(super) fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub(super) fn unexpected(expected: &str, token: &Token, source: &str) -> Self {
        // A token the lexer already rejected speaks for itself
        if let TokenKind::Error(kind) = token.kind {
            return Self::new(kind.to_string(), token.span);
        }

        let found = match token.kind {
            TokenKind::Identifier | TokenKind::Word => {
                format!("{} '{}'", token.kind.describe(), token.text(source))
            }
            _ => token.kind.describe(),
        };

        Self::new(format!("expected {}, found {}", expected, found), token.span)
    }
}
