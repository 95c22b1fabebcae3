// Parser module - splits parser into logical components
mod ambiguity;
mod error;
mod expressions;
mod helpers;
mod signature;
mod statements;

// Public exports
pub use error::ParseError;

use std::collections::HashMap;

use ambiguity::BraceReading;
use crate::ast::{Ast, AstNode, NodeType};
use crate::diagnostics::Diagnostic;
use crate::lexer::{LexMode, Lookahead, Span};
use crate::limits::ParserLimits;

// Memoized lookahead, valid while the cursor, mode and newline policy are unchanged
struct Memo {
    pos: usize,
    mode: LexMode,
    newlines: bool,
    lookahead: Lookahead,
}

// Parser structure
pub struct Parser<'a> {
    source: &'a str,
    limits: &'a ParserLimits,
    pos: usize,     // Byte offset of the cursor
    newlines: bool, // Whether newlines are statement terminators here
    memo: Option<Memo>,
    braces: HashMap<usize, BraceReading>, // Reading chosen for each `{` offset
    ast: Ast,
    token_count: usize,
    fatal: Option<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, limits: &'a ParserLimits) -> Self {
        Self::new_at(source, 0, limits)
    }

    // Parser whose cursor starts at `start`; used to re-parse an edited region
    fn new_at(source: &'a str, start: usize, limits: &'a ParserLimits) -> Self {
        let mut parser = Self {
            source,
            limits,
            pos: start,
            newlines: true,
            memo: None,
            braces: HashMap::new(),
            ast: Ast::new(source.to_string()),
            token_count: 0,
            fatal: None,
        };

        // Create the SourceFile root node
        let root_idx = parser.new_node(AstNode::new(NodeType::SourceFile, start));
        parser.ast.root = Some(root_idx);
        parser
    }

    /// Parse the whole input into a tree.
    ///
    /// Malformed input still yields `Ok` with Error nodes and diagnostics.
    /// `Err` is returned only when a token or node limit trips mid-parse.
    pub fn parse(mut self) -> Result<Ast, ParseError> {
        let root = self.root();

        if let Err(err) = self.parse_statements(root, None, true, 0) {
            self.ast.diagnostics.push(Diagnostic::error(err.message, err.span));
        }
        self.consume_trailing_trivia();

        if let Some(err) = self.fatal {
            return Err(err);
        }

        self.ast.nodes[root].span = Span::new(0, self.source.len());
        Ok(self.ast)
    }

    fn root(&self) -> usize {
        self.ast.root.unwrap_or(0)
    }
}

// Public API functions

/// Parse with default limits.
///
/// Syntax errors never make this fail; they become Error nodes plus
/// diagnostics on the returned tree. The only `Err` cases are the resource
/// limits of [`ParserLimits`].
pub fn parse(source: &str) -> Result<Ast, ParseError> {
    parse_with_limits(source, &ParserLimits::default())
}

/// Parse under `limits`; fails only with [`ParseError::InputTooLarge`],
/// [`ParseError::TokenLimitExceeded`] or [`ParseError::NodeLimitExceeded`]
pub fn parse_with_limits(source: &str, limits: &ParserLimits) -> Result<Ast, ParseError> {
    check_input_size(source, limits)?;
    Parser::new(source, limits).parse()
}

/// Parse statements from `start` to the end of `source`.
///
/// The resulting tree holds `source` and absolute spans; its root span is
/// meaningless and only its children are of interest.
pub(crate) fn parse_region(
    source: &str,
    start: usize,
    limits: &ParserLimits,
) -> Result<Ast, ParseError> {
    Parser::new_at(source, start, limits).parse()
}

pub(crate) fn check_input_size(source: &str, limits: &ParserLimits) -> Result<(), ParseError> {
    if source.len() > limits.max_input_size {
        return Err(ParseError::InputTooLarge {
            size: source.len(),
            max: limits.max_input_size,
        });
    }
    Ok(())
}
