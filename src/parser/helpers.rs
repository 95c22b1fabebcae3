use log::trace;

use super::error::{ParseError, SyntaxError};
use super::{Memo, Parser};
use crate::ast::{AstNode, NodeType};
use crate::diagnostics::Diagnostic;
use crate::lexer::{LexMode, Lexer, Lookahead, Operator, Span, Token, TokenKind, Trivia, TriviaKind};

/// Saved parser state for backtracking
#[derive(Debug, Clone, Copy)]
pub(super) struct Checkpoint {
    pos: usize,
    nodes: usize,
    trivia: usize,
    diagnostics: usize,
    token_count: usize,
    newlines: bool,
}

// Parser helper methods
impl<'a> Parser<'a> {
    // Helper: Check recursion depth limit
    pub(super) fn check_depth(&self, depth: usize) -> Result<(), SyntaxError> {
        if depth >= self.limits.max_nesting_depth {
            return Err(SyntaxError::new(
                format!(
                    "nesting too deep: {} levels (max {}). Consider simplifying.",
                    depth, self.limits.max_nesting_depth
                ),
                Span::new(self.pos, self.pos),
            ));
        }
        Ok(())
    }

    fn lookahead(&mut self, mode: LexMode) -> &Lookahead {
        let memo = match self.memo.take() {
            Some(memo)
                if memo.pos == self.pos && memo.mode == mode && memo.newlines == self.newlines =>
            {
                memo
            }
            _ => {
                // After a fatal limit the rest of the input reads as end of file
                let lookahead = if self.fatal.is_some() {
                    Lookahead {
                        trivia: Vec::new(),
                        token: Token {
                            kind: TokenKind::Eof,
                            span: Span::new(self.pos, self.pos),
                        },
                    }
                } else {
                    Lexer::at(self.source, self.pos, self.limits).next_token(mode, !self.newlines)
                };
                Memo {
                    pos: self.pos,
                    mode,
                    newlines: self.newlines,
                    lookahead,
                }
            }
        };
        &self.memo.insert(memo).lookahead
    }

    /// Helper: peek the next token under `mode`
    pub(super) fn peek(&mut self, mode: LexMode) -> Token {
        self.lookahead(mode).token
    }

    /// Helper: peek, and report whether trivia separates the token from the cursor
    pub(super) fn peek_is_adjacent(&mut self, mode: LexMode) -> (Token, bool) {
        let token = self.peek(mode);
        (token, token.span.start == self.pos)
    }

    /// Helper: lex the token after `token` without moving the cursor
    pub(super) fn peek_after(&self, token: Token, mode: LexMode) -> Token {
        if self.fatal.is_some() || token.kind == TokenKind::Eof {
            return Token {
                kind: TokenKind::Eof,
                span: Span::new(token.span.end, token.span.end),
            };
        }
        Lexer::at(self.source, token.span.end, self.limits)
            .next_token(mode, !self.newlines)
            .token
    }

    /// Helper: consume the next token, committing the trivia before it
    pub(super) fn bump(&mut self, mode: LexMode) -> Token {
        let token = self.peek(mode);
        if let Some(memo) = self.memo.take() {
            self.ast.trivia.extend(memo.lookahead.trivia);
        }

        if token.kind == TokenKind::Eof {
            self.pos = token.span.start;
            return token;
        }

        self.pos = token.span.end;
        self.token_count += 1;
        if self.token_count > self.limits.max_token_count {
            self.set_fatal(ParseError::TokenLimitExceeded {
                max: self.limits.max_token_count,
            });
        }
        token
    }

    fn set_fatal(&mut self, err: ParseError) {
        if self.fatal.is_none() {
            trace!("parser winding down: {}", err);
            self.fatal = Some(err);
            self.memo = None;
        }
    }

    // Add node, enforcing the tree size limit
    pub(super) fn new_node(&mut self, node: AstNode) -> usize {
        if self.ast.nodes.len() >= self.limits.max_ast_nodes {
            self.set_fatal(ParseError::NodeLimitExceeded {
                max: self.limits.max_ast_nodes,
            });
        }
        self.ast.add_node(node)
    }

    /// Helper: start an inner node at the cursor
    pub(super) fn start_node(&mut self, node_type: NodeType) -> usize {
        self.new_node(AstNode::new(node_type, self.pos))
    }

    /// Helper: consume the next token as a leaf of the given kind
    pub(super) fn leaf(&mut self, node_type: NodeType, mode: LexMode) -> usize {
        let token = self.bump(mode);
        self.new_node(AstNode::new_terminal(node_type, token.span))
    }

    /// Helper: consume the next token as an anonymous leaf and attach it
    pub(super) fn push_token(&mut self, parent: usize, mode: LexMode) {
        let leaf = self.leaf(NodeType::Token, mode);
        self.ast.add_child(parent, leaf);
    }

    /// Helper: consume a specific token kind into `parent` or error
    pub(super) fn expect(
        &mut self,
        parent: usize,
        kind: TokenKind,
        mode: LexMode,
        expected: &str,
    ) -> Result<(), SyntaxError> {
        let token = self.peek(mode);
        if token.kind != kind {
            return Err(self.unexpected(expected, token));
        }
        self.push_token(parent, mode);
        Ok(())
    }

    /// Helper: consume a keyword (lexed as an identifier) into `parent` or error
    pub(super) fn expect_keyword(&mut self, parent: usize, keyword: &str) -> Result<(), SyntaxError> {
        let token = self.peek(LexMode::STRUCTURAL);
        if token.kind != TokenKind::Identifier || token.text(self.source) != keyword {
            return Err(self.unexpected(&format!("'{}'", keyword), token));
        }
        self.push_token(parent, LexMode::STRUCTURAL);
        Ok(())
    }

    pub(super) fn unexpected(&self, expected: &str, token: Token) -> SyntaxError {
        SyntaxError::unexpected(expected, &token, self.source)
    }

    pub(super) fn token_text(&self, token: Token) -> &'a str {
        token.text(self.source)
    }

    /// The operator a token stands for in operator position
    pub(super) fn as_operator(&self, token: Token) -> Option<Operator> {
        match token.kind {
            TokenKind::Operator(op) => Some(op),
            TokenKind::Identifier => Operator::from_keyword(token.text(self.source)),
            _ => None,
        }
    }

    // Helper: Skip consecutive newlines, recording them as trivia
    pub(super) fn skip_newlines(&mut self) {
        while self.peek(LexMode::STRUCTURAL).kind == TokenKind::Newline {
            let token = self.bump(LexMode::STRUCTURAL);
            self.ast.trivia.push(Trivia {
                kind: TriviaKind::Newline,
                span: token.span,
            });
        }
    }

    /// Commit the trivia between the last token and the end of input
    pub(super) fn consume_trailing_trivia(&mut self) {
        if self.peek(LexMode::STRUCTURAL).kind == TokenKind::Eof {
            self.bump(LexMode::STRUCTURAL);
        }
    }

    /// Run `f` with newlines treated as trivia (or not), restoring the
    /// previous policy afterwards
    pub(super) fn with_newlines<T>(
        &mut self,
        significant: bool,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        let saved = std::mem::replace(&mut self.newlines, significant);
        let result = f(self);
        self.newlines = saved;
        result
    }

    pub(super) fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.ast.diagnostics.push(diagnostic);
    }

    // Backtracking

    pub(super) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            nodes: self.ast.nodes.len(),
            trivia: self.ast.trivia.len(),
            diagnostics: self.ast.diagnostics.len(),
            token_count: self.token_count,
            newlines: self.newlines,
        }
    }

    /// Discard everything produced since `checkpoint`. Nodes created before
    /// it must not have gained children since, which holds because a
    /// construct is attached to its parent only once it has parsed.
    pub(super) fn rewind(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.ast.nodes.truncate(checkpoint.nodes);
        self.ast.trivia.truncate(checkpoint.trivia);
        self.ast.diagnostics.truncate(checkpoint.diagnostics);
        self.token_count = checkpoint.token_count;
        self.newlines = checkpoint.newlines;
    }

    // Error recovery

    /// Turn a failed statement into an Error node: consume up to the next
    /// terminator (or `closer`) outside brackets, at least one token.
    pub(super) fn recover_statement(
        &mut self,
        err: SyntaxError,
        closer: Option<TokenKind>,
    ) -> usize {
        let node = self.start_node(NodeType::Error);
        let mut nesting = 0usize;
        let mut consumed = false;

        loop {
            let token = self.peek(LexMode::ARGUMENT);
            if token.kind == TokenKind::Eof {
                break;
            }
            let at_boundary = token.kind.is_terminator() || Some(token.kind) == closer;
            if nesting == 0 && at_boundary && consumed {
                break;
            }
            nesting = track_nesting(nesting, token.kind);
            self.push_token(node, LexMode::ARGUMENT);
            consumed = true;
        }

        self.record_error(node, err)
    }

    /// Turn a bracketed construct that fits no interpretation into an Error
    /// node spanning up to its matching close (or end of input)
    pub(super) fn recover_construct(&mut self, err: SyntaxError) -> usize {
        let node = self.start_node(NodeType::Error);
        let mut nesting = 0usize;

        loop {
            let token = self.peek(LexMode::ARGUMENT);
            if token.kind == TokenKind::Eof {
                break;
            }
            nesting = track_nesting(nesting, token.kind);
            self.push_token(node, LexMode::ARGUMENT);
            if nesting == 0 {
                break;
            }
        }

        self.record_error(node, err)
    }

    fn record_error(&mut self, node: usize, err: SyntaxError) -> usize {
        trace!(
            "error node at {}..{}: {}",
            self.ast.nodes[node].span.start,
            self.ast.nodes[node].span.end,
            err.message
        );
        self.diagnostic(Diagnostic::error(err.message, err.span));
        node
    }
}

fn track_nesting(nesting: usize, kind: TokenKind) -> usize {
    match kind {
        TokenKind::LParen | TokenKind::DollarParen | TokenKind::LBracket | TokenKind::LBrace => {
            nesting + 1
        }
        TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => nesting.saturating_sub(1),
        _ => nesting,
    }
}
