use std::iter::Peekable;
use std::str::CharIndices;

use bitflags::bitflags;
use serde::Serialize;
use thiserror::Error;

use crate::limits::ParserLimits;
use crate::parser::ParseError;

// Byte ranges

/// Half-open byte range into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Move the span by a signed byte delta
    pub fn shifted(self, delta: isize) -> Span {
        Span::new(
            self.start.saturating_add_signed(delta),
            self.end.saturating_add_signed(delta),
        )
    }
}

// Lexing modes

bitflags! {
    /// Which context-dependent token rules may fire at the current position.
    ///
    /// The grammar only accepts words, file paths and flags in some positions,
    /// and lexing them elsewhere would swallow structural punctuation
    /// (`a:` would become a word inside a record).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LexMode: u8 {
        const WORDS = 1 << 0;
        const FILE_PATHS = 1 << 1;
        const FLAGS = 1 << 2;
        const REST = 1 << 3;
        const COMMA_DELIMITS = 1 << 4;

        const ARGUMENT = Self::WORDS.bits() | Self::FILE_PATHS.bits() | Self::FLAGS.bits();
        const ELEMENT = Self::ARGUMENT.bits() | Self::COMMA_DELIMITS.bits();
        const SIGNATURE = Self::FLAGS.bits() | Self::REST.bits();
    }
}

impl LexMode {
    /// Statement heads, math expressions, record keys
    pub const STRUCTURAL: LexMode = LexMode::empty();
}

// Token types

/// Binary operators, in precedence-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,           // ||
    And,          // &&
    RegexMatch,   // =~
    Equal,        // ==
    NotEqual,     // !=
    In,           // in
    Greater,      // >
    GreaterEqual, // >=
    LessEqual,    // <=
    Less,         // <
    ShiftLeft,    // <<
    ShiftRight,   // >>
    Plus,         // +
    Minus,        // -
    Multiply,     // *
    Divide,       // /
    Modulo,       // %
    Mod,          // mod
}

impl Operator {
    /// Binding power; every operator is left-associative
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Or => 1,
            Operator::And => 2,
            Operator::RegexMatch | Operator::Equal | Operator::NotEqual | Operator::In => 6,
            Operator::Greater | Operator::GreaterEqual | Operator::LessEqual | Operator::Less => 7,
            Operator::ShiftLeft | Operator::ShiftRight => 9,
            Operator::Plus | Operator::Minus => 10,
            Operator::Multiply | Operator::Divide | Operator::Modulo | Operator::Mod => 11,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::RegexMatch => "=~",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::In => "in",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::LessEqual => "<=",
            Operator::Less => "<",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Mod => "mod",
        }
    }

    /// Word operators are lexed as identifiers and promoted by the parser
    pub fn from_keyword(text: &str) -> Option<Operator> {
        match text {
            "in" => Some(Operator::In),
            "mod" => Some(Operator::Mod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringKind {
    Double,   // "..."
    Single,   // '...'
    Backtick, // `...`
}

/// Why a region of input matched no token rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("string literal must not be empty")]
    EmptyString,
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("backslash must escape a character")]
    StrayBackslash,
    #[error("identifier too long (max {0} bytes)")]
    IdentifierTooLong(usize),
    #[error("string literal too long (max {0} bytes)")]
    StringTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Content
    Identifier,
    Word,
    Number,
    String(StringKind),
    FilePath,
    FlagName,      // --name
    FlagShorthand, // -x
    Rest,          // ...rest
    Operator(Operator),

    // Punctuation
    Dollar,      // $
    DollarParen, // $(
    Dot,         // .
    DotDot,      // ..
    Eq,          // =
    Colon,       // :
    Comma,       // ,
    Question,    // ?
    Semicolon,   // ;
    Pipe,        // |
    LParen,      // (
    RParen,      // )
    LBrace,      // {
    RBrace,      // }
    LBracket,    // [
    RBracket,    // ]

    // Special
    Newline,
    Error(LexErrorKind),
    Eof,
}

impl TokenKind {
    /// `;`, `|` and newline separate statements
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            TokenKind::Semicolon | TokenKind::Pipe | TokenKind::Newline
        )
    }

    /// Tokens that can begin a command argument (generic expression)
    pub fn starts_expression(&self) -> bool {
        matches!(
            self,
            TokenKind::Number
                | TokenKind::String(_)
                | TokenKind::Dollar
                | TokenKind::DollarParen
                | TokenKind::FilePath
                | TokenKind::FlagName
                | TokenKind::FlagShorthand
                | TokenKind::LBrace
                | TokenKind::LBracket
                | TokenKind::Operator(_)
                | TokenKind::Identifier
                | TokenKind::Word
        )
    }

    /// Tokens that can begin a math-mode operand
    pub fn starts_math_expression(&self) -> bool {
        matches!(
            self,
            TokenKind::DollarParen
                | TokenKind::LParen
                | TokenKind::Dollar
                | TokenKind::Number
                | TokenKind::LBracket
                | TokenKind::LBrace
        )
    }

    /// Human readable name for diagnostics
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier => "identifier".to_string(),
            TokenKind::Word => "word".to_string(),
            TokenKind::Number => "number".to_string(),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::FilePath => "file path".to_string(),
            TokenKind::FlagName => "flag".to_string(),
            TokenKind::FlagShorthand => "flag shorthand".to_string(),
            TokenKind::Rest => "'...rest'".to_string(),
            TokenKind::Operator(op) => format!("'{}'", op.as_str()),
            TokenKind::Dollar => "'$'".to_string(),
            TokenKind::DollarParen => "'$('".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::DotDot => "'..'".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Question => "'?'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Pipe => "'|'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Error(kind) => kind.to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

/// Skippable input between tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriviaKind {
    Whitespace,
    Newline,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub span: Span,
}

/// The trivia preceding a token, and the token itself
#[derive(Debug, Clone, PartialEq)]
pub struct Lookahead {
    pub trivia: Vec<Trivia>,
    pub token: Token,
}

/// One item of a full token stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lexeme {
    Trivia(Trivia),
    Token(Token),
}

// Lexer

/// On-demand tokenizer: each instance lexes forward from one byte offset.
///
/// The parser creates one per lookahead so that backtracking is just a
/// matter of lexing again from a saved offset.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    base: usize,
    pos: usize,
    limits: &'a ParserLimits,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, limits: &'a ParserLimits) -> Self {
        Self::at(source, 0, limits)
    }

    /// Start lexing at `offset`, which must be a char boundary of `source`
    pub fn at(source: &'a str, offset: usize, limits: &'a ParserLimits) -> Self {
        let offset = offset.min(source.len());
        Self {
            source,
            chars: source[offset..].char_indices().peekable(),
            base: offset,
            pos: offset,
            limits,
        }
    }

    // Character navigation methods

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_char2(&mut self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.peek().map(|(_, c)| *c)
    }

    fn consume_char(&mut self) -> Option<char> {
        if let Some((idx, ch)) = self.chars.next() {
            self.pos = self.base + idx + ch.len_utf8();
            Some(ch)
        } else {
            None
        }
    }

    fn consume_while<F>(&mut self, predicate: F) -> bool
    where
        F: Fn(char) -> bool,
    {
        let mut consumed = false;
        while let Some(c) = self.peek_char() {
            if predicate(c) {
                self.consume_char();
                consumed = true;
            } else {
                break;
            }
        }
        consumed
    }

    fn advance_to(&mut self, end: usize) {
        while self.pos < end {
            if self.consume_char().is_none() {
                break;
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: Span::new(start, self.pos),
        }
    }

    // Main tokenization method

    /// Skip trivia, then lex one token under `mode`.
    ///
    /// With `newlines_are_trivia` set, line breaks are skipped like spaces;
    /// otherwise they are returned as `Newline` tokens.
    pub fn next_token(&mut self, mode: LexMode, newlines_are_trivia: bool) -> Lookahead {
        let trivia = self.skip_trivia(newlines_are_trivia);
        let token = self.lex_token(mode);
        Lookahead { trivia, token }
    }

    fn skip_trivia(&mut self, newlines_are_trivia: bool) -> Vec<Trivia> {
        let mut trivia = Vec::new();

        loop {
            let start = self.pos;
            let kind = match self.peek_char() {
                Some('\n') if newlines_are_trivia => {
                    self.consume_char();
                    TriviaKind::Newline
                }
                Some(c) if c != '\n' && c.is_whitespace() => {
                    self.consume_while(|c| c != '\n' && c.is_whitespace());
                    TriviaKind::Whitespace
                }
                Some('#') => {
                    // Comment runs to the end of the line, newline excluded
                    self.consume_while(|c| c != '\n');
                    TriviaKind::Comment
                }
                _ => break,
            };
            trivia.push(Trivia {
                kind,
                span: Span::new(start, self.pos),
            });
        }

        trivia
    }

    fn lex_token(&mut self, mode: LexMode) -> Token {
        let start = self.pos;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some('\n') => {
                self.consume_char();
                TokenKind::Newline
            }
            Some(quote @ ('"' | '\'' | '`')) => return self.lex_string(quote),
            Some('$') => {
                self.consume_char();
                if self.peek_char() == Some('(') {
                    self.consume_char();
                    TokenKind::DollarParen
                } else {
                    TokenKind::Dollar
                }
            }
            Some('|') => {
                self.consume_char();
                if self.peek_char() == Some('|') {
                    self.consume_char();
                    TokenKind::Operator(Operator::Or)
                } else {
                    TokenKind::Pipe
                }
            }
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some('[') => self.single(TokenKind::LBracket),
            Some(']') => self.single(TokenKind::RBracket),
            Some(';') => self.single(TokenKind::Semicolon),
            Some('.') => return self.lex_dot(mode),
            Some('-') => return self.lex_dash(mode),
            Some(_) => return self.lex_longest(mode),
        };

        self.token(kind, start)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    // String lexing

    fn lex_string(&mut self, quote: char) -> Token {
        let start = self.pos;
        self.consume_char(); // opening quote

        let body_start = self.pos;
        self.consume_while(|c| c != quote);
        let body_len = self.pos - body_start;

        if self.peek_char().is_none() {
            return self.token(TokenKind::Error(LexErrorKind::UnterminatedString), start);
        }
        self.consume_char(); // closing quote

        // Only single quotes permit an empty body
        if body_len == 0 && quote != '\'' {
            return self.token(TokenKind::Error(LexErrorKind::EmptyString), start);
        }

        if self.pos - start > self.limits.max_string_length {
            return self.token(
                TokenKind::Error(LexErrorKind::StringTooLong(self.limits.max_string_length)),
                start,
            );
        }

        let kind = match quote {
            '"' => StringKind::Double,
            '\'' => StringKind::Single,
            _ => StringKind::Backtick,
        };
        self.token(TokenKind::String(kind), start)
    }

    // Dot-led tokens: rest parameter, directory shorthand, paths, range dots

    fn lex_dot(&mut self, mode: LexMode) -> Token {
        let start = self.pos;
        let rest = self.rest();

        if mode.contains(LexMode::REST) && rest.starts_with("...rest") {
            self.advance_to(start + "...rest".len());
            return self.token(TokenKind::Rest, start);
        }

        let dots = if rest.starts_with("..") { 2 } else { 1 };

        if mode.contains(LexMode::FILE_PATHS) {
            if self.is_directory_shorthand(start, dots) {
                self.advance_to(start + dots);
                return self.token(TokenKind::FilePath, start);
            }
            let path_len = scan_file_path(rest);
            if path_len > dots {
                self.advance_to(start + path_len);
                return self.token(TokenKind::FilePath, start);
            }
        }

        self.advance_to(start + dots);
        let kind = if dots == 2 {
            TokenKind::DotDot
        } else {
            TokenKind::Dot
        };
        self.token(kind, start)
    }

    /// `.` or `..` standing alone after a space, e.g. `cd ..`
    fn is_directory_shorthand(&self, start: usize, dots: usize) -> bool {
        let before = self.source[..start].chars().next_back();
        if !matches!(before, Some(' ') | Some('\t')) {
            return false;
        }
        match self.source[start + dots..].chars().next() {
            None => true,
            Some(c) => c.is_whitespace() || matches!(c, ';' | '|' | ')' | ']' | '}'),
        }
    }

    // Dash-led tokens: flags or the minus operator

    fn lex_dash(&mut self, mode: LexMode) -> Token {
        let start = self.pos;
        self.consume_char(); // '-'

        if mode.contains(LexMode::FLAGS) {
            match (self.peek_char(), self.peek_char2()) {
                (Some('-'), Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.consume_char();
                    self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    return self.token(TokenKind::FlagName, start);
                }
                (Some(c), _) if c.is_ascii_alphanumeric() => {
                    self.consume_char();
                    return self.token(TokenKind::FlagShorthand, start);
                }
                _ => {}
            }
        }

        self.token(TokenKind::Operator(Operator::Minus), start)
    }

    // Longest match among the content rules that may fire in `mode`

    fn lex_longest(&mut self, mode: LexMode) -> Token {
        let start = self.pos;
        let rest = self.rest();
        let first = match rest.chars().next() {
            Some(c) => c,
            None => return self.token(TokenKind::Eof, start),
        };

        // (kind, length, priority); higher priority wins a tie
        let mut best: Option<(TokenKind, usize, u8)> = None;
        let mut offer = |kind: TokenKind, len: usize, priority: u8| {
            if len == 0 {
                return;
            }
            let better = match best {
                None => true,
                Some((_, best_len, best_priority)) => {
                    len > best_len || (len == best_len && priority > best_priority)
                }
            };
            if better {
                best = Some((kind, len, priority));
            }
        };

        if let Some((op, len)) = scan_operator(rest) {
            offer(TokenKind::Operator(op), len, 5);
        }
        if let Some(kind) = structural_punctuation(first, mode) {
            offer(kind, 1, 5);
        }
        if first.is_ascii_digit() {
            offer(TokenKind::Number, scan_number(rest), 4);
        }
        if first.is_ascii_alphabetic() || first == '_' {
            offer(TokenKind::Identifier, scan_identifier(rest), 3);
        }
        if mode.contains(LexMode::FILE_PATHS) {
            offer(TokenKind::FilePath, scan_file_path(rest), 2);
        }
        if mode.contains(LexMode::WORDS) {
            offer(TokenKind::Word, scan_word(rest, mode), 1);
        }

        match best {
            Some((TokenKind::Identifier, len, _)) if len > self.limits.max_identifier_length => {
                self.advance_to(start + len);
                self.token(
                    TokenKind::Error(LexErrorKind::IdentifierTooLong(
                        self.limits.max_identifier_length,
                    )),
                    start,
                )
            }
            Some((kind, len, _)) => {
                self.advance_to(start + len);
                self.token(kind, start)
            }
            None => {
                self.consume_char();
                let error = if first == '\\' {
                    LexErrorKind::StrayBackslash
                } else {
                    LexErrorKind::UnexpectedCharacter(first)
                };
                self.token(TokenKind::Error(error), start)
            }
        }
    }
}

// Token scanners: each returns the byte length of the longest match at the
// start of `text`, or 0

fn is_reserved(c: char, mode: LexMode) -> bool {
    matches!(
        c,
        '\'' | '"' | '`' | '{' | '}' | '[' | ']' | '(' | ')' | '\\' | '$' | ';' | '.' | '|' | '#' | '-'
    ) || c.is_whitespace()
        || (c == ',' && mode.contains(LexMode::COMMA_DELIMITS))
}

fn scan_word(text: &str, mode: LexMode) -> usize {
    let mut chars = text.char_indices();
    let mut end = 0;

    while let Some((idx, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((escaped_idx, escaped)) if !escaped.is_whitespace() => {
                    end = escaped_idx + escaped.len_utf8();
                }
                _ => break,
            }
        } else if is_reserved(c, mode) {
            break;
        } else {
            end = idx + c.len_utf8();
        }
    }

    end
}

fn scan_identifier(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    1 + bytes[1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_' || **b == b'-')
        .count()
}

fn scan_number(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut end = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if end == 0 {
        return 0;
    }

    // Fraction: the point itself may trail, but never eat the first dot of `..`
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1) != Some(&b'.') {
        end += 1;
        end += bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    }

    end
}

/// `([\w.]+/)*[\w.]+\.\w+`, longest match, rejecting all-numeric candidates
fn scan_file_path(text: &str) -> usize {
    let mut best = 0;
    let mut segment_start = 0;
    let mut dot_in_segment = false;
    let mut non_numeric = false;

    for (idx, c) in text.char_indices() {
        let is_word_char = c.is_alphanumeric() || c == '_';
        match c {
            '/' => {
                // Directory segments must be non-empty
                if idx == segment_start {
                    break;
                }
                segment_start = idx + 1;
                dot_in_segment = false;
                non_numeric = true;
            }
            '.' => {
                if idx > segment_start {
                    dot_in_segment = true;
                }
            }
            _ if is_word_char => {
                if !c.is_ascii_digit() {
                    non_numeric = true;
                }
                // A dot past the segment's first char, and a word char to end on
                if dot_in_segment && non_numeric {
                    best = idx + c.len_utf8();
                }
            }
            _ => break,
        }
    }

    best
}

fn scan_operator(text: &str) -> Option<(Operator, usize)> {
    let two = match text.get(..2) {
        Some("||") => Some(Operator::Or),
        Some("&&") => Some(Operator::And),
        Some("=~") => Some(Operator::RegexMatch),
        Some("==") => Some(Operator::Equal),
        Some("!=") => Some(Operator::NotEqual),
        Some(">=") => Some(Operator::GreaterEqual),
        Some("<=") => Some(Operator::LessEqual),
        Some("<<") => Some(Operator::ShiftLeft),
        Some(">>") => Some(Operator::ShiftRight),
        _ => None,
    };
    if let Some(op) = two {
        return Some((op, 2));
    }

    let one = match text.chars().next()? {
        '>' => Operator::Greater,
        '<' => Operator::Less,
        '+' => Operator::Plus,
        '-' => Operator::Minus,
        '*' => Operator::Multiply,
        '/' => Operator::Divide,
        '%' => Operator::Modulo,
        _ => return None,
    };
    Some((one, 1))
}

/// `=`, `:`, `,` and `?` are punctuation unless words are being lexed
fn structural_punctuation(c: char, mode: LexMode) -> Option<TokenKind> {
    if c == ',' && mode.contains(LexMode::COMMA_DELIMITS) {
        return Some(TokenKind::Comma);
    }
    if mode.contains(LexMode::WORDS) {
        return None;
    }
    match c {
        '=' => Some(TokenKind::Eq),
        ':' => Some(TokenKind::Colon),
        ',' => Some(TokenKind::Comma),
        '?' => Some(TokenKind::Question),
        _ => None,
    }
}

/// Lex a whole source in argument mode, keeping trivia and newlines.
///
/// Used by tooling that wants a flat token listing; the parser itself lexes
/// on demand with the mode each position calls for.
pub fn lex(source: &str, limits: &ParserLimits) -> Result<Vec<Lexeme>, ParseError> {
    if source.len() > limits.max_input_size {
        return Err(ParseError::InputTooLarge {
            size: source.len(),
            max: limits.max_input_size,
        });
    }

    let mut lexemes = Vec::new();
    let mut lexer = Lexer::new(source, limits);

    loop {
        let Lookahead { trivia, token } = lexer.next_token(LexMode::ARGUMENT, false);
        lexemes.extend(trivia.into_iter().map(Lexeme::Trivia));

        if token.kind == TokenKind::Eof {
            break;
        }
        if lexemes.len() >= limits.max_token_count {
            return Err(ParseError::TokenLimitExceeded {
                max: limits.max_token_count,
            });
        }
        lexemes.push(Lexeme::Token(token));
    }

    Ok(lexemes)
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Helper
    fn lex_single(source: &str, mode: LexMode) -> (TokenKind, String) {
        let limits = ParserLimits::default();
        let mut lexer = Lexer::new(source, &limits);
        let token = lexer.next_token(mode, true).token;
        (token.kind, token.text(source).to_string())
    }

    fn kinds(source: &str, mode: LexMode) -> Vec<TokenKind> {
        let limits = ParserLimits::default();
        let mut lexer = Lexer::new(source, &limits);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token(mode, false).token;
            if token.kind == TokenKind::Eof {
                break;
            }
            kinds.push(token.kind);
        }
        kinds
    }

    #[rstest]
    #[case("foo", TokenKind::Identifier, "foo")]
    #[case("foo-bar", TokenKind::Identifier, "foo-bar")]
    #[case("_x1", TokenKind::Identifier, "_x1")]
    #[case("foo=bar", TokenKind::Word, "foo=bar")]
    #[case("a:b", TokenKind::Word, "a:b")]
    #[case("42", TokenKind::Number, "42")]
    #[case("3.14", TokenKind::Number, "3.14")]
    #[case("7.", TokenKind::Number, "7.")]
    #[case("12abc", TokenKind::Word, "12abc")]
    #[case("main.rs", TokenKind::FilePath, "main.rs")]
    #[case("src/lib.rs", TokenKind::FilePath, "src/lib.rs")]
    #[case("./run.sh", TokenKind::FilePath, "./run.sh")]
    #[case("1.txt", TokenKind::FilePath, "1.txt")]
    #[case("--verbose", TokenKind::FlagName, "--verbose")]
    #[case("-l", TokenKind::FlagShorthand, "-l")]
    #[case(">", TokenKind::Operator(Operator::Greater), ">")]
    #[case(">>", TokenKind::Operator(Operator::ShiftRight), ">>")]
    #[case("+5", TokenKind::Word, "+5")]
    #[case("=", TokenKind::Word, "=")]
    #[case("a\\;b", TokenKind::Word, "a\\;b")]
    #[case("a\\ b", TokenKind::Identifier, "a")]
    #[case("$(", TokenKind::DollarParen, "$(")]
    #[case("||", TokenKind::Operator(Operator::Or), "||")]
    #[case("|", TokenKind::Pipe, "|")]
    fn test_argument_mode_priorities(
        #[case] source: &str,
        #[case] kind: TokenKind,
        #[case] text: &str,
    ) {
        assert_eq!(
            lex_single(source, LexMode::ARGUMENT),
            (kind, text.to_string())
        );
    }

    #[rstest]
    #[case("a:", TokenKind::Identifier, "a")]
    #[case("main.rs", TokenKind::Identifier, "main")]
    #[case("=", TokenKind::Eq, "=")]
    #[case("==", TokenKind::Operator(Operator::Equal), "==")]
    #[case("=~", TokenKind::Operator(Operator::RegexMatch), "=~")]
    #[case("?", TokenKind::Question, "?")]
    #[case("-1", TokenKind::Operator(Operator::Minus), "-")]
    #[case("..", TokenKind::DotDot, "..")]
    #[case(".", TokenKind::Dot, ".")]
    fn test_structural_mode_priorities(
        #[case] source: &str,
        #[case] kind: TokenKind,
        #[case] text: &str,
    ) {
        assert_eq!(
            lex_single(source, LexMode::STRUCTURAL),
            (kind, text.to_string())
        );
    }

    #[rstest]
    #[case(Operator::Or, 1)]
    #[case(Operator::And, 2)]
    #[case(Operator::RegexMatch, 6)]
    #[case(Operator::In, 6)]
    #[case(Operator::NotEqual, 6)]
    #[case(Operator::Less, 7)]
    #[case(Operator::GreaterEqual, 7)]
    #[case(Operator::ShiftRight, 9)]
    #[case(Operator::Minus, 10)]
    #[case(Operator::Mod, 11)]
    #[case(Operator::Modulo, 11)]
    fn test_precedence_levels(#[case] op: Operator, #[case] precedence: u8) {
        assert_eq!(op.precedence(), precedence);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            lex_single("\"hello world\"", LexMode::ARGUMENT),
            (TokenKind::String(StringKind::Double), "\"hello world\"".into())
        );
        assert_eq!(
            lex_single("''", LexMode::ARGUMENT),
            (TokenKind::String(StringKind::Single), "''".into())
        );
        assert_eq!(
            lex_single("`cmd`", LexMode::ARGUMENT),
            (TokenKind::String(StringKind::Backtick), "`cmd`".into())
        );
        // Strings may span lines
        assert_eq!(
            lex_single("'a\nb'", LexMode::ARGUMENT).0,
            TokenKind::String(StringKind::Single)
        );
    }

    #[test]
    fn test_string_errors() {
        assert_eq!(
            lex_single("\"abc", LexMode::ARGUMENT),
            (
                TokenKind::Error(LexErrorKind::UnterminatedString),
                "\"abc".into()
            )
        );
        assert_eq!(
            lex_single("\"\" x", LexMode::ARGUMENT),
            (TokenKind::Error(LexErrorKind::EmptyString), "\"\"".into())
        );
    }

    #[test]
    fn test_range_is_not_a_file_path() {
        assert_eq!(
            kinds("1..5", LexMode::ARGUMENT),
            vec![TokenKind::Number, TokenKind::DotDot, TokenKind::Number]
        );
    }

    #[test]
    fn test_directory_shorthand() {
        assert_eq!(
            kinds("cd ..", LexMode::ARGUMENT),
            vec![TokenKind::Identifier, TokenKind::FilePath]
        );
        assert_eq!(
            kinds("ls . ", LexMode::ARGUMENT),
            vec![TokenKind::Identifier, TokenKind::FilePath]
        );
        // No whitespace before: plain dots
        assert_eq!(
            kinds("a..", LexMode::STRUCTURAL),
            vec![TokenKind::Identifier, TokenKind::DotDot]
        );
    }

    #[test]
    fn test_comma_delimits_words_in_elements() {
        assert_eq!(kinds("a,b", LexMode::ARGUMENT), vec![TokenKind::Word]);
        assert_eq!(
            kinds("a,b", LexMode::ELEMENT),
            vec![TokenKind::Identifier, TokenKind::Comma, TokenKind::Identifier]
        );
    }

    #[test]
    fn test_flags_only_where_allowed() {
        assert_eq!(
            kinds("--flag(-f)", LexMode::SIGNATURE),
            vec![
                TokenKind::FlagName,
                TokenKind::LParen,
                TokenKind::FlagShorthand,
                TokenKind::RParen
            ]
        );
        assert_eq!(
            kinds("-f", LexMode::STRUCTURAL),
            vec![TokenKind::Operator(Operator::Minus), TokenKind::Identifier]
        );
    }

    #[test]
    fn test_rest_parameter() {
        assert_eq!(lex_single("...rest", LexMode::SIGNATURE).0, TokenKind::Rest);
        assert_eq!(lex_single("...rest", LexMode::STRUCTURAL).0, TokenKind::DotDot);
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            lex_single("@", LexMode::STRUCTURAL).0,
            TokenKind::Error(LexErrorKind::UnexpectedCharacter('@'))
        );
        assert_eq!(lex_single("@", LexMode::ARGUMENT).0, TokenKind::Word);
        assert_eq!(
            lex_single("\\", LexMode::ARGUMENT).0,
            TokenKind::Error(LexErrorKind::StrayBackslash)
        );
    }

    #[test]
    fn test_identifier_too_long() {
        let limits = ParserLimits {
            max_identifier_length: 3,
            ..ParserLimits::default()
        };
        let mut lexer = Lexer::new("abcdef", &limits);
        let token = lexer.next_token(LexMode::STRUCTURAL, true).token;
        assert_eq!(
            token.kind,
            TokenKind::Error(LexErrorKind::IdentifierTooLong(3))
        );
        assert_eq!(token.span, Span::new(0, 6));
    }

    #[test]
    fn test_trivia_collection() {
        let limits = ParserLimits::default();
        let mut lexer = Lexer::new("  # note\n\tx", &limits);
        let lookahead = lexer.next_token(LexMode::STRUCTURAL, true);
        let trivia: Vec<TriviaKind> = lookahead.trivia.iter().map(|t| t.kind).collect();
        assert_eq!(
            trivia,
            vec![
                TriviaKind::Whitespace,
                TriviaKind::Comment,
                TriviaKind::Newline,
                TriviaKind::Whitespace
            ]
        );
        assert_eq!(lookahead.token.span, Span::new(10, 11));
    }

    #[test]
    fn test_newline_token_when_significant() {
        let limits = ParserLimits::default();
        let mut lexer = Lexer::new("\nx", &limits);
        assert_eq!(
            lexer.next_token(LexMode::STRUCTURAL, false).token.kind,
            TokenKind::Newline
        );
    }

    #[test]
    fn test_lex_covers_whole_input() {
        let source = "ls -la ./src # list\nlet x = [1, 2]";
        let lexemes = lex(source, &ParserLimits::default()).unwrap();

        let mut rebuilt = String::new();
        for lexeme in &lexemes {
            let span = match lexeme {
                Lexeme::Trivia(t) => t.span,
                Lexeme::Token(t) => t.span,
            };
            rebuilt.push_str(&source[span.start..span.end]);
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_lex_input_too_large() {
        let limits = ParserLimits {
            max_input_size: 4,
            ..ParserLimits::default()
        };
        assert!(matches!(
            lex("echo hello", &limits),
            Err(ParseError::InputTooLarge { size: 10, max: 4 })
        ));
    }
}
