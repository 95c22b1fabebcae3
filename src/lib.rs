//! Syntax analyzer for nu-style shell scripts.
//!
//! Source text goes through a mode-driven tokenizer and a recursive-descent
//! parser into an arena [`Ast`](ast::Ast): statements, commands, math
//! expressions, tables, records and definitions, with byte ranges, named
//! fields and Error nodes for the parts that do not parse. Whitespace and
//! comments are kept as trivia so the tree reproduces its input exactly.
//!
//! ```
//! let ast = nu_syntax::parse("let x = 1 + 2").unwrap();
//! assert!(!ast.has_errors());
//! ```

pub mod ast;
pub mod diagnostics;
pub mod incremental;
pub mod lexer;
pub mod limits;
pub mod parser;

pub use ast::{Ast, AstNode, Field, NodeFlags, NodeType};
pub use diagnostics::{Diagnostic, DiagnosticPrinter, Severity};
pub use incremental::{ReparseStats, TextEdit, reparse, reparse_with_stats};
pub use lexer::Span;
pub use limits::{LimitError, ParserLimits};
pub use parser::{ParseError, parse, parse_with_limits};
