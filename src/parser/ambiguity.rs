// Ambiguity resolution for bracketed constructs
//
// Table vs array:   `[[a, b]; [1, 2]]` is a table, `[[a, b], [1, 2]]` an array
//                   of arrays. The first element is parsed once as an ordinary
//                   expression; if it is a comma-separated array and `;`
//                   follows, it is re-tagged as the column header.
// Record vs block:  `{ a: 1 }` is a record, `{ ls }` a block. The record
//                   reading is tried first and the block reading second, each
//                   from a saved checkpoint. The outcome is remembered per
//                   `{` offset for the rest of the parse.
//
// When no reading fits, the construct becomes an Error node instead of
// failing the enclosing rule.

use log::debug;

use super::Parser;
use super::error::SyntaxError;
use crate::ast::{Field, NodeFlags, NodeType};
use crate::lexer::{LexMode, TokenKind};

/// How the braces at one offset were read
#[derive(Debug, Clone)]
pub(super) enum BraceReading {
    Record,
    Block,
    Neither(SyntaxError),
}

impl<'a> Parser<'a> {
    /// Parse `[ ... ]` as a Table or an Array
    pub(super) fn parse_table_or_array(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let checkpoint = self.checkpoint();
        let start = self.peek(LexMode::STRUCTURAL).span.start;

        match self.with_newlines(false, |p| p.parse_list(depth + 1)) {
            Ok(node) => Ok(node),
            Err(err) => {
                debug!("list at {}: no table or array reading ({})", start, err.message);
                self.rewind(checkpoint);
                Ok(self.recover_construct(err))
            }
        }
    }

    fn parse_list(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Array);
        self.expect(node, TokenKind::LBracket, LexMode::STRUCTURAL, "'['")?;

        if self.peek(LexMode::ELEMENT).kind == TokenKind::RBracket {
            self.push_token(node, LexMode::ELEMENT);
            return Ok(node);
        }

        let first = self.parse_expression(LexMode::ELEMENT, depth + 1)?;

        if self.peek(LexMode::ELEMENT).kind == TokenKind::Semicolon && self.is_column_header(first)
        {
            debug!(
                "list at {}: column header followed by ';', committing to table",
                self.ast.nodes[node].span.start
            );
            self.ast.nodes[first].node_type = NodeType::ColumnHeader;
            self.ast.nodes[node].node_type = NodeType::Table;
            self.ast.add_child(node, first);
            self.push_token(node, LexMode::ELEMENT);
            self.parse_table_rows(node, depth + 1)?;
        } else {
            if self.ast.nodes[first].node_type == NodeType::Array {
                debug!(
                    "list at {}: no ';' after leading array, committing to array",
                    self.ast.nodes[node].span.start
                );
            }
            self.ast.add_child(node, first);
            self.parse_array_elements(node, depth + 1)?;
        }

        self.expect(node, TokenKind::RBracket, LexMode::ELEMENT, "']'")?;
        Ok(node)
    }

    // A column header is an array whose elements are separated by commas only
    fn is_column_header(&self, node: usize) -> bool {
        if self.ast.nodes[node].node_type != NodeType::Array {
            return false;
        }
        let elements = self.ast.named_children(node).count();
        let commas = self
            .ast
            .children(node)
            .filter(|&c| {
                self.ast.nodes[c].node_type == NodeType::Token && self.ast.node_text(c) == ","
            })
            .count();
        elements <= 1 || commas == elements - 1
    }

    // Rows after the header: arrays separated by whitespace
    fn parse_table_rows(&mut self, table: usize, depth: usize) -> Result<(), SyntaxError> {
        self.check_depth(depth)?;

        loop {
            let token = self.peek(LexMode::ELEMENT);
            match token.kind {
                TokenKind::RBracket => return Ok(()),
                TokenKind::LBracket => {
                    let row = self.parse_table_or_array(depth + 1)?;
                    if self.ast.nodes[row].node_type == NodeType::Table {
                        return Err(SyntaxError::new(
                            "table rows must be arrays",
                            self.ast.nodes[row].span,
                        ));
                    }
                    self.ast.add_child(table, row);
                }
                _ => return Err(self.unexpected("table row or ']'", token)),
            }
        }
    }

    // Remaining array elements, each preceded by a comma or whitespace
    fn parse_array_elements(&mut self, array: usize, depth: usize) -> Result<(), SyntaxError> {
        self.check_depth(depth)?;

        loop {
            let (token, adjacent) = self.peek_is_adjacent(LexMode::ELEMENT);
            match token.kind {
                TokenKind::RBracket => return Ok(()),
                TokenKind::Comma => {
                    self.push_token(array, LexMode::ELEMENT);
                    let next = self.peek(LexMode::ELEMENT);
                    if !next.kind.starts_expression() {
                        return Err(self.unexpected("array element after ','", next));
                    }
                }
                kind if kind.starts_expression() && adjacent => {
                    return Err(SyntaxError::new(
                        "array elements must be separated by ',' or whitespace",
                        token.span,
                    ));
                }
                kind if kind.starts_expression() => {}
                _ => return Err(self.unexpected("array element or ']'", token)),
            }

            let element = self.parse_expression(LexMode::ELEMENT, depth + 1)?;
            self.ast.add_child(array, element);
        }
    }

    /// Parse `{ ... }` as a record, else as a block, else as an Error node.
    ///
    /// The reading is decided once per `{` offset. When backtracking brings
    /// the parser back over the same braces, the remembered reading is
    /// replayed instead of trying both again, so nested braces cost
    /// quadratic rather than exponential time.
    pub(super) fn parse_record_or_block(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let checkpoint = self.checkpoint();
        let start = self.peek(LexMode::STRUCTURAL).span.start;

        if let Some(reading) = self.braces.get(&start).cloned() {
            return Ok(self.replay_braces(reading, depth));
        }

        let record_err = match self.parse_record_reading(depth) {
            Ok(node) => {
                debug!("record_or_block at {}: record", start);
                self.braces.insert(start, BraceReading::Record);
                return Ok(node);
            }
            Err(err) => err,
        };
        self.rewind(checkpoint);

        let block_err = match self.parse_braced_block(depth + 1) {
            Ok(node) => {
                debug!("record_or_block at {}: block ({})", start, record_err.message);
                self.braces.insert(start, BraceReading::Block);
                return Ok(node);
            }
            Err(err) => err,
        };
        self.rewind(checkpoint);

        // Report whichever reading got further
        let err = if record_err.span.start >= block_err.span.start {
            record_err
        } else {
            block_err
        };
        debug!("record_or_block at {}: neither reading fits", start);
        self.braces.insert(start, BraceReading::Neither(err.clone()));
        Ok(self.recover_construct(err))
    }

    // Braces seen before: repeat the reading chosen the first time
    fn replay_braces(&mut self, reading: BraceReading, depth: usize) -> usize {
        let checkpoint = self.checkpoint();
        let result = match reading {
            BraceReading::Record => self.parse_record_reading(depth),
            BraceReading::Block => self.parse_braced_block(depth + 1),
            BraceReading::Neither(err) => Err(err),
        };

        match result {
            Ok(node) => node,
            // Neither reading fitted, or the remembered one now nests too deep
            Err(err) => {
                self.rewind(checkpoint);
                self.recover_construct(err)
            }
        }
    }

    fn parse_record_reading(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.with_newlines(false, |p| p.parse_record(depth + 1))
    }

    // { (name: value ,?)* }
    fn parse_record(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::RecordOrBlock);
        self.ast.nodes[node].flags |= NodeFlags::RECORD;
        self.expect(node, TokenKind::LBrace, LexMode::STRUCTURAL, "'{'")?;

        loop {
            let token = self.peek(LexMode::STRUCTURAL);
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::Identifier => {
                    let field = self.parse_record_field(depth + 1)?;
                    self.ast.add_child(node, field);
                }
                _ => return Err(self.unexpected("record field or '}'", token)),
            }

            if self.peek(LexMode::STRUCTURAL).kind == TokenKind::Comma {
                self.push_token(node, LexMode::STRUCTURAL);
            }
        }

        self.expect(node, TokenKind::RBrace, LexMode::STRUCTURAL, "'}'")?;
        Ok(node)
    }

    fn parse_record_field(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::RecordField);

        let name = self.leaf(NodeType::Identifier, LexMode::STRUCTURAL);
        self.ast.set_field(name, Field::Name);
        self.ast.add_child(node, name);

        self.expect(node, TokenKind::Colon, LexMode::STRUCTURAL, "':'")?;

        let value = self.parse_expression(LexMode::ELEMENT, depth + 1)?;
        self.ast.set_field(value, Field::Value);
        self.ast.add_child(node, value);

        Ok(node)
    }

    // { <statements> }, failing on the first malformed statement
    fn parse_braced_block(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::RecordOrBlock);
        self.ast.nodes[node].flags |= NodeFlags::BLOCK;
        self.expect(node, TokenKind::LBrace, LexMode::STRUCTURAL, "'{'")?;
        self.parse_statements(node, Some(TokenKind::RBrace), false, depth + 1)?;
        self.expect(node, TokenKind::RBrace, LexMode::STRUCTURAL, "'}'")?;

        Ok(node)
    }
}
