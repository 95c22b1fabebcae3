use super::Parser;
use super::error::SyntaxError;
use crate::ast::{AstNode, Field, NodeType};
use crate::diagnostics::Diagnostic;
use crate::lexer::{LexMode, Operator, TokenKind};

// Recursive expression parsing methods
impl<'a> Parser<'a> {
    /// Parse a math expression with precedence climbing.
    /// Returns the node index of the parsed expression.
    pub(super) fn parse_math_expression(
        &mut self,
        depth: usize,
        min_precedence: u8,
    ) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let mut left_idx = self.parse_math_primary(depth + 1)?;

        loop {
            let token = self.peek(LexMode::STRUCTURAL);

            // Check if we have a binary operator at this precedence level
            let op_precedence = match self.as_operator(token) {
                Some(op) if op.precedence() >= min_precedence => op.precedence(),
                _ => break,
            };

            let start = self.ast.nodes[left_idx].span.start;
            let binary_idx = self.new_node(AstNode::new(NodeType::BinaryExpression, start));

            self.ast.set_field(left_idx, Field::Left);
            self.ast.add_child(binary_idx, left_idx);

            let op_idx = self.leaf(NodeType::Operator, LexMode::STRUCTURAL);
            self.ast.set_field(op_idx, Field::Operator);
            self.ast.add_child(binary_idx, op_idx);

            // Parse right side with higher precedence for left-associativity
            let right_idx = self.parse_math_expression(depth + 1, op_precedence + 1)?;
            self.ast.set_field(right_idx, Field::Right);
            self.ast.add_child(binary_idx, right_idx);

            // The binary node becomes the new left side
            left_idx = binary_idx;
        }

        Ok(left_idx)
    }

    /// Parse a math operand: substitution, parenthesized expression, value
    /// path, number, table/array or record/block
    fn parse_math_primary(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let token = self.peek(LexMode::STRUCTURAL);
        match token.kind {
            TokenKind::DollarParen => self.parse_command_substitution(depth + 1),
            TokenKind::LParen => self.parse_parenthesized(depth + 1),
            TokenKind::Dollar => self.parse_value_path(depth + 1),
            TokenKind::Number => Ok(self.leaf(NodeType::NumberLiteral, LexMode::STRUCTURAL)),
            TokenKind::LBracket => self.parse_table_or_array(depth + 1),
            TokenKind::LBrace => self.parse_record_or_block(depth + 1),
            _ => Err(self.unexpected("math expression", token)),
        }
    }

    // ( <math expression> ), with newlines insignificant inside
    fn parse_parenthesized(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::ParenthesizedMathExpression);
        self.expect(node, TokenKind::LParen, LexMode::STRUCTURAL, "'('")?;

        self.with_newlines(false, |p| {
            let inner = p.parse_math_expression(depth + 1, 0)?;
            p.ast.add_child(node, inner);
            p.expect(node, TokenKind::RParen, LexMode::STRUCTURAL, "')'")
        })?;

        Ok(node)
    }

    // $name(.name)*, each dot immediately following the previous segment
    pub(super) fn parse_value_path(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::ValuePath);
        self.expect(node, TokenKind::Dollar, LexMode::STRUCTURAL, "'$'")?;
        self.expect_path_segment(node)?;

        loop {
            let (dot, adjacent) = self.peek_is_adjacent(LexMode::STRUCTURAL);
            if dot.kind != TokenKind::Dot || !adjacent {
                break;
            }

            // A dot not directly followed by a name ends the path unconsumed
            let next = self.peek_after(dot, LexMode::STRUCTURAL);
            if next.kind != TokenKind::Identifier || next.span.start != dot.span.end {
                break;
            }
            self.push_token(node, LexMode::STRUCTURAL);
            self.expect_path_segment(node)?;
        }

        Ok(node)
    }

    fn expect_path_segment(&mut self, node: usize) -> Result<(), SyntaxError> {
        let token = self.peek(LexMode::STRUCTURAL);
        if token.kind != TokenKind::Identifier {
            return Err(self.unexpected("identifier", token));
        }
        let segment = self.leaf(NodeType::Identifier, LexMode::STRUCTURAL);
        self.ast.add_child(node, segment);
        Ok(())
    }

    // $( <statements> )
    pub(super) fn parse_command_substitution(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::CommandSubstitution);
        let open = self.peek(LexMode::STRUCTURAL);
        self.expect(node, TokenKind::DollarParen, LexMode::STRUCTURAL, "'$('")?;

        let count = self.parse_statements(node, Some(TokenKind::RParen), true, depth + 1)?;
        if count == 0 {
            return Err(SyntaxError::new(
                "command substitution needs at least one statement",
                open.span,
            ));
        }

        self.expect(node, TokenKind::RParen, LexMode::STRUCTURAL, "')'")?;
        Ok(node)
    }

    /// Parse a generic expression (command argument, list element, record
    /// value) under `mode`
    pub(super) fn parse_expression(
        &mut self,
        mode: LexMode,
        depth: usize,
    ) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let token = self.peek(mode);
        match token.kind {
            TokenKind::Number => self.parse_number_or_range(mode, depth + 1),
            TokenKind::String(_) => Ok(self.leaf(NodeType::StringLiteral, mode)),
            TokenKind::Dollar => self.parse_value_path(depth + 1),
            TokenKind::DollarParen => self.parse_command_substitution(depth + 1),
            TokenKind::FilePath => {
                let text = self.token_text(token);
                if !text.contains('/') && text.chars().any(|c| c != '.') {
                    self.diagnostic(
                        Diagnostic::warning(format!("'{}' was read as a file path", text), token.span)
                            .with_help("paths are recognized by their extension; quote the text if it is not a path"),
                    );
                }
                Ok(self.leaf(NodeType::FilePath, mode))
            }
            TokenKind::FlagName => Ok(self.leaf(NodeType::FlagName, mode)),
            TokenKind::FlagShorthand => Ok(self.leaf(NodeType::FlagShorthand, mode)),
            TokenKind::LBrace => self.parse_record_or_block(depth + 1),
            TokenKind::LBracket => self.parse_table_or_array(depth + 1),
            TokenKind::Operator(_) => Ok(self.leaf(NodeType::Operator, mode)),
            TokenKind::Identifier => match Operator::from_keyword(self.token_text(token)) {
                Some(_) => Ok(self.leaf(NodeType::Operator, mode)),
                None => Ok(self.leaf(NodeType::Identifier, mode)),
            },
            TokenKind::Word => Ok(self.leaf(NodeType::Word, mode)),
            _ => Err(self.unexpected("expression", token)),
        }
    }

    // <number> or <number>..<number>
    fn parse_number_or_range(&mut self, mode: LexMode, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let from = self.leaf(NodeType::NumberLiteral, mode);

        let (token, adjacent) = self.peek_is_adjacent(LexMode::STRUCTURAL);
        if token.kind != TokenKind::DotDot || !adjacent {
            return Ok(from);
        }

        let start = self.ast.nodes[from].span.start;
        let node = self.new_node(AstNode::new(NodeType::Range, start));
        self.ast.set_field(from, Field::From);
        self.ast.add_child(node, from);
        self.push_token(node, LexMode::STRUCTURAL);

        let token = self.peek(LexMode::STRUCTURAL);
        if token.kind != TokenKind::Number {
            return Err(self.unexpected("number after '..'", token));
        }
        let to = self.leaf(NodeType::NumberLiteral, LexMode::STRUCTURAL);
        self.ast.set_field(to, Field::To);
        self.ast.add_child(node, to);

        Ok(node)
    }
}
