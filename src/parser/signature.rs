use super::Parser;
use super::error::SyntaxError;
use crate::ast::{AstNode, NodeFlags, NodeType, TypeName};
use crate::lexer::{LexMode, TokenKind};

// Function signature parsing
impl<'a> Parser<'a> {
    /// Parse a signature: [ (parameter | flag | rest) ,? ... ]
    pub(super) fn parse_signature(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Signature);
        self.expect(node, TokenKind::LBracket, LexMode::SIGNATURE, "'['")?;

        self.with_newlines(false, |p| {
            loop {
                let token = p.peek(LexMode::SIGNATURE);
                let entry = match token.kind {
                    TokenKind::RBracket => break,
                    TokenKind::Identifier => p.parse_parameter(depth + 1)?,
                    TokenKind::FlagName => p.parse_flag(depth + 1)?,
                    TokenKind::Rest => p.parse_rest(depth + 1)?,
                    _ => return Err(p.unexpected("parameter, flag, '...rest' or ']'", token)),
                };
                p.ast.add_child(node, entry);

                // Separating commas are optional
                if p.peek(LexMode::SIGNATURE).kind == TokenKind::Comma {
                    p.push_token(node, LexMode::SIGNATURE);
                }
            }
            p.expect(node, TokenKind::RBracket, LexMode::SIGNATURE, "']'")
        })?;

        Ok(node)
    }

    // name [: type] [?]
    fn parse_parameter(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Parameter);
        let name = self.leaf(NodeType::Identifier, LexMode::SIGNATURE);
        self.ast.add_child(node, name);

        self.parse_type_annotation(node)?;

        if self.peek(LexMode::SIGNATURE).kind == TokenKind::Question {
            self.push_token(node, LexMode::SIGNATURE);
            self.ast.nodes[node].flags |= NodeFlags::NULLABLE;
        }

        Ok(node)
    }

    // --name [(-x)] [: type]
    fn parse_flag(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Flag);
        let name = self.leaf(NodeType::FlagName, LexMode::SIGNATURE);
        self.ast.add_child(node, name);

        if self.peek(LexMode::SIGNATURE).kind == TokenKind::LParen {
            self.push_token(node, LexMode::SIGNATURE);

            let token = self.peek(LexMode::SIGNATURE);
            if token.kind != TokenKind::FlagShorthand {
                return Err(self.unexpected("flag shorthand", token));
            }
            let shorthand = self.leaf(NodeType::FlagShorthand, LexMode::SIGNATURE);
            self.ast.add_child(node, shorthand);

            self.expect(node, TokenKind::RParen, LexMode::SIGNATURE, "')'")?;
        }

        self.parse_type_annotation(node)?;
        Ok(node)
    }

    // ...rest [: type]
    fn parse_rest(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Rest);
        self.push_token(node, LexMode::SIGNATURE);
        self.parse_type_annotation(node)?;
        Ok(node)
    }

    // Helper: optional `: type` suffix
    fn parse_type_annotation(&mut self, node: usize) -> Result<(), SyntaxError> {
        if self.peek(LexMode::SIGNATURE).kind != TokenKind::Colon {
            return Ok(());
        }
        self.push_token(node, LexMode::SIGNATURE);

        let token = self.peek(LexMode::SIGNATURE);
        let known = token.kind == TokenKind::Identifier
            && TypeName::from_name(self.token_text(token)).is_some();
        if !known {
            let names: Vec<&str> = TypeName::ALL.iter().map(|t| t.as_str()).collect();
            return Err(self.unexpected(&format!("type ({})", names.join(", ")), token));
        }

        let token = self.bump(LexMode::SIGNATURE);
        let ty = self.new_node(AstNode::new_terminal(NodeType::Type, token.span));
        self.ast.add_child(node, ty);
        Ok(())
    }
}
