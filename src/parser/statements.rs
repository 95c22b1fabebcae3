use log::trace;

use super::Parser;
use super::error::SyntaxError;
use crate::ast::{Field, NodeFlags, NodeType};
use crate::diagnostics::Diagnostic;
use crate::lexer::{LexMode, TokenKind};

// Recursive statement parsing methods
impl<'a> Parser<'a> {
    /// Parse a statement list into `container` until end of input or `closer`.
    ///
    /// With `recover` set, a failed statement becomes an Error node and parsing
    /// resumes after the next terminator; otherwise the first failure is
    /// returned. Returns the number of statements parsed.
    pub(super) fn parse_statements(
        &mut self,
        container: usize,
        closer: Option<TokenKind>,
        recover: bool,
        depth: usize,
    ) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;
        self.with_newlines(true, |p| p.parse_statement_list(container, closer, recover, depth))
    }

    fn parse_statement_list(
        &mut self,
        container: usize,
        closer: Option<TokenKind>,
        recover: bool,
        depth: usize,
    ) -> Result<usize, SyntaxError> {
        let mut count = 0;

        loop {
            self.skip_newlines();

            let token = self.peek(LexMode::STRUCTURAL);
            if token.kind == TokenKind::Eof || Some(token.kind) == closer {
                break;
            }

            // A terminator with no statement before it
            if token.kind.is_terminator() {
                let err = self.unexpected("statement", token);
                if !recover {
                    return Err(err);
                }
                let error = self.start_node(NodeType::Error);
                self.push_token(error, LexMode::STRUCTURAL);
                self.diagnostic(Diagnostic::error(err.message, err.span));
                self.ast.add_child(container, error);
                count += 1;
                continue;
            }

            let checkpoint = self.checkpoint();
            let statement = match self.parse_statement(depth + 1) {
                Ok(statement) => statement,
                Err(err) if recover => {
                    self.rewind(checkpoint);
                    self.recover_statement(err, closer)
                }
                Err(err) => return Err(err),
            };
            self.ast.add_child(container, statement);
            count += 1;

            // Anything other than a terminator or the end is trailing garbage
            let token = self.peek(LexMode::STRUCTURAL);
            let at_end = token.kind == TokenKind::Eof || Some(token.kind) == closer;
            if !at_end && !token.kind.is_terminator() {
                let err = self.unexpected("';', '|' or newline after statement", token);
                if !recover {
                    return Err(err);
                }
                let error = self.recover_statement(err, closer);
                self.ast.add_child(container, error);
            }

            if self.peek(LexMode::STRUCTURAL).kind.is_terminator() {
                self.push_token(container, LexMode::STRUCTURAL);
            }
        }

        Ok(count)
    }

    /// Parse a single statement, dispatching on its first token
    pub(super) fn parse_statement(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let token = self.peek(LexMode::STRUCTURAL);
        trace!("parse_statement: next token = {:?}", token);

        match token.kind {
            TokenKind::Identifier => match self.token_text(token) {
                "let" => self.parse_variable_declaration(depth + 1),
                "export" | "def" => self.parse_function_definition(depth + 1),
                "alias" => self.parse_alias(depth + 1),
                _ => self.parse_command(depth + 1),
            },
            TokenKind::Eq => self.parse_math_mode(depth + 1),
            kind if kind.starts_math_expression() => self.parse_math_expression(depth + 1, 0),
            _ => Err(self.unexpected("statement", token)),
        }
    }

    // let <name> = <math expression | string>
    fn parse_variable_declaration(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::VariableDeclaration);
        self.expect_keyword(node, "let")?;

        let name = self.expect_identifier()?;
        self.ast.set_field(name, Field::Name);
        self.ast.add_child(node, name);

        self.expect(node, TokenKind::Eq, LexMode::STRUCTURAL, "'='")?;

        let value = match self.peek(LexMode::STRUCTURAL).kind {
            TokenKind::String(_) => self.leaf(NodeType::StringLiteral, LexMode::STRUCTURAL),
            _ => self.parse_math_expression(depth + 1, 0)?,
        };
        self.ast.set_field(value, Field::Value);
        self.ast.add_child(node, value);

        Ok(node)
    }

    // [export] def <name> <signature> <block>
    fn parse_function_definition(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::FunctionDefinition);

        let token = self.peek(LexMode::STRUCTURAL);
        if self.token_text(token) == "export" {
            self.push_token(node, LexMode::STRUCTURAL);
            self.ast.nodes[node].flags |= NodeFlags::EXPORTED;
        }
        self.expect_keyword(node, "def")?;

        let token = self.peek(LexMode::STRUCTURAL);
        let name = match token.kind {
            TokenKind::Identifier => self.leaf(NodeType::Identifier, LexMode::STRUCTURAL),
            TokenKind::String(_) => self.leaf(NodeType::StringLiteral, LexMode::STRUCTURAL),
            _ => return Err(self.unexpected("function name", token)),
        };
        self.ast.set_field(name, Field::FuncName);
        self.ast.add_child(node, name);

        let signature = self.parse_signature(depth + 1)?;
        self.ast.add_child(node, signature);

        let block = self.parse_block(depth + 1)?;
        self.ast.add_child(node, block);

        Ok(node)
    }

    // Function body: { <statements> }
    fn parse_block(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Block);
        self.expect(node, TokenKind::LBrace, LexMode::STRUCTURAL, "'{'")?;
        self.parse_statements(node, Some(TokenKind::RBrace), true, depth + 1)?;
        self.expect(node, TokenKind::RBrace, LexMode::STRUCTURAL, "'}'")?;

        Ok(node)
    }

    // alias <name> = <statement>
    fn parse_alias(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Alias);
        self.expect_keyword(node, "alias")?;

        let name = self.expect_identifier()?;
        self.ast.set_field(name, Field::AliasName);
        self.ast.add_child(node, name);

        self.expect(node, TokenKind::Eq, LexMode::STRUCTURAL, "'='")?;

        let target = self.parse_statement(depth + 1)?;
        self.ast.add_child(node, target);

        Ok(node)
    }

    // = <math expression>
    fn parse_math_mode(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::MathMode);
        self.expect(node, TokenKind::Eq, LexMode::STRUCTURAL, "'='")?;

        let expr = self.parse_math_expression(depth + 1, 0)?;
        self.ast.add_child(node, expr);

        Ok(node)
    }

    // <name>[?] <expression>*
    fn parse_command(&mut self, depth: usize) -> Result<usize, SyntaxError> {
        self.check_depth(depth)?;

        let node = self.start_node(NodeType::Command);

        let name = self.expect_identifier()?;
        self.ast.set_field(name, Field::CmdName);
        self.ast.add_child(node, name);

        // Try marker after the name: `open? file.txt`, `open ? file.txt`
        if self.peek(LexMode::STRUCTURAL).kind == TokenKind::Question {
            let marker = self.leaf(NodeType::Token, LexMode::STRUCTURAL);
            self.ast.set_field(marker, Field::CmdName);
            self.ast.add_child(node, marker);
            self.ast.nodes[node].flags |= NodeFlags::TRY;
        }

        while self.peek(LexMode::ARGUMENT).kind.starts_expression() {
            let arg = self.parse_expression(LexMode::ARGUMENT, depth + 1)?;
            self.ast.set_field(arg, Field::Arg);
            self.ast.add_child(node, arg);
        }

        Ok(node)
    }

    fn expect_identifier(&mut self) -> Result<usize, SyntaxError> {
        let token = self.peek(LexMode::STRUCTURAL);
        if token.kind != TokenKind::Identifier {
            return Err(self.unexpected("identifier", token));
        }
        Ok(self.leaf(NodeType::Identifier, LexMode::STRUCTURAL))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Field, NodeFlags, NodeType};
    use crate::parser::{ParseError, parse};

    // Helper
    fn to_ast_string(source: &str) -> Result<String, ParseError> {
        let ast = parse(source)?;
        Ok(ast.to_string())
    }

    // Variable declaration tests
    #[test]
    fn test_let_number() {
        let ast = to_ast_string("let x = 42\n").unwrap();
        let expected = "\
SourceFile
  VariableDeclaration
    name: Identifier 'x'
    value: NumberLiteral '42'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_let_string() {
        let ast = to_ast_string("let greeting = 'hi there'").unwrap();
        let expected = "\
SourceFile
  VariableDeclaration
    name: Identifier 'greeting'
    value: StringLiteral ''hi there''
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_let_missing_value_is_error() {
        let ast = parse("let x =\nls").unwrap();
        let expected = "\
SourceFile
  Error 'let x ='
  Command
    cmd_name: Identifier 'ls'
";
        assert_eq!(ast.to_string(), expected);
        assert_eq!(ast.diagnostics.len(), 1);
        assert_eq!(
            ast.diagnostics[0].message,
            "expected math expression, found newline"
        );
    }

    // Function definition tests
    #[test]
    fn test_def_with_signature_and_block() {
        let ast = to_ast_string("def greet [name: string] { echo $name }").unwrap();
        let expected = "\
SourceFile
  FunctionDefinition
    func_name: Identifier 'greet'
    Signature
      Parameter
        Identifier 'name'
        Type 'string'
    Block
      Command
        cmd_name: Identifier 'echo'
        arg: ValuePath
          Identifier 'name'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_export_def_with_string_name() {
        let ast = to_ast_string("export def \"git st\" [] {}").unwrap();
        let expected = "\
SourceFile
  FunctionDefinition [exported]
    func_name: StringLiteral '\"git st\"'
    Signature
    Block
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_export_without_def_is_error() {
        let ast = parse("export foo").unwrap();
        assert_eq!(ast.statements().len(), 1);
        assert_eq!(ast.nodes[ast.statements()[0]].node_type, NodeType::Error);
        assert_eq!(ast.diagnostics[0].message, "expected 'def', found identifier 'foo'");
    }

    #[test]
    fn test_function_body_recovers_inside_block() {
        let ast = to_ast_string("def f [] {\n  ls\n  )\n  pwd\n}").unwrap();
        let expected = "\
SourceFile
  FunctionDefinition
    func_name: Identifier 'f'
    Signature
    Block
      Command
        cmd_name: Identifier 'ls'
      Error ')'
      Command
        cmd_name: Identifier 'pwd'
";
        assert_eq!(ast, expected);
    }

    // Alias tests
    #[test]
    fn test_alias_to_command() {
        let ast = to_ast_string("alias ll = ls -l").unwrap();
        let expected = "\
SourceFile
  Alias
    alias_name: Identifier 'll'
    Command
      cmd_name: Identifier 'ls'
      arg: FlagShorthand '-l'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_alias_of_alias() {
        let ast = to_ast_string("alias a = alias b = c").unwrap();
        let expected = "\
SourceFile
  Alias
    alias_name: Identifier 'a'
    Alias
      alias_name: Identifier 'b'
      Command
        cmd_name: Identifier 'c'
";
        assert_eq!(ast, expected);
    }

    // Math mode tests
    #[test]
    fn test_math_mode() {
        let ast = to_ast_string("= 1 + 2").unwrap();
        let expected = "\
SourceFile
  MathMode
    BinaryExpression
      left: NumberLiteral '1'
      operator: Operator '+'
      right: NumberLiteral '2'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_bare_math_expression_statement() {
        let ast = to_ast_string("$x.y").unwrap();
        let expected = "\
SourceFile
  ValuePath
    Identifier 'x'
    Identifier 'y'
";
        assert_eq!(ast, expected);
    }

    // Command tests
    #[test]
    fn test_command_arguments() {
        let ast = to_ast_string("cp -r src/ dest.txt --force 3 'q'").unwrap();
        let expected = "\
SourceFile
  Command
    cmd_name: Identifier 'cp'
    arg: FlagShorthand '-r'
    arg: Word 'src/'
    arg: FilePath 'dest.txt'
    arg: FlagName '--force'
    arg: NumberLiteral '3'
    arg: StringLiteral ''q''
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_try_command() {
        let ast = parse("open? data.json").unwrap();
        let cmd = ast.statements()[0];
        assert_eq!(
            ast.to_string(),
            "\
SourceFile
  Command [try]
    cmd_name: Identifier 'open'
    arg: FilePath 'data.json'
"
        );
        assert_eq!(ast.children_by_field(cmd, Field::CmdName).len(), 1);
        assert_eq!(ast.node_text(ast.children(cmd).nth(1).unwrap()), "?");
    }

    #[test]
    fn test_try_marker_may_follow_whitespace() {
        let ast = parse("open ? data.json").unwrap();
        let cmd = ast.statements()[0];
        assert!(ast.nodes[cmd].flags.contains(NodeFlags::TRY));
        assert_eq!(ast.children_by_field(cmd, Field::Arg).len(), 1);
        assert_eq!(ast.reconstruct(), "open ? data.json");

        // Only the first `?` is the marker
        let ast = parse("echo ? ?").unwrap();
        let cmd = ast.statements()[0];
        assert!(ast.nodes[cmd].flags.contains(NodeFlags::TRY));
        let arg = ast.child_by_field(cmd, Field::Arg).unwrap();
        assert_eq!(ast.nodes[arg].node_type, NodeType::Word);
        assert_eq!(ast.node_text(arg), "?");
    }

    #[test]
    fn test_operator_as_argument() {
        let ast = to_ast_string("where size > 10").unwrap();
        let expected = "\
SourceFile
  Command
    cmd_name: Identifier 'where'
    arg: Identifier 'size'
    arg: Operator '>'
    arg: NumberLiteral '10'
";
        assert_eq!(ast, expected);
    }

    // Statement list tests
    #[test]
    fn test_terminators() {
        let ast = parse("ls; pwd | cat\nwhoami").unwrap();
        let kinds: Vec<NodeType> = ast
            .statements()
            .iter()
            .map(|&s| ast.nodes[s].node_type)
            .collect();
        assert_eq!(kinds, vec![NodeType::Command; 4]);
        assert_eq!(ast.children(ast.root.unwrap()).count(), 7);
    }

    #[test]
    fn test_blank_lines_and_comments() {
        let source = "# setup\n\nls   # list\n\n\npwd\n";
        let ast = parse(source).unwrap();
        assert_eq!(ast.statements().len(), 2);
        assert!(!ast.has_errors());
        assert_eq!(ast.reconstruct(), source);
    }

    #[test]
    fn test_stray_terminator_is_error() {
        let ast = to_ast_string("ls;;pwd").unwrap();
        let expected = "\
SourceFile
  Command
    cmd_name: Identifier 'ls'
  Error ';'
  Command
    cmd_name: Identifier 'pwd'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_trailing_garbage_recovers_at_terminator() {
        let ast = parse("echo (1)\nls").unwrap();
        let expected = "\
SourceFile
  Command
    cmd_name: Identifier 'echo'
  Error '(1)'
  Command
    cmd_name: Identifier 'ls'
";
        assert_eq!(ast.to_string(), expected);
        assert_eq!(
            ast.diagnostics[0].message,
            "expected ';', '|' or newline after statement, found '('"
        );
    }

    #[test]
    fn test_stray_closer_at_top_level() {
        let ast = to_ast_string("} ls").unwrap();
        let expected = "\
SourceFile
  Error '} ls'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_recovery_skips_balanced_brackets() {
        let ast = to_ast_string("let = [1\n2]\nls").unwrap();
        let expected = "\
SourceFile
  Error 'let = [1\\n2]'
  Command
    cmd_name: Identifier 'ls'
";
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_nesting_limit_becomes_error_node() {
        let limits = crate::limits::ParserLimits {
            max_nesting_depth: 12,
            ..crate::limits::ParserLimits::default()
        };
        let ast = crate::parser::parse_with_limits("ls [[[[[[[[1]]]]]]]]\npwd", &limits).unwrap();
        assert!(ast.has_errors());
        assert!(
            ast.diagnostics
                .iter()
                .any(|d| d.message.starts_with("nesting too deep"))
        );
        let last = *ast.statements().last().unwrap();
        assert_eq!(ast.nodes[last].node_type, NodeType::Command);
    }
}
