use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::lexer::{Span, Trivia};

// Syntax tree with single vector storage using first-child/next-sibling links
#[derive(Debug, Clone)]
pub struct Ast {
    pub nodes: Vec<AstNode>,
    pub source: String,
    pub root: Option<usize>, // Index of the SourceFile node
    pub trivia: Vec<Trivia>, // Whitespace, comments and skipped newlines, in order
    pub diagnostics: Vec<Diagnostic>,
}

// Node kinds in the syntax tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    SourceFile, // Root node containing all statements

    // Statements
    VariableDeclaration,
    FunctionDefinition,
    Alias,
    MathMode,
    Command,

    // Definitions
    Signature,
    Parameter,
    Flag,
    Rest,
    Type, // Type annotation (terminal)
    Block,

    // Expressions
    BinaryExpression,
    ParenthesizedMathExpression,
    CommandSubstitution,
    ValuePath,
    Range,
    Table,
    ColumnHeader,
    Array,
    RecordOrBlock,
    RecordField,

    // Terminals
    Identifier,
    Word,
    NumberLiteral,
    StringLiteral,
    FilePath,
    FlagName,
    FlagShorthand,
    Operator,
    Token, // Anonymous keyword or punctuation

    Error, // Unparseable region
}

impl NodeType {
    /// Kinds that may appear directly in a statement list
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeType::VariableDeclaration
                | NodeType::FunctionDefinition
                | NodeType::Alias
                | NodeType::MathMode
                | NodeType::Command
                | NodeType::Error
        ) || self.is_math_expression()
    }

    /// Kinds accepted as math-mode operands
    pub fn is_math_expression(self) -> bool {
        matches!(
            self,
            NodeType::BinaryExpression
                | NodeType::CommandSubstitution
                | NodeType::ParenthesizedMathExpression
                | NodeType::ValuePath
                | NodeType::NumberLiteral
                | NodeType::Table
                | NodeType::Array
                | NodeType::RecordOrBlock
        )
    }

    /// Leaves whose text is shown in the tree dump
    pub fn is_named_terminal(self) -> bool {
        matches!(
            self,
            NodeType::Identifier
                | NodeType::Word
                | NodeType::NumberLiteral
                | NodeType::StringLiteral
                | NodeType::FilePath
                | NodeType::FlagName
                | NodeType::FlagShorthand
                | NodeType::Operator
                | NodeType::Type
                | NodeType::Error
        )
    }
}

/// Named child slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FuncName,
    AliasName,
    CmdName,
    Arg,
    Name,
    Value,
    Left,
    Operator,
    Right,
    From,
    To,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::FuncName => "func_name",
            Field::AliasName => "alias_name",
            Field::CmdName => "cmd_name",
            Field::Arg => "arg",
            Field::Name => "name",
            Field::Value => "value",
            Field::Left => "left",
            Field::Operator => "operator",
            Field::Right => "right",
            Field::From => "from",
            Field::To => "to",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Markers that don't warrant a node of their own
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        const EXPORTED = 1 << 0; // export def
        const TRY = 1 << 1;      // cmd? form
        const NULLABLE = 1 << 2; // param? form
        const RECORD = 1 << 3;   // RecordOrBlock resolved as a record
        const BLOCK = 1 << 4;    // RecordOrBlock resolved as a block
    }
}

/// Closed set of signature types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeName {
    Int,
    String,
    Path,
    Table,
    Unit,
    Number,
    Pattern,
    Range,
    Block,
    Any,
}

impl TypeName {
    pub const ALL: [TypeName; 10] = [
        TypeName::Int,
        TypeName::String,
        TypeName::Path,
        TypeName::Table,
        TypeName::Unit,
        TypeName::Number,
        TypeName::Pattern,
        TypeName::Range,
        TypeName::Block,
        TypeName::Any,
    ];

    pub fn from_name(name: &str) -> Option<TypeName> {
        TypeName::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeName::Int => "int",
            TypeName::String => "string",
            TypeName::Path => "path",
            TypeName::Table => "table",
            TypeName::Unit => "unit",
            TypeName::Number => "number",
            TypeName::Pattern => "pattern",
            TypeName::Range => "range",
            TypeName::Block => "block",
            TypeName::Any => "any",
        }
    }
}

// Uniform-size tree node using first-child/next-sibling representation
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub node_type: NodeType,
    pub span: Span,
    pub field: Option<Field>,
    pub flags: NodeFlags,

    // Tree structure using indices
    pub first_child: Option<usize>,
    pub last_child: Option<usize>,
    pub next_sibling: Option<usize>,
    pub parent: Option<usize>,
}

impl AstNode {
    /// Inner node; its span becomes the union of its children as they are added
    pub fn new(node_type: NodeType, start: usize) -> Self {
        Self::new_terminal(node_type, Span::new(start, start))
    }

    pub fn new_terminal(node_type: NodeType, span: Span) -> Self {
        Self {
            node_type,
            span,
            field: None,
            flags: NodeFlags::empty(),
            first_child: None,
            last_child: None,
            next_sibling: None,
            parent: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }
}

impl Ast {
    pub fn new(source: String) -> Self {
        Self {
            nodes: Vec::new(),
            source,
            root: None,
            trivia: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    // Add node and return its index
    pub fn add_node(&mut self, node: AstNode) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);
        idx
    }

    // Link child to parent (adds as last child) and widen the parent's span
    pub fn add_child(&mut self, parent_idx: usize, child_idx: usize) {
        self.nodes[child_idx].parent = Some(parent_idx);
        let child_span = self.nodes[child_idx].span;

        let parent = &mut self.nodes[parent_idx];
        match parent.last_child {
            Some(last) => {
                parent.span = parent.span.cover(child_span);
                self.nodes[last].next_sibling = Some(child_idx);
            }
            None => {
                parent.span = child_span;
                parent.first_child = Some(child_idx);
            }
        }
        self.nodes[parent_idx].last_child = Some(child_idx);
    }

    pub fn set_field(&mut self, node_idx: usize, field: Field) {
        self.nodes[node_idx].field = Some(field);
    }

    pub fn children(&self, node_idx: usize) -> Children<'_> {
        Children {
            ast: self,
            next: self.nodes[node_idx].first_child,
        }
    }

    /// Children that are not anonymous tokens
    pub fn named_children(&self, node_idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.children(node_idx)
            .filter(|&c| self.nodes[c].node_type != NodeType::Token)
    }

    pub fn child_by_field(&self, node_idx: usize, field: Field) -> Option<usize> {
        self.children(node_idx)
            .find(|&c| self.nodes[c].field == Some(field) && self.nodes[c].node_type != NodeType::Token)
    }

    pub fn children_by_field(&self, node_idx: usize, field: Field) -> Vec<usize> {
        self.children(node_idx)
            .filter(|&c| self.nodes[c].field == Some(field) && self.nodes[c].node_type != NodeType::Token)
            .collect()
    }

    pub fn node_text(&self, node_idx: usize) -> &str {
        let span = self.nodes[node_idx].span;
        &self.source[span.start..span.end]
    }

    /// Typed view of a `Type` leaf
    pub fn type_name(&self, node_idx: usize) -> Option<TypeName> {
        match self.nodes[node_idx].node_type {
            NodeType::Type => TypeName::from_name(self.node_text(node_idx)),
            _ => None,
        }
    }

    /// Top-level statements, terminators excluded
    pub fn statements(&self) -> Vec<usize> {
        match self.root {
            Some(root) => self.named_children(root).collect(),
            None => Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
            || self.nodes.iter().any(|n| n.node_type == NodeType::Error)
    }

    pub fn count_nodes(&self, node_type: NodeType) -> usize {
        self.nodes.iter().filter(|n| n.node_type == node_type).count()
    }

    /// Concatenate every leaf and every trivia span in document order
    pub fn reconstruct(&self) -> String {
        let mut spans: Vec<Span> = self.trivia.iter().map(|t| t.span).collect();

        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(idx) = stack.pop() {
                let node = &self.nodes[idx];
                if node.is_leaf() {
                    if idx != root {
                        spans.push(node.span);
                    }
                } else {
                    let mut children: Vec<usize> = self.children(idx).collect();
                    children.reverse();
                    stack.extend(children);
                }
            }
        }

        spans.sort_by_key(|s| (s.start, s.end));
        spans
            .iter()
            .map(|s| &self.source[s.start..s.end])
            .collect()
    }

    /// Deep-copy a subtree of `from` into this tree, moving spans by `delta`.
    /// Returns the new, unlinked subtree root.
    pub fn copy_subtree(&mut self, from: &Ast, node_idx: usize, delta: isize) -> usize {
        let source = &from.nodes[node_idx];
        let mut copy = AstNode::new_terminal(source.node_type, source.span.shifted(delta));
        copy.field = source.field;
        copy.flags = source.flags;
        let copy_idx = self.add_node(copy);

        for child in from.children(node_idx) {
            let child_copy = self.copy_subtree(from, child, delta);
            self.add_child(copy_idx, child_copy);
        }

        copy_idx
    }

    /// Serialize the tree, trivia and diagnostics as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = JsonDocument {
            root: self.root.map(|r| self.json_node(r)),
            trivia: &self.trivia,
            diagnostics: &self.diagnostics,
        };
        serde_json::to_string_pretty(&document)
    }

    fn json_node(&self, node_idx: usize) -> JsonNode<'_> {
        let node = &self.nodes[node_idx];
        JsonNode {
            kind: node.node_type,
            field: node.field,
            start: node.span.start,
            end: node.span.end,
            flags: flag_names(node.flags),
            text: node.is_leaf().then(|| self.node_text(node_idx)),
            children: self.children(node_idx).map(|c| self.json_node(c)).collect(),
        }
    }

    fn fmt_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        node_idx: usize,
        indent: usize,
        spans: bool,
    ) -> fmt::Result {
        let node = &self.nodes[node_idx];
        if node.node_type == NodeType::Token {
            return Ok(());
        }

        write!(f, "{}", "  ".repeat(indent))?;
        if let Some(field) = node.field {
            write!(f, "{}: ", field)?;
        }
        write!(f, "{:?}", node.node_type)?;

        if !node.flags.is_empty() {
            write!(f, " [{}]", flag_names(node.flags).join(", "))?;
        }
        if node.node_type.is_named_terminal() {
            write!(f, " '{}'", escape(self.node_text(node_idx)))?;
        }
        if spans {
            write!(f, " @{}..{}", node.span.start, node.span.end)?;
        }
        writeln!(f)?;

        for child in self.children(node_idx) {
            self.fmt_node(f, child, indent + 1, spans)?;
        }
        Ok(())
    }
}

impl fmt::Display for Ast {
    /// Indented dump; `{:#}` adds byte ranges
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(f, root, 0, f.alternate()),
            None => Ok(()),
        }
    }
}

/// Iterator over a node's children in document order
pub struct Children<'a> {
    ast: &'a Ast,
    next: Option<usize>,
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.ast.nodes[current].next_sibling;
        Some(current)
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    root: Option<JsonNode<'a>>,
    trivia: &'a [Trivia],
    diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
struct JsonNode<'a> {
    kind: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<Field>,
    start: usize,
    end: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<JsonNode<'a>>,
}

fn flag_names(flags: NodeFlags) -> Vec<String> {
    flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
