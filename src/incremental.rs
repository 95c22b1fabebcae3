//! Incremental re-parsing.
//!
//! A top-level statement together with the terminator that ends it forms a
//! segment. After a terminator the parser is back in its initial state, so
//! segments that lie entirely before an edit can be reused as they are, and
//! segments that lie entirely after it can be reused with their ranges
//! shifted. Only the segments the edit touches are lexed and parsed again.

use log::debug;

use crate::ast::{Ast, AstNode, NodeType};
use crate::lexer::{Span, Trivia};
use crate::limits::ParserLimits;
use crate::parser::{self, ParseError};

/// A single replacement: bytes `start..old_end` of the previous text became
/// bytes `start..new_end` of the new text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub old_end: usize,
    pub new_end: usize,
}

impl TextEdit {
    pub fn new(start: usize, old_end: usize, new_end: usize) -> Self {
        Self {
            start,
            old_end,
            new_end,
        }
    }

    /// Replace `start..old_end` of `source` with `text`, returning the new
    /// text and the matching edit. `None` if the range is not valid in `source`.
    pub fn splice(source: &str, start: usize, old_end: usize, text: &str) -> Option<(String, TextEdit)> {
        if start > old_end {
            return None;
        }
        let before = source.get(..start)?;
        let after = source.get(old_end..)?;

        let new_source = format!("{}{}{}", before, text, after);
        Some((new_source, TextEdit::new(start, old_end, start + text.len())))
    }

    /// Length change caused by the edit
    pub fn delta(&self) -> isize {
        self.new_end as isize - self.old_end as isize
    }
}

/// What an incremental re-parse reused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReparseStats {
    /// Segments before the edit taken over unchanged
    pub reused_prefix: usize,
    /// Segments after the edit taken over with shifted ranges
    pub reused_suffix: usize,
    /// Bytes of the new text that were lexed and parsed
    pub reparsed_bytes: usize,
    pub full_reparse: bool,
}

/// Parse `new_source`, reusing what `previous` already knows about the text
/// outside `edit`. The result matches `parse_with_limits(new_source, limits)`.
pub fn reparse(
    previous: &Ast,
    new_source: &str,
    edit: TextEdit,
    limits: &ParserLimits,
) -> Result<Ast, ParseError> {
    reparse_with_stats(previous, new_source, edit, limits).map(|(ast, _)| ast)
}

/// Like [`reparse`], also reporting how much of the previous tree was reused
pub fn reparse_with_stats(
    previous: &Ast,
    new_source: &str,
    edit: TextEdit,
    limits: &ParserLimits,
) -> Result<(Ast, ReparseStats), ParseError> {
    parser::check_input_size(new_source, limits)?;

    if let Err(reason) = check_edit(previous, new_source, edit) {
        debug!("reparse: {}, parsing from scratch", reason);
        return full_reparse(new_source, limits);
    }
    let Some(root) = previous.root else {
        return full_reparse(new_source, limits);
    };

    let children: Vec<usize> = previous.children(root).collect();
    let plan = Plan::new(previous, &children, edit, new_source.len());

    let Some(region_source) = new_source.get(..plan.region_end_new) else {
        return full_reparse(new_source, limits);
    };
    let region = match parser::parse_region(region_source, plan.region_start, limits) {
        Ok(region) => region,
        Err(err) => {
            debug!("reparse: region hit a limit ({}), parsing from scratch", err);
            return full_reparse(new_source, limits);
        }
    };

    if region.has_errors() {
        debug!("reparse: edited region has syntax errors, parsing from scratch");
        return full_reparse(new_source, limits);
    }
    if plan.suffix.is_some() && !ends_on_terminator(&region, plan.region_end_new) {
        debug!("reparse: edited region no longer ends on a terminator, parsing from scratch");
        return full_reparse(new_source, limits);
    }

    let ast = merge(previous, &children, &region, &plan, new_source, edit.delta());
    if ast.nodes.len() > limits.max_ast_nodes {
        return full_reparse(new_source, limits);
    }

    let stats = ReparseStats {
        reused_prefix: count_segments(previous, &children[..plan.prefix]),
        reused_suffix: plan
            .suffix
            .map_or(0, |first| count_segments(previous, &children[first..])),
        reparsed_bytes: plan.region_end_new - plan.region_start,
        full_reparse: false,
    };
    debug!(
        "reparse: reused {} + {} segments, reparsed {}..{}",
        stats.reused_prefix, stats.reused_suffix, plan.region_start, plan.region_end_new
    );

    Ok((ast, stats))
}

fn full_reparse(source: &str, limits: &ParserLimits) -> Result<(Ast, ReparseStats), ParseError> {
    let ast = parser::parse_with_limits(source, limits)?;
    let stats = ReparseStats {
        reparsed_bytes: source.len(),
        full_reparse: true,
        ..ReparseStats::default()
    };
    Ok((ast, stats))
}

// The edit must describe exactly how the previous text became the new one
fn check_edit(previous: &Ast, new_source: &str, edit: TextEdit) -> Result<(), &'static str> {
    let old = previous.source.as_str();

    if edit.start > edit.old_end
        || edit.start > edit.new_end
        || edit.old_end > old.len()
        || edit.new_end > new_source.len()
    {
        return Err("edit out of range");
    }
    if old.len() - edit.old_end != new_source.len() - edit.new_end {
        return Err("edit does not account for the new length");
    }

    let same_prefix = matches!(
        (old.get(..edit.start), new_source.get(..edit.start)),
        (Some(a), Some(b)) if a == b
    );
    let same_suffix = matches!(
        (old.get(edit.old_end..), new_source.get(edit.new_end..)),
        (Some(a), Some(b)) if a == b
    );
    if !same_prefix || !same_suffix {
        return Err("text outside the edit changed");
    }

    Ok(())
}

// Which root children are reused, and the byte range parsed again
struct Plan {
    prefix: usize,         // Number of leading children reused
    suffix: Option<usize>, // Index of the first trailing child reused
    region_start: usize,
    region_end_old: usize,
    region_end_new: usize,
}

impl Plan {
    fn new(previous: &Ast, children: &[usize], edit: TextEdit, new_len: usize) -> Self {
        let is_terminator = |idx: usize| previous.nodes[idx].node_type == NodeType::Token;

        // Segments whose terminator ends strictly before the edit
        let mut prefix = 0;
        let mut region_start = 0;
        for (i, &child) in children.iter().enumerate() {
            let span = previous.nodes[child].span;
            if span.end >= edit.start {
                break;
            }
            if is_terminator(child) {
                prefix = i + 1;
                region_start = span.end;
            }
        }

        // Segments preceded by a terminator that starts at or after the edit
        let suffix = (prefix + 1..children.len()).find(|&k| {
            let terminator = children[k - 1];
            is_terminator(terminator) && previous.nodes[terminator].span.start >= edit.old_end
        });

        let (region_end_old, region_end_new) = match suffix {
            Some(first) => {
                let end = previous.nodes[children[first - 1]].span.end;
                (end, end.saturating_add_signed(edit.delta()))
            }
            None => (previous.source.len(), new_len),
        };

        Plan {
            prefix,
            suffix,
            region_start,
            region_end_old,
            region_end_new,
        }
    }
}

fn ends_on_terminator(region: &Ast, end: usize) -> bool {
    let Some(root) = region.root else {
        return false;
    };
    match region.children(root).last() {
        Some(last) => {
            let node = &region.nodes[last];
            node.node_type == NodeType::Token && node.span.end == end
        }
        None => false,
    }
}

fn count_segments(ast: &Ast, children: &[usize]) -> usize {
    let terminators = children
        .iter()
        .filter(|&&c| ast.nodes[c].node_type == NodeType::Token)
        .count();
    let unterminated = children
        .last()
        .is_some_and(|&c| ast.nodes[c].node_type != NodeType::Token);
    terminators + usize::from(unterminated)
}

// Assemble prefix, region and shifted suffix into a fresh tree
fn merge(
    previous: &Ast,
    children: &[usize],
    region: &Ast,
    plan: &Plan,
    new_source: &str,
    delta: isize,
) -> Ast {
    let mut ast = Ast::new(new_source.to_string());
    let root = ast.add_node(AstNode::new(NodeType::SourceFile, 0));
    ast.root = Some(root);

    for &child in &children[..plan.prefix] {
        let copy = ast.copy_subtree(previous, child, 0);
        ast.add_child(root, copy);
    }
    if let Some(region_root) = region.root {
        for child in region.children(region_root) {
            let copy = ast.copy_subtree(region, child, 0);
            ast.add_child(root, copy);
        }
    }
    if let Some(first) = plan.suffix {
        for &child in &children[first..] {
            let copy = ast.copy_subtree(previous, child, delta);
            ast.add_child(root, copy);
        }
    }
    ast.nodes[root].span = Span::new(0, new_source.len());

    // Trivia and diagnostics never cross a segment boundary
    ast.trivia.extend(
        previous
            .trivia
            .iter()
            .filter(|t| t.span.end <= plan.region_start)
            .copied(),
    );
    ast.trivia.extend(region.trivia.iter().copied());
    if plan.suffix.is_some() {
        ast.trivia.extend(
            previous
                .trivia
                .iter()
                .filter(|t| t.span.start >= plan.region_end_old)
                .map(|t| Trivia {
                    kind: t.kind,
                    span: t.span.shifted(delta),
                }),
        );
    }

    ast.diagnostics.extend(
        previous
            .diagnostics
            .iter()
            .filter(|d| d.span.start < plan.region_start)
            .cloned(),
    );
    ast.diagnostics.extend(region.diagnostics.iter().cloned());
    if plan.suffix.is_some() {
        ast.diagnostics.extend(
            previous
                .diagnostics
                .iter()
                .filter(|d| d.span.start >= plan.region_end_old)
                .map(|d| d.shifted(delta)),
        );
    }

    ast
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    // Helper: apply an edit incrementally and check it against a fresh parse
    fn edit_and_compare(source: &str, start: usize, old_end: usize, text: &str) -> ReparseStats {
        let limits = ParserLimits::default();
        let previous = parse(source).unwrap();
        let (new_source, edit) = TextEdit::splice(source, start, old_end, text).unwrap();

        let (ast, stats) = reparse_with_stats(&previous, &new_source, edit, &limits).unwrap();
        let fresh = parse(&new_source).unwrap();

        assert_eq!(format!("{:#}", ast), format!("{:#}", fresh));
        assert_eq!(ast.trivia, fresh.trivia);
        assert_eq!(ast.diagnostics, fresh.diagnostics);
        assert_eq!(ast.reconstruct(), new_source);
        stats
    }

    #[test]
    fn test_splice() {
        let (text, edit) = TextEdit::splice("echo a", 5, 6, "bcd").unwrap();
        assert_eq!(text, "echo bcd");
        assert_eq!(edit, TextEdit::new(5, 6, 8));
        assert_eq!(edit.delta(), 2);
        assert!(TextEdit::splice("echo", 3, 9, "x").is_none());
        assert!(TextEdit::splice("echo", 3, 2, "x").is_none());
    }

    #[test]
    fn test_edit_in_middle_reuses_both_sides() {
        let stats = edit_and_compare("ls\necho a\npwd\n", 8, 9, "bb");
        assert!(!stats.full_reparse);
        assert_eq!(stats.reused_prefix, 1);
        assert_eq!(stats.reused_suffix, 1);
        assert_eq!(stats.reparsed_bytes, "echo bb\n".len());
    }

    #[test]
    fn test_append_reuses_prefix() {
        let stats = edit_and_compare("let x = 1\nls -la\n", 17, 17, "echo $x\n");
        assert!(!stats.full_reparse);
        assert_eq!(stats.reused_prefix, 2);
        assert_eq!(stats.reused_suffix, 0);
    }

    #[test]
    fn test_suffix_shifts_ranges_and_diagnostics() {
        let stats = edit_and_compare("ls\necho a\nopen config.toml # cfg\n", 8, 9, "abc");
        assert!(!stats.full_reparse);
        assert_eq!(stats.reused_suffix, 1);
    }

    #[test]
    fn test_edit_introducing_error_falls_back() {
        let stats = edit_and_compare("ls\necho a\npwd\n", 8, 8, "[");
        assert!(stats.full_reparse);
    }

    #[test]
    fn test_edit_joining_statements() {
        let stats = edit_and_compare("ls\npwd\n", 2, 3, "");
        assert!(!stats.full_reparse);
        assert_eq!(stats.reused_prefix, 0);
        assert_eq!(stats.reused_suffix, 0);
    }

    #[test]
    fn test_edit_removing_terminator_before_suffix() {
        // `;` replaced by a space turns two statements into one
        edit_and_compare("echo a; echo b\nls\n", 6, 7, " ");
    }

    #[test]
    fn test_inconsistent_edit_falls_back() {
        let limits = ParserLimits::default();
        let previous = parse("ls\npwd\n").unwrap();
        let edit = TextEdit::new(0, 2, 9);
        let (ast, stats) = reparse_with_stats(&previous, "cd\npwd\n", edit, &limits).unwrap();
        assert!(stats.full_reparse);
        assert_eq!(ast.to_string(), parse("cd\npwd\n").unwrap().to_string());
    }

    #[test]
    fn test_reparse_respects_input_limit() {
        let limits = ParserLimits {
            max_input_size: 4,
            ..ParserLimits::default()
        };
        let previous = parse("ls").unwrap();
        let (source, edit) = TextEdit::splice("ls", 2, 2, " -la").unwrap();
        assert_eq!(
            reparse(&previous, &source, edit, &limits).unwrap_err(),
            ParseError::InputTooLarge { size: 6, max: 4 }
        );
    }
}
