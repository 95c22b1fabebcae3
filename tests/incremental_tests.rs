use nu_syntax::ast::{Ast, NodeType};
use nu_syntax::{ParserLimits, TextEdit, parse, reparse, reparse_with_stats};

// Helper: both trees must agree on structure, ranges, trivia and diagnostics
fn assert_same_tree(incremental: &Ast, fresh: &Ast) {
    assert_eq!(format!("{:#}", incremental), format!("{:#}", fresh));
    assert_eq!(incremental.trivia, fresh.trivia);
    assert_eq!(incremental.diagnostics, fresh.diagnostics);
}

const PROGRAM: &str = "\
# setup
let files = $(ls)
def show [path: path] {
  open $path
}

echo done
";

#[test]
fn test_typing_a_statement_char_by_char() {
    let limits = ParserLimits::default();
    let typed = "let total = (1 + 2) * [3 4]\n";
    let insert_at = PROGRAM.find("echo").unwrap();

    let mut source = PROGRAM.to_string();
    let mut ast = parse(&source).unwrap();

    for (i, c) in typed.char_indices() {
        let at = insert_at + i;
        let (next, edit) = TextEdit::splice(&source, at, at, &c.to_string()).unwrap();
        ast = reparse(&ast, &next, edit, &limits).unwrap();
        assert_same_tree(&ast, &parse(&next).unwrap());
        source = next;
    }

    assert_eq!(ast.reconstruct(), source);
    assert!(!ast.has_errors());
}

#[test]
fn test_deleting_a_statement_char_by_char() {
    let limits = ParserLimits::default();
    let mut source = PROGRAM.to_string();
    let mut ast = parse(&source).unwrap();

    let start = source.find("def").unwrap();
    let len = source.find("\n\necho").unwrap() + 1 - start;

    for _ in 0..len {
        let (next, edit) = TextEdit::splice(&source, start, start + 1, "").unwrap();
        ast = reparse(&ast, &next, edit, &limits).unwrap();
        assert_same_tree(&ast, &parse(&next).unwrap());
        source = next;
    }

    assert_eq!(source, "# setup\nlet files = $(ls)\n\necho done\n");
    assert_eq!(ast.statements().len(), 2);
}

#[test]
fn test_edit_inside_function_body_reuses_neighbours() {
    let limits = ParserLimits::default();
    let previous = parse(PROGRAM).unwrap();

    let at = PROGRAM.find("$path\n").unwrap() + "$path".len();
    let (source, edit) = TextEdit::splice(PROGRAM, at, at, " --raw").unwrap();

    let (ast, stats) = reparse_with_stats(&previous, &source, edit, &limits).unwrap();
    assert_same_tree(&ast, &parse(&source).unwrap());
    assert!(!stats.full_reparse);
    assert_eq!(stats.reused_prefix, 1);
    assert_eq!(stats.reused_suffix, 1);
}

#[test]
fn test_edit_unbalancing_brackets_falls_back() {
    let limits = ParserLimits::default();
    let previous = parse(PROGRAM).unwrap();

    let at = PROGRAM.find("$(ls)").unwrap() + 1;
    let (source, edit) = TextEdit::splice(PROGRAM, at, at + 1, "").unwrap();

    let (ast, stats) = reparse_with_stats(&previous, &source, edit, &limits).unwrap();
    assert!(stats.full_reparse);
    assert!(ast.has_errors());
    assert_same_tree(&ast, &parse(&source).unwrap());
}

#[test]
fn test_unchanged_ranges_are_preserved() {
    let limits = ParserLimits::default();
    let previous = parse(PROGRAM).unwrap();

    let at = PROGRAM.find("files").unwrap();
    let (source, edit) = TextEdit::splice(PROGRAM, at, at + "files".len(), "f").unwrap();
    let ast = reparse(&previous, &source, edit, &limits).unwrap();

    // The function definition moved left by exactly the deleted length
    let def_of = |tree: &Ast| {
        tree.statements()
            .into_iter()
            .find(|&s| tree.nodes[s].node_type == NodeType::FunctionDefinition)
            .unwrap()
    };
    let before = previous.nodes[def_of(&previous)].span;
    let after = ast.nodes[def_of(&ast)].span;
    assert_eq!(after.start, before.start - 4);
    assert_eq!(after.len(), before.len());
    assert_eq!(ast.node_text(def_of(&ast)), previous.node_text(def_of(&previous)));
}
