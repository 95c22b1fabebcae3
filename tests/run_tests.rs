use std::fs;
use std::path::{Path, PathBuf};

use nu_syntax::parse;

/// Find all fixture directories in tests/fixtures/
fn find_fixtures() -> Vec<PathBuf> {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut test_dirs = Vec::new();

    if let Ok(entries) = fs::read_dir(&fixtures_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            // Check if it has an input.nu file
            if path.is_dir() && path.join("input.nu").exists() {
                test_dirs.push(path);
            }
        }
    }

    test_dirs.sort();
    test_dirs
}

/// Run a single fixture: parse input.nu and compare the tree dump
fn run_test_case(test_dir: &Path) -> Result<(), String> {
    let test_name = test_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let input_file = test_dir.join("input.nu");
    let expected_file = test_dir.join("expected.txt");

    if !expected_file.exists() {
        return Err(format!("Test '{}': expected.txt not found", test_name));
    }

    let source = fs::read_to_string(&input_file)
        .map_err(|e| format!("Test '{}': failed to read input.nu: {}", test_name, e))?;
    let expected = fs::read_to_string(&expected_file)
        .map_err(|e| format!("Test '{}': failed to read expected.txt: {}", test_name, e))?;

    let ast = parse(&source).map_err(|e| format!("Test '{}': {}", test_name, e))?;

    if ast.reconstruct() != source {
        return Err(format!("Test '{}': tree does not reproduce its input", test_name));
    }

    let actual = ast.to_string();
    if actual.trim_end() != expected.trim_end() {
        return Err(format!(
            "Test '{}': output mismatch\nExpected:\n{}\nActual:\n{}",
            test_name,
            expected.trim_end(),
            actual.trim_end()
        ));
    }

    Ok(())
}

#[test]
fn test_fixtures() {
    let test_dirs = find_fixtures();

    if test_dirs.is_empty() {
        panic!("No fixtures found in tests/fixtures/");
    }

    let mut failures = Vec::new();

    for test_dir in &test_dirs {
        let test_name = test_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        print!("Running fixture '{}' ... ", test_name);

        match run_test_case(test_dir) {
            Ok(_) => {
                println!("ok");
            }
            Err(e) => {
                println!("FAILED");
                failures.push(e);
            }
        }
    }

    if !failures.is_empty() {
        eprintln!("\nFailures:");
        for failure in &failures {
            eprintln!("  {}", failure);
        }
        panic!("{} fixture(s) failed", failures.len());
    }
}

// Individual test for one fixture - makes it easier to run in isolation
#[test]
fn test_fixture_error_recovery() {
    let test_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/error_recovery");
    if let Err(e) = run_test_case(&test_dir) {
        panic!("{}", e);
    }
}
