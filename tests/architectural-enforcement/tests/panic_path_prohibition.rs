//! Integration Test: Panic Path Prohibition
//!
//! **Policy**: production code propagates errors with `Result` and `?`.
//! `unwrap()` and `expect()` are only allowed in tests and doc examples.

use architectural_enforcement::{
    code_part, is_in_test_fn, load_sources, report, SourceFile, Violation, PRODUCTION_DIRS,
};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations: Vec<Violation> = load_sources(PRODUCTION_DIRS)
        .iter()
        .flat_map(find_panic_paths)
        .collect();

    report(
        "CRITICAL: unwrap()/expect() found in production code!",
        &violations,
        &[
            "REQUIRED: return a Result and use `?`",
            "REQUIRED: handle Option with `let ... else`, `ok_or`, or a default",
        ],
    );
}

fn find_panic_paths(file: &SourceFile) -> Vec<Violation> {
    let lines = file.production_lines();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains(".unwrap()") || code.contains(".expect(")) {
            continue;
        }
        if is_in_test_fn(lines, idx) {
            continue;
        }
        violations.push(Violation {
            path: file.path.clone(),
            line: idx + 1,
            kind: "Panic path",
            text: line.trim().to_string(),
        });
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_unwrap_and_expect() {
        let file = SourceFile::new(
            "bad.rs",
            "fn a() {\n    let x = y.unwrap();\n    let z = w.expect(\"w\");\n}\n",
        );
        assert_eq!(find_panic_paths(&file).len(), 2);
    }

    #[test]
    fn test_allows_unwrap_or_and_doc_examples() {
        let file = SourceFile::new(
            "ok.rs",
            "//! conductor.submit(\"Hi\").await.unwrap();\nfn a() {\n    let x = y.unwrap_or(0);\n}\n",
        );
        assert!(find_panic_paths(&file).is_empty());
    }

    #[test]
    fn test_allows_unwrap_in_test_fn() {
        let file = SourceFile::new(
            "ok.rs",
            "#[test]\nfn check() {\n    let x = y.unwrap();\n}\n",
        );
        assert!(find_panic_paths(&file).is_empty());
    }
}
