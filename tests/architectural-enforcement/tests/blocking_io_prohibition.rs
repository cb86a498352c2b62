//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the conductor and the chat front end must not
//! block the runtime. Use `tokio::io`/`tokio::fs` or the async HTTP client.
//!
//! Plain (non-async) functions may block: configuration is read that way
//! before any turn runs.

use architectural_enforcement::{
    code_part, is_in_async_fn, is_in_sync_fn, load_sources, report, SourceFile, Violation,
    PRODUCTION_DIRS,
};

const BLOCKING_CALLS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
];

const BLOCKING_CONSOLE: &[&str] = &["std::io::stdin()", "std::io::stdout()"];

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<Violation> = load_sources(PRODUCTION_DIRS)
        .iter()
        .flat_map(find_blocking_io)
        .collect();

    report(
        "CRITICAL: Blocking I/O found in async code!",
        &violations,
        &[
            "FORBIDDEN in async fn: std::fs, std::net, std::process::Command, reqwest::blocking",
            "FORBIDDEN in async fn: std::io::stdin(), std::io::stdout()",
            "REQUIRED: tokio::io::stdin()/stdout(), tokio::fs, reqwest async client",
            "ACCEPTABLE: blocking calls in non-async functions",
        ],
    );
}

fn find_blocking_io(file: &SourceFile) -> Vec<Violation> {
    let lines = file.production_lines();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);

        for (pattern, kind) in BLOCKING_CALLS {
            if code.contains(pattern) && !is_in_sync_fn(lines, idx) {
                violations.push(Violation {
                    path: file.path.clone(),
                    line: idx + 1,
                    kind: *kind,
                    text: line.trim().to_string(),
                });
            }
        }

        if BLOCKING_CONSOLE.iter().any(|p| code.contains(p)) && is_in_async_fn(lines, idx) {
            violations.push(Violation {
                path: file.path.clone(),
                line: idx + 1,
                kind: "Blocking stdin/stdout in async",
                text: line.trim().to_string(),
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_file_read_in_async_fn() {
        let file = SourceFile::new(
            "bad.rs",
            "async fn load() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
        );
        let found = find_blocking_io(&file);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].kind, "Blocking file I/O");
    }

    #[test]
    fn test_allows_file_read_in_sync_fn() {
        let file = SourceFile::new(
            "ok.rs",
            "pub fn load() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
        );
        assert!(find_blocking_io(&file).is_empty());
    }

    #[test]
    fn test_flags_module_level_import() {
        let file = SourceFile::new("bad.rs", "use std::net::TcpStream;\n");
        assert_eq!(find_blocking_io(&file).len(), 1);
    }

    #[test]
    fn test_ignores_test_module() {
        let file = SourceFile::new(
            "ok.rs",
            "#[cfg(test)]\nmod tests {\n    async fn t() { std::fs::read(\"a\"); }\n}\n",
        );
        assert!(find_blocking_io(&file).is_empty());
    }
}
