//! Integration Test: Sleep Prohibition
//!
//! **Policy**: no code waits by sleeping. Production code waits on the
//! response stream or on user input. Integration tests drive turns with
//! scripted transports and explicit polling, so they never need to sleep
//! either; a stalled stream is observed with `tokio::time::timeout`.

use architectural_enforcement::{
    code_part, load_sources, report, SourceFile, Violation, INTEGRATION_TEST_DIRS,
    PRODUCTION_DIRS,
};

const SLEEP_PATTERNS: &[&str] = &["thread::sleep", "time::sleep", "sleep("];

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<Violation> = load_sources(PRODUCTION_DIRS)
        .iter()
        .flat_map(|file| find_sleeps(file, file.production_lines()))
        .collect();

    report(
        "CRITICAL: Sleep calls found in production code!",
        &violations,
        &[
            "FORBIDDEN: sleep in polling loops or as synchronization",
            "REQUIRED: await the stream, the channel or stdin",
        ],
    );
}

#[test]
fn test_no_sleep_in_integration_tests() {
    let violations: Vec<Violation> = load_sources(INTEGRATION_TEST_DIRS)
        .iter()
        .flat_map(|file| find_sleeps(file, &file.lines))
        .collect();

    report(
        "CRITICAL: Sleep calls found in integration tests!",
        &violations,
        &[
            "Drive turns with ScriptedTransport and poll_streaming()",
            "Use tokio::time::timeout to observe a stream that never ends",
        ],
    );
}

fn find_sleeps(file: &SourceFile, lines: &[String]) -> Vec<Violation> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let code = code_part(line);
            SLEEP_PATTERNS.iter().any(|p| code.contains(p))
        })
        .map(|(idx, line)| Violation {
            path: file.path.clone(),
            line: idx + 1,
            kind: "Sleep call",
            text: line.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_sleep_variants() {
        let file = SourceFile::new(
            "bad.rs",
            "fn a() {\n    std::thread::sleep(d);\n}\nasync fn b() {\n    tokio::time::sleep(d).await;\n}\n",
        );
        let found = find_sleeps(&file, &file.lines);
        assert_eq!(found.iter().map(|v| v.line).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn test_ignores_comments() {
        let file = SourceFile::new("ok.rs", "// never sleep(1) here\nlet x = 1;\n");
        assert!(find_sleeps(&file, &file.lines).is_empty());
    }
}
