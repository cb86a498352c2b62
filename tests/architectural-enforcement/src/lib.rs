//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the tests in `tests/`. Each test walks the
//! production sources of the workspace and fails with a list of offending
//! lines:
//! - No sleep calls (wait on I/O instead)
//! - No blocking I/O inside async functions
//! - No `unwrap()`/`expect()` outside tests
//!
//! Scanning is line based. Everything from the first `#[cfg(test)]` line of
//! a file onwards counts as test code.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "conductor/cli/src"];

/// Integration test directories, relative to the workspace root
pub const INTEGRATION_TEST_DIRS: &[&str] = &["conductor/core/tests"];

/// Root of the workspace this crate lives in
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A Rust source file loaded for scanning
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// All lines of the file
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Parse source text
    pub fn new(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Lines before the test module
    pub fn production_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .position(|l| l.trim_start().starts_with("#[cfg(test)]"))
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }
}

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule it breaks
    pub kind: &'static str,
    /// The trimmed source line
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

/// Load every `.rs` file below the given workspace-relative directories
///
/// Panics if a directory is missing, so a moved crate cannot make the
/// scans pass by finding nothing.
pub fn load_sources(dirs: &[&str]) -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in dirs {
        let path = root.join(dir);
        assert!(path.exists(), "scan directory {} is missing", path.display());

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(SourceFile::new(relative, &content));
        }
    }

    files
}

/// The code on a line, without any trailing comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a line opens a function
pub fn is_fn_signature(line: &str) -> bool {
    let mut rest = code_part(line).trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "async ", "unsafe "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped.trim_start();
        }
    }
    rest.starts_with("fn ")
}

/// Signature line of the function enclosing `idx`, if any
pub fn enclosing_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> Option<&str> {
    for i in (0..=idx.min(lines.len().saturating_sub(1))).rev() {
        let line = lines[i].as_ref();
        if is_fn_signature(line) {
            return Some(line);
        }
        let trimmed = line.trim_start();
        if i != idx && (trimmed.starts_with("mod ") || trimmed.starts_with("impl")) {
            return None;
        }
    }
    None
}

/// Whether the line at `idx` sits inside an `async fn`
pub fn is_in_async_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|sig| sig.contains("async fn "))
}

/// Whether the line at `idx` sits inside a plain, non-async function
pub fn is_in_sync_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|sig| !sig.contains("async fn "))
}

/// Whether the line at `idx` belongs to a `#[test]`/`#[tokio::test]` function
pub fn is_in_test_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> bool {
    let Some(fn_idx) = (0..=idx.min(lines.len().saturating_sub(1)))
        .rev()
        .find(|&i| is_fn_signature(lines[i].as_ref()))
    else {
        return false;
    };

    for i in (0..fn_idx).rev() {
        let line = lines[i].as_ref().trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

/// Print violations and fail the test if there are any
pub fn report(title: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    if !guidance.is_empty() {
        eprintln!();
        for line in guidance {
            eprintln!("  {line}");
        }
    }

    panic!(
        "\nFound {} violation(s).\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature_detection() {
        assert!(is_fn_signature("fn main() {"));
        assert!(is_fn_signature("    pub async fn submit(&mut self) {"));
        assert!(is_fn_signature("pub(crate) fn helper() {"));
        assert!(!is_fn_signature("    let f = fn_name();"));
        assert!(!is_fn_signature("// fn commented()"));
    }

    #[test]
    fn test_async_detection() {
        let code = [
            "pub async fn bad() {",
            "    let text = std::fs::read_to_string(\"a\")?;",
            "}",
        ];
        assert!(is_in_async_fn(&code, 1));
        assert!(!is_in_sync_fn(&code, 1));
    }

    #[test]
    fn test_sync_detection() {
        let code = [
            "pub fn load<F>(env: F) -> Result<()> {",
            "    let text = std::fs::read_to_string(\"a\")?;",
            "}",
        ];
        assert!(is_in_sync_fn(&code, 1));
        assert!(!is_in_async_fn(&code, 1));
    }

    #[test]
    fn test_test_fn_detection() {
        let code = [
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(d).await;",
            "}",
        ];
        assert!(is_in_test_fn(&code, 2));

        let code = ["async fn helper() {", "    tokio::time::sleep(d).await;", "}"];
        assert!(!is_in_test_fn(&code, 1));
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let file = SourceFile::new("x.rs", "fn a() {}\n#[cfg(test)]\nmod tests {}\n");
        assert_eq!(file.production_lines().len(), 1);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // .unwrap()"), "let x = 1; ");
        assert_eq!(code_part("/// doc .unwrap()"), "");
    }
}
