//! Normalization of Go toolchain diagnostics.
//!
//! `go run` reports compile errors for ad-hoc files under the synthetic
//! package name `command-line-arguments`, and names the temporary entry
//! file in every position. This is a textual contract with the Go
//! toolchain's output format; everything that depends on it lives here.

use serde::{Deserialize, Serialize};

/// Fixed name of the file handed to `go run`
pub const ENTRY_FILENAME: &str = "main.go";

/// Marker the Go toolchain prints before compiler diagnostics
pub const ERROR_SENTINEL: &str = "command-line-arguments";

/// Captured process text and its normalized form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub raw: String,
    pub is_error: bool,
    pub normalized: String,
}

/// Classify `input` and rewrite entry-file references to `logical_path`.
///
/// The text after the first mention of the entry file is prefixed with
/// `logical_path`, so `/tmp/x/main.go:12: undefined: X` becomes
/// `<logical_path>:12: undefined: X`. Later lines that mention the entry
/// file have everything up to it replaced the same way. Input without the
/// entry file is returned trimmed but otherwise unchanged.
pub fn normalize_diagnostic(input: &str, logical_path: &str) -> Diagnostic {
    let trimmed = input.trim();
    let is_error = trimmed.contains(ERROR_SENTINEL);

    let normalized = match trimmed.find(ENTRY_FILENAME) {
        Some(idx) => {
            let rest = &trimmed[idx + ENTRY_FILENAME.len()..];
            let mut out = String::with_capacity(rest.len() + logical_path.len());
            out.push_str(logical_path);
            for (line_no, line) in rest.split('\n').enumerate() {
                if line_no > 0 {
                    out.push('\n');
                    out.push_str(&rewrite_line(line, logical_path));
                } else {
                    out.push_str(line);
                }
            }
            out
        }
        None => trimmed.to_string(),
    };

    Diagnostic {
        raw: input.to_string(),
        is_error,
        normalized,
    }
}

fn rewrite_line(line: &str, logical_path: &str) -> String {
    match line.find(ENTRY_FILENAME) {
        Some(idx) => format!("{}{}", logical_path, &line[idx + ENTRY_FILENAME.len()..]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_entry_file_reference() {
        let diag = normalize_diagnostic("main.go:12: undefined: X", "P");
        assert_eq!(diag.normalized, "P:12: undefined: X");
        assert!(!diag.is_error);
    }

    #[test]
    fn test_compiler_error_is_classified_and_rewritten() {
        let raw = "# command-line-arguments\n/tmp/run123/main.go:12:2: undefined: X\n";
        let diag = normalize_diagnostic(raw, "files/undef.gno");

        assert!(diag.is_error);
        assert_eq!(diag.normalized, "files/undef.gno:12:2: undefined: X");
        assert_eq!(diag.raw, raw);
    }

    #[test]
    fn test_multiple_positions_all_rewritten() {
        let raw = "# command-line-arguments\n/tmp/a/main.go:3:2: undefined: X\n/tmp/a/main.go:4:2: undefined: Y";
        let diag = normalize_diagnostic(raw, "f.gno");
        assert_eq!(diag.normalized, "f.gno:3:2: undefined: X\nf.gno:4:2: undefined: Y");
    }

    #[test]
    fn test_without_entry_file_unchanged() {
        let diag = normalize_diagnostic("panic: boom\n", "f.gno");
        assert_eq!(diag.normalized, "panic: boom");
        assert!(!diag.is_error);
    }

    #[test]
    fn test_empty_input() {
        let diag = normalize_diagnostic("", "f.gno");
        assert!(diag.normalized.is_empty());
        assert!(!diag.is_error);
    }
}
