//! Go toolchain integration.
//!
//! Drives the external Go tools against generated files:
//! 1. Format-check - `gofmt -l -e` on one file
//! 2. Build - `go build -tags=gno` over a package's production files
//! 3. Run - `go run` of a single entry file, with diagnostics mapped back
//!    to the Gno source path
//!
//! Every invocation uses an explicit argument vector and honours the
//! configured timeout and cancellation token.

mod diagnostics;
mod process;
mod runner;
mod tools;

pub use diagnostics::{normalize_diagnostic, Diagnostic, ENTRY_FILENAME, ERROR_SENTINEL};
pub use process::{run_process, run_process_with_input, CancelToken, ProcessLimits, ProcessOutput};
pub use runner::{classify_run, is_build_excluded, select_build_files, GoToolchain, BUILD_TAGS_FLAG};
pub use tools::{detect_tool, ToolInfo, ToolRegistry};
