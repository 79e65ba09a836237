//! Precompile orchestration over packages on disk and in memory.
//!
//! Each flow strings the lower modules together:
//! 1. Precompile - translate files to disk, format-check them and follow
//!    repository imports into their packages, once per package per run
//! 2. Build - `go build` the generated production files of each package
//! 3. Check - precompile and build, then remove every artifact written
//! 4. Run - translate each file of an in-memory package and `go run` it
//! 5. Clean - delete generated files left next to sources

mod execution;
mod types;

pub use execution::{clean_generated_files, Precompiler};
pub use types::{CheckSource, GeneratedArtifact, PrecompileReport};
