// Library exports for the Gno to Go precompiler
pub mod codegen;
pub mod config;
pub mod error;
pub mod module;
pub mod orchestrator;
pub mod parser;
pub mod policy;
pub mod resolver;
pub mod toolchain;
pub mod translate;

// Re-export key types for convenience
pub use codegen::{precompile_filename_and_tags, Header};
pub use config::PrecompileConfig;
pub use error::{AggregateError, PrecompileError, Result};
pub use module::{gno_files_from_args, gno_packages_from_args, MemFile, MemPackage, ModuleKind};
pub use orchestrator::{CheckSource, GeneratedArtifact, PrecompileReport, Precompiler};
pub use resolver::PrecompiledSet;
pub use toolchain::{normalize_diagnostic, CancelToken, Diagnostic, ToolRegistry};
pub use translate::{translate, TranslationResult};
