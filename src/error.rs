//! Precompile errors
//!
//! Error taxonomy for translation, policy, code generation and the Go
//! toolchain steps.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while precompiling Gno to Go
#[derive(Error, Debug)]
pub enum PrecompileError {
    #[error("parse: {message}")]
    Parse { filename: String, message: String },

    #[error("import {path:?} is not in the whitelist")]
    ImportNotWhitelisted { path: String },

    #[error("failed to replace the {from:?} package with {to:?}")]
    ImportRewrite { from: String, to: String },

    #[error("codegen {filename}: {message}")]
    CodeGen { filename: String, message: String },

    #[error("check .go file {}: {output}", path.display())]
    FormatCheck { path: PathBuf, output: String },

    #[error("{}: build pkg: std go compiler: {output}", package.display())]
    Build { package: PathBuf, output: String },

    #[error("{output}")]
    Run { output: String },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    #[error("import cycle detected: {chain}")]
    ImportCycle { chain: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cleanup {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<PrecompileError>,
    },

    #[error("{count} precompile errors: {errors}")]
    TranslateFailed { count: usize, errors: AggregateError },

    #[error("{count} build errors: {errors}")]
    BuildFailed { count: usize, errors: AggregateError },

    #[error(transparent)]
    Aggregate(AggregateError),
}

impl PrecompileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the source file the error was raised for
    pub(crate) fn in_file(self, path: impl Into<PathBuf>) -> Self {
        Self::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// True for failures that must abort a run regardless of other results
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Self::Cleanup { .. })
    }

    /// Individual errors carried by this error, flattening aggregates
    pub fn flatten(&self) -> Vec<&PrecompileError> {
        match self {
            Self::Aggregate(agg)
            | Self::TranslateFailed { errors: agg, .. }
            | Self::BuildFailed { errors: agg, .. } => {
                agg.iter().flat_map(|e| e.flatten()).collect()
            }
            Self::InFile { source, .. } => {
                let inner = source.flatten();
                if inner.len() == 1 {
                    vec![self]
                } else {
                    inner
                }
            }
            other => vec![other],
        }
    }
}

/// Result type for precompile operations
pub type Result<T> = std::result::Result<T, PrecompileError>;

/// Any number of errors joined without losing individual messages
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<PrecompileError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: PrecompileError) {
        self.errors.push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PrecompileError> {
        self.errors.iter()
    }

    pub fn into_inner(self) -> Vec<PrecompileError> {
        self.errors
    }

    /// `None` when nothing was collected
    pub fn into_option(self) -> Option<AggregateError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate as an error
    pub fn into_result(self) -> Result<()> {
        match self.into_option() {
            None => Ok(()),
            Some(agg) => Err(PrecompileError::Aggregate(agg)),
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl From<Vec<PrecompileError>> for AggregateError {
    fn from(errors: Vec<PrecompileError>) -> Self {
        Self { errors }
    }
}

impl Extend<PrecompileError> for AggregateError {
    fn extend<I: IntoIterator<Item = PrecompileError>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl IntoIterator for AggregateError {
    type Item = PrecompileError;
    type IntoIter = std::vec::IntoIter<PrecompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
